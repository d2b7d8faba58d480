use crate::config::ExplainConfig;
use crate::explain::{
    Attributor, Explanation, FeatureAttribution, LimeAttributor, MethodAttributions,
    TreeShapAttributor,
};
use crate::models::TrainedModel;
use crate::schema::{FeatureRecord, FEATURE_COUNT};

/// Runs every configured attribution method and keeps the strongest features of
/// each. A failing method contributes an empty list instead of an error.
pub struct ExplanationService {
    attributors: Vec<Box<dyn Attributor>>,
    top_n: usize,
}

impl ExplanationService {
    /// TreeSHAP first, then the local surrogate.
    pub fn new(config: &ExplainConfig) -> Self {
        let attributors: Vec<Box<dyn Attributor>> = vec![
            Box::new(TreeShapAttributor),
            Box::new(LimeAttributor::new(
                config.lime_samples,
                config.kernel_width,
                config.lime_seed,
            )),
        ];
        Self::with_attributors(attributors, config.top_n)
    }

    pub fn with_attributors(attributors: Vec<Box<dyn Attributor>>, top_n: usize) -> Self {
        ExplanationService {
            attributors,
            top_n: top_n.max(1),
        }
    }

    pub fn top_n(&self) -> usize {
        self.top_n
    }

    pub fn explain(
        &self,
        record: &FeatureRecord,
        model: &TrainedModel,
        background: &[[f64; FEATURE_COUNT]],
    ) -> Explanation {
        let methods = self
            .attributors
            .iter()
            .map(|attributor| {
                let attributions = match attributor.attribute(record, model, background) {
                    Ok(all) => rank(all, self.top_n),
                    Err(e) => {
                        log::warn!("{} explanation unavailable: {}", attributor.name(), e);
                        Vec::new()
                    }
                };
                MethodAttributions {
                    method: attributor.name().to_string(),
                    attributions,
                }
            })
            .collect();
        Explanation { methods }
    }
}

/// Sort by absolute attribution (largest first) and keep `top_n`.
/// Ties keep schema order.
pub fn rank(mut attributions: Vec<FeatureAttribution>, top_n: usize) -> Vec<FeatureAttribution> {
    attributions.sort_by(|a, b| b.attribution.abs().total_cmp(&a.attribution.abs()));
    attributions.truncate(top_n);
    attributions
}
