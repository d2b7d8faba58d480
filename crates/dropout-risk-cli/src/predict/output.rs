use anyhow::{Context, Result};

use dropout_risk::prediction::Assessment;

pub fn render_assessment(assessment: &Assessment) -> Result<String> {
    serde_json::to_string_pretty(assessment).context("Failed to encode assessment")
}

/// One line per top feature, for the log.
pub fn summarize(assessment: &Assessment) -> String {
    let p = &assessment.prediction;
    let mut out = format!(
        "Risk {:.3} ({}), confidence {:.3}",
        p.risk_score, p.risk_category, p.confidence
    );
    for feature in &p.top_features {
        out.push_str(&format!(
            "\n  {:<32} {:>+8.4}  (value {})",
            feature.label, feature.attribution_value, feature.raw_value
        ));
    }
    if let Some(first) = assessment.feature_importance.first() {
        out.push_str(&format!(
            "\n  Most important feature overall: {} ({:.3})",
            first.name, first.importance
        ));
    }
    out
}
