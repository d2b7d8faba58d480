/// Common contract for fitted binary classifiers.
///
/// Models are fitted by their own constructors and are immutable afterwards, so
/// scoring only needs `&self` and implementations are `Send + Sync` for sharing
/// behind an `Arc`.
pub trait ClassifierModel: Send + Sync {
    /// Probability of the positive (dropout) class for one row in schema order.
    fn predict_proba(&self, x: &[f64]) -> f64;

    /// Class label at the 0.5 cut-off.
    fn predict(&self, x: &[f64]) -> u8 {
        u8::from(self.predict_proba(x) >= 0.5)
    }

    /// Probabilities for many rows.
    fn predict_proba_batch(&self, rows: &[[f64; crate::schema::FEATURE_COUNT]]) -> Vec<f64> {
        rows.iter().map(|r| self.predict_proba(r)).collect()
    }

    /// Optional human readable name for the model
    fn name(&self) -> &str {
        "classifier"
    }
}
