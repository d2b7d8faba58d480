//! Loading and preparing the student dataset.
//!
//! The chain is `load_dataset` -> `normalize_column_names` -> `encode_target` ->
//! `RawTable::to_dataset` -> `split_train_test`. `DataLoader::load_and_prepare`
//! runs all of it from a [`PipelineConfig`].
use std::path::Path;

use once_cell::sync::Lazy;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use regex::Regex;

use crate::config::PipelineConfig;
use crate::error::{Result, RiskError};
use crate::schema::{FeatureRecord, FEATURE_COUNT, FEATURE_NAMES};

static NON_ALNUM_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

/// Status values that map to the positive class.
const DROPOUT_LABEL: &str = "Dropout";
/// Status values that map to the negative class.
const RETAINED_LABELS: [&str; 2] = ["Graduate", "Enrolled"];

/// Untyped CSV contents: one header row and string cells.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Extract the schema features and the encoded target.
    ///
    /// Expects `encode_target` to have run, so the label column holds `0`/`1`.
    pub fn to_dataset(&self, label_column: &str) -> Result<TrainingDataset> {
        let mut feature_idx = [0usize; FEATURE_COUNT];
        for (slot, name) in feature_idx.iter_mut().zip(FEATURE_NAMES.iter()) {
            *slot = self.column_index(name).ok_or_else(|| {
                RiskError::DataUnavailable(format!("missing feature column '{}'", name))
            })?;
        }
        let label_idx = self.column_index(label_column).ok_or_else(|| {
            RiskError::DataUnavailable(format!("missing label column '{}'", label_column))
        })?;

        let mut records = Vec::with_capacity(self.rows.len());
        let mut labels = Vec::with_capacity(self.rows.len());
        for (row_idx, row) in self.rows.iter().enumerate() {
            let mut values = [0.0; FEATURE_COUNT];
            for (k, &col) in feature_idx.iter().enumerate() {
                let cell = row.get(col).map(|c| c.trim()).unwrap_or("");
                values[k] = cell.parse::<f64>().map_err(|_| {
                    RiskError::DataUnavailable(format!(
                        "row {}: column '{}' is not numeric ('{}')",
                        row_idx + 1,
                        FEATURE_NAMES[k],
                        cell
                    ))
                })?;
                if !values[k].is_finite() {
                    return Err(RiskError::DataUnavailable(format!(
                        "row {}: column '{}' is not finite",
                        row_idx + 1,
                        FEATURE_NAMES[k]
                    )));
                }
            }
            let label = match row.get(label_idx).map(|c| c.trim()).unwrap_or("") {
                "1" => 1u8,
                "0" => 0u8,
                other => {
                    return Err(RiskError::UnknownLabel {
                        row: row_idx + 1,
                        value: other.to_string(),
                    })
                }
            };
            records.push(FeatureRecord::from_array(values));
            labels.push(label);
        }

        TrainingDataset::new(records, labels)
    }
}

/// Feature records paired with binary labels (1 = dropout).
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingDataset {
    pub records: Vec<FeatureRecord>,
    pub labels: Vec<u8>,
}

impl TrainingDataset {
    pub fn new(records: Vec<FeatureRecord>, labels: Vec<u8>) -> Result<Self> {
        if records.len() != labels.len() {
            return Err(RiskError::DataUnavailable(format!(
                "{} records but {} labels",
                records.len(),
                labels.len()
            )));
        }
        if let Some(bad) = labels.iter().find(|&&l| l > 1) {
            return Err(RiskError::DataUnavailable(format!("label {} is not binary", bad)));
        }
        Ok(TrainingDataset { records, labels })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn n_positive(&self) -> usize {
        self.labels.iter().filter(|&&l| l == 1).count()
    }

    /// Feature rows in schema order.
    pub fn features(&self) -> Vec<[f64; FEATURE_COUNT]> {
        self.records.iter().map(FeatureRecord::to_array).collect()
    }

    pub fn select(&self, indices: &[usize]) -> TrainingDataset {
        TrainingDataset {
            records: indices.iter().map(|&i| self.records[i]).collect(),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
        }
    }

    pub fn log_summary(&self, name: &str) {
        let positives = self.n_positive();
        let pct = if self.is_empty() {
            0.0
        } else {
            positives as f64 / self.len() as f64 * 100.0
        };
        log::info!(
            "{}: {} records, {} dropout ({:.1}%), {} retained",
            name,
            self.len(),
            positives,
            pct,
            self.len() - positives
        );
    }
}

/// Read a delimited file with a header row.
pub fn load_dataset<P: AsRef<Path>>(path: P, delimiter: u8) -> Result<RawTable> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .from_path(path)
        .map_err(|e| {
            RiskError::DataUnavailable(format!("failed to open {}: {}", path.display(), e))
        })?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| RiskError::DataUnavailable(format!("failed to read header row: {}", e)))?
        .iter()
        .map(str::to_string)
        .collect();

    if headers.len() < 2 {
        return Err(RiskError::DataUnavailable(format!(
            "{} has a single column; check the delimiter ('{}')",
            path.display(),
            delimiter as char
        )));
    }

    let mut rows = Vec::new();
    for (row_idx, result) in reader.records().enumerate() {
        let record = result.map_err(|e| {
            RiskError::DataUnavailable(format!("failed to read row {}: {}", row_idx + 1, e))
        })?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    if rows.is_empty() {
        return Err(RiskError::DataUnavailable(format!(
            "{} contains no data rows",
            path.display()
        )));
    }

    log::debug!(
        "Loaded {} rows x {} columns from {}",
        rows.len(),
        headers.len(),
        path.display()
    );
    Ok(RawTable { headers, rows })
}

/// Normalize one header: lowercase, non-alphanumeric runs become `_`.
pub fn normalize_column_name(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    NON_ALNUM_RUN
        .replace_all(&lowered, "_")
        .trim_matches('_')
        .to_string()
}

pub fn normalize_column_names(mut table: RawTable) -> RawTable {
    table.headers = table
        .headers
        .iter()
        .map(|h| normalize_column_name(h))
        .collect();
    table
}

/// Map the status column to `1` (Dropout) or `0` (Graduate, Enrolled).
///
/// Already encoded `0`/`1` values pass through, so re-running is harmless.
/// Anything else is treated as a data-quality problem.
pub fn encode_target(mut table: RawTable, label_column: &str) -> Result<RawTable> {
    let idx = table.column_index(label_column).ok_or_else(|| {
        RiskError::DataUnavailable(format!("missing label column '{}'", label_column))
    })?;

    for (row_idx, row) in table.rows.iter_mut().enumerate() {
        let value = row.get(idx).map(|c| c.trim()).unwrap_or("");
        let encoded = if value == DROPOUT_LABEL || value == "1" {
            "1"
        } else if RETAINED_LABELS.contains(&value) || value == "0" {
            "0"
        } else {
            return Err(RiskError::UnknownLabel {
                row: row_idx + 1,
                value: value.to_string(),
            });
        };
        if let Some(cell) = row.get_mut(idx) {
            *cell = encoded.to_string();
        }
    }
    Ok(table)
}

/// Stratified split preserving the class ratio in both partitions.
///
/// Each class gives `round(n_class * test_fraction)` rows to the test partition.
/// Both partitions keep the input order, so the same seed and input always
/// produce the same split.
pub fn split_train_test(
    dataset: &TrainingDataset,
    test_fraction: f64,
    seed: u64,
) -> Result<(TrainingDataset, TrainingDataset)> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(RiskError::InvalidConfig(format!(
            "test_fraction must be in (0, 1), got {}",
            test_fraction
        )));
    }
    if dataset.is_empty() {
        return Err(RiskError::DataUnavailable("cannot split an empty dataset".to_string()));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut is_test = vec![false; dataset.len()];

    for class in [0u8, 1u8] {
        let mut members: Vec<usize> = (0..dataset.len())
            .filter(|&i| dataset.labels[i] == class)
            .collect();
        members.shuffle(&mut rng);
        let n_test = (members.len() as f64 * test_fraction).round() as usize;
        for &i in members.iter().take(n_test) {
            is_test[i] = true;
        }
    }

    let (test_idx, train_idx): (Vec<usize>, Vec<usize>) =
        (0..dataset.len()).partition(|&i| is_test[i]);

    if train_idx.is_empty() || test_idx.is_empty() {
        return Err(RiskError::DataUnavailable(format!(
            "split of {} records left an empty partition",
            dataset.len()
        )));
    }

    Ok((dataset.select(&train_idx), dataset.select(&test_idx)))
}

/// Held-out index sets for stratified k-fold cross-validation.
///
/// Each class is shuffled and dealt round-robin over the folds, so fold sizes
/// differ by at most one and every fold keeps roughly the class ratio. Every
/// index appears in exactly one fold; indices within a fold are ascending.
pub fn stratified_folds(
    dataset: &TrainingDataset,
    k: usize,
    seed: u64,
) -> Result<Vec<Vec<usize>>> {
    if k < 2 {
        return Err(RiskError::InvalidConfig(format!(
            "cross-validation needs at least 2 folds, got {}",
            k
        )));
    }
    if dataset.len() < k {
        return Err(RiskError::DataUnavailable(format!(
            "{} records cannot fill {} folds",
            dataset.len(),
            k
        )));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut folds = vec![Vec::new(); k];
    let mut slot = 0;
    for class in [0u8, 1u8] {
        let mut members: Vec<usize> = (0..dataset.len())
            .filter(|&i| dataset.labels[i] == class)
            .collect();
        members.shuffle(&mut rng);
        for i in members {
            folds[slot % k].push(i);
            slot += 1;
        }
    }
    folds.iter_mut().for_each(|fold| fold.sort_unstable());
    Ok(folds)
}

pub struct DataLoader;

impl DataLoader {
    /// Load, clean, encode and split the dataset named in `config`.
    pub fn load_and_prepare(
        config: &PipelineConfig,
    ) -> Result<(TrainingDataset, TrainingDataset)> {
        log::info!("Loading data from {}", config.dataset_path.display());
        let table = load_dataset(&config.dataset_path, config.delimiter_byte())?;
        let table = normalize_column_names(table);
        let table = encode_target(table, &config.label_column)?;
        let dataset = table.to_dataset(&config.label_column)?;
        dataset.log_summary("Dataset");

        let (train, test) =
            split_train_test(&dataset, config.test_fraction, config.split_seed)?;
        train.log_summary("Training partition");
        test.log_summary("Test partition");
        Ok((train, test))
    }
}
