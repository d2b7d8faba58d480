//! Persisted model artifact.
//!
//! The artifact is a single JSON document holding the feature schema it was
//! trained on, the fitted model and a background sample of training rows.
//! Writes go through a temporary file in the destination directory and an atomic
//! rename, so a reader never observes a half-written artifact and a failed write
//! leaves the previous one in place.
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{Result, RiskError};
use crate::models::TrainedModel;
use crate::schema::{schema_names, validate_schema, FEATURE_COUNT};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    /// Feature names in model input order.
    pub schema: Vec<String>,
    /// Display label of the deployed model.
    pub variant: String,
    pub model: TrainedModel,
    /// Training rows used as the reference distribution for explanations.
    pub background: Vec<[f64; FEATURE_COUNT]>,
    pub trained_at: DateTime<Utc>,
}

impl ModelArtifact {
    pub fn new(model: TrainedModel, background: Vec<[f64; FEATURE_COUNT]>) -> Self {
        ModelArtifact {
            schema: schema_names(),
            variant: model.label(),
            model,
            background,
            trained_at: Utc::now(),
        }
    }

    /// Write the artifact atomically to `destination`.
    pub fn persist<P: AsRef<Path>>(&self, destination: P) -> Result<()> {
        let destination = destination.as_ref();
        let bytes = serde_json::to_vec(self)
            .map_err(|e| RiskError::Persist(format!("failed to encode artifact: {}", e)))?;
        write_atomically(destination, &bytes)?;
        log::info!(
            "Saved {} artifact to {} ({} bytes)",
            self.variant,
            destination.display(),
            bytes.len()
        );
        Ok(())
    }

    /// Read and validate an artifact.
    ///
    /// A missing or undecodable file is `ModelUnavailable`; an artifact trained on
    /// a different feature schema is `SchemaMismatch`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read(path).map_err(|e| {
            RiskError::ModelUnavailable(format!("cannot read {}: {}", path.display(), e))
        })?;
        let artifact: ModelArtifact = serde_json::from_slice(&content).map_err(|e| {
            RiskError::ModelUnavailable(format!("cannot decode {}: {}", path.display(), e))
        })?;
        validate_schema(&artifact.schema)?;
        log::debug!(
            "Loaded {} artifact trained at {} from {}",
            artifact.variant,
            artifact.trained_at.to_rfc3339(),
            path.display()
        );
        Ok(artifact)
    }
}

/// Write `bytes` to `destination` via a synced temporary file and a rename.
pub fn write_atomically(destination: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(|e| {
        RiskError::Persist(format!("cannot create directory {}: {}", dir.display(), e))
    })?;

    let temp = NamedTempFile::new_in(&dir).map_err(|e| {
        RiskError::Persist(format!("cannot create temp file in {}: {}", dir.display(), e))
    })?;
    {
        let mut writer = BufWriter::new(temp.as_file());
        writer
            .write_all(bytes)
            .and_then(|_| writer.flush())
            .map_err(|e| RiskError::Persist(format!("write failed: {}", e)))?;
    }
    temp.as_file()
        .sync_all()
        .map_err(|e| RiskError::Persist(format!("fsync failed: {}", e)))?;
    temp.persist(destination).map_err(|e| {
        RiskError::Persist(format!(
            "cannot replace {}: {}",
            destination.display(),
            e.error
        ))
    })?;
    Ok(())
}

/// Pick up to `size` rows without replacement, keeping their original order.
pub fn sample_background(
    rows: &[[f64; FEATURE_COUNT]],
    size: usize,
    seed: u64,
) -> Vec<[f64; FEATURE_COUNT]> {
    if rows.len() <= size {
        return rows.to_vec();
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut picked = sample(&mut rng, rows.len(), size).into_vec();
    picked.sort_unstable();
    picked.into_iter().map(|i| rows[i]).collect()
}

/// Source of the deployed artifact for the prediction service.
pub trait ModelLoader: Send + Sync {
    fn load(&self) -> Result<ModelArtifact>;

    /// Where the artifact comes from, for log messages.
    fn describe(&self) -> String;
}

/// Loads the artifact from a JSON file on disk.
#[derive(Debug, Clone)]
pub struct ArtifactLoader {
    path: PathBuf,
}

impl ArtifactLoader {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        ArtifactLoader { path: path.into() }
    }
}

impl ModelLoader for ArtifactLoader {
    fn load(&self) -> Result<ModelArtifact> {
        ModelArtifact::load(&self.path)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
