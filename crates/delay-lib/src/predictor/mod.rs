//! Delay model: feature encoding plus prediction resolution
//!
//! [`DelayModel`] owns two pieces of swappable state, an in-memory
//! classifier produced by [`DelayModel::fit`] and an inference session
//! produced by [`DelayModel::load`]. Predictions are served from the first
//! source available, in this order:
//!
//! 1. the loaded inference session
//! 2. the in-memory classifier
//! 3. the configured artifact path, loaded once and then retried
//!
//! Both slots hold `Arc` snapshots behind a `RwLock`, so readers clone the
//! current snapshot and run without holding the lock while `fit`/`load`
//! build a replacement first and swap it in.

mod artifact;
mod export;
mod features;
mod inference;

pub use artifact::{compute_checksum, read_artifact, write_atomic};
pub use export::{build_model, keys, ArtifactMetadata, DOC_STRING, INPUT_NAME, OUTPUT_NAME};
pub use features::{
    carrier_feature, flight_type_feature, month_feature, FeatureEncoder, FeatureMatrix,
    CARRIER_PREFIX, FLIGHT_TYPE_PREFIX, MONTH_PREFIX,
};
pub use inference::{InferenceStats, OnnxSession};

use crate::classifier::{self, Classifier, TrainParams};
use crate::config::{ConfigError, ModelConfig};
use crate::error::{ModelError, Result};
use crate::models::{FlightRecord, Labels, TrainingRecord};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// Which source answered a prediction call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictionSource {
    Session,
    Classifier,
}

impl PredictionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PredictionSource::Session => "session",
            PredictionSource::Classifier => "classifier",
        }
    }
}

/// The flight delay model component
#[derive(Debug)]
pub struct DelayModel {
    config: ModelConfig,
    encoder: FeatureEncoder,
    classifier: RwLock<Option<Arc<dyn Classifier>>>,
    session: RwLock<Option<Arc<OnnxSession>>>,
}

impl DelayModel {
    pub fn new(config: ModelConfig) -> Self {
        let encoder = FeatureEncoder::from_config(&config);
        Self {
            config,
            encoder,
            classifier: RwLock::new(None),
            session: RwLock::new(None),
        }
    }

    /// Build from environment configuration, failing fast on bad values
    pub fn from_env() -> std::result::Result<Self, ConfigError> {
        Ok(Self::new(ModelConfig::load()?))
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn encoder(&self) -> &FeatureEncoder {
        &self.encoder
    }

    /// Encode serving-time records
    pub fn preprocess(&self, records: &[FlightRecord]) -> FeatureMatrix {
        self.encoder.encode(records)
    }

    /// Encode historical records into features and delay labels
    pub fn preprocess_for_training(&self, records: &[TrainingRecord]) -> (FeatureMatrix, Labels) {
        self.encoder.encode_training(records)
    }

    /// Train a fresh classifier, replacing any previous one
    pub fn fit(&self, features: &FeatureMatrix, labels: &[i64]) -> Result<()> {
        let trained = classifier::train(&TrainParams::from_config(&self.config), features, labels)?;
        *self
            .classifier
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(trained);
        Ok(())
    }

    /// One prediction (0 or 1) per row
    pub fn predict(&self, features: &FeatureMatrix) -> Result<Vec<i64>> {
        self.predict_with_source(features).map(|(labels, _)| labels)
    }

    /// Predict and report which source answered
    pub fn predict_with_source(
        &self,
        features: &FeatureMatrix,
    ) -> Result<(Vec<i64>, PredictionSource)> {
        if let Some(resolved) = self.resolve(features)? {
            return Ok(resolved);
        }

        let Some(path) = self.config.model_path.as_deref() else {
            return Err(ModelError::NoPredictionSource);
        };

        match self.load(Some(path)) {
            Ok(_) => {
                // Single retry; a load that leaves no source ends here
                if let Some(resolved) = self.resolve(features)? {
                    return Ok(resolved);
                }
            }
            Err(e) if e.is_not_found() => {
                debug!(path = %path.display(), "Configured artifact does not exist");
            }
            Err(e) => return Err(e),
        }

        Err(ModelError::NoPredictionSource)
    }

    fn resolve(&self, features: &FeatureMatrix) -> Result<Option<(Vec<i64>, PredictionSource)>> {
        if let Some(session) = self.session_snapshot() {
            return Ok(Some((session.run(features)?, PredictionSource::Session)));
        }
        if let Some(classifier) = self.classifier_snapshot() {
            return Ok(Some((
                classifier.predict(features)?,
                PredictionSource::Classifier,
            )));
        }
        Ok(None)
    }

    /// Export the trained classifier. Returns the written path, or `None`
    /// when there is nothing to save.
    pub fn save(&self, path: Option<&Path>) -> Result<Option<PathBuf>> {
        let Some(classifier) = self.classifier_snapshot() else {
            debug!("No trained classifier, skipping save");
            return Ok(None);
        };
        let path = self.artifact_path(path)?;

        let width = if self.config.is_restricted() {
            let configured = self.config.top_features.len();
            if configured != classifier.n_features() {
                return Err(ModelError::ShapeMismatch {
                    expected: classifier.n_features(),
                    actual: configured,
                });
            }
            configured
        } else {
            classifier.n_features()
        };

        let bytes = build_model(classifier.as_ref(), &self.config, width).to_bytes();
        write_atomic(&path, &bytes)?;

        info!(
            path = %path.display(),
            classifier = %classifier.kind(),
            n_features = width,
            size = bytes.len(),
            checksum = %compute_checksum(&bytes),
            "Model artifact saved"
        );
        Ok(Some(path))
    }

    /// Load an artifact and replace the current session. A missing file is
    /// reported as [`ModelError::ArtifactNotFound`] and leaves the current
    /// session in place.
    pub fn load(&self, path: Option<&Path>) -> Result<ArtifactMetadata> {
        let path = self.artifact_path(path)?;
        let bytes = read_artifact(&path)?;
        let session = OnnxSession::from_bytes(&bytes).map_err(|source| ModelError::Artifact {
            path: path.clone(),
            source,
        })?;

        let metadata = session.metadata().clone();
        if self.config.is_restricted() {
            if !metadata.feature_names.is_empty() && metadata.feature_names != self.config.top_features
            {
                warn!(
                    path = %path.display(),
                    artifact_features = %metadata.feature_names.join("|"),
                    configured_features = %self.config.top_features.join("|"),
                    "Artifact was trained against a different feature list"
                );
            }
            if session.n_features() != self.config.top_features.len() {
                warn!(
                    path = %path.display(),
                    artifact_width = session.n_features(),
                    configured_width = self.config.top_features.len(),
                    "Artifact input width differs from the configured feature list"
                );
            }
        }

        *self.session.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(session));

        info!(
            path = %path.display(),
            version = metadata.version.as_deref().unwrap_or("unknown"),
            n_features = metadata.n_features.unwrap_or_default(),
            checksum = %compute_checksum(&bytes),
            "Model artifact loaded"
        );
        Ok(metadata)
    }

    pub fn has_classifier(&self) -> bool {
        self.classifier_snapshot().is_some()
    }

    pub fn has_session(&self) -> bool {
        self.session_snapshot().is_some()
    }

    /// Metadata of the loaded artifact, if any
    pub fn metadata(&self) -> Option<ArtifactMetadata> {
        self.session_snapshot().map(|s| s.metadata().clone())
    }

    pub fn inference_stats(&self) -> Option<InferenceStats> {
        self.session_snapshot().map(|s| s.stats())
    }

    fn artifact_path(&self, path: Option<&Path>) -> Result<PathBuf> {
        path.or(self.config.model_path.as_deref())
            .map(Path::to_path_buf)
            .ok_or(ModelError::NoArtifactPath)
    }

    fn classifier_snapshot(&self) -> Option<Arc<dyn Classifier>> {
        self.classifier
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn session_snapshot(&self) -> Option<Arc<OnnxSession>> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
