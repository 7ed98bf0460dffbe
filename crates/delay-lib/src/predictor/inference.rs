//! ONNX inference using tract
//!
//! Loads an exported delay artifact and runs it on feature matrices.
//! Plans are optimized for a concrete batch size on first use and cached.

use super::export::ArtifactMetadata;
use super::FeatureMatrix;
use crate::error::{ModelError, Result};
use crate::onnx::ModelProto;
use anyhow::Context;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tract_onnx::prelude::*;
use tracing::{debug, warn};

/// Latency above which a batch is logged as slow
const MAX_INFERENCE_MS: u128 = 50;

/// Upper bound on cached plans; beyond it plans are built per call
const MAX_CACHED_PLANS: usize = 64;

type TractPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// A ready-to-query inference session over one exported artifact
pub struct OnnxSession {
    model: InferenceModel,
    n_features: usize,
    metadata: ArtifactMetadata,
    plans: DashMap<usize, Arc<TractPlan>>,
    inference_count: AtomicU64,
    slow_inference_count: AtomicU64,
}

impl std::fmt::Debug for OnnxSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxSession")
            .field("n_features", &self.n_features)
            .field("metadata", &self.metadata)
            .field("cached_plans", &self.plans.len())
            .finish()
    }
}

impl OnnxSession {
    /// Parse an artifact and compile its single-row plan
    pub fn from_bytes(bytes: &[u8]) -> anyhow::Result<Self> {
        let proto = ModelProto::from_bytes(bytes).context("Failed to decode ONNX protobuf")?;
        let n_features = proto
            .input_width()
            .context("Model input has no static feature width")?;
        let metadata = ArtifactMetadata::from_model(&proto);

        let model = tract_onnx::onnx()
            .model_for_read(&mut std::io::Cursor::new(bytes))
            .context("Failed to parse ONNX model")?;

        let session = Self {
            model,
            n_features,
            metadata,
            plans: DashMap::new(),
            inference_count: AtomicU64::new(0),
            slow_inference_count: AtomicU64::new(0),
        };
        // Surface unsupported graphs at load time rather than on first request
        session.plan(1)?;
        Ok(session)
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn metadata(&self) -> &ArtifactMetadata {
        &self.metadata
    }

    fn plan(&self, batch: usize) -> anyhow::Result<Arc<TractPlan>> {
        if let Some(plan) = self.plans.get(&batch) {
            return Ok(Arc::clone(plan.value()));
        }

        let plan = self
            .model
            .clone()
            .with_input_fact(0, f32::fact([batch, self.n_features]).into())
            .context("Failed to set input shape")?
            .into_optimized()
            .context("Failed to optimize model")?
            .into_runnable()
            .context("Failed to create runnable model")?;
        let plan = Arc::new(plan);

        if self.plans.len() < MAX_CACHED_PLANS {
            self.plans.insert(batch, Arc::clone(&plan));
        }
        debug!(batch = batch, "Compiled inference plan");
        Ok(plan)
    }

    /// Run the artifact on a feature matrix, one label per row
    pub fn run(&self, features: &FeatureMatrix) -> Result<Vec<i64>> {
        if features.n_cols() != self.n_features {
            return Err(ModelError::ShapeMismatch {
                expected: self.n_features,
                actual: features.n_cols(),
            });
        }
        if features.is_empty() {
            return Ok(Vec::new());
        }

        let start = Instant::now();
        let labels = self.run_plan(features).map_err(ModelError::Inference)?;

        let elapsed = start.elapsed();
        self.inference_count.fetch_add(1, Ordering::Relaxed);
        if elapsed.as_millis() > MAX_INFERENCE_MS {
            self.slow_inference_count.fetch_add(1, Ordering::Relaxed);
            warn!(
                elapsed_ms = elapsed.as_millis(),
                rows = features.n_rows(),
                "Inference exceeded {}ms target",
                MAX_INFERENCE_MS
            );
        } else {
            debug!(
                elapsed_us = elapsed.as_micros(),
                rows = features.n_rows(),
                "Inference completed"
            );
        }

        Ok(labels)
    }

    fn run_plan(&self, features: &FeatureMatrix) -> anyhow::Result<Vec<i64>> {
        let rows = features.n_rows();
        let plan = self.plan(rows)?;
        let input: Tensor = features.values().to_owned().into();

        let result = plan.run(tvec!(input.into()))?;
        let output = result.first().context("No output from model")?;
        let labels = output.cast_to::<i64>()?;
        let labels = labels.as_slice::<i64>()?.to_vec();

        if labels.len() != rows {
            anyhow::bail!("Model returned {} labels for {} rows", labels.len(), rows);
        }
        Ok(labels)
    }

    pub fn stats(&self) -> InferenceStats {
        InferenceStats {
            total_inferences: self.inference_count.load(Ordering::Relaxed),
            slow_inferences: self.slow_inference_count.load(Ordering::Relaxed),
        }
    }
}

/// Inference statistics
#[derive(Debug, Clone)]
pub struct InferenceStats {
    pub total_inferences: u64,
    pub slow_inferences: u64,
}
