//! Flight delay prediction library
//!
//! This crate provides the core functionality for:
//! - One-hot feature encoding of flight records
//! - Classifier training with class-imbalance correction
//! - ONNX export and tract-based inference
//! - Prediction resolution across in-memory and exported models
//! - Health checks and observability

pub mod classifier;
pub mod config;
pub mod dataset;
pub mod error;
pub mod evaluation;
pub mod health;
pub mod models;
pub mod observability;
pub mod onnx;
pub mod predictor;

pub use config::{ClassifierKind, ConfigError, ModelConfig, ModelOverrides};
pub use error::ModelError;
pub use health::{ComponentHealth, ComponentStatus, HealthRegistry, HealthReport, ReadinessResponse};
pub use models::*;
pub use observability::{ServiceMetrics, StructuredLogger};
pub use predictor::{DelayModel, FeatureEncoder, FeatureMatrix, PredictionSource};
