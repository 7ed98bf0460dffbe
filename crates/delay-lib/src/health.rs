//! Health tracking for the prediction service
//!
//! Liveness never depends on model state. Readiness requires startup to have
//! finished and no component to be unhealthy.

use crate::predictor::DelayModel;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Health status of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Serving, but without everything it should have (e.g. no artifact yet)
    Degraded,
    Unhealthy,
}

impl ComponentStatus {
    pub fn is_operational(&self) -> bool {
        matches!(self, ComponentStatus::Healthy | ComponentStatus::Degraded)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    fn with_status(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn healthy() -> Self {
        Self::with_status(ComponentStatus::Healthy, None)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::with_status(ComponentStatus::Degraded, Some(message.into()))
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::with_status(ComponentStatus::Unhealthy, Some(message.into()))
    }
}

/// Aggregate component report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: ComponentStatus,
    pub components: HashMap<String, ComponentHealth>,
}

impl HealthReport {
    /// Worst status across components
    pub fn compute_status(components: &HashMap<String, ComponentHealth>) -> ComponentStatus {
        let mut has_degraded = false;
        for health in components.values() {
            match health.status {
                ComponentStatus::Unhealthy => return ComponentStatus::Unhealthy,
                ComponentStatus::Degraded => has_degraded = true,
                ComponentStatus::Healthy => {}
            }
        }

        if has_degraded {
            ComponentStatus::Degraded
        } else {
            ComponentStatus::Healthy
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub components: HashMap<String, ComponentHealth>,
}

/// Component names for health tracking
pub mod components {
    /// Prediction sources held by the delay model
    pub const MODEL: &str = "model";
    /// The artifact file the service loads from
    pub const ARTIFACT: &str = "artifact";
}

/// Health of the model component, from the prediction sources it can reach.
/// A session is healthy; a classifier or a not-yet-loaded path still serves.
pub fn model_health(model: &DelayModel) -> ComponentHealth {
    if model.has_session() {
        ComponentHealth::healthy()
    } else if model.has_classifier() {
        ComponentHealth::degraded("serving from in-memory classifier")
    } else if model.config().model_path.is_some() {
        ComponentHealth::degraded("artifact will be loaded on first request")
    } else {
        ComponentHealth::unhealthy("no prediction source")
    }
}

/// Shared registry of component health
#[derive(Debug, Clone)]
pub struct HealthRegistry {
    components: Arc<RwLock<HashMap<String, ComponentHealth>>>,
    ready: Arc<RwLock<bool>>,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self {
            components: Arc::new(RwLock::new(HashMap::new())),
            ready: Arc::new(RwLock::new(false)),
        }
    }

    pub async fn register(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    pub async fn update(&self, name: &str, health: ComponentHealth) {
        self.components
            .write()
            .await
            .insert(name.to_string(), health);
    }

    pub async fn set_healthy(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::degraded(message)).await;
    }

    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::unhealthy(message)).await;
    }

    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    pub async fn report(&self) -> HealthReport {
        let components = self.components.read().await.clone();
        let status = HealthReport::compute_status(&components);
        HealthReport { status, components }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        let ready = *self.ready.read().await;
        let report = self.report().await;

        let reason = if !ready {
            Some("Service not yet initialized".to_string())
        } else if !report.status.is_operational() {
            Some("Critical component unhealthy".to_string())
        } else {
            None
        };

        ReadinessResponse {
            ready: reason.is_none(),
            reason,
            components: report.components,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_registry_initial_state() {
        let registry = HealthRegistry::new();
        let report = registry.report().await;

        assert_eq!(report.status, ComponentStatus::Healthy);
        assert!(report.components.is_empty());
    }

    #[tokio::test]
    async fn test_degraded_component() {
        let registry = HealthRegistry::new();
        registry.register(components::MODEL).await;
        registry.register(components::ARTIFACT).await;
        registry
            .set_degraded(components::ARTIFACT, "artifact not found")
            .await;

        let report = registry.report().await;
        assert_eq!(report.status, ComponentStatus::Degraded);
        assert_eq!(
            report.components[components::ARTIFACT].message.as_deref(),
            Some("artifact not found")
        );
    }

    #[test]
    fn test_model_health_follows_sources() {
        let model = DelayModel::new(crate::ModelConfig::default());
        assert_eq!(model_health(&model).status, ComponentStatus::Unhealthy);

        let lazy = DelayModel::new(crate::ModelConfig {
            model_path: Some("/nonexistent/delay_model.onnx".into()),
            ..Default::default()
        });
        let health = model_health(&lazy);
        assert_eq!(health.status, ComponentStatus::Degraded);
        assert!(health.message.unwrap().contains("first request"));
    }

    #[tokio::test]
    async fn test_readiness_lifecycle() {
        let registry = HealthRegistry::new();
        registry.register(components::MODEL).await;
        assert!(!registry.readiness().await.ready);

        registry.set_ready(true).await;
        assert!(registry.readiness().await.ready);

        registry
            .set_degraded(components::MODEL, "classifier only")
            .await;
        assert!(registry.readiness().await.ready);

        registry
            .set_unhealthy(components::MODEL, "no prediction source")
            .await;
        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(
            readiness.reason.as_deref(),
            Some("Critical component unhealthy")
        );
    }
}
