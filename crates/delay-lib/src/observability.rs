//! Observability for the delay predictor
//!
//! Provides:
//! - Prometheus metrics (prediction latency, predictions by outcome, errors, model info)
//! - Event-tagged structured logging with tracing

use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_counter_vec,
    GaugeVec, Histogram, IntCounter, IntCounterVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for batch latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ServiceMetricsInner> = OnceLock::new();

struct ServiceMetricsInner {
    prediction_latency_seconds: Histogram,
    predictions: IntCounterVec,
    prediction_errors: IntCounter,
    validation_errors: IntCounter,
    model_reloads: IntCounterVec,
    model_info: GaugeVec,
}

impl ServiceMetricsInner {
    fn new() -> Self {
        Self {
            prediction_latency_seconds: register_histogram!(
                "delay_predictor_prediction_latency_seconds",
                "Time spent encoding and predicting one request batch",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register prediction_latency_seconds"),

            predictions: register_int_counter_vec!(
                "delay_predictor_predictions_total",
                "Predictions served, by outcome and answering source",
                &["outcome", "source"]
            )
            .expect("Failed to register predictions_total"),

            prediction_errors: register_int_counter!(
                "delay_predictor_prediction_errors_total",
                "Prediction requests that failed after validation"
            )
            .expect("Failed to register prediction_errors_total"),

            validation_errors: register_int_counter!(
                "delay_predictor_validation_errors_total",
                "Prediction requests rejected as malformed"
            )
            .expect("Failed to register validation_errors_total"),

            model_reloads: register_int_counter_vec!(
                "delay_predictor_model_reloads_total",
                "Artifact load attempts, by result",
                &["result"]
            )
            .expect("Failed to register model_reloads_total"),

            model_info: register_gauge_vec!(
                "delay_predictor_model_info",
                "Information about the currently loaded artifact",
                &["version", "classifier"]
            )
            .expect("Failed to register model_info"),
        }
    }
}

/// Lightweight handle to the global metrics; clones share the same series
#[derive(Clone, Debug)]
pub struct ServiceMetrics {
    _private: (),
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ServiceMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ServiceMetricsInner {
        GLOBAL_METRICS.get_or_init(ServiceMetricsInner::new)
    }

    pub fn observe_prediction_latency(&self, duration_secs: f64) {
        self.inner().prediction_latency_seconds.observe(duration_secs);
    }

    /// Count a batch of predictions by label
    pub fn record_predictions(&self, labels: &[i64], source: &str) {
        let delayed = labels.iter().filter(|&&l| l == 1).count() as u64;
        let on_time = labels.len() as u64 - delayed;
        let predictions = &self.inner().predictions;
        predictions
            .with_label_values(&["delayed", source])
            .inc_by(delayed);
        predictions
            .with_label_values(&["on_time", source])
            .inc_by(on_time);
    }

    pub fn inc_prediction_errors(&self) {
        self.inner().prediction_errors.inc();
    }

    pub fn inc_validation_errors(&self) {
        self.inner().validation_errors.inc();
    }

    pub fn record_reload(&self, result: &str) {
        self.inner()
            .model_reloads
            .with_label_values(&[result])
            .inc();
    }

    /// Replace the model info series with the given version
    pub fn set_model_info(&self, version: &str, classifier: &str) {
        let info = &self.inner().model_info;
        info.reset();
        info.with_label_values(&[version, classifier]).set(1.0);
    }
}

/// Structured logger for service and training events
#[derive(Clone, Debug)]
pub struct StructuredLogger {
    component: String,
}

impl StructuredLogger {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
        }
    }

    pub fn log_startup(&self, version: &str, artifact_path: &str) {
        info!(
            event = "service_started",
            component = %self.component,
            service_version = %version,
            artifact_path = %artifact_path,
            "Delay prediction service started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "service_shutdown",
            component = %self.component,
            reason = %reason,
            "Delay prediction service shutting down"
        );
    }

    pub fn log_model_loaded(&self, path: &str, version: &str, n_features: usize) {
        info!(
            event = "model_loaded",
            component = %self.component,
            path = %path,
            model_version = %version,
            n_features = n_features,
            "Model artifact loaded"
        );
    }

    pub fn log_model_unavailable(&self, path: &str, reason: &str) {
        warn!(
            event = "model_unavailable",
            component = %self.component,
            path = %path,
            reason = %reason,
            "Model artifact could not be loaded"
        );
    }

    pub fn log_prediction_batch(&self, rows: usize, delayed: usize, source: &str, elapsed_ms: f64) {
        info!(
            event = "prediction_batch",
            component = %self.component,
            rows = rows,
            delayed = delayed,
            source = %source,
            elapsed_ms = elapsed_ms,
            "Served prediction batch"
        );
    }

    pub fn log_training_complete(
        &self,
        classifier: &str,
        rows: usize,
        positives: usize,
        accuracy: Option<f64>,
        artifact_path: &str,
    ) {
        info!(
            event = "training_complete",
            component = %self.component,
            classifier = %classifier,
            rows = rows,
            positives = positives,
            validation_accuracy = ?accuracy,
            artifact_path = %artifact_path,
            "Training run finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_handles_share_registry() {
        let metrics = ServiceMetrics::new();
        let other = metrics.clone();

        metrics.observe_prediction_latency(0.002);
        metrics.record_predictions(&[1, 0, 0], "classifier");
        other.inc_prediction_errors();
        other.inc_validation_errors();
        other.record_reload("ok");
        metrics.set_model_info("1.0", "logistic");

        let families = prometheus::gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "delay_predictor_predictions_total"));
        assert!(families
            .iter()
            .any(|f| f.get_name() == "delay_predictor_model_info"));
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("delay-server");
        assert_eq!(logger.component, "delay-server");
        logger.log_prediction_batch(3, 1, "session", 0.4);
    }
}
