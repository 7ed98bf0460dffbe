//! HTTP API: predictions, health, readiness, reload and Prometheus metrics

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use delay_lib::{
    health::{components, model_health},
    observability::{ServiceMetrics, StructuredLogger},
    predictor::ArtifactMetadata,
    DelayModel, FlightRecord, FlightType, HealthRegistry, ModelError,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use validator::{Validate, ValidationError};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub model: Arc<DelayModel>,
    pub health_registry: HealthRegistry,
    pub metrics: ServiceMetrics,
    pub logger: StructuredLogger,
    pub max_batch_size: usize,
}

impl AppState {
    pub fn new(model: Arc<DelayModel>, health_registry: HealthRegistry, metrics: ServiceMetrics) -> Self {
        Self {
            model,
            health_registry,
            metrics,
            logger: StructuredLogger::new("delay-server"),
            max_batch_size: usize::MAX,
        }
    }

    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }
}

/// One flight in a prediction request, keyed by the dataset column names
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct FlightInput {
    #[serde(rename = "OPERA")]
    #[validate(length(min = 1, message = "OPERA must not be empty"))]
    pub opera: String,

    #[serde(rename = "TIPOVUELO")]
    #[validate(custom(function = "validate_flight_type"))]
    pub tipovuelo: String,

    #[serde(rename = "MES")]
    #[validate(range(min = 1, max = 12, message = "MES must be between 1 and 12"))]
    pub mes: i64,
}

impl FlightInput {
    fn to_record(&self) -> Option<FlightRecord> {
        let flight_type = self.tipovuelo.parse::<FlightType>().ok()?;
        let month = u8::try_from(self.mes).ok()?;
        Some(FlightRecord::new(self.opera.clone(), flight_type, month))
    }
}

fn validate_flight_type(code: &str) -> Result<(), ValidationError> {
    code.parse::<FlightType>().map(|_| ()).map_err(|_| {
        let mut error = ValidationError::new("flight_type");
        error.message = Some("TIPOVUELO must be 'I' or 'N'".into());
        error
    })
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct PredictRequest {
    #[validate(length(min = 1, message = "at least one flight is required"), nested)]
    pub flights: Vec<FlightInput>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PredictResponse {
    pub predict: Vec<i64>,
}

fn bad_request(state: &AppState, detail: String, errors: serde_json::Value) -> Response {
    state.metrics.inc_validation_errors();
    warn!(detail = %detail, "Rejected prediction request");
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "detail": detail, "errors": errors })),
    )
        .into_response()
}

fn server_error(detail: String) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "detail": detail })),
    )
        .into_response()
}

/// Liveness: fixed payload, independent of model state
async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "OK" })))
}

/// Readiness: 200 once started with a usable prediction source
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    refresh_model_health(&state).await;
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status_code, Json(readiness))
}

async fn predict(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            return bad_request(&state, rejection.body_text(), json!([]));
        }
    };

    if let Err(errors) = request.validate() {
        let payload = serde_json::to_value(&errors).unwrap_or_else(|_| json!([]));
        return bad_request(&state, errors.to_string(), payload);
    }
    if request.flights.len() > state.max_batch_size {
        return bad_request(
            &state,
            format!(
                "{} flights exceeds the limit of {}",
                request.flights.len(),
                state.max_batch_size
            ),
            json!([]),
        );
    }

    let Some(records) = request
        .flights
        .iter()
        .map(FlightInput::to_record)
        .collect::<Option<Vec<_>>>()
    else {
        return bad_request(&state, "invalid flight record".to_string(), json!([]));
    };

    let had_session = state.model.has_session();
    let start = Instant::now();
    let model = Arc::clone(&state.model);
    let outcome = tokio::task::spawn_blocking(move || {
        let features = model.preprocess(&records);
        model.predict_with_source(&features)
    })
    .await;
    let elapsed = start.elapsed();

    match outcome {
        Ok(Ok((labels, source))) => {
            if !had_session && state.model.has_session() {
                record_lazy_load(&state).await;
            }
            state.metrics.observe_prediction_latency(elapsed.as_secs_f64());
            state.metrics.record_predictions(&labels, source.as_str());
            state.logger.log_prediction_batch(
                labels.len(),
                labels.iter().filter(|&&l| l == 1).count(),
                source.as_str(),
                elapsed.as_secs_f64() * 1000.0,
            );
            (StatusCode::OK, Json(PredictResponse { predict: labels })).into_response()
        }
        Ok(Err(e)) => {
            state.metrics.inc_prediction_errors();
            error!(error = %e, "Prediction failed");
            server_error(e.to_string())
        }
        Err(e) => {
            state.metrics.inc_prediction_errors();
            error!(error = %e, "Prediction task panicked");
            server_error("prediction task failed".to_string())
        }
    }
}

/// Reload the configured artifact into the running model
async fn reload(State(state): State<Arc<AppState>>) -> Response {
    match load_artifact(&state).await {
        Ok(metadata) => (StatusCode::OK, Json(metadata)).into_response(),
        Err(e) if e.is_not_found() => (
            StatusCode::NOT_FOUND,
            Json(json!({ "detail": e.to_string() })),
        )
            .into_response(),
        Err(e) => server_error(e.to_string()),
    }
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return server_error("failed to encode metrics".to_string());
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Load the configured artifact, updating health, metrics and logs
pub async fn load_artifact(state: &AppState) -> Result<ArtifactMetadata, ModelError> {
    let model = Arc::clone(&state.model);
    let result = tokio::task::spawn_blocking(move || model.load(None))
        .await
        .unwrap_or_else(|e| Err(ModelError::Inference(anyhow::anyhow!("load task failed: {}", e))));

    let path = state
        .model
        .config()
        .model_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_default();

    match &result {
        Ok(metadata) => {
            let version = metadata.version.as_deref().unwrap_or("unknown");
            let classifier = metadata.classifier.as_deref().unwrap_or("unknown");
            state.metrics.record_reload("ok");
            state.metrics.set_model_info(version, classifier);
            state
                .logger
                .log_model_loaded(&path, version, metadata.n_features.unwrap_or_default());
            state.health_registry.set_healthy(components::ARTIFACT).await;
        }
        Err(e) if e.is_not_found() => {
            state.metrics.record_reload("not_found");
            state.logger.log_model_unavailable(&path, &e.to_string());
            state
                .health_registry
                .set_degraded(components::ARTIFACT, e.to_string())
                .await;
        }
        Err(e) => {
            state.metrics.record_reload("error");
            state.logger.log_model_unavailable(&path, &e.to_string());
            state
                .health_registry
                .set_unhealthy(components::ARTIFACT, e.to_string())
                .await;
        }
    }
    refresh_model_health(state).await;
    result
}

/// Account for an artifact the model loaded itself while answering a request
async fn record_lazy_load(state: &AppState) {
    let Some(metadata) = state.model.metadata() else {
        return;
    };
    let version = metadata.version.as_deref().unwrap_or("unknown");
    let classifier = metadata.classifier.as_deref().unwrap_or("unknown");
    let path = state
        .model
        .config()
        .model_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_default();

    state.metrics.record_reload("lazy");
    state.metrics.set_model_info(version, classifier);
    state
        .logger
        .log_model_loaded(&path, version, metadata.n_features.unwrap_or_default());
    state.health_registry.set_healthy(components::ARTIFACT).await;
    refresh_model_health(state).await;
}

/// Mirror the model's prediction sources into the health registry
pub async fn refresh_model_health(state: &AppState) {
    state
        .health_registry
        .update(components::MODEL, model_health(&state.model))
        .await;
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/readyz", get(readyz))
        .route("/predict", post(predict))
        .route("/reload", post(reload))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Serve until the shutdown future resolves
pub async fn serve(
    address: &str,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = create_router(state);

    info!(addr = %address, "Starting API server");
    let listener = tokio::net::TcpListener::bind(address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flight_input_validation() {
        let valid = FlightInput {
            opera: "Aerolineas Argentinas".to_string(),
            tipovuelo: "N".to_string(),
            mes: 3,
        };
        assert!(valid.validate().is_ok());
        assert!(valid.to_record().is_some());

        let bad_type = FlightInput {
            tipovuelo: "O".to_string(),
            ..valid.clone()
        };
        assert!(bad_type.validate().is_err());

        let bad_month = FlightInput { mes: 13, ..valid };
        assert!(bad_month.validate().is_err());
    }

    #[test]
    fn test_empty_request_rejected() {
        let request = PredictRequest { flights: vec![] };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_nested_errors_surface() {
        let request = PredictRequest {
            flights: vec![FlightInput {
                opera: "Copa Air".to_string(),
                tipovuelo: "I".to_string(),
                mes: 0,
            }],
        };
        assert!(request.validate().is_err());
    }
}
