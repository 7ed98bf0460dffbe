//! Delay prediction service
//!
//! Serves `/predict` over HTTP from an exported delay model artifact,
//! with health, readiness and Prometheus metrics endpoints.

use anyhow::{Context, Result};
use delay_lib::{
    health::components, observability::ServiceMetrics, DelayModel, HealthRegistry, ModelConfig,
};
use delay_server::{api, config::ServerConfig};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting delay-server");

    let server_config = ServerConfig::load()?;
    let mut model_config = ModelConfig::load().context("Invalid model configuration")?;
    if model_config.model_path.is_none() {
        model_config.model_path = Some(server_config.artifact_path.clone());
    }
    let artifact_path = model_config
        .model_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    info!(
        address = %server_config.bind_address(),
        artifact_path = %artifact_path,
        restricted_features = model_config.top_features.len(),
        "Service configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::MODEL).await;
    health_registry.register(components::ARTIFACT).await;

    let metrics = ServiceMetrics::new();
    let model = Arc::new(DelayModel::new(model_config));
    let state = Arc::new(
        api::AppState::new(model, health_registry.clone(), metrics)
            .with_max_batch_size(server_config.max_batch_size),
    );
    state.logger.log_startup(SERVICE_VERSION, &artifact_path);

    // A missing artifact is tolerated; a corrupt one is fatal
    match api::load_artifact(&state).await {
        Ok(_) => {}
        Err(e) if e.is_not_found() => {}
        Err(e) => return Err(e).context("Failed to load model artifact"),
    }

    health_registry.set_ready(true).await;

    let logger = state.logger.clone();
    api::serve(&server_config.bind_address(), state, async move {
        let _ = tokio::signal::ctrl_c().await;
        logger.log_shutdown("SIGINT received");
    })
    .await?;

    info!("Shut down");
    Ok(())
}
