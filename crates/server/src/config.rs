//! Server configuration

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// HTTP service settings, read from `SERVER_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Artifact loaded at startup and on `/reload` when `MODEL_PATH` is unset
    #[serde(default = "default_artifact_path")]
    pub artifact_path: PathBuf,

    /// Largest number of flights accepted in one request
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_artifact_path() -> PathBuf {
    PathBuf::from("./delay_model.onnx")
}

fn default_max_batch_size() -> usize {
    10_000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            artifact_path: default_artifact_path(),
            max_batch_size: default_max_batch_size(),
        }
    }
}

impl ServerConfig {
    /// Load from the environment; malformed values are an error
    pub fn load() -> Result<Self> {
        Self::from_env(config::Environment::with_prefix("SERVER"))
    }

    pub fn from_env(env: config::Environment) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(env)
            .build()
            .context("Failed to read server configuration")?;
        config
            .try_deserialize()
            .context("Invalid server configuration")
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> config::Environment {
        let source: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        config::Environment::with_prefix("SERVER").source(Some(source))
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_env(env(&[])).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.artifact_path, PathBuf::from("./delay_model.onnx"));
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
    }

    #[test]
    fn test_environment_overrides() {
        let config = ServerConfig::from_env(env(&[
            ("SERVER_PORT", "9000"),
            ("SERVER_ARTIFACT_PATH", "/models/delay_model.onnx"),
        ]))
        .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(
            config.artifact_path,
            PathBuf::from("/models/delay_model.onnx")
        );
    }

    #[test]
    fn test_malformed_port_fails() {
        assert!(ServerConfig::from_env(env(&[("SERVER_PORT", "eighty")])).is_err());
    }
}
