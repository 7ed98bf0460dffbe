//! Model configuration
//!
//! Values come from explicit overrides first and fall back to environment
//! variables (`TOP_FEATURES`, `DELAY_THRESHOLD_MINUTES`, `RANDOM_STATE`,
//! `MODEL_VERSION`, `MODEL_PATH`, `CLASSIFIER`, `LEARNING_RATE`,
//! `N_ESTIMATORS`). A `.env` file in the working directory is honoured.

use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Default minutes past schedule after which a departure counts as delayed
pub const DEFAULT_DELAY_THRESHOLD_MINUTES: i64 = 15;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Classifier family used by `fit`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierKind {
    #[default]
    Logistic,
    #[serde(alias = "xgboost", alias = "boosting")]
    GradientBoosting,
}

impl ClassifierKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassifierKind::Logistic => "logistic",
            ClassifierKind::GradientBoosting => "gradient_boosting",
        }
    }
}

impl fmt::Display for ClassifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ClassifierKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "logistic" => Ok(ClassifierKind::Logistic),
            "gradient_boosting" | "xgboost" | "boosting" => Ok(ClassifierKind::GradientBoosting),
            other => Err(ConfigError::Invalid(format!("unknown classifier '{}'", other))),
        }
    }
}

/// Immutable configuration of a delay model instance
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Ordered canonical feature names; empty means full one-hot mode
    #[serde(default, deserialize_with = "deserialize_feature_list")]
    pub top_features: Vec<String>,

    #[serde(default = "default_delay_threshold")]
    pub delay_threshold_minutes: i64,

    #[serde(default = "default_random_state")]
    pub random_state: u64,

    #[serde(default = "default_model_version")]
    pub model_version: String,

    /// Default artifact path for save, load and lazy loading
    #[serde(default)]
    pub model_path: Option<PathBuf>,

    #[serde(default)]
    pub classifier: ClassifierKind,

    /// Shrinkage for gradient boosting
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,

    /// Boosting rounds for gradient boosting
    #[serde(default = "default_n_estimators")]
    pub n_estimators: usize,
}

fn default_delay_threshold() -> i64 {
    DEFAULT_DELAY_THRESHOLD_MINUTES
}

fn default_random_state() -> u64 {
    1
}

fn default_model_version() -> String {
    "1.0".to_string()
}

fn default_learning_rate() -> f64 {
    0.1
}

fn default_n_estimators() -> usize {
    100
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            top_features: Vec::new(),
            delay_threshold_minutes: default_delay_threshold(),
            random_state: default_random_state(),
            model_version: default_model_version(),
            model_path: None,
            classifier: ClassifierKind::default(),
            learning_rate: default_learning_rate(),
            n_estimators: default_n_estimators(),
        }
    }
}

/// Explicit values that take precedence over the environment
#[derive(Debug, Clone, Default)]
pub struct ModelOverrides {
    pub top_features: Option<Vec<String>>,
    pub delay_threshold_minutes: Option<i64>,
    pub random_state: Option<u64>,
    pub model_version: Option<String>,
    pub model_path: Option<PathBuf>,
    pub classifier: Option<ClassifierKind>,
    pub learning_rate: Option<f64>,
    pub n_estimators: Option<usize>,
}

impl ModelConfig {
    /// Load configuration from the process environment (and `.env`)
    pub fn load() -> Result<Self, ConfigError> {
        Self::resolve(ModelOverrides::default())
    }

    /// Load configuration, letting explicit overrides win over the environment
    pub fn resolve(overrides: ModelOverrides) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_sources(config::Environment::default(), overrides)
    }

    /// Build from an explicit environment source; used directly by tests
    pub fn from_sources(
        env: config::Environment,
        overrides: ModelOverrides,
    ) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder().add_source(env);

        // Overrides replace environment values before deserialization, so a
        // malformed variable is ignored when an explicit value is supplied.
        if let Some(features) = overrides.top_features {
            builder = builder.set_override("top_features", features)?;
        }
        if let Some(threshold) = overrides.delay_threshold_minutes {
            builder = builder.set_override("delay_threshold_minutes", threshold)?;
        }
        if let Some(seed) = overrides.random_state {
            builder = builder.set_override("random_state", seed.to_string())?;
        }
        if let Some(version) = overrides.model_version {
            builder = builder.set_override("model_version", version)?;
        }
        if let Some(path) = overrides.model_path {
            builder = builder.set_override("model_path", path.to_string_lossy().into_owned())?;
        }
        if let Some(kind) = overrides.classifier {
            builder = builder.set_override("classifier", kind.as_str())?;
        }
        if let Some(rate) = overrides.learning_rate {
            builder = builder.set_override("learning_rate", rate)?;
        }
        if let Some(rounds) = overrides.n_estimators {
            builder = builder.set_override("n_estimators", rounds.to_string())?;
        }

        let config: ModelConfig = builder.build()?.try_deserialize()?;
        config.validated()
    }

    fn validated(mut self) -> Result<Self, ConfigError> {
        if self.delay_threshold_minutes < 0 {
            return Err(ConfigError::Invalid(format!(
                "delay_threshold_minutes must be non-negative, got {}",
                self.delay_threshold_minutes
            )));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(ConfigError::Invalid(format!(
                "learning_rate must be a positive number, got {}",
                self.learning_rate
            )));
        }
        if self.n_estimators == 0 {
            return Err(ConfigError::Invalid("n_estimators must be at least 1".to_string()));
        }
        if self
            .model_path
            .as_ref()
            .is_some_and(|p| p.as_os_str().is_empty())
        {
            self.model_path = None;
        }
        Ok(self)
    }

    /// True when encoding is restricted to a configured feature list
    pub fn is_restricted(&self) -> bool {
        !self.top_features.is_empty()
    }
}

/// Split a feature list on `,` or `|`, trimming blanks
pub fn parse_feature_list(raw: &str) -> Vec<String> {
    raw.split([',', '|'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn deserialize_feature_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct FeatureListVisitor;

    impl<'de> Visitor<'de> for FeatureListVisitor {
        type Value = Vec<String>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a comma separated string or a list of feature names")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            Ok(parse_feature_list(v))
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut features = Vec::new();
            while let Some(item) = seq.next_element::<String>()? {
                let item = item.trim();
                if !item.is_empty() {
                    features.push(item.to_string());
                }
            }
            Ok(features)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }
    }

    deserializer.deserialize_any(FeatureListVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> config::Environment {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        config::Environment::default().source(Some(map))
    }

    #[test]
    fn test_defaults_without_environment() {
        let config = ModelConfig::from_sources(env(&[]), ModelOverrides::default()).unwrap();
        assert!(config.top_features.is_empty());
        assert_eq!(config.delay_threshold_minutes, 15);
        assert_eq!(config.random_state, 1);
        assert_eq!(config.model_version, "1.0");
        assert!(config.model_path.is_none());
        assert_eq!(config.classifier, ClassifierKind::Logistic);
    }

    #[test]
    fn test_environment_values() {
        let config = ModelConfig::from_sources(
            env(&[
                ("TOP_FEATURES", "MES_7, OPERA_Copa Air ,,TIPOVUELO_I"),
                ("DELAY_THRESHOLD_MINUTES", "20"),
                ("RANDOM_STATE", "42"),
                ("MODEL_VERSION", "2.1"),
                ("MODEL_PATH", "/tmp/delay_model.onnx"),
                ("CLASSIFIER", "gradient_boosting"),
            ]),
            ModelOverrides::default(),
        )
        .unwrap();
        assert_eq!(
            config.top_features,
            vec!["MES_7", "OPERA_Copa Air", "TIPOVUELO_I"]
        );
        assert_eq!(config.delay_threshold_minutes, 20);
        assert_eq!(config.random_state, 42);
        assert_eq!(config.model_version, "2.1");
        assert_eq!(
            config.model_path,
            Some(PathBuf::from("/tmp/delay_model.onnx"))
        );
        assert_eq!(config.classifier, ClassifierKind::GradientBoosting);
    }

    #[test]
    fn test_overrides_take_precedence() {
        let overrides = ModelOverrides {
            top_features: Some(vec!["MES_7".to_string()]),
            delay_threshold_minutes: Some(20),
            random_state: Some(42),
            model_version: Some("2.0".to_string()),
            ..Default::default()
        };
        let config = ModelConfig::from_sources(
            env(&[
                ("TOP_FEATURES", "MES_10"),
                ("DELAY_THRESHOLD_MINUTES", "not-a-number"),
            ]),
            overrides,
        )
        .unwrap();
        assert_eq!(config.top_features, vec!["MES_7"]);
        assert_eq!(config.delay_threshold_minutes, 20);
        assert_eq!(config.random_state, 42);
        assert_eq!(config.model_version, "2.0");
    }

    #[test]
    fn test_malformed_threshold_fails_fast() {
        let result = ModelConfig::from_sources(
            env(&[("DELAY_THRESHOLD_MINUTES", "fifteen")]),
            ModelOverrides::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_negative_threshold_rejected() {
        let result = ModelConfig::from_sources(
            env(&[]),
            ModelOverrides {
                delay_threshold_minutes: Some(-1),
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_parse_feature_list_separators() {
        assert_eq!(
            parse_feature_list("MES_7|OPERA_Grupo LATAM, MES_12"),
            vec!["MES_7", "OPERA_Grupo LATAM", "MES_12"]
        );
        assert!(parse_feature_list(" , | ").is_empty());
    }

    #[test]
    fn test_classifier_kind_from_str() {
        assert_eq!(
            "xgboost".parse::<ClassifierKind>().unwrap(),
            ClassifierKind::GradientBoosting
        );
        assert!("forest".parse::<ClassifierKind>().is_err());
    }
}
