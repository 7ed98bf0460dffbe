//! Artifact evaluation and inspection commands

use anyhow::{Context, Result};
use clap::Args;
use delay_lib::{
    dataset::load_training_records,
    evaluation::{classification_report, ClassificationReport},
    predictor::{compute_checksum, read_artifact, ArtifactMetadata},
    DelayModel, ModelConfig, ModelOverrides,
};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::output::{print_info, print_json, print_metadata, print_report, print_warning, OutputFormat};

#[derive(Debug, Clone, Args)]
pub struct EvaluateArgs {
    /// Labelled flights CSV to score against
    #[arg(long, env = "DATA_PATH")]
    pub data_path: PathBuf,

    /// ONNX artifact to evaluate
    #[arg(long, env = "MODEL_PATH")]
    pub model_path: PathBuf,
}

#[derive(Debug, Clone, Args)]
pub struct InspectArgs {
    /// ONNX artifact to inspect
    #[arg(long, env = "MODEL_PATH")]
    pub model_path: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArtifactSummary {
    pub path: PathBuf,
    pub size_bytes: usize,
    pub checksum: String,
    pub metadata: ArtifactMetadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationSummary {
    pub artifact: ArtifactSummary,
    pub report: ClassificationReport,
}

/// Read an artifact's metadata without building an inference plan
pub fn inspect_artifact(path: &Path) -> Result<ArtifactSummary> {
    let bytes = read_artifact(path)?;
    let metadata = ArtifactMetadata::read(&bytes)
        .with_context(|| format!("{} is not a valid ONNX model", path.display()))?;

    Ok(ArtifactSummary {
        path: path.to_path_buf(),
        size_bytes: bytes.len(),
        checksum: compute_checksum(&bytes),
        metadata,
    })
}

/// Score an artifact on a labelled dataset. Rows are encoded against the
/// artifact's own feature list and delay threshold when it records them.
pub fn evaluate_artifact(data_path: &Path, model_path: &Path) -> Result<EvaluationSummary> {
    let artifact = inspect_artifact(model_path)?;
    let metadata = &artifact.metadata;

    let overrides = ModelOverrides {
        top_features: (!metadata.feature_names.is_empty()).then(|| metadata.feature_names.clone()),
        delay_threshold_minutes: metadata
            .delay_threshold_minutes
            .as_deref()
            .and_then(|raw| raw.parse().ok()),
        model_path: Some(model_path.to_path_buf()),
        ..Default::default()
    };
    let model = DelayModel::new(ModelConfig::resolve(overrides).context("Invalid model configuration")?);
    model.load(None)?;

    let records = load_training_records(data_path)
        .with_context(|| format!("Failed to load dataset {}", data_path.display()))?;
    let (features, labels) = model.preprocess_for_training(&records);
    let predicted = model
        .predict(&features)
        .context("Artifact could not score the dataset")?;
    let report = classification_report(&labels, &predicted)?;

    Ok(EvaluationSummary { artifact, report })
}

pub async fn run_evaluate(args: EvaluateArgs, format: OutputFormat) -> Result<()> {
    let summary = tokio::task::spawn_blocking(move || {
        evaluate_artifact(&args.data_path, &args.model_path)
    })
    .await
    .context("Evaluation task failed")??;

    match format {
        OutputFormat::Json => print_json(&summary)?,
        OutputFormat::Table => {
            print_artifact(&summary.artifact);
            println!();
            print_report(&summary.report);
        }
    }
    Ok(())
}

pub fn run_inspect(args: InspectArgs, format: OutputFormat) -> Result<()> {
    let summary = inspect_artifact(&args.model_path)?;
    match format {
        OutputFormat::Json => print_json(&summary)?,
        OutputFormat::Table => print_artifact(&summary),
    }
    Ok(())
}

fn print_artifact(summary: &ArtifactSummary) {
    print_info(&format!(
        "{} ({} bytes, sha256 {})",
        summary.path.display(),
        summary.size_bytes,
        summary.checksum
    ));
    print_metadata(&summary.metadata);
    if summary.metadata.version.is_none() {
        print_warning("Artifact has no version property");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::fixtures::training_csv;
    use crate::commands::train::train_model;

    fn trained_artifact(dir: &Path, top_features: Vec<String>) -> (PathBuf, PathBuf) {
        let data_path = dir.join("data.csv");
        std::fs::write(&data_path, training_csv()).unwrap();
        let model_path = dir.join("delay_model.onnx");
        let config = ModelConfig {
            top_features,
            model_path: Some(model_path.clone()),
            ..Default::default()
        };
        train_model(config, &data_path, 0.0).unwrap();
        (data_path, model_path)
    }

    #[test]
    fn test_inspect_reports_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let features = vec!["OPERA_Latin American Wings".to_string(), "MES_12".to_string()];
        let (_, model_path) = trained_artifact(dir.path(), features.clone());

        let summary = inspect_artifact(&model_path).unwrap();
        assert_eq!(summary.metadata.feature_names, features);
        assert_eq!(summary.metadata.n_features, Some(2));
        assert_eq!(summary.metadata.version.as_deref(), Some("1.0"));
        assert_eq!(summary.checksum.len(), 64);
        assert!(summary.size_bytes > 0);
    }

    #[test]
    fn test_inspect_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        assert!(inspect_artifact(&dir.path().join("missing.onnx")).is_err());
    }

    #[test]
    fn test_evaluate_uses_artifact_features() {
        let dir = tempfile::tempdir().unwrap();
        let features = vec!["OPERA_Latin American Wings".to_string(), "MES_12".to_string()];
        let (data_path, model_path) = trained_artifact(dir.path(), features);

        let summary = evaluate_artifact(&data_path, &model_path).unwrap();
        assert_eq!(summary.report.total, 96);
        // Both late groups are named by the two features
        assert_eq!(summary.report.accuracy, 1.0);
    }
}
