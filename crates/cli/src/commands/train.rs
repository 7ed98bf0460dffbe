//! Training command: encode the dataset, fit, validate, export and publish

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use delay_lib::{
    config::parse_feature_list,
    dataset::{load_training_records, train_validation_split},
    evaluation::{classification_report, ClassificationReport},
    predictor::{compute_checksum, read_artifact},
    ClassifierKind, DelayModel, ModelConfig, ModelOverrides, StructuredLogger,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::output::{format_percent, print_json, print_report, print_success, OutputFormat};
use crate::storage::{StorageClient, UploadedObject, DEFAULT_GCS_API_URL};

#[derive(Debug, Clone, Args)]
pub struct TrainArgs {
    /// Historical flights CSV
    #[arg(long, env = "DATA_PATH")]
    pub data_path: PathBuf,

    /// Where the ONNX artifact is written
    #[arg(long, env = "MODEL_PATH")]
    pub model_path: PathBuf,

    /// GCS bucket to publish the artifact to (requires --commit-sha)
    #[arg(long, env = "BUCKET_NAME")]
    pub bucket_name: Option<String>,

    /// Commit the artifact is versioned under (requires --bucket-name)
    #[arg(long, env = "COMMIT_SHA")]
    pub commit_sha: Option<String>,

    #[arg(long, env = "DELAY_THRESHOLD_MINUTES")]
    pub delay_threshold_minutes: Option<i64>,

    /// Shrinkage for gradient boosting
    #[arg(long, env = "LEARNING_RATE")]
    pub learning_rate: Option<f64>,

    #[arg(long, env = "RANDOM_STATE")]
    pub random_state: Option<u64>,

    /// Feature columns separated by '|' or ','; empty keeps every column
    #[arg(long, env = "TOP_FEATURES")]
    pub top_features: Option<String>,

    /// logistic or gradient_boosting
    #[arg(long, env = "CLASSIFIER", value_parser = parse_classifier)]
    pub classifier: Option<ClassifierKind>,

    /// Boosting rounds for gradient boosting
    #[arg(long, env = "N_ESTIMATORS")]
    pub n_estimators: Option<usize>,

    #[arg(long, env = "MODEL_VERSION")]
    pub model_version: Option<String>,

    /// Share of rows held out for the validation report
    #[arg(long, env = "VALIDATION_SPLIT", default_value_t = 0.33, value_parser = parse_fraction)]
    pub validation_split: f64,

    #[arg(long, env = "GCS_API_URL", default_value = DEFAULT_GCS_API_URL)]
    pub gcs_api_url: String,

    #[arg(long, env = "GCS_ACCESS_TOKEN", hide_env_values = true)]
    pub gcs_access_token: Option<String>,
}

fn parse_classifier(raw: &str) -> Result<ClassifierKind, String> {
    raw.parse::<ClassifierKind>().map_err(|e| e.to_string())
}

fn parse_fraction(raw: &str) -> Result<f64, String> {
    let value: f64 = raw.parse().map_err(|_| format!("'{}' is not a number", raw))?;
    if (0.0..1.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("{} must be in [0, 1)", value))
    }
}

/// Where and how to publish a trained artifact
#[derive(Debug, Clone, PartialEq)]
pub struct UploadPlan {
    pub bucket: String,
    pub commit_sha: String,
    pub access_token: String,
}

impl TrainArgs {
    /// Explicit arguments win over the environment
    pub fn overrides(&self) -> ModelOverrides {
        ModelOverrides {
            top_features: self.top_features.as_deref().map(parse_feature_list),
            delay_threshold_minutes: self.delay_threshold_minutes,
            random_state: self.random_state,
            model_version: self.model_version.clone(),
            model_path: Some(self.model_path.clone()),
            classifier: self.classifier,
            learning_rate: self.learning_rate,
            n_estimators: self.n_estimators,
        }
    }

    /// Checked before training so a bad upload setup fails fast
    pub fn upload_plan(&self) -> Result<Option<UploadPlan>> {
        match (&self.bucket_name, &self.commit_sha) {
            (None, None) => Ok(None),
            (Some(bucket), Some(commit_sha)) => {
                let access_token = self
                    .gcs_access_token
                    .clone()
                    .context("GCS_ACCESS_TOKEN is required to upload artifacts")?;
                Ok(Some(UploadPlan {
                    bucket: bucket.clone(),
                    commit_sha: commit_sha.clone(),
                    access_token,
                }))
            }
            (Some(_), None) => anyhow::bail!("--bucket-name requires --commit-sha"),
            (None, Some(_)) => anyhow::bail!("--commit-sha requires --bucket-name"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainingSummary {
    pub classifier: String,
    pub model_version: String,
    pub rows: usize,
    pub positives: usize,
    pub train_rows: usize,
    pub validation_rows: usize,
    pub feature_names: Vec<String>,
    pub artifact_path: PathBuf,
    pub checksum: String,
    pub validation: Option<ClassificationReport>,
    pub upload: Option<UploadedObject>,
}

/// Train on a dataset file and write the artifact to the configured path
pub fn train_model(
    config: ModelConfig,
    data_path: &Path,
    validation_split: f64,
) -> Result<TrainingSummary> {
    let seed = config.random_state;
    let model = DelayModel::new(config);

    let records = load_training_records(data_path)
        .with_context(|| format!("Failed to load dataset {}", data_path.display()))?;
    let (features, labels) = model.preprocess_for_training(&records);
    let positives = labels.iter().filter(|&&l| l == 1).count();
    info!(
        rows = features.n_rows(),
        columns = features.n_cols(),
        positives = positives,
        "Encoded training data"
    );

    let (train_idx, validation_idx) =
        train_validation_split(features.n_rows(), validation_split, seed);
    let pick = |indices: &[usize]| -> Vec<i64> { indices.iter().map(|&i| labels[i]).collect() };

    model
        .fit(&features.select_rows(&train_idx), &pick(&train_idx))
        .context("Training failed")?;

    let validation = if validation_idx.is_empty() {
        None
    } else {
        let predicted = model.predict(&features.select_rows(&validation_idx))?;
        Some(classification_report(&pick(&validation_idx), &predicted)?)
    };

    // The exported artifact is always fitted on every row
    if !validation_idx.is_empty() {
        model.fit(&features, &labels).context("Training failed")?;
        debug!(rows = features.n_rows(), "Refitted on all rows after validation");
    }

    let artifact_path = model
        .save(None)?
        .context("No trained classifier to save")?;
    let checksum = compute_checksum(&read_artifact(&artifact_path)?);

    let config = model.config();
    StructuredLogger::new("delay-train").log_training_complete(
        config.classifier.as_str(),
        features.n_rows(),
        positives,
        validation.as_ref().map(|r| r.accuracy),
        &artifact_path.display().to_string(),
    );

    Ok(TrainingSummary {
        classifier: config.classifier.to_string(),
        model_version: config.model_version.clone(),
        rows: features.n_rows(),
        positives,
        train_rows: train_idx.len(),
        validation_rows: validation_idx.len(),
        feature_names: features.columns().to_vec(),
        artifact_path,
        checksum,
        validation,
        upload: None,
    })
}

pub async fn run(args: TrainArgs, format: OutputFormat) -> Result<()> {
    let upload = args.upload_plan()?;
    let config = ModelConfig::resolve(args.overrides()).context("Invalid model configuration")?;

    let data_path = args.data_path.clone();
    let validation_split = args.validation_split;
    let mut summary =
        tokio::task::spawn_blocking(move || train_model(config, &data_path, validation_split))
            .await
            .context("Training task failed")??;

    if let Some(plan) = upload {
        let client = StorageClient::new(&args.gcs_api_url, plan.access_token)?;
        let object = client
            .upload_artifact(&plan.bucket, &plan.commit_sha, &summary.artifact_path)
            .await
            .context("Failed to upload artifact")?;
        info!(uri = %object.gs_uri(), "Artifact uploaded");
        summary.upload = Some(object);
    }

    match format {
        OutputFormat::Json => print_json(&summary)?,
        OutputFormat::Table => print_summary(&summary),
    }
    Ok(())
}

fn print_summary(summary: &TrainingSummary) {
    println!("{}", "Training Summary".bold());
    println!("{}", "=".repeat(50));
    println!("Classifier:   {}", summary.classifier.cyan());
    println!("Version:      {}", summary.model_version);
    println!(
        "Rows:         {} (validated on {} held out of {} train rows, artifact fitted on all)",
        summary.rows, summary.validation_rows, summary.train_rows
    );
    let positive_share = if summary.rows > 0 {
        summary.positives as f64 / summary.rows as f64
    } else {
        0.0
    };
    println!(
        "Delayed:      {} ({})",
        summary.positives,
        format_percent(positive_share)
    );
    println!("Features:     {}", summary.feature_names.len());
    println!();

    if let Some(report) = &summary.validation {
        print_report(report);
        println!();
    }

    print_success(&format!(
        "Artifact written to {} (sha256 {})",
        summary.artifact_path.display(),
        &summary.checksum[..12.min(summary.checksum.len())]
    ));
    if let Some(object) = &summary.upload {
        print_success(&format!("Uploaded to {}", object.gs_uri()));
    }
}
