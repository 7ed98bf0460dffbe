//! Google Cloud Storage client for publishing model artifacts

use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Default endpoint of the GCS JSON API
pub const DEFAULT_GCS_API_URL: &str = "https://storage.googleapis.com";

/// File name every artifact is published under
pub const ARTIFACT_FILE_NAME: &str = "delay_model.onnx";

/// Object name for an artifact built from a given commit
pub fn artifact_object_name(commit_sha: &str) -> String {
    format!("models/{}/{}", commit_sha, ARTIFACT_FILE_NAME)
}

/// Client for the GCS media upload endpoint
pub struct StorageClient {
    client: Client,
    base_url: Url,
    access_token: String,
}

/// Object resource returned by a successful upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedObject {
    pub bucket: String,
    pub name: String,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default, rename = "md5Hash")]
    pub md5_hash: Option<String>,
}

impl UploadedObject {
    pub fn gs_uri(&self) -> String {
        format!("gs://{}/{}", self.bucket, self.name)
    }
}

impl StorageClient {
    /// Create a new storage client
    pub fn new(base_url: &str, access_token: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid storage API URL")?;

        Ok(Self {
            client,
            base_url,
            access_token: access_token.into(),
        })
    }

    fn upload_url(&self, bucket: &str, object_name: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("Storage API URL cannot be a base"))?
            .pop_if_empty()
            .extend(["upload", "storage", "v1", "b", bucket, "o"]);
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", object_name);
        Ok(url)
    }

    /// Upload raw bytes as `gs://{bucket}/{object_name}`
    pub async fn upload(
        &self,
        bucket: &str,
        object_name: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadedObject> {
        let url = self.upload_url(bucket, object_name)?;

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.access_token)
            .header("content-type", "application/octet-stream")
            .body(bytes)
            .send()
            .await
            .context("Failed to send upload request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Storage API error ({}): {}", status, body);
        }

        response
            .json()
            .await
            .context("Failed to parse upload response")
    }

    /// Upload a local artifact under `models/{commit_sha}/delay_model.onnx`
    pub async fn upload_artifact(
        &self,
        bucket: &str,
        commit_sha: &str,
        path: &Path,
    ) -> Result<UploadedObject> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read artifact {}", path.display()))?;
        self.upload(bucket, &artifact_object_name(commit_sha), bytes)
            .await
    }
}
