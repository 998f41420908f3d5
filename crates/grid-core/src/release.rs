//! Release registration
//!
//! Checksums a build artifact and registers it with the GRID releases API so
//! the website and the updater can offer it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::remote::classify_status;
use crate::{Error, Result};

/// Releases endpoint used when `GRID_API_URL` is unset
pub const DEFAULT_RELEASES_URL: &str = "https://grideditor.com/api/releases";

const FALLBACK_DOWNLOAD_BASE: &str = "https://grideditor.com/downloads";

/// What to publish.
#[derive(Debug, Clone)]
pub struct ReleaseSpec {
    pub version: String,
    pub file: PathBuf,
    pub channel: String,
    pub platform: String,
    pub arch: String,
    /// GitHub `owner/name` hosting the artifact
    pub repo: Option<String>,
}

impl ReleaseSpec {
    /// A stable Windows x64 release of `file`.
    pub fn new(version: impl Into<String>, file: impl Into<PathBuf>) -> Self {
        Self {
            version: version.into(),
            file: file.into(),
            channel: "stable".to_string(),
            platform: "windows".to_string(),
            arch: "x64".to_string(),
            repo: None,
        }
    }
}

/// Body of the release registration request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseData {
    pub version: String,
    pub channel: String,
    pub platform: String,
    pub arch: String,
    pub url: String,
    pub sha256: String,
    pub published_at: String,
}

/// Where users download the artifact from.
pub fn download_url(version: &str, file_name: &str, repo: Option<&str>) -> String {
    match repo {
        Some(repo) => format!("https://github.com/{repo}/releases/download/{version}/{file_name}"),
        None => format!("{FALLBACK_DOWNLOAD_BASE}/{file_name}"),
    }
}

/// Checksum the artifact and assemble the registration body.
///
/// # Errors
///
/// Returns an I/O error if the artifact is missing or unreadable.
pub fn prepare(spec: &ReleaseSpec, now: DateTime<Utc>) -> Result<ReleaseData> {
    let file_name = artifact_name(&spec.file)?;
    let sha256 = grid_fs::checksum::file_sha256_hex(&spec.file)?;
    if spec.repo.is_none() {
        tracing::warn!("No repository given, using the generic download location");
    }

    Ok(ReleaseData {
        version: spec.version.clone(),
        channel: spec.channel.clone(),
        platform: spec.platform.clone(),
        arch: spec.arch.clone(),
        url: download_url(&spec.version, &file_name, spec.repo.as_deref()),
        sha256,
        published_at: now.to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}

fn artifact_name(path: &Path) -> Result<String> {
    if !path.is_file() {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("File not found: {}", path.display()),
        )));
    }
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| Error::InvalidConfig {
            message: format!("{} has no file name", path.display()),
        })
}

/// Posts [`ReleaseData`] to the releases API.
#[derive(Debug, Clone)]
pub struct ReleasePublisher {
    client: Client,
    api_url: String,
    secret: String,
}

impl ReleasePublisher {
    pub fn new(api_url: impl Into<String>, secret: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::InvalidConfig {
                message: format!("cannot build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            api_url: api_url.into(),
            secret: secret.into(),
        })
    }

    /// Configure from `GRID_API_URL` and `GRID_API_SECRET`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` when `GRID_API_SECRET` is unset or empty.
    pub fn from_env(timeout: Duration) -> Result<Self> {
        let api_url = std::env::var("GRID_API_URL").unwrap_or_else(|_| DEFAULT_RELEASES_URL.to_string());
        let secret = std::env::var("GRID_API_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::InvalidConfig {
                message: "GRID_API_SECRET environment variable is not set".to_string(),
            })?;
        Self::new(api_url, secret, timeout)
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Register the release; a success body that is not JSON counts as `{}`.
    pub async fn publish(&self, data: &ReleaseData) -> Result<Value> {
        tracing::info!(version = %data.version, channel = %data.channel, url = %self.api_url, "Publishing release");
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.secret)
            .json(data)
            .send()
            .await
            .map_err(|e| Error::network(e.to_string()))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| Error::network(e.to_string()))?;
        if !status.is_success() {
            return Err(classify_status(status, Some(body.as_str()).filter(|b| !b.is_empty())));
        }
        Ok(serde_json::from_str(&body).unwrap_or_else(|_| Value::Object(Default::default())))
    }
}
