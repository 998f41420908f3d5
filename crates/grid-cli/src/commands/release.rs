//! Release publishing

use std::time::Duration;

use colored::Colorize;

use grid_core::release::{ReleaseData, prepare};
use grid_core::{ReleasePublisher, ReleaseSpec};

use crate::error::Result;

const PUBLISH_TIMEOUT: Duration = Duration::from_secs(60);

/// Checksum `spec.file` and register it with the releases API.
///
/// The secret is checked before the artifact is read.
pub async fn run_publish(spec: &ReleaseSpec) -> Result<ReleaseData> {
    let publisher = ReleasePublisher::from_env(PUBLISH_TIMEOUT)?;
    let data = prepare(spec, chrono::Utc::now())?;

    println!("{}", "Publishing release".bold());
    println!("{}:  {}", "Version".dimmed(), data.version.cyan());
    println!("{}:  {} / {} / {}", "Target".dimmed(), data.channel, data.platform, data.arch);
    println!("{}:      {}", "URL".dimmed(), data.url);
    println!("{}:   {}", "SHA256".dimmed(), data.sha256);

    let response = publisher.publish(&data).await?;
    println!("{} Release registered at {}", "OK".green().bold(), publisher.api_url());
    tracing::debug!(%response, "Releases API response");
    Ok(data)
}
