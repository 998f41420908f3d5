//! Config command implementation

use colored::Colorize;

use grid_core::{ConfigSync, GridConfig, MergeOutcome};

use crate::error::{CliError, Result};

/// Fetch the enterprise configuration and apply it if newer.
pub async fn run_pull(config_sync: &ConfigSync) -> Result<MergeOutcome> {
    let outcome = config_sync.pull().await?;
    match &outcome {
        MergeOutcome::Applied(state) => {
            println!(
                "{} Applied enterprise configuration v{} ({} provider settings)",
                "OK".green().bold(),
                state.version(),
                state.provider_settings.len()
            );
            if let Some(config) = &state.config
                && !config.mcp_config.servers.is_empty()
            {
                println!("{}:", "MCP Servers".bold());
                for name in config.mcp_config.servers.keys() {
                    println!("  {} {}", "+".green(), name.cyan());
                }
            }
        }
        MergeOutcome::Unchanged {
            local_version,
            remote_version,
        } => {
            println!(
                "Enterprise configuration up to date (local v{local_version}, server v{remote_version})"
            );
        }
    }
    println!("{}: {}", "Stored at".dimmed(), config_sync.path());
    Ok(outcome)
}

/// Print the effective client configuration as TOML.
pub fn run_show(config: &GridConfig) -> Result<()> {
    let rendered = toml::to_string_pretty(config).map_err(|e| CliError::user(e.to_string()))?;
    print!("{rendered}");
    Ok(())
}
