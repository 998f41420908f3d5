//! Cloud workspace listing and registration

use colored::Colorize;

use grid_core::model::CreateWorkspaceRequest;
use grid_core::{CredentialProvider, RemoteApi, Workspace};
use grid_fs::NormalizedPath;

use crate::error::{CliError, Result};

async fn api_key(credentials: &dyn CredentialProvider) -> Result<String> {
    credentials.credential().await.ok_or_else(|| {
        CliError::user(format!("Not logged in. Run {} first.", "grid login".cyan()))
    })
}

pub async fn run_list(remote: &dyn RemoteApi, credentials: &dyn CredentialProvider) -> Result<Vec<Workspace>> {
    let key = api_key(credentials).await?;
    let workspaces = remote.list_workspaces(&key).await?;

    println!("{}", "Cloud Workspaces".bold());
    println!();
    if workspaces.is_empty() {
        println!("  {} (use {} to add one)", "None".dimmed(), "grid sync --create".cyan());
    }
    for ws in &workspaces {
        let synced = ws.updated_at.as_deref().unwrap_or("never");
        println!("  {} {} {}", ws.name.cyan(), ws.id.dimmed(), format!("updated {synced}").dimmed());
    }
    Ok(workspaces)
}

/// Register `name` for `root` without binding it.
pub async fn run_create(
    remote: &dyn RemoteApi,
    credentials: &dyn CredentialProvider,
    root: &NormalizedPath,
    name: &str,
) -> Result<Workspace> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CliError::user("Workspace name must not be empty"));
    }
    let key = api_key(credentials).await?;

    let existing = remote.list_workspaces(&key).await?;
    if existing.iter().any(|w| w.name == name) {
        return Err(CliError::user(format!("Workspace \"{name}\" already exists")));
    }

    let workspace = remote
        .create_workspace(
            &key,
            &CreateWorkspaceRequest {
                name: name.to_string(),
                path: root.to_string(),
            },
        )
        .await?;
    println!("{} Created workspace {} ({})", "OK".green().bold(), workspace.name.cyan(), workspace.id);
    Ok(workspace)
}
