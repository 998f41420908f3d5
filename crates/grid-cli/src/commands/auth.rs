//! Login, logout and whoami

use colored::Colorize;
use dialoguer::Password;

use grid_core::{AuthService, ConfigSync, MergeOutcome, User};

use crate::error::{CliError, Result};

fn not_logged_in() -> CliError {
    CliError::user(format!("Not logged in. Run {} first.", "grid login".cyan()))
}

fn print_user(user: &User) {
    println!("{}:   {}", "Email".dimmed(), user.email.cyan());
    println!("{}:    {}", "Tier".dimmed(), user.tier);
    if let Some(team) = &user.team_id {
        let role = if user.is_team_admin { " (admin)" } else { "" };
        println!("{}:    {}{}", "Team".dimmed(), team, role);
    }
}

/// Validate and store an API key, then pull the enterprise configuration.
///
/// Prompts for the key when `api_key` is `None`. A failed config pull is
/// reported but does not fail the login.
pub async fn run_login(auth: &AuthService, config: &ConfigSync, api_key: Option<String>) -> Result<User> {
    let api_key = match api_key {
        Some(key) => key,
        None => Password::new().with_prompt("GRID API key").interact()?,
    };

    let user = auth.login(&api_key).await?;
    println!("{} Logged in", "OK".green().bold());
    print_user(&user);

    match config.pull().await {
        Ok(MergeOutcome::Applied(state)) => {
            println!("Applied enterprise configuration v{}", state.version());
        }
        Ok(MergeOutcome::Unchanged { .. }) => {}
        Err(e) => tracing::warn!(error = %e, "Enterprise config not pulled"),
    }
    Ok(user)
}

pub fn run_logout(auth: &AuthService) -> Result<()> {
    auth.logout()?;
    println!("{} Logged out", "OK".green().bold());
    Ok(())
}

/// Re-validate the stored key and print the account.
pub async fn run_whoami(auth: &AuthService) -> Result<User> {
    let user = auth.restore().await?.ok_or_else(not_logged_in)?;
    print_user(&user);
    Ok(user)
}
