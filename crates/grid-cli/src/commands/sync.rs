//! Sync, status, resync and watch

use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use serde_json::{Value, json};

use grid_core::{
    AuthService, AutoSync, ChangeKind, CycleOutcome, CycleReport, SyncEvent, SyncEventHandler,
    SyncService, SyncStatus,
};

use crate::error::{CliError, Result};

fn report_json(report: &CycleReport) -> Value {
    json!({
        "accepted": report.accepted,
        "rejected": report.rejected,
        "downloaded": report.downloaded,
        "overwritten": report.overwritten,
        "io_errors": report.io_errors.iter().map(|i| json!({"path": i.path, "message": i.message})).collect::<Vec<_>>(),
        "deferred": report.deferred,
        "cursor": report.cursor,
        "dirty": report.dirty,
        "failure": report.failure.as_ref().map(|f| json!({"kind": f.kind.to_string(), "message": f.message})),
    })
}

fn print_report(report: &CycleReport) {
    if !report.has_activity() && report.rejected.is_empty() && report.io_errors.is_empty() {
        println!("{} Up to date", "OK".green().bold());
    } else {
        println!(
            "{} Sync complete: {} uploaded, {} downloaded",
            "OK".green().bold(),
            report.accepted.len(),
            report.downloaded.len()
        );
    }
    if !report.overwritten.is_empty() {
        println!("{} Local edits replaced by the server copy:", "!".yellow().bold());
        for path in &report.overwritten {
            println!("  {}", path.yellow());
        }
    }
    for rejection in &report.rejected {
        println!("  {} {} ({})", "x".red(), rejection.path, rejection.reason.dimmed());
    }
    for issue in &report.io_errors {
        println!("  {} {} ({})", "x".red(), issue.path, issue.message.dimmed());
    }
    if !report.deferred.is_empty() {
        println!("  {} {} file(s) changed mid-sync, next cycle picks them up", "~".dimmed(), report.deferred.len());
    }
    if report.dirty {
        println!("{} Some downloads were not applied; they are retried next sync", "!".yellow().bold());
    }
}

/// Run one cycle and print its report.
///
/// # Errors
///
/// Fails when not logged in or when the cycle itself failed.
pub async fn run_sync(service: &SyncService, json_output: bool) -> Result<CycleReport> {
    let report = match service.sync_now().await {
        CycleOutcome::Completed(report) => report,
        CycleOutcome::Skipped => {
            return Err(CliError::user("Another sync is already running for this workspace"));
        }
        CycleOutcome::NotAuthenticated => {
            return Err(CliError::user(format!("Not logged in. Run {} first.", "grid login".cyan())));
        }
    };

    if json_output {
        println!("{}", serde_json::to_string_pretty(&report_json(&report))?);
    }
    if let Some(failure) = &report.failure {
        return Err(CliError::user(format!("Sync failed ({}): {}", failure.kind, failure.message)));
    }
    if !json_output {
        print_report(&report);
    }
    Ok(report)
}

/// Clear the cursor, then sync.
pub async fn run_resync(service: &SyncService, json_output: bool) -> Result<CycleReport> {
    service.reset_cursor().await?;
    if !json_output {
        println!("Cursor cleared, requesting a full snapshot");
    }
    run_sync(service, json_output).await
}

fn status_json(status: &SyncStatus) -> Value {
    json!({
        "workspace": status.workspace,
        "cursor": status.cursor,
        "dirty": status.dirty,
        "tracked": status.tracked,
        "pending": status.pending.changes.iter().collect::<Vec<_>>(),
        "issues": status.pending.issues.iter().map(|i| json!({"path": i.path, "message": i.message})).collect::<Vec<_>>(),
    })
}

/// Print the local sync state without contacting the server.
pub async fn run_status(service: &SyncService, json_output: bool) -> Result<SyncStatus> {
    let status = service.status().await?;
    if json_output {
        println!("{}", serde_json::to_string_pretty(&status_json(&status))?);
        return Ok(status);
    }

    println!("{}", "Sync Status".bold());
    println!();
    println!("{}:       {}", "Root".dimmed(), service.root());
    match &status.workspace {
        Some(ws) => println!("{}:  {} ({})", "Workspace".dimmed(), ws.name.cyan(), ws.id),
        None => println!(
            "{}:  {} (run {} to bind)",
            "Workspace".dimmed(),
            "not bound".yellow(),
            "grid sync --create".cyan()
        ),
    }
    println!(
        "{}:     {}",
        "Cursor".dimmed(),
        status.cursor.as_deref().unwrap_or("none (next sync is a full snapshot)")
    );
    println!("{}:    {}", "Tracked".dimmed(), status.tracked);
    if status.dirty {
        println!("{}:      {}", "State".dimmed(), "partially applied, will replay".yellow());
    }
    println!();

    println!("{}:", "Pending Changes".bold());
    if status.pending.changes.is_empty() {
        println!("  {}", "None".dimmed());
    }
    for change in &status.pending.changes {
        let marker = match change.kind {
            ChangeKind::Created => "+".green(),
            ChangeKind::Modified => "~".yellow(),
            ChangeKind::Deleted => "-".red(),
        };
        println!("  {} {}", marker, change.path);
    }
    for issue in &status.pending.issues {
        println!("  {} {} ({})", "x".red(), issue.path, issue.message.dimmed());
    }
    Ok(status)
}

/// Prints one line per finished cycle while watching.
struct ConsoleHandler;

impl SyncEventHandler for ConsoleHandler {
    fn on_event(&self, event: SyncEvent) {
        let now = chrono::Local::now().format("%H:%M:%S");
        match event {
            SyncEvent::CycleSucceeded {
                accepted,
                downloaded,
                overwritten,
                ..
            } => {
                if accepted + downloaded > 0 {
                    println!("[{now}] {} {accepted} up, {downloaded} down", "synced".green());
                }
                if !overwritten.is_empty() {
                    println!("[{now}] {} {}", "server copy kept:".yellow(), overwritten.join(", "));
                }
            }
            SyncEvent::CycleFailed { kind, message } => {
                println!("[{now}] {} ({kind}) {message}", "sync failed".red());
            }
            SyncEvent::CycleStarted | SyncEvent::CycleSkipped => {}
        }
    }
}

/// Sync every `interval` until Ctrl-C or logout.
pub async fn run_watch(service: SyncService, auth: &AuthService, interval: Duration) -> Result<()> {
    if auth.restore().await?.is_none() {
        return Err(CliError::user(format!("Not logged in. Run {} first.", "grid login".cyan())));
    }

    let service = Arc::new(service.with_handler(Arc::new(ConsoleHandler)));
    // Catch up immediately, then follow the timer
    service.sync_now().await;

    let auto = AutoSync::start(Arc::clone(&service), interval);
    let logout = auto.stop_on_logout(auth.subscribe());
    println!(
        "Watching {} every {}s, press {} to stop",
        service.root().to_string().cyan(),
        interval.as_secs(),
        "Ctrl-C".bold()
    );

    tokio::signal::ctrl_c().await?;
    auto.stop();
    logout.abort();
    auto.join().await;
    println!("Stopped");
    Ok(())
}
