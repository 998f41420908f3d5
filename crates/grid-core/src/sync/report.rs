//! Cycle reports and the notification sink

use crate::SyncErrorKind;
use crate::detect::PathIssue;
use crate::model::Rejection;

/// Why a cycle stopped before completing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleFailure {
    pub kind: SyncErrorKind,
    pub message: String,
}

/// Everything that happened during one sync cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    /// Local changes the server confirmed
    pub accepted: Vec<String>,
    /// Local changes the server refused, with its reasons
    pub rejected: Vec<Rejection>,
    /// Paths written or removed from server downloads
    pub downloaded: Vec<String>,
    /// Local edits discarded because the server copy won
    pub overwritten: Vec<String>,
    /// Paths skipped this cycle because of local I/O failures
    pub io_errors: Vec<PathIssue>,
    /// Paths that changed while the request was being built
    pub deferred: Vec<String>,
    /// Cursor after the cycle
    pub cursor: Option<String>,
    /// The server response was only partially applied
    pub dirty: bool,
    pub failure: Option<CycleFailure>,
}

impl CycleReport {
    /// A report for a cycle that stopped with `error`.
    pub fn failed(error: &crate::Error) -> Self {
        Self {
            failure: Some(CycleFailure {
                kind: error.kind(),
                message: error.to_string(),
            }),
            ..Self::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// Whether the cycle moved anything in either direction.
    pub fn has_activity(&self) -> bool {
        !self.accepted.is_empty() || !self.downloaded.is_empty()
    }
}

/// How a call to `sync_now` ended.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// The cycle ran; see the report for success or failure
    Completed(CycleReport),
    /// Another cycle was already in flight
    Skipped,
    /// No credential was available
    NotAuthenticated,
}

impl CycleOutcome {
    pub fn report(&self) -> Option<&CycleReport> {
        match self {
            CycleOutcome::Completed(report) => Some(report),
            _ => None,
        }
    }
}

/// Notifications emitted over a cycle's lifetime.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    CycleStarted,
    CycleSucceeded {
        accepted: usize,
        rejected: Vec<Rejection>,
        downloaded: usize,
        /// Reported once per cycle as a batch
        overwritten: Vec<String>,
        io_errors: Vec<PathIssue>,
    },
    CycleSkipped,
    CycleFailed {
        kind: SyncErrorKind,
        message: String,
    },
}

impl SyncEvent {
    /// The terminal event for a finished cycle.
    pub fn from_report(report: &CycleReport) -> Self {
        match &report.failure {
            Some(failure) => SyncEvent::CycleFailed {
                kind: failure.kind,
                message: failure.message.clone(),
            },
            None => SyncEvent::CycleSucceeded {
                accepted: report.accepted.len(),
                rejected: report.rejected.clone(),
                downloaded: report.downloaded.len(),
                overwritten: report.overwritten.clone(),
                io_errors: report.io_errors.clone(),
            },
        }
    }
}

/// Receives [`SyncEvent`]s; implementations must not block.
pub trait SyncEventHandler: Send + Sync {
    fn on_event(&self, event: SyncEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandler;

impl SyncEventHandler for NoopHandler {
    fn on_event(&self, _event: SyncEvent) {}
}

/// Writes events to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl SyncEventHandler for LoggingHandler {
    fn on_event(&self, event: SyncEvent) {
        match event {
            SyncEvent::CycleStarted => tracing::debug!("Sync cycle started"),
            SyncEvent::CycleSkipped => tracing::debug!("Sync already in progress, skipped"),
            SyncEvent::CycleSucceeded {
                accepted,
                rejected,
                downloaded,
                overwritten,
                io_errors,
            } => {
                tracing::info!(accepted, downloaded, "Workspace synced");
                for rejection in &rejected {
                    tracing::warn!(path = %rejection.path, reason = %rejection.reason, "Change rejected");
                }
                if !overwritten.is_empty() {
                    tracing::warn!(
                        count = overwritten.len(),
                        paths = ?overwritten,
                        "Local edits overwritten by server copy"
                    );
                }
                for issue in &io_errors {
                    tracing::warn!(path = %issue.path, error = %issue.message, "Path skipped");
                }
            }
            SyncEvent::CycleFailed { kind, message } => {
                tracing::error!(%kind, %message, "Sync failed");
            }
        }
    }
}
