//! Workspace synchronization
//!
//! [`SyncService`] runs push/pull cycles for one workspace root. Results are
//! summarized in a [`CycleReport`] and announced to a [`SyncEventHandler`].

mod apply;
mod conflict;
mod engine;
mod report;
mod retry;

pub use conflict::{ConflictResolver, Resolution};
pub use engine::{SyncOptions, SyncService, SyncStatus};
pub use report::{
    CycleFailure, CycleOutcome, CycleReport, LoggingHandler, NoopHandler, SyncEvent,
    SyncEventHandler,
};
pub use retry::RetryPolicy;
