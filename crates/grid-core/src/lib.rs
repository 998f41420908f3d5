//! Core client for GRID Cloud
//!
//! This crate implements everything the `grid` CLI does against the cloud:
//!
//! - **Workspace sync**: change detection against a persisted tracker, one
//!   push/pull round trip per cycle, server-wins conflict handling
//! - **Scheduling**: single-flight cycles, periodic auto sync stopped by logout
//! - **Authentication**: API key validation, credential storage, login/logout events
//! - **Enterprise config**: versioned provider settings and MCP servers
//! - **Release publishing**: artifact checksums and release registration
//! - **Configuration resolution**: defaults, global and workspace layers
//!
//! # Architecture
//!
//! ```text
//!              grid-cli
//!                 |
//!             grid-core
//!     +-----+-----+-----+------+
//!     |     |     |     |      |
//!  detect tracker sync remote auth/enterprise
//!     |     |
//!     grid-fs
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use grid_core::{MemoryRemote, StaticCredential, SyncOptions, SyncService};
//!
//! let service = SyncService::open(
//!     "/path/to/notes",
//!     Arc::new(MemoryRemote::new()),
//!     Arc::new(StaticCredential(Some("grid_key".into()))),
//!     SyncOptions { create_if_missing: true, ..Default::default() },
//! )?;
//! let outcome = service.sync_now().await;
//! ```

pub mod auth;
pub mod config;
pub mod detect;
pub mod enterprise;
pub mod error;
pub mod model;
pub mod release;
pub mod remote;
pub mod schedule;
pub mod sync;
pub mod tracker;

pub use auth::{
    AuthEvent, AuthService, CredentialProvider, CredentialStore, FileCredentialStore,
    MemoryCredentialStore, StaticCredential,
};
pub use config::{ConfigLayer, ConfigResolver, GridConfig};
pub use detect::{ChangeDetector, Detection, IgnoreRules, PathIssue};
pub use enterprise::{ConfigSync, EnterpriseConfig, EnterpriseState, MergeOutcome, merge};
pub use error::{Error, Result, SyncErrorKind};
pub use model::{
    Change, ChangeKind, ChangeSet, Download, FileRecord, Rejection, SyncRequest, SyncResult,
    Tier, User, WireChange, Workspace,
};
pub use release::{ReleaseData, ReleasePublisher, ReleaseSpec};
pub use remote::{HttpRemote, KeyValidator, MemoryRemote, RemoteApi};
pub use schedule::AutoSync;
pub use sync::{
    ConflictResolver, CycleOutcome, CycleReport, SyncEvent, SyncEventHandler, SyncOptions,
    SyncService, SyncStatus,
};
pub use tracker::{StateStore, SyncState, Tracker};
