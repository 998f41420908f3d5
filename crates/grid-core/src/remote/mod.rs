//! GRID Cloud API surface
//!
//! [`RemoteApi`] is the seam between the sync engine and the server.
//! [`HttpRemote`] talks to the real API; [`MemoryRemote`] is an in-process
//! server used by tests and offline runs.

mod http;
mod memory;

pub use http::{HttpRemote, classify_status};
pub use memory::MemoryRemote;

use async_trait::async_trait;

use crate::Result;
use crate::enterprise::EnterpriseConfig;
use crate::model::{CreateWorkspaceRequest, SyncRequest, SyncResult, User, Workspace};

/// Operations the client performs against the cloud.
///
/// Every call carries the API key explicitly; implementations hold no
/// credential state of their own.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// List the workspaces registered for this account.
    async fn list_workspaces(&self, api_key: &str) -> Result<Vec<Workspace>>;

    /// Register a new cloud workspace.
    async fn create_workspace(&self, api_key: &str, request: &CreateWorkspaceRequest) -> Result<Workspace>;

    /// One push/pull round trip for a workspace.
    async fn sync(&self, api_key: &str, workspace_id: &str, request: &SyncRequest) -> Result<SyncResult>;

    /// Fetch the team's enterprise configuration.
    async fn fetch_config(&self, api_key: &str) -> Result<EnterpriseConfig>;
}

/// Checks an API key and resolves the account it belongs to.
#[async_trait]
pub trait KeyValidator: Send + Sync {
    async fn validate(&self, api_key: &str) -> Result<User>;
}
