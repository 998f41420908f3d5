//! reqwest-backed implementation of the cloud API

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use super::{KeyValidator, RemoteApi};
use crate::enterprise::EnterpriseConfig;
use crate::model::{CreateWorkspaceRequest, SyncRequest, SyncResult, User, Workspace};
use crate::{Error, Result};

const UPGRADE_MESSAGE: &str = "Upgrade to Pro to use this feature";

/// Map a non-success HTTP status to the sync error taxonomy.
///
/// `body_message` is the `message` field of the error body, when the server
/// sent one.
pub fn classify_status(status: StatusCode, body_message: Option<&str>) -> Error {
    match status.as_u16() {
        401 => Error::auth(body_message.unwrap_or("API key not accepted")),
        402 | 403 => Error::auth(body_message.unwrap_or(UPGRADE_MESSAGE)),
        _ => {
            let reason = status.canonical_reason().unwrap_or("unknown status");
            match body_message {
                Some(msg) => Error::protocol(format!("API error {}: {reason}: {msg}", status.as_u16())),
                None => Error::protocol(format!("API error {}: {reason}", status.as_u16())),
            }
        }
    }
}

fn transport_error(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::network(format!("request timed out: {err}"))
    } else {
        Error::network(err.to_string())
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// `GET /workspaces` answers with either a wrapper object or a bare list.
#[derive(Deserialize)]
#[serde(untagged)]
enum WorkspaceList {
    Wrapped { workspaces: Vec<Workspace> },
    Bare(Vec<Workspace>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WorkspaceBody {
    Wrapped { workspace: Workspace },
    Bare(Workspace),
}

/// Client for the GRID Cloud HTTP API.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: Client,
    base_url: String,
}

impl HttpRemote {
    /// Create a client for `base_url` (e.g. `https://grideditor.com/api`).
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("grid/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::InvalidConfig {
                message: format!("cannot build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, endpoint: &str, api_key: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{endpoint}", self.base_url))
            .bearer_auth(api_key)
            .header("x-api-key", api_key)
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status();
        let body = response.bytes().await.map_err(transport_error)?;

        if !status.is_success() {
            let message = serde_json::from_slice::<ErrorBody>(&body)
                .ok()
                .and_then(|b| b.message);
            tracing::debug!(status = status.as_u16(), ?message, "API request failed");
            return Err(classify_status(status, message.as_deref()));
        }

        serde_json::from_slice(&body)
            .map_err(|e| Error::protocol(format!("malformed response body: {e}")))
    }
}

#[async_trait]
impl RemoteApi for HttpRemote {
    async fn list_workspaces(&self, api_key: &str) -> Result<Vec<Workspace>> {
        let body: WorkspaceList = self
            .send(self.request(Method::GET, "/workspaces", api_key))
            .await?;
        Ok(match body {
            WorkspaceList::Wrapped { workspaces } => workspaces,
            WorkspaceList::Bare(workspaces) => workspaces,
        })
    }

    async fn create_workspace(&self, api_key: &str, request: &CreateWorkspaceRequest) -> Result<Workspace> {
        let body: WorkspaceBody = self
            .send(self.request(Method::POST, "/workspaces", api_key).json(request))
            .await?;
        Ok(match body {
            WorkspaceBody::Wrapped { workspace } => workspace,
            WorkspaceBody::Bare(workspace) => workspace,
        })
    }

    async fn sync(&self, api_key: &str, workspace_id: &str, request: &SyncRequest) -> Result<SyncResult> {
        let endpoint = format!("/workspaces/{workspace_id}/sync");
        tracing::debug!(
            workspace = workspace_id,
            changes = request.changes.len(),
            cursor = ?request.cursor,
            "Sending sync request"
        );
        self.send(self.request(Method::POST, &endpoint, api_key).json(request))
            .await
    }

    async fn fetch_config(&self, api_key: &str) -> Result<EnterpriseConfig> {
        self.send(self.request(Method::GET, "/ide/config", api_key))
            .await
    }
}

#[async_trait]
impl KeyValidator for HttpRemote {
    async fn validate(&self, api_key: &str) -> Result<User> {
        let builder = self
            .client
            .post(format!("{}/ide/auth/validate", self.base_url))
            .json(&json!({ "apiKey": api_key }));

        match self.send(builder).await {
            Ok(user) => Ok(user),
            Err(Error::Auth { message }) | Err(Error::Protocol { message }) => {
                Err(Error::InvalidApiKey { reason: message })
            }
            Err(e) => Err(e),
        }
    }
}
