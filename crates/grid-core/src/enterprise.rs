//! Enterprise configuration pulled from the cloud
//!
//! Team admins publish provider settings and MCP server definitions; the
//! client applies a remote config only when its version is newer than the
//! one stored locally.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use grid_fs::{ConfigStore, NormalizedPath};

use crate::auth::{AuthEvent, CredentialProvider};
use crate::remote::RemoteApi;
use crate::{Error, Result};

const ENTERPRISE_FILE: &str = "enterprise.json";

/// MCP server definitions distributed with the enterprise config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct McpConfig {
    #[serde(default)]
    pub servers: Map<String, Value>,
    #[serde(default)]
    pub inputs: Vec<Value>,
}

/// Body of `GET /ide/config`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnterpriseConfig {
    #[serde(default)]
    pub provider_settings: Map<String, Value>,
    #[serde(default)]
    pub mcp_config: McpConfig,
    /// Milliseconds since the epoch
    #[serde(default)]
    pub updated_at: i64,
    pub version: u64,
}

/// What the client has applied locally.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnterpriseState {
    /// Last enterprise config applied, if any
    #[serde(default)]
    pub config: Option<EnterpriseConfig>,
    /// Effective provider settings after merging
    #[serde(default)]
    pub provider_settings: Map<String, Value>,
}

impl EnterpriseState {
    /// Version of the applied config; 0 when none has been applied.
    pub fn version(&self) -> u64 {
        self.config.as_ref().map_or(0, |c| c.version)
    }
}

/// Result of [`merge`].
#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    /// The remote config was newer; this is the new local state
    Applied(EnterpriseState),
    /// Local state already at or beyond the remote version
    Unchanged { local_version: u64, remote_version: u64 },
}

/// Merge a fetched config into local state.
///
/// A strictly higher remote version replaces the stored config and its
/// provider settings override local ones key by key. Local keys the remote
/// does not mention are kept.
pub fn merge(local: &EnterpriseState, remote: &EnterpriseConfig) -> MergeOutcome {
    let local_version = local.version();
    if remote.version <= local_version {
        return MergeOutcome::Unchanged {
            local_version,
            remote_version: remote.version,
        };
    }

    let mut provider_settings = local.provider_settings.clone();
    for (key, value) in &remote.provider_settings {
        provider_settings.insert(key.clone(), value.clone());
    }

    MergeOutcome::Applied(EnterpriseState {
        config: Some(remote.clone()),
        provider_settings,
    })
}

/// Fetches, merges and persists the enterprise config.
pub struct ConfigSync {
    remote: Arc<dyn RemoteApi>,
    credentials: Arc<dyn CredentialProvider>,
    path: NormalizedPath,
    store: ConfigStore,
}

impl ConfigSync {
    /// `dir` is the directory holding `enterprise.json`.
    pub fn new(
        remote: Arc<dyn RemoteApi>,
        credentials: Arc<dyn CredentialProvider>,
        dir: &NormalizedPath,
    ) -> Self {
        Self {
            remote,
            credentials,
            path: dir.join(ENTERPRISE_FILE),
            store: ConfigStore::new(),
        }
    }

    /// Default location: `<config_dir>/grid/`.
    pub fn default_dir() -> Option<NormalizedPath> {
        dirs::config_dir().map(|d| NormalizedPath::new(d.join("grid")))
    }

    pub fn path(&self) -> &NormalizedPath {
        &self.path
    }

    /// Locally applied state, empty if nothing was ever applied.
    pub fn load(&self) -> Result<EnterpriseState> {
        Ok(self.store.load_optional(&self.path)?.unwrap_or_default())
    }

    /// Fetch the remote config and apply it if newer.
    ///
    /// # Errors
    ///
    /// Returns `NotAuthenticated` without a credential, and any remote or
    /// storage error. Local state is untouched on error.
    pub async fn pull(&self) -> Result<MergeOutcome> {
        let api_key = self
            .credentials
            .credential()
            .await
            .ok_or(Error::NotAuthenticated)?;
        let remote = self.remote.fetch_config(&api_key).await?;
        let local = self.load()?;

        let outcome = merge(&local, &remote);
        match &outcome {
            MergeOutcome::Applied(state) => {
                self.store.save(&self.path, state)?;
                tracing::info!(
                    from = local.version(),
                    to = state.version(),
                    "Applied enterprise configuration"
                );
            }
            MergeOutcome::Unchanged {
                local_version,
                remote_version,
            } => {
                tracing::debug!(local_version, remote_version, "Enterprise configuration up to date");
            }
        }
        Ok(outcome)
    }

    /// Pull the config every time a login is announced.
    pub fn spawn_on_login(self: Arc<Self>, mut events: broadcast::Receiver<AuthEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(AuthEvent::Login(_)) => {
                        if let Err(e) = self.pull().await {
                            tracing::warn!(error = %e, "Enterprise config sync failed");
                        }
                    }
                    Ok(AuthEvent::Logout) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "Auth events lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn remote(version: u64, settings: Value) -> EnterpriseConfig {
        EnterpriseConfig {
            provider_settings: settings.as_object().cloned().unwrap_or_default(),
            version,
            ..Default::default()
        }
    }

    #[test]
    fn newer_remote_overrides_key_by_key() {
        let local = EnterpriseState {
            config: Some(remote(1, json!({}))),
            provider_settings: json!({"openai.model": "gpt-4", "local.only": true})
                .as_object()
                .cloned()
                .unwrap(),
        };
        let incoming = remote(2, json!({"openai.model": "gpt-5", "anthropic.enabled": true}));

        let MergeOutcome::Applied(state) = merge(&local, &incoming) else {
            panic!("expected merge to apply");
        };
        assert_eq!(state.version(), 2);
        assert_eq!(state.provider_settings["openai.model"], json!("gpt-5"));
        assert_eq!(state.provider_settings["anthropic.enabled"], json!(true));
        assert_eq!(state.provider_settings["local.only"], json!(true));
    }

    #[test]
    fn equal_or_older_remote_is_ignored() {
        let local = EnterpriseState {
            config: Some(remote(3, json!({}))),
            provider_settings: Map::new(),
        };
        assert_eq!(
            merge(&local, &remote(3, json!({"a": 1}))),
            MergeOutcome::Unchanged {
                local_version: 3,
                remote_version: 3
            }
        );
        assert!(matches!(
            merge(&local, &remote(2, json!({}))),
            MergeOutcome::Unchanged { .. }
        ));
    }

    #[test]
    fn first_config_applies_over_empty_state() {
        let outcome = merge(&EnterpriseState::default(), &remote(1, json!({"k": "v"})));
        assert!(matches!(outcome, MergeOutcome::Applied(s) if s.provider_settings["k"] == "v"));
    }

    #[test]
    fn parses_camel_case_body() {
        let config: EnterpriseConfig = serde_json::from_str(
            r#"{
                "providerSettings": {"openai.apiBase": "https://llm.internal"},
                "mcpConfig": {"servers": {"search": {"command": "mcp-search"}}, "inputs": []},
                "updatedAt": 1700000000000,
                "version": 4
            }"#,
        )
        .unwrap();
        assert_eq!(config.version, 4);
        assert!(config.mcp_config.servers.contains_key("search"));
    }
}
