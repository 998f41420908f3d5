//! In-process GRID Cloud server
//!
//! Last-write-wins per path with a monotonically increasing revision. The
//! cursor handed to clients is `rev-<n>` and selects which files come back as
//! downloads. A change made against a base other than the server's current
//! copy is a conflict; it is not applied and the server copy is sent back.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use grid_fs::Fingerprint;

use super::{KeyValidator, RemoteApi};
use crate::auth::check_key_format;
use crate::enterprise::EnterpriseConfig;
use crate::model::{
    ChangeKind, CreateWorkspaceRequest, Download, Rejection, SyncRequest, SyncResult, Tier, User,
    WireChange, Workspace,
};
use crate::{Error, Result};

#[derive(Debug, Clone)]
struct StoredFile {
    content: Vec<u8>,
    fingerprint: Fingerprint,
    revision: u64,
    deleted: bool,
}

#[derive(Debug, Default)]
struct ServerState {
    revision: u64,
    workspaces: Vec<Workspace>,
    files: HashMap<String, BTreeMap<String, StoredFile>>,
    rejections: BTreeMap<String, String>,
    /// `None` accepts any well-formed key
    accepted_keys: Option<BTreeSet<String>>,
    denial: Option<String>,
    config: EnterpriseConfig,
}

/// Idempotent last-write-wins server kept entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryRemote {
    state: Mutex<ServerState>,
    sync_calls: AtomicUsize,
    pending_failures: AtomicU32,
    latency: Mutex<Duration>,
}

fn parse_cursor(cursor: Option<&str>) -> Result<u64> {
    match cursor {
        None => Ok(0),
        Some(raw) => raw
            .strip_prefix("rev-")
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| Error::protocol(format!("API error 400: Bad Request: unknown cursor {raw:?}"))),
    }
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Only the given keys are accepted from now on.
    pub fn with_keys<I, S>(self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lock().accepted_keys = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    /// Delay every round trip by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap_or_else(PoisonError::into_inner) = latency;
    }

    /// Fail the next `count` round trips with a network error.
    pub fn fail_network(&self, count: u32) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    /// Refuse every change to `path`.
    pub fn reject_path(&self, path: impl Into<String>, reason: impl Into<String>) {
        self.lock().rejections.insert(path.into(), reason.into());
    }

    /// Answer every request with an access denial, as for a free-tier account.
    pub fn deny_access(&self, message: impl Into<String>) {
        self.lock().denial = Some(message.into());
    }

    pub fn set_config(&self, config: EnterpriseConfig) {
        self.lock().config = config;
    }

    /// Number of sync round trips received, failed ones included.
    pub fn sync_calls(&self) -> usize {
        self.sync_calls.load(Ordering::SeqCst)
    }

    pub fn revision(&self) -> u64 {
        self.lock().revision
    }

    /// Write a file as another client would.
    pub fn put_file(&self, workspace_id: &str, path: &str, content: impl AsRef<[u8]>) {
        let content = content.as_ref().to_vec();
        let mut state = self.lock();
        state.revision += 1;
        let revision = state.revision;
        state.files.entry(workspace_id.to_string()).or_default().insert(
            path.to_string(),
            StoredFile {
                fingerprint: Fingerprint::of_bytes(&content),
                content,
                revision,
                deleted: false,
            },
        );
    }

    /// Delete a file as another client would.
    pub fn delete_file(&self, workspace_id: &str, path: &str) {
        let mut state = self.lock();
        state.revision += 1;
        let revision = state.revision;
        if let Some(file) = state
            .files
            .get_mut(workspace_id)
            .and_then(|files| files.get_mut(path))
        {
            file.deleted = true;
            file.revision = revision;
        }
    }

    /// Current content of a live file.
    pub fn file(&self, workspace_id: &str, path: &str) -> Option<Vec<u8>> {
        self.lock()
            .files
            .get(workspace_id)?
            .get(path)
            .filter(|f| !f.deleted)
            .map(|f| f.content.clone())
    }

    /// Paths of all live files in a workspace.
    pub fn paths(&self, workspace_id: &str) -> Vec<String> {
        self.lock()
            .files
            .get(workspace_id)
            .map(|files| {
                files
                    .iter()
                    .filter(|(_, f)| !f.deleted)
                    .map(|(p, _)| p.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn authorize(&self, api_key: &str) -> Result<()> {
        let state = self.lock();
        if let Some(message) = &state.denial {
            return Err(Error::auth(message.clone()));
        }
        match &state.accepted_keys {
            Some(keys) if !keys.contains(api_key) => Err(Error::auth("API key not accepted")),
            _ => Ok(()),
        }
    }

    async fn round_trip_delay(&self) {
        let latency = *self.latency.lock().unwrap_or_else(PoisonError::into_inner);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn take_failure(&self) -> bool {
        self.pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// Decode and verify the payload of a create or modify.
fn payload(change: &WireChange) -> std::result::Result<Vec<u8>, String> {
    let encoded = change.content.as_deref().ok_or("missing content")?;
    let content = STANDARD
        .decode(encoded)
        .map_err(|e| format!("content is not base64: {e}"))?;
    if Fingerprint::of_bytes(&content) != change.fingerprint {
        return Err("fingerprint does not match content".to_string());
    }
    Ok(content)
}

impl ServerState {
    fn apply(&mut self, workspace_id: &str, request: &SyncRequest) -> Result<SyncResult> {
        let since = parse_cursor(request.cursor.as_deref())?;
        let mut accepted = Vec::new();
        let mut rejected = Vec::new();
        let mut conflicts = BTreeSet::new();

        for change in &request.changes {
            if let Some(reason) = self.rejections.get(&change.path) {
                rejected.push(Rejection {
                    path: change.path.clone(),
                    reason: reason.clone(),
                });
                continue;
            }

            let files = self.files.entry(workspace_id.to_string()).or_default();
            let existing = files.get(&change.path);
            let live_fingerprint = existing.filter(|f| !f.deleted).map(|f| &f.fingerprint);
            let target = (change.kind != ChangeKind::Deleted).then_some(&change.fingerprint);

            // Already in the requested state
            if live_fingerprint == target {
                accepted.push(change.path.clone());
                continue;
            }

            // The client edited a copy the server no longer has
            if existing.is_some() && live_fingerprint != change.base.as_ref() {
                conflicts.insert(change.path.clone());
                continue;
            }

            let stored = match change.kind {
                ChangeKind::Deleted => {
                    let Some(file) = existing else {
                        accepted.push(change.path.clone());
                        continue;
                    };
                    StoredFile {
                        deleted: true,
                        ..file.clone()
                    }
                }
                ChangeKind::Created | ChangeKind::Modified => match payload(change) {
                    Ok(content) => StoredFile {
                        content,
                        fingerprint: change.fingerprint.clone(),
                        revision: 0,
                        deleted: false,
                    },
                    Err(reason) => {
                        rejected.push(Rejection {
                            path: change.path.clone(),
                            reason,
                        });
                        continue;
                    }
                },
            };

            self.revision += 1;
            let revision = self.revision;
            files.insert(change.path.clone(), StoredFile { revision, ..stored });
            accepted.push(change.path.clone());
        }

        let just_accepted: BTreeSet<&str> = accepted.iter().map(String::as_str).collect();
        let downloads = self
            .files
            .get(workspace_id)
            .into_iter()
            .flatten()
            .filter(|(path, file)| {
                (file.revision > since || conflicts.contains(path.as_str()))
                    && !just_accepted.contains(path.as_str())
            })
            .map(|(path, file)| {
                if file.deleted {
                    Download {
                        path: path.clone(),
                        content: None,
                        fingerprint: None,
                        deleted: true,
                    }
                } else {
                    Download {
                        path: path.clone(),
                        content: Some(STANDARD.encode(&file.content)),
                        fingerprint: Some(file.fingerprint.clone()),
                        deleted: false,
                    }
                }
            })
            .collect();

        let cursor = format!("rev-{}", self.revision);
        let now = chrono::Utc::now().to_rfc3339();
        if let Some(ws) = self.workspaces.iter_mut().find(|w| w.id == workspace_id) {
            ws.last_synced_at = Some(cursor.clone());
            ws.updated_at = Some(now);
        }

        Ok(SyncResult {
            accepted,
            rejected,
            downloads,
            cursor,
        })
    }
}

#[async_trait]
impl RemoteApi for MemoryRemote {
    async fn list_workspaces(&self, api_key: &str) -> Result<Vec<Workspace>> {
        self.round_trip_delay().await;
        self.authorize(api_key)?;
        Ok(self.lock().workspaces.clone())
    }

    async fn create_workspace(&self, api_key: &str, request: &CreateWorkspaceRequest) -> Result<Workspace> {
        self.authorize(api_key)?;
        let mut state = self.lock();
        let workspace = Workspace {
            id: format!("ws-{}", state.workspaces.len() + 1),
            name: request.name.clone(),
            path: request.path.clone(),
            settings: serde_json::Value::Null,
            updated_at: Some(chrono::Utc::now().to_rfc3339()),
            last_synced_at: None,
        };
        state.workspaces.push(workspace.clone());
        Ok(workspace)
    }

    async fn sync(&self, api_key: &str, workspace_id: &str, request: &SyncRequest) -> Result<SyncResult> {
        self.sync_calls.fetch_add(1, Ordering::SeqCst);
        self.round_trip_delay().await;
        if self.take_failure() {
            return Err(Error::network("connection reset by peer"));
        }
        self.authorize(api_key)?;

        let mut state = self.lock();
        if !state.workspaces.iter().any(|w| w.id == workspace_id) {
            return Err(Error::protocol("API error 404: Not Found"));
        }
        state.apply(workspace_id, request)
    }

    async fn fetch_config(&self, api_key: &str) -> Result<EnterpriseConfig> {
        self.authorize(api_key)?;
        Ok(self.lock().config.clone())
    }
}

#[async_trait]
impl KeyValidator for MemoryRemote {
    async fn validate(&self, api_key: &str) -> Result<User> {
        check_key_format(api_key)?;
        if let Err(Error::Auth { message }) = self.authorize(api_key) {
            return Err(Error::InvalidApiKey { reason: message });
        }
        Ok(User {
            id: "user-1".to_string(),
            email: "dev@grideditor.com".to_string(),
            tier: Tier::Pro,
            team_id: None,
            is_team_admin: false,
        })
    }
}
