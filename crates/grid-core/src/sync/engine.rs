//! The sync engine
//!
//! One cycle: detect local changes, push them with the cursor in a single
//! round trip, validate the server's answer, then apply accepted changes and
//! downloads and persist tracker and cursor together.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio::sync::Mutex;

use grid_fs::{Fingerprint, NormalizedPath, RobustnessConfig, io};

use super::apply;
use super::conflict::ConflictResolver;
use super::report::{CycleOutcome, CycleReport, LoggingHandler, SyncEvent, SyncEventHandler};
use super::retry::RetryPolicy;
use crate::auth::CredentialProvider;
use crate::detect::{ChangeDetector, Detection, IgnoreRules, PathIssue};
use crate::model::{
    Change, ChangeKind, ChangeSet, CreateWorkspaceRequest, FileRecord, SyncRequest, WireChange,
    Workspace,
};
use crate::remote::RemoteApi;
use crate::tracker::{StateStore, SyncState, Tracker};
use crate::{Error, Result};

/// Options for a [`SyncService`].
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Cloud workspace name; defaults to the root directory's name
    pub workspace_name: Option<String>,
    /// Register the workspace in the cloud when no match exists
    pub create_if_missing: bool,
    /// Upper bound on a single round trip
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    pub ignore: IgnoreRules,
    pub robustness: RobustnessConfig,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            workspace_name: None,
            create_if_missing: false,
            request_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            ignore: IgnoreRules::default(),
            robustness: RobustnessConfig::default(),
        }
    }
}

/// Local view of a workspace's sync state, computed without the server.
#[derive(Debug, Clone)]
pub struct SyncStatus {
    pub workspace: Option<Workspace>,
    pub cursor: Option<String>,
    pub dirty: bool,
    pub tracked: usize,
    pub pending: Detection,
}

/// Changes ready to send, and what was held back while building them.
struct Outgoing {
    sent: ChangeSet,
    wire: Vec<WireChange>,
    deferred: Vec<String>,
    io_errors: Vec<PathIssue>,
}

/// Synchronizes one workspace root with its cloud copy.
///
/// At most one cycle runs at a time; a cycle requested while another is in
/// flight returns [`CycleOutcome::Skipped`] without contacting the server.
pub struct SyncService {
    root: NormalizedPath,
    remote: Arc<dyn RemoteApi>,
    credentials: Arc<dyn CredentialProvider>,
    handler: Arc<dyn SyncEventHandler>,
    options: SyncOptions,
    store: StateStore,
    detector: ChangeDetector,
    gate: Mutex<()>,
    state: Mutex<SyncState>,
}

impl SyncService {
    /// Open the workspace at `root`, loading any persisted state.
    pub fn open(
        root: impl Into<NormalizedPath>,
        remote: Arc<dyn RemoteApi>,
        credentials: Arc<dyn CredentialProvider>,
        options: SyncOptions,
    ) -> Result<Self> {
        let root = root.into();
        let store = StateStore::new(&root);
        let state = store.load()?;
        let detector = ChangeDetector::new(root.clone(), options.ignore.clone());

        Ok(Self {
            root,
            remote,
            credentials,
            handler: Arc::new(LoggingHandler),
            options,
            store,
            detector,
            gate: Mutex::new(()),
            state: Mutex::new(state),
        })
    }

    /// Replace the default logging event handler.
    pub fn with_handler(mut self, handler: Arc<dyn SyncEventHandler>) -> Self {
        self.handler = handler;
        self
    }

    pub fn root(&self) -> &NormalizedPath {
        &self.root
    }

    fn workspace_name(&self) -> String {
        self.options
            .workspace_name
            .clone()
            .or_else(|| self.root.file_name().map(str::to_string))
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "workspace".to_string())
    }

    /// Run one sync cycle now.
    pub async fn sync_now(&self) -> CycleOutcome {
        let Ok(_gate) = self.gate.try_lock() else {
            tracing::debug!(root = %self.root, "Cycle already in flight");
            self.handler.on_event(SyncEvent::CycleSkipped);
            return CycleOutcome::Skipped;
        };

        let Some(api_key) = self.credentials.credential().await else {
            tracing::debug!("Not logged in, skipping sync");
            return CycleOutcome::NotAuthenticated;
        };

        self.handler.on_event(SyncEvent::CycleStarted);
        let mut state = self.state.lock().await;
        let report = match self.run_cycle(&mut state, &api_key).await {
            Ok(report) => report,
            Err(e) => {
                tracing::debug!(error = %e, "Sync cycle aborted");
                CycleReport {
                    cursor: state.cursor.clone(),
                    dirty: state.dirty,
                    ..CycleReport::failed(&e)
                }
            }
        };
        self.handler.on_event(SyncEvent::from_report(&report));
        CycleOutcome::Completed(report)
    }

    /// Find or create the cloud workspace for this root and persist the
    /// binding.
    ///
    /// Holds the cycle gate while talking to the server, so a cycle
    /// requested meanwhile is skipped rather than queued.
    pub async fn bind_workspace(&self) -> Result<Workspace> {
        let _gate = self.gate.lock().await;
        let api_key = self
            .credentials
            .credential()
            .await
            .ok_or(Error::NotAuthenticated)?;
        let mut state = self.state.lock().await;
        let mut next = self.store.load()?;
        let workspace = self.bind(&mut next, &api_key).await?;
        self.store.save(&next)?;
        *state = next;
        Ok(workspace)
    }

    /// Binding, cursor, dirty flag and pending changes.
    pub async fn status(&self) -> Result<SyncStatus> {
        let mut state = self.state.lock().await;
        *state = self.store.load()?;
        Ok(SyncStatus {
            workspace: state.workspace.clone(),
            cursor: state.cursor.clone(),
            dirty: state.dirty,
            tracked: state.files.len(),
            pending: self.detector.detect(&state.files),
        })
    }

    /// Forget the cursor so the next cycle requests a full snapshot.
    pub async fn reset_cursor(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let mut next = self.store.load()?;
        next.reset_cursor();
        next.dirty = false;
        self.store.save(&next)?;
        *state = next;
        tracing::info!(root = %self.root, "Cursor cleared, next sync is a full resync");
        Ok(())
    }

    /// Record that a watcher saw `path` disappear.
    ///
    /// Waits for any in-flight cycle. Returns `false` for untracked paths.
    pub async fn mark_deleted(&self, path: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        let mut next = self.store.load()?;
        if !next.files.mark_deleted(path) {
            return Ok(false);
        }
        self.store.save(&next)?;
        *state = next;
        Ok(true)
    }

    async fn run_cycle(&self, state: &mut SyncState, api_key: &str) -> Result<CycleReport> {
        // Another process may have written the state since the last cycle
        let mut next = self.store.load()?;
        let workspace = self.bind(&mut next, api_key).await?;

        let detection = self.detector.detect(&next.files);
        for path in &detection.revived {
            tracing::debug!(%path, "File is back, dropping its tombstone");
            next.files.clear_tombstone(path);
        }
        let outgoing = self.build_outgoing(&detection.changes, &next.files);
        // Pending until the server confirms; a rejection keeps the tombstone
        for change in &outgoing.sent {
            if change.kind == ChangeKind::Deleted {
                next.files.mark_deleted(&change.path);
            }
        }
        let mut report = CycleReport {
            deferred: outgoing.deferred.clone(),
            io_errors: detection.issues.iter().cloned().chain(outgoing.io_errors).collect(),
            ..CycleReport::default()
        };

        let request = SyncRequest {
            changes: outgoing.wire,
            cursor: next.cursor.clone(),
        };
        tracing::debug!(
            workspace = %workspace.id,
            changes = request.changes.len(),
            cursor = ?request.cursor,
            "Starting round trip"
        );

        let remote = self.remote.as_ref();
        let workspace_id = workspace.id.as_str();
        let request = &request;
        let result = self
            .call(true, || remote.sync(api_key, workspace_id, request))
            .await?;

        // Nothing is written unless every download is acceptable
        let downloads = apply::validate(&result.downloads)?;
        let resolution = ConflictResolver::resolve(&detection.changes, &result.downloads);

        for path in &result.accepted {
            if resolution.superseded.contains(path) {
                continue;
            }
            let Some(change) = outgoing.sent.get(path) else {
                tracing::debug!(%path, "Server accepted a path that was not sent");
                continue;
            };
            match change.kind {
                ChangeKind::Deleted => {
                    next.files.remove(path);
                }
                ChangeKind::Created | ChangeKind::Modified => {
                    next.files
                        .upsert(FileRecord::synced(path, change.fingerprint.clone()));
                }
            }
            report.accepted.push(path.clone());
        }
        report.rejected = result.rejected.clone();

        let applied = apply::write_all(&self.root, downloads, &mut next.files, self.options.robustness);
        let overwritten: BTreeSet<String> = resolution
            .overwritten
            .into_iter()
            .chain(applied.clobbered.iter().cloned())
            .collect();
        report.overwritten = overwritten.into_iter().collect();

        if applied.complete() {
            next.cursor = Some(result.cursor.clone());
            next.dirty = false;
        } else {
            tracing::warn!(
                failed = applied.failed.len(),
                "Downloads partially applied, keeping cursor"
            );
            next.dirty = true;
        }
        report.downloaded = applied.written;
        report.io_errors.extend(applied.failed);

        if let Some(ws) = next.workspace.as_mut() {
            ws.last_synced_at = next.cursor.clone();
        }
        self.store.save(&next)?;

        report.cursor = next.cursor.clone();
        report.dirty = next.dirty;
        *state = next;
        Ok(report)
    }

    async fn bind(&self, state: &mut SyncState, api_key: &str) -> Result<Workspace> {
        if let Some(workspace) = &state.workspace {
            return Ok(workspace.clone());
        }

        let name = self.workspace_name();
        let remote = self.remote.as_ref();
        let workspaces = self.call(true, || remote.list_workspaces(api_key)).await?;

        let workspace = match workspaces.into_iter().find(|w| w.name == name) {
            Some(workspace) => workspace,
            None if self.options.create_if_missing => {
                let request = CreateWorkspaceRequest {
                    name: name.clone(),
                    path: self.root.to_string(),
                };
                let request = &request;
                // Not idempotent, so never retried
                let created = self
                    .call(false, || remote.create_workspace(api_key, request))
                    .await?;
                tracing::info!(workspace = %created.id, %name, "Created cloud workspace");
                created
            }
            None => return Err(Error::WorkspaceNotFound { name }),
        };

        tracing::info!(workspace = %workspace.id, %name, "Bound to cloud workspace");
        state.workspace = Some(workspace.clone());
        state.cursor = None;
        Ok(workspace)
    }

    /// Read and encode the content of each create/modify.
    ///
    /// A file whose fingerprint no longer matches the scan changed in the
    /// meantime and is deferred to the next cycle.
    fn build_outgoing(&self, changes: &ChangeSet, tracker: &Tracker) -> Outgoing {
        let mut sent = Vec::new();
        let mut wire = Vec::new();
        let mut deferred = Vec::new();
        let mut io_errors = Vec::new();

        for change in changes {
            let content = match change.kind {
                ChangeKind::Deleted => None,
                ChangeKind::Created | ChangeKind::Modified => {
                    match io::read_bytes(&self.root.join(&change.path)) {
                        Ok(bytes) if Fingerprint::of_bytes(&bytes) == change.fingerprint => {
                            Some(STANDARD.encode(bytes))
                        }
                        Ok(_) => {
                            tracing::debug!(path = %change.path, "Changed during scan, deferring");
                            deferred.push(change.path.clone());
                            continue;
                        }
                        Err(e) => {
                            io_errors.push(PathIssue {
                                path: change.path.clone(),
                                message: e.to_string(),
                            });
                            continue;
                        }
                    }
                }
            };
            wire.push(WireChange {
                path: change.path.clone(),
                kind: change.kind,
                fingerprint: change.fingerprint.clone(),
                base: tracker.get(&change.path).and_then(|r| r.synced.clone()),
                content,
            });
            sent.push(change.clone());
        }

        Outgoing {
            sent: ChangeSet::new(sent),
            wire,
            deferred,
            io_errors,
        }
    }

    /// Run a remote call under the round-trip timeout, retrying transient
    /// failures when `retry` is set.
    async fn call<T, F, Fut>(&self, retry: bool, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let timeout = self.options.request_timeout;
        let policy = if retry {
            self.options.retry
        } else {
            RetryPolicy::new(1)
        };
        policy
            .run(|| {
                let fut = op();
                async move {
                    match tokio::time::timeout(timeout, fut).await {
                        Ok(result) => result,
                        Err(_) => Err(Error::network(format!(
                            "request timed out after {}s",
                            timeout.as_secs_f32()
                        ))),
                    }
                }
            })
            .await
    }
}
