//! Local state tracker and its persistent store
//!
//! The tracker is the client's record of what it last knew the server to
//! have. It is persisted together with the workspace binding and the sync
//! cursor in a single JSON document, so the cursor can never advance past
//! tracker contents that were not saved.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{File, OpenOptions};

use fs2::FileExt;
use serde::{Deserialize, Serialize};

use grid_fs::{ConfigStore, NormalizedPath};

use crate::Result;
use crate::model::{FileRecord, Workspace};

/// Directory under the workspace root that holds client state
pub const STATE_DIR: &str = ".grid";

const STATE_FILE: &str = "state.json";
const LOCK_FILE: &str = "state.lock";
const STATE_VERSION: &str = "1.0";

/// Last-known-synced fingerprints keyed by workspace-relative path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<FileRecord>", into = "Vec<FileRecord>")]
pub struct Tracker {
    records: BTreeMap<String, FileRecord>,
}

impl Tracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<&FileRecord> {
        self.records.get(path)
    }

    /// Insert or replace the record for `record.path`.
    pub fn upsert(&mut self, record: FileRecord) {
        self.records.insert(record.path.clone(), record);
    }

    pub fn remove(&mut self, path: &str) -> Option<FileRecord> {
        self.records.remove(path)
    }

    /// Flag a record as a deletion awaiting server confirmation.
    ///
    /// Returns `false` if the path is not tracked.
    pub fn mark_deleted(&mut self, path: &str) -> bool {
        match self.records.get_mut(path) {
            Some(record) => {
                record.tombstone = true;
                true
            }
            None => false,
        }
    }

    /// Drop a tombstone for a path that turned out to still exist.
    ///
    /// Returns `true` if a tombstone was cleared.
    pub fn clear_tombstone(&mut self, path: &str) -> bool {
        match self.records.get_mut(path) {
            Some(record) if record.tombstone => {
                record.tombstone = false;
                true
            }
            _ => false,
        }
    }

    pub fn all_paths(&self) -> BTreeSet<String> {
        self.records.keys().cloned().collect()
    }

    pub fn records(&self) -> impl Iterator<Item = &FileRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl From<Vec<FileRecord>> for Tracker {
    fn from(records: Vec<FileRecord>) -> Self {
        Self {
            records: records.into_iter().map(|r| (r.path.clone(), r)).collect(),
        }
    }
}

impl From<Tracker> for Vec<FileRecord> {
    fn from(tracker: Tracker) -> Self {
        tracker.records.into_values().collect()
    }
}

/// Everything the client persists for one workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    /// State format version for forward compatibility
    version: String,
    /// Cloud workspace this directory is bound to
    #[serde(default)]
    pub workspace: Option<Workspace>,
    /// Opaque server cursor; `None` requests a full snapshot
    #[serde(default)]
    pub cursor: Option<String>,
    /// Set when a server response was only partially applied
    #[serde(default)]
    pub dirty: bool,
    #[serde(default)]
    pub files: Tracker,
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION.to_string(),
            workspace: None,
            cursor: None,
            dirty: false,
            files: Tracker::new(),
        }
    }
}

impl SyncState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Forget the cursor so the next cycle fetches a full snapshot.
    pub fn reset_cursor(&mut self) {
        self.cursor = None;
    }
}

/// Loads and saves [`SyncState`] under `<root>/.grid/`.
#[derive(Debug)]
pub struct StateStore {
    dir: NormalizedPath,
    config: ConfigStore,
}

impl StateStore {
    pub fn new(root: &NormalizedPath) -> Self {
        Self {
            dir: root.join(STATE_DIR),
            config: ConfigStore::new(),
        }
    }

    pub fn state_path(&self) -> NormalizedPath {
        self.dir.join(STATE_FILE)
    }

    /// Load the persisted state, or an empty one if none exists yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the state file exists but cannot be read or parsed.
    pub fn load(&self) -> Result<SyncState> {
        let path = self.state_path();
        if !path.is_file() {
            return Ok(SyncState::new());
        }
        let _lock = self.lock(false)?;
        let state: SyncState = self.config.load(&path)?;
        Ok(state)
    }

    /// Persist the state atomically under an exclusive lock.
    pub fn save(&self, state: &SyncState) -> Result<()> {
        std::fs::create_dir_all(self.dir.to_native())?;
        let _lock = self.lock(true)?;
        self.config.save(&self.state_path(), state)?;
        tracing::debug!(
            path = %self.state_path(),
            files = state.files.len(),
            dirty = state.dirty,
            "Saved sync state"
        );
        Ok(())
    }

    /// Advisory lock on a sidecar file; released when the handle drops.
    fn lock(&self, exclusive: bool) -> Result<File> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.dir.join(LOCK_FILE).to_native())?;
        if exclusive {
            file.lock_exclusive()?;
        } else {
            file.lock_shared()?;
        }
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grid_fs::Fingerprint;
    use pretty_assertions::assert_eq;

    fn record(path: &str, content: &str) -> FileRecord {
        FileRecord::synced(path, Fingerprint::of_bytes(content))
    }

    #[test]
    fn upsert_get_remove() {
        let mut tracker = Tracker::new();
        tracker.upsert(record("a.txt", "one"));
        tracker.upsert(record("a.txt", "two"));

        assert_eq!(tracker.len(), 1);
        assert_eq!(
            tracker.get("a.txt").unwrap().fingerprint,
            Fingerprint::of_bytes("two")
        );
        assert!(tracker.remove("a.txt").is_some());
        assert!(tracker.is_empty());
    }

    #[test]
    fn mark_deleted_only_tracked_paths() {
        let mut tracker = Tracker::new();
        tracker.upsert(record("kept.md", "x"));

        assert!(tracker.mark_deleted("kept.md"));
        assert!(!tracker.mark_deleted("unknown.md"));
        assert!(tracker.get("kept.md").unwrap().tombstone);
    }

    #[test]
    fn clear_tombstone_only_when_set() {
        let mut tracker = Tracker::new();
        tracker.upsert(record("a.md", "a"));
        assert!(!tracker.clear_tombstone("a.md"));

        tracker.mark_deleted("a.md");
        assert!(tracker.clear_tombstone("a.md"));
        assert!(!tracker.get("a.md").unwrap().tombstone);
        assert!(!tracker.clear_tombstone("missing.md"));
    }

    #[test]
    fn all_paths_is_sorted_set() {
        let mut tracker = Tracker::new();
        tracker.upsert(record("b", "1"));
        tracker.upsert(record("a", "2"));
        let paths: Vec<_> = tracker.all_paths().into_iter().collect();
        assert_eq!(paths, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn state_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(&NormalizedPath::new(dir.path()));

        let mut state = SyncState::new();
        state.cursor = Some("rev-9".into());
        state.dirty = true;
        state.files.upsert(record("docs/readme.md", "hello"));
        store.save(&state).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, state);
        assert_eq!(loaded.version(), "1.0");
    }

    #[test]
    fn missing_state_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(&NormalizedPath::new(dir.path()));
        let state = store.load().unwrap();
        assert!(state.files.is_empty());
        assert_eq!(state.cursor, None);
    }

    #[test]
    fn files_serialize_as_list() {
        let mut state = SyncState::new();
        state.files.upsert(record("x.txt", "x"));
        let json = serde_json::to_value(&state).unwrap();
        assert!(json["files"].is_array());
        assert_eq!(json["files"][0]["path"], "x.txt");
    }
}
