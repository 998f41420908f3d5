//! Data model shared by the sync engine and the remote API
//!
//! Wire types use snake_case JSON, matching the GRID Cloud API.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use grid_fs::Fingerprint;

/// A cloud workspace as registered with the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: String,
    pub name: String,
    /// Root path the workspace was registered from
    #[serde(default)]
    pub path: String,
    /// Opaque server-side settings
    #[serde(default)]
    pub settings: Value,
    #[serde(default)]
    pub updated_at: Option<String>,
    /// Server cursor at registration time; never parsed by the client
    #[serde(default)]
    pub last_synced_at: Option<String>,
}

/// Body of `POST /workspaces`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateWorkspaceRequest {
    pub name: String,
    pub path: String,
}

/// Subscription tier of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Pro,
    Enterprise,
    Founder,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Tier::Free => "free",
            Tier::Pro => "pro",
            Tier::Enterprise => "enterprise",
            Tier::Founder => "founder",
        };
        f.write_str(s)
    }
}

/// The account an API key belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub tier: Tier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    #[serde(default)]
    pub is_team_admin: bool,
}

/// Tracker entry: what the client last knew the server to have for a path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Workspace-relative path, forward slashes
    pub path: String,
    /// Fingerprint of the local content when last observed
    pub fingerprint: Fingerprint,
    /// Fingerprint the server confirmed; `None` until the first confirmation
    #[serde(default)]
    pub synced: Option<Fingerprint>,
    /// Deletion sent but not yet confirmed by the server
    #[serde(default)]
    pub tombstone: bool,
}

impl FileRecord {
    /// A record whose local and server fingerprints agree.
    pub fn synced(path: impl Into<String>, fingerprint: Fingerprint) -> Self {
        Self {
            path: path.into(),
            synced: Some(fingerprint.clone()),
            fingerprint,
            tombstone: false,
        }
    }
}

/// Kind of a path-level change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Deleted,
    Created,
    Modified,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChangeKind::Deleted => "deleted",
            ChangeKind::Created => "created",
            ChangeKind::Modified => "modified",
        };
        f.write_str(s)
    }
}

/// One entry of a [`ChangeSet`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub path: String,
    pub kind: ChangeKind,
    /// New content fingerprint, or for deletions the last-synced one
    pub fingerprint: Fingerprint,
}

impl Change {
    pub fn new(path: impl Into<String>, kind: ChangeKind, fingerprint: Fingerprint) -> Self {
        Self {
            path: path.into(),
            kind,
            fingerprint,
        }
    }
}

/// Ordered local changes for one sync cycle.
///
/// Deletions come first so the server applies destructive operations before
/// creations that may reuse the same path prefix; within each group entries
/// are sorted by path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    changes: Vec<Change>,
}

impl ChangeSet {
    pub fn new(mut changes: Vec<Change>) -> Self {
        let rank = |c: &Change| u8::from(c.kind != ChangeKind::Deleted);
        changes.sort_by(|a, b| rank(a).cmp(&rank(b)).then_with(|| a.path.cmp(&b.path)));
        Self { changes }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Change> {
        self.changes.iter()
    }

    pub fn get(&self, path: &str) -> Option<&Change> {
        self.changes.iter().find(|c| c.path == path)
    }

    pub fn paths(&self) -> BTreeSet<&str> {
        self.changes.iter().map(|c| c.path.as_str()).collect()
    }

    /// Drop the entry for `path`, if any.
    pub fn remove(&mut self, path: &str) -> Option<Change> {
        let pos = self.changes.iter().position(|c| c.path == path)?;
        Some(self.changes.remove(pos))
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = &'a Change;
    type IntoIter = std::slice::Iter<'a, Change>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}

/// A change as transmitted, with base64 content for creates and updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireChange {
    pub path: String,
    pub kind: ChangeKind,
    pub fingerprint: Fingerprint,
    /// Last-synced fingerprint the edit was made against; absent for new files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<Fingerprint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Body of `POST /workspaces/{id}/sync`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRequest {
    pub changes: Vec<WireChange>,
    pub cursor: Option<String>,
}

/// A change the server refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub path: String,
    pub reason: String,
}

/// A file the client must write (or delete) locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Download {
    pub path: String,
    /// Base64 content; absent for deletions
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub fingerprint: Option<Fingerprint>,
    #[serde(default)]
    pub deleted: bool,
}

/// Server response to a sync request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResult {
    #[serde(default)]
    pub accepted: Vec<String>,
    #[serde(default)]
    pub rejected: Vec<Rejection>,
    #[serde(default)]
    pub downloads: Vec<Download>,
    pub cursor: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fp(s: &str) -> Fingerprint {
        Fingerprint::of_bytes(s)
    }

    #[test]
    fn change_set_puts_deletions_first() {
        let set = ChangeSet::new(vec![
            Change::new("b.txt", ChangeKind::Modified, fp("b")),
            Change::new("a.txt/sub", ChangeKind::Created, fp("sub")),
            Change::new("z.txt", ChangeKind::Deleted, fp("z")),
            Change::new("a.txt", ChangeKind::Deleted, fp("a")),
        ]);

        let order: Vec<_> = set.iter().map(|c| (c.path.as_str(), c.kind)).collect();
        assert_eq!(
            order,
            vec![
                ("a.txt", ChangeKind::Deleted),
                ("z.txt", ChangeKind::Deleted),
                ("a.txt/sub", ChangeKind::Created),
                ("b.txt", ChangeKind::Modified),
            ]
        );
    }

    #[test]
    fn sync_result_tolerates_missing_lists() {
        let result: SyncResult = serde_json::from_str(r#"{"cursor": "rev-3"}"#).unwrap();
        assert!(result.accepted.is_empty());
        assert!(result.downloads.is_empty());
        assert_eq!(result.cursor, "rev-3");
    }

    #[test]
    fn wire_change_omits_content_for_deletions() {
        let change = WireChange {
            path: "gone.md".into(),
            kind: ChangeKind::Deleted,
            fingerprint: fp("gone"),
            base: Some(fp("gone")),
            content: None,
        };
        let json = serde_json::to_value(&change).unwrap();
        assert_eq!(json["kind"], "deleted");
        assert!(json.get("content").is_none());
    }

    #[test]
    fn user_parses_camel_case() {
        let user: User = serde_json::from_str(
            r#"{"id": "u1", "email": "a@b.c", "tier": "pro", "teamId": "t1", "isTeamAdmin": true}"#,
        )
        .unwrap();
        assert_eq!(user.tier, Tier::Pro);
        assert_eq!(user.team_id.as_deref(), Some("t1"));
        assert!(user.is_team_admin);
    }

    #[test]
    fn workspace_defaults_optional_fields() {
        let ws: Workspace = serde_json::from_str(r#"{"id": "w1", "name": "notes"}"#).unwrap();
        assert_eq!(ws.last_synced_at, None);
        assert_eq!(ws.settings, Value::Null);
    }
}
