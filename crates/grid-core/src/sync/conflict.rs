//! Server-wins conflict policy

use std::collections::BTreeSet;

use crate::model::{ChangeKind, ChangeSet, Download};

/// Paths affected by a conflict in one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Local edits that the server copy replaced
    pub overwritten: Vec<String>,
    /// Every local change the server answered with its own copy; the
    /// download decides the tracker entry for these paths
    pub superseded: BTreeSet<String>,
}

/// Decides the fate of local changes the server also sent back.
///
/// A conflict is a path in the outgoing change set that also appears in the
/// downloads. The download always wins. A local edit only counts as
/// overwritten when the server's copy differs from it.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConflictResolver;

impl ConflictResolver {
    pub fn resolve(local: &ChangeSet, downloads: &[Download]) -> Resolution {
        let mut resolution = Resolution::default();
        for download in downloads {
            let Some(change) = local.get(&download.path) else {
                continue;
            };
            resolution.superseded.insert(change.path.clone());

            let same_outcome = match change.kind {
                ChangeKind::Deleted => download.deleted,
                ChangeKind::Created | ChangeKind::Modified => {
                    !download.deleted && download.fingerprint.as_ref() == Some(&change.fingerprint)
                }
            };
            if !same_outcome {
                resolution.overwritten.push(change.path.clone());
            }
        }
        resolution.overwritten.sort();
        resolution
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Change;
    use grid_fs::Fingerprint;
    use pretty_assertions::assert_eq;

    fn download(path: &str, content: Option<&str>) -> Download {
        Download {
            path: path.into(),
            content: None,
            fingerprint: content.map(Fingerprint::of_bytes),
            deleted: content.is_none(),
        }
    }

    #[test]
    fn server_copy_overwrites_differing_edit() {
        let local = ChangeSet::new(vec![
            Change::new("a.md", ChangeKind::Modified, Fingerprint::of_bytes("mine")),
            Change::new("b.md", ChangeKind::Created, Fingerprint::of_bytes("b")),
        ]);
        let resolution = ConflictResolver::resolve(&local, &[download("a.md", Some("theirs"))]);

        assert_eq!(resolution.overwritten, vec!["a.md".to_string()]);
        assert!(resolution.superseded.contains("a.md"));
        assert!(!resolution.superseded.contains("b.md"));
    }

    #[test]
    fn identical_content_is_not_an_overwrite() {
        let local = ChangeSet::new(vec![Change::new(
            "same.md",
            ChangeKind::Created,
            Fingerprint::of_bytes("x"),
        )]);
        let resolution = ConflictResolver::resolve(&local, &[download("same.md", Some("x"))]);
        assert!(resolution.overwritten.is_empty());
        assert_eq!(resolution.superseded.len(), 1);
    }

    #[test]
    fn remote_delete_beats_local_edit_and_vice_versa() {
        let local = ChangeSet::new(vec![
            Change::new("edited.md", ChangeKind::Modified, Fingerprint::of_bytes("e")),
            Change::new("removed.md", ChangeKind::Deleted, Fingerprint::of_bytes("r")),
        ]);
        let resolution = ConflictResolver::resolve(
            &local,
            &[download("edited.md", None), download("removed.md", Some("revived"))],
        );
        assert_eq!(
            resolution.overwritten,
            vec!["edited.md".to_string(), "removed.md".to_string()]
        );
    }
}
