//! Validation and application of server downloads

use std::collections::BTreeSet;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use grid_fs::{Fingerprint, NormalizedPath, RobustnessConfig, io, validate_relative_path};

use crate::detect::PathIssue;
use crate::model::{Download, FileRecord};
use crate::tracker::{STATE_DIR, Tracker};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Action {
    Write { content: Vec<u8>, fingerprint: Fingerprint },
    Remove,
}

/// A download that passed every check and may be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ValidDownload {
    pub path: String,
    pub action: Action,
}

/// Check every download before anything touches the disk.
///
/// # Errors
///
/// Returns a protocol error for an unsafe or duplicate path, undecodable
/// content, or content whose SHA-256 differs from the declared fingerprint.
pub(crate) fn validate(downloads: &[Download]) -> Result<Vec<ValidDownload>> {
    let mut seen = BTreeSet::new();
    let mut valid = Vec::with_capacity(downloads.len());

    for download in downloads {
        let path = validate_relative_path(&download.path)
            .map_err(|e| Error::protocol(format!("unsafe download path: {e}")))?;
        if path == STATE_DIR || path.starts_with(&format!("{STATE_DIR}/")) {
            return Err(Error::protocol(format!("download targets client state: {path}")));
        }
        if !seen.insert(path.clone()) {
            return Err(Error::protocol(format!("duplicate download for {path}")));
        }

        let action = if download.deleted {
            Action::Remove
        } else {
            let encoded = download
                .content
                .as_deref()
                .ok_or_else(|| Error::protocol(format!("download for {path} has no content")))?;
            let content = STANDARD
                .decode(encoded)
                .map_err(|e| Error::protocol(format!("download for {path} is not base64: {e}")))?;
            let declared = download
                .fingerprint
                .clone()
                .ok_or_else(|| Error::protocol(format!("download for {path} has no fingerprint")))?;
            let actual = Fingerprint::of_bytes(&content);
            if actual != declared {
                return Err(Error::protocol(format!(
                    "checksum mismatch for {path}: declared {declared}, got {actual}"
                )));
            }
            Action::Write {
                content,
                fingerprint: declared,
            }
        };
        valid.push(ValidDownload { path, action });
    }

    Ok(valid)
}

/// What happened while writing downloads.
#[derive(Debug, Default)]
pub(crate) struct Applied {
    pub written: Vec<String>,
    pub failed: Vec<PathIssue>,
    /// Local content that differed from both the tracker and the download
    pub clobbered: Vec<String>,
}

impl Applied {
    pub fn complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Write validated downloads under `root`, updating the tracker only for
/// paths whose disk operation succeeded.
///
/// Removals run before writes, so a path that turned from a file into a
/// directory on the server can be written in the same cycle.
pub(crate) fn write_all(
    root: &NormalizedPath,
    mut downloads: Vec<ValidDownload>,
    tracker: &mut Tracker,
    robustness: RobustnessConfig,
) -> Applied {
    downloads.sort_by_key(|d| !matches!(d.action, Action::Remove));
    let mut applied = Applied::default();

    for download in downloads {
        let target = root.join(&download.path);
        if has_untracked_edit(&target, &download, tracker) {
            applied.clobbered.push(download.path.clone());
        }

        let result = match &download.action {
            Action::Write { content, .. } => io::write_atomic(&target, content, robustness),
            Action::Remove => io::remove_file(&target),
        };

        match result {
            Ok(()) => {
                match download.action {
                    Action::Write { fingerprint, .. } => {
                        tracker.upsert(FileRecord::synced(&download.path, fingerprint));
                    }
                    Action::Remove => {
                        io::prune_empty_dirs(&root.to_native(), &target.to_native());
                        tracker.remove(&download.path);
                    }
                }
                applied.written.push(download.path);
            }
            Err(e) => {
                tracing::warn!(path = %download.path, error = %e, "Cannot apply download");
                applied.failed.push(PathIssue {
                    path: download.path,
                    message: e.to_string(),
                });
            }
        }
    }

    applied
}

/// Whether writing `download` discards local content the tracker does not
/// know about.
fn has_untracked_edit(target: &NormalizedPath, download: &ValidDownload, tracker: &Tracker) -> bool {
    if !target.is_file() {
        return false;
    }
    let Ok(current) = Fingerprint::of_file(&target.to_native()) else {
        return false;
    };
    let synced = tracker.get(&download.path).and_then(|r| r.synced.as_ref());
    if synced == Some(&current) {
        return false;
    }
    match &download.action {
        Action::Write { fingerprint, .. } => *fingerprint != current,
        Action::Remove => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn write(path: &str, content: &str) -> Download {
        Download {
            path: path.into(),
            content: Some(STANDARD.encode(content)),
            fingerprint: Some(Fingerprint::of_bytes(content)),
            deleted: false,
        }
    }

    #[test]
    fn valid_downloads_pass() {
        let valid = validate(&[write("docs/a.md", "hello")]).unwrap();
        assert_eq!(valid[0].path, "docs/a.md");
        assert!(matches!(&valid[0].action, Action::Write { content, .. } if content == b"hello"));
    }

    #[test]
    fn traversal_is_rejected() {
        let err = validate(&[write("../escape.md", "x")]).unwrap_err();
        assert_eq!(err.kind(), crate::SyncErrorKind::Protocol);
    }

    #[test]
    fn absolute_path_is_rejected() {
        assert!(validate(&[write("/etc/passwd", "x")]).is_err());
    }

    #[test]
    fn state_dir_is_off_limits() {
        assert!(validate(&[write(".grid/state.json", "{}")]).is_err());
    }

    #[test]
    fn checksum_mismatch_is_rejected() {
        let mut bad = write("a.md", "hello");
        bad.fingerprint = Some(Fingerprint::of_bytes("other"));
        let err = validate(&[write("ok.md", "fine"), bad]).unwrap_err();
        assert!(err.to_string().contains("checksum mismatch"));
    }

    #[test]
    fn undecodable_content_is_rejected() {
        let mut bad = write("a.md", "hello");
        bad.content = Some("not base64!!".into());
        assert!(validate(&[bad]).is_err());
    }

    #[test]
    fn duplicate_paths_are_rejected() {
        assert!(validate(&[write("a.md", "1"), write("./a.md", "1")]).is_err());
    }

    #[test]
    fn write_all_updates_tracker_and_removes() {
        let dir = tempfile::tempdir().unwrap();
        let root = NormalizedPath::new(dir.path());
        std::fs::create_dir_all(dir.path().join("old")).unwrap();
        std::fs::write(dir.path().join("old/gone.md"), "bye").unwrap();

        let mut tracker = Tracker::new();
        tracker.upsert(FileRecord::synced("old/gone.md", Fingerprint::of_bytes("bye")));

        let downloads = validate(&[
            write("new/hello.md", "hi"),
            Download {
                path: "old/gone.md".into(),
                content: None,
                fingerprint: None,
                deleted: true,
            },
        ])
        .unwrap();
        let applied = write_all(&root, downloads, &mut tracker, RobustnessConfig::default());

        assert!(applied.complete());
        assert!(applied.clobbered.is_empty());
        assert_eq!(std::fs::read_to_string(dir.path().join("new/hello.md")).unwrap(), "hi");
        assert!(!dir.path().join("old").exists());
        assert!(tracker.get("old/gone.md").is_none());
        assert_eq!(
            tracker.get("new/hello.md").unwrap().synced,
            Some(Fingerprint::of_bytes("hi"))
        );
    }

    #[test]
    fn removals_apply_before_writes() {
        let dir = tempfile::tempdir().unwrap();
        let root = NormalizedPath::new(dir.path());
        std::fs::write(dir.path().join("a.txt"), "was a file").unwrap();

        let mut tracker = Tracker::new();
        tracker.upsert(FileRecord::synced("a.txt", Fingerprint::of_bytes("was a file")));

        // Server order puts the child first
        let downloads = validate(&[
            write("a.txt/sub", "now a directory"),
            Download {
                path: "a.txt".into(),
                content: None,
                fingerprint: None,
                deleted: true,
            },
        ])
        .unwrap();
        let applied = write_all(&root, downloads, &mut tracker, RobustnessConfig::default());

        assert!(applied.complete(), "{:?}", applied.failed);
        assert_eq!(applied.written, vec!["a.txt".to_string(), "a.txt/sub".to_string()]);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("a.txt/sub")).unwrap(),
            "now a directory"
        );
        assert!(tracker.get("a.txt").is_none());
        assert!(tracker.get("a.txt/sub").is_some());
    }

    #[test]
    fn untracked_local_content_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let root = NormalizedPath::new(dir.path());
        std::fs::write(dir.path().join("draft.md"), "local draft").unwrap();

        let mut tracker = Tracker::new();
        let applied = write_all(
            &root,
            validate(&[write("draft.md", "server")]).unwrap(),
            &mut tracker,
            RobustnessConfig::default(),
        );
        assert_eq!(applied.clobbered, vec!["draft.md".to_string()]);
    }
}
