//! Change detection
//!
//! Diffs the files currently under a workspace root against the tracker and
//! produces the ordered [`ChangeSet`] for the next sync cycle.

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use regex::Regex;
use walkdir::WalkDir;

use grid_fs::{Fingerprint, NormalizedPath, io};

use crate::model::{Change, ChangeKind, ChangeSet};
use crate::tracker::{STATE_DIR, Tracker};
use crate::{Error, Result};

type Predicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// One compiled ignore pattern.
#[derive(Debug, Clone)]
enum Rule {
    /// `name/`: a directory with this name anywhere in the tree
    Dir(String),
    /// Pattern containing `/`: matched against the whole relative path
    Anchored(Regex),
    /// Pattern without `/`: matched against every path component
    Component(Regex),
}

/// Decides which workspace-relative paths are excluded from sync.
///
/// Patterns use a small glob dialect: `*` and `?` stay within one path
/// component, `**` crosses components, and a trailing `/` matches a
/// directory by name. The client state directory and staging files left by
/// interrupted atomic writes are always ignored.
#[derive(Clone, Default)]
pub struct IgnoreRules {
    rules: Vec<Rule>,
    predicate: Option<Predicate>,
}

impl fmt::Debug for IgnoreRules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IgnoreRules")
            .field("rules", &self.rules)
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}

impl IgnoreRules {
    /// Compile glob-style patterns.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if a pattern cannot be compiled.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let mut rules = Vec::new();
        for pattern in patterns {
            let pattern = pattern.as_ref().trim();
            if pattern.is_empty() || pattern.starts_with('#') {
                continue;
            }
            rules.push(compile(pattern)?);
        }
        Ok(Self {
            rules,
            predicate: None,
        })
    }

    /// Add an externally supplied predicate; a path is ignored if either
    /// the patterns or the predicate match it.
    pub fn with_predicate(mut self, predicate: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// Whether `path` (relative, forward slashes) is excluded.
    pub fn is_ignored(&self, path: &str) -> bool {
        if path == STATE_DIR || path.starts_with(&format!("{STATE_DIR}/")) {
            return true;
        }
        if path.rsplit('/').next().is_some_and(io::is_temp_file) {
            return true;
        }
        let matched = self.rules.iter().any(|rule| match rule {
            Rule::Dir(name) => path.split('/').any(|seg| seg == name),
            Rule::Anchored(re) => re.is_match(path),
            Rule::Component(re) => path.split('/').any(|seg| re.is_match(seg)),
        });
        matched || self.predicate.as_ref().is_some_and(|p| p(path))
    }
}

fn compile(pattern: &str) -> Result<Rule> {
    if let Some(dir) = pattern.strip_suffix('/')
        && !dir.contains('/')
        && !dir.contains(['*', '?'])
    {
        return Ok(Rule::Dir(dir.to_string()));
    }

    let trimmed = pattern.trim_start_matches('/').trim_end_matches('/');
    let re = Regex::new(&glob_to_regex(trimmed)).map_err(|e| Error::InvalidConfig {
        message: format!("invalid ignore pattern {pattern:?}: {e}"),
    })?;
    if pattern.contains('/') {
        Ok(Rule::Anchored(re))
    } else {
        Ok(Rule::Component(re))
    }
}

fn glob_to_regex(glob: &str) -> String {
    let mut out = String::from("^");
    let mut chars = glob.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                out.push_str(".*");
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            c => out.push_str(&regex::escape(&c.to_string())),
        }
    }
    // Anchored directory patterns also cover everything beneath them
    out.push_str("(/.*)?$");
    out
}

/// A path that could not be inspected this cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathIssue {
    pub path: String,
    pub message: String,
}

/// Output of one scan.
#[derive(Debug, Clone, Default)]
pub struct Detection {
    pub changes: ChangeSet,
    /// Paths excluded because they could not be read; retried next cycle
    pub issues: Vec<PathIssue>,
    /// Tombstoned paths that are still on disk
    pub revived: Vec<String>,
}

/// Scans a workspace root and diffs it against a [`Tracker`].
#[derive(Debug, Clone)]
pub struct ChangeDetector {
    root: NormalizedPath,
    ignore: IgnoreRules,
}

impl ChangeDetector {
    pub fn new(root: NormalizedPath, ignore: IgnoreRules) -> Self {
        Self { root, ignore }
    }

    /// Compute the change set for the current filesystem snapshot.
    ///
    /// Deterministic for a given tracker and filesystem. Unreadable files
    /// and directories are reported as issues and never turned into
    /// deletions.
    pub fn detect(&self, tracker: &Tracker) -> Detection {
        let mut changes = Vec::new();
        let mut issues = Vec::new();
        // Paths that exist, whether or not they could be hashed
        let mut present = BTreeSet::new();
        // Directories that could not be listed
        let mut unreadable_dirs = Vec::new();

        let root = self.root.to_native();
        let walker = WalkDir::new(&root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| match self.root.relative(entry.path()) {
                Some(rel) => !self.ignore.is_ignored(&rel),
                None => true,
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let rel = e
                        .path()
                        .and_then(|p| self.root.relative(p))
                        .unwrap_or_default();
                    tracing::warn!(path = %rel, error = %e, "Cannot list directory, skipping");
                    unreadable_dirs.push(rel.clone());
                    issues.push(PathIssue {
                        path: rel,
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }
            let Some(rel) = self.root.relative(entry.path()) else {
                continue;
            };
            present.insert(rel.clone());

            match fingerprint(entry.path()) {
                Ok(fp) => {
                    let kind = match tracker.get(&rel) {
                        None => Some(ChangeKind::Created),
                        Some(record) => match &record.synced {
                            None => Some(ChangeKind::Created),
                            Some(synced) if *synced != fp => Some(ChangeKind::Modified),
                            Some(_) => None,
                        },
                    };
                    if let Some(kind) = kind {
                        changes.push(Change::new(rel, kind, fp));
                    }
                }
                Err(e) => {
                    tracing::warn!(path = %rel, error = %e, "Cannot read file, deferring");
                    issues.push(PathIssue {
                        path: rel,
                        message: e.to_string(),
                    });
                }
            }
        }

        // A tombstone is a watcher's report that the file went away. It
        // outranks an unreadable parent directory but not a file seen on disk.
        let mut revived = Vec::new();
        for record in tracker.records() {
            if present.contains(&record.path) {
                if record.tombstone {
                    revived.push(record.path.clone());
                }
                continue;
            }
            if self.ignore.is_ignored(&record.path)
                || (!record.tombstone && is_under_any(&record.path, &unreadable_dirs))
            {
                continue;
            }
            let fingerprint = record.synced.clone().unwrap_or_else(|| record.fingerprint.clone());
            changes.push(Change::new(&record.path, ChangeKind::Deleted, fingerprint));
        }

        let changes = ChangeSet::new(changes);
        tracing::debug!(
            root = %self.root,
            changes = changes.len(),
            issues = issues.len(),
            "Scanned workspace"
        );
        Detection {
            changes,
            issues,
            revived,
        }
    }
}

fn fingerprint(path: &Path) -> Result<Fingerprint> {
    Ok(Fingerprint::of_file(path)?)
}

fn is_under_any(path: &str, dirs: &[String]) -> bool {
    dirs.iter()
        .any(|dir| dir.is_empty() || path == dir || path.starts_with(&format!("{dir}/")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FileRecord;
    use rstest::rstest;

    #[rstest]
    #[case("node_modules/", "node_modules/pkg/index.js", true)]
    #[case("node_modules/", "src/node_modules/x.js", true)]
    #[case("node_modules/", "src/node_modules_backup.js", false)]
    #[case("*.log", "debug.log", true)]
    #[case("*.log", "logs/today.log", true)]
    #[case("*.log", "debug.log.txt", false)]
    #[case("build/*.o", "build/main.o", true)]
    #[case("build/*.o", "src/build/main.o", false)]
    #[case("docs/**", "docs/a/b/c.md", true)]
    #[case("?.tmp", "a.tmp", true)]
    #[case("?.tmp", "ab.tmp", false)]
    fn ignore_patterns(#[case] pattern: &str, #[case] path: &str, #[case] ignored: bool) {
        let rules = IgnoreRules::new(&[pattern]).unwrap();
        assert_eq!(rules.is_ignored(path), ignored, "{pattern} vs {path}");
    }

    #[test]
    fn state_dir_always_ignored() {
        let rules = IgnoreRules::default();
        assert!(rules.is_ignored(".grid"));
        assert!(rules.is_ignored(".grid/state.json"));
        assert!(!rules.is_ignored(".gridfile"));
    }

    #[test]
    fn interrupted_write_leftovers_always_ignored() {
        let rules = IgnoreRules::default();
        assert!(rules.is_ignored("docs/.readme.md.4242.0.tmp"));
        assert!(rules.is_ignored(".a.md.1.7.tmp"));
        assert!(!rules.is_ignored("docs/readme.md"));
        assert!(!rules.is_ignored("docs/draft.tmp"));
    }

    #[test]
    fn tombstones_on_present_files_are_revived() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("kept.md"), "still here").unwrap();

        let mut tracker = Tracker::new();
        tracker.upsert(FileRecord::synced("kept.md", Fingerprint::of_bytes("still here")));
        tracker.upsert(FileRecord::synced("gone.md", Fingerprint::of_bytes("bye")));
        tracker.mark_deleted("kept.md");
        tracker.mark_deleted("gone.md");

        let detection =
            ChangeDetector::new(NormalizedPath::new(dir.path()), IgnoreRules::default()).detect(&tracker);

        assert_eq!(detection.revived, vec!["kept.md".to_string()]);
        assert_eq!(detection.changes.len(), 1);
        assert_eq!(detection.changes.get("gone.md").unwrap().kind, ChangeKind::Deleted);
    }

    #[test]
    fn predicate_extends_patterns() {
        let rules = IgnoreRules::new(&["*.bak"])
            .unwrap()
            .with_predicate(|p| p.starts_with("secret"));
        assert!(rules.is_ignored("secret.txt"));
        assert!(rules.is_ignored("x.bak"));
        assert!(!rules.is_ignored("public.txt"));
    }

    #[test]
    fn comments_and_blank_lines_skipped() {
        let rules = IgnoreRules::new(&["# comment", "", "*.o"]).unwrap();
        assert!(rules.is_ignored("a.o"));
        assert!(!rules.is_ignored("# comment"));
    }

    #[test]
    fn unreadable_dir_shields_deletions() {
        assert!(is_under_any("private/a.txt", &["private".to_string()]));
        assert!(!is_under_any("privateer.txt", &["private".to_string()]));
    }
}
