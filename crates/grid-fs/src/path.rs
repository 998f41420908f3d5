//! Normalized path handling for cross-platform compatibility

use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// An absolute or workspace-relative path stored with forward slashes.
///
/// Workspace-relative paths are exchanged with the server in this form;
/// conversion to a platform-native path happens only at I/O boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NormalizedPath {
    inner: String,
}

impl NormalizedPath {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            inner: path.as_ref().to_string_lossy().replace('\\', "/"),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.inner
    }

    /// Platform-native form for handing to `std::fs`.
    pub fn to_native(&self) -> PathBuf {
        PathBuf::from(&self.inner)
    }

    /// Append a relative `segment`, which may itself contain slashes.
    pub fn join(&self, segment: &str) -> Self {
        let segment = segment.replace('\\', "/");
        let base = self.inner.trim_end_matches('/');
        Self {
            inner: format!("{base}/{segment}"),
        }
    }

    /// Last component, ignoring a trailing slash.
    pub fn file_name(&self) -> Option<&str> {
        self.inner
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
    }

    /// Extension of the last component; dotfiles have none.
    pub fn extension(&self) -> Option<&str> {
        let name = self.file_name()?;
        match name.rfind('.') {
            Some(0) | None => None,
            Some(idx) => Some(&name[idx + 1..]),
        }
    }

    pub fn is_file(&self) -> bool {
        self.to_native().is_file()
    }

    /// Express `path` relative to this root, using forward slashes.
    ///
    /// Returns `None` when `path` is not under the root or is the root itself.
    pub fn relative(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(self.to_native()).ok()?;
        let rel = rel.to_string_lossy().replace('\\', "/");
        if rel.is_empty() { None } else { Some(rel) }
    }
}

impl AsRef<Path> for NormalizedPath {
    fn as_ref(&self) -> &Path {
        Path::new(&self.inner)
    }
}

impl std::fmt::Display for NormalizedPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.inner)
    }
}

macro_rules! normalized_from {
    ($($ty:ty),*) => {
        $(impl From<$ty> for NormalizedPath {
            fn from(path: $ty) -> Self {
                Self::new(path)
            }
        })*
    };
}

normalized_from!(&str, String, PathBuf, &Path);

/// Validate a workspace-relative file path received from outside.
///
/// Returns the canonical form: forward slashes, no empty or `.` segments.
/// Rejects absolute paths, drive prefixes, parent traversal, NUL bytes and
/// paths that name a directory.
pub fn validate_relative_path(raw: &str) -> Result<String> {
    let normalized = raw.replace('\\', "/");

    if normalized.trim().is_empty() {
        return Err(Error::invalid_path(raw, "path is empty"));
    }
    if normalized.contains('\0') {
        return Err(Error::invalid_path(raw, "path contains a NUL byte"));
    }
    if normalized.starts_with('/') {
        return Err(Error::invalid_path(raw, "path is absolute"));
    }
    if normalized.len() >= 2 && normalized.as_bytes()[1] == b':' {
        return Err(Error::invalid_path(raw, "path has a drive prefix"));
    }
    if normalized.ends_with('/') {
        return Err(Error::invalid_path(raw, "path names a directory"));
    }

    let mut segments = Vec::new();
    for segment in normalized.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return Err(Error::invalid_path(raw, "path escapes the workspace")),
            s => segments.push(s),
        }
    }

    if segments.is_empty() {
        return Err(Error::invalid_path(raw, "path is empty"));
    }
    Ok(segments.join("/"))
}
