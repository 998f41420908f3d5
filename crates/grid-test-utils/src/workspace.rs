//! [`TestWorkspace`] builder for sync scenarios.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// A temporary workspace directory with helpers for setup and assertion.
///
/// The workspace root is a named subdirectory of the temp dir, so the root's
/// file name (used as the cloud workspace name) is predictable. A sibling
/// `config/` directory stands in for the user's global config dir.
///
/// # Example
///
/// ```rust,no_run
/// use grid_test_utils::TestWorkspace;
///
/// let ws = TestWorkspace::named("notes");
/// ws.write("docs/readme.md", "hello");
/// ws.assert_file_contains("docs/readme.md", "hello");
/// ```
pub struct TestWorkspace {
    temp_dir: TempDir,
    root: PathBuf,
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

impl TestWorkspace {
    /// Create an empty workspace named `workspace`.
    pub fn new() -> Self {
        Self::named("workspace")
    }

    /// Create an empty workspace whose root directory is called `name`.
    pub fn named(name: &str) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join(name);
        fs::create_dir_all(&root).unwrap();
        Self { temp_dir, root }
    }

    /// Return the workspace root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// A directory outside the workspace for global config files.
    pub fn config_dir(&self) -> PathBuf {
        let dir = self.temp_dir.path().join("config");
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// Write `content` to `path` (relative to root), creating parents.
    pub fn write(&self, path: &str, content: impl AsRef<[u8]>) -> &Self {
        let full_path = self.root.join(path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&full_path, content)
            .unwrap_or_else(|e| panic!("TestWorkspace::write: {}: {e}", full_path.display()));
        self
    }

    /// Read the file at `path` as text.
    pub fn read(&self, path: &str) -> String {
        let full_path = self.root.join(path);
        fs::read_to_string(&full_path)
            .unwrap_or_else(|e| panic!("TestWorkspace::read: {}: {e}", full_path.display()))
    }

    /// Delete the file at `path`.
    pub fn remove(&self, path: &str) {
        let full_path = self.root.join(path);
        fs::remove_file(&full_path)
            .unwrap_or_else(|e| panic!("TestWorkspace::remove: {}: {e}", full_path.display()));
    }

    pub fn exists(&self, path: &str) -> bool {
        self.root.join(path).exists()
    }

    /// Write `.grid/config.toml` inside the workspace.
    pub fn write_workspace_config(&self, toml: &str) {
        self.write(".grid/config.toml", toml);
    }

    /// Write `config.toml` in the global config directory.
    pub fn write_global_config(&self, toml: &str) {
        fs::write(self.config_dir().join("config.toml"), toml).unwrap();
    }

    /// Assert that `path` (relative to root) exists.
    ///
    /// # Panics
    /// Panics with a descriptive message if the path does not exist.
    pub fn assert_file_exists(&self, path: &str) {
        let full_path = self.root.join(path);
        assert!(
            full_path.exists(),
            "Expected file to exist: {}",
            full_path.display()
        );
    }

    /// Assert that `path` (relative to root) does **not** exist.
    ///
    /// # Panics
    /// Panics with a descriptive message if the path exists.
    pub fn assert_file_not_exists(&self, path: &str) {
        let full_path = self.root.join(path);
        assert!(
            !full_path.exists(),
            "Expected file NOT to exist: {}",
            full_path.display()
        );
    }

    /// Assert that the file at `path` contains `content`.
    ///
    /// # Panics
    /// Panics if the file cannot be read or does not contain `content`.
    pub fn assert_file_contains(&self, path: &str, content: &str) {
        let file_content = self.read(path);
        assert!(
            file_content.contains(content),
            "File {path} does not contain expected content.\nExpected: {content}\nActual: {file_content}"
        );
    }
}
