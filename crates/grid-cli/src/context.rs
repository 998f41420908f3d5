//! Workspace and account context for a command
//!
//! Finds the workspace root (git-like: any directory inside a bound
//! workspace works), resolves configuration, and builds the services a
//! command needs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use grid_core::{
    AuthService, ConfigResolver, ConfigSync, FileCredentialStore, GridConfig, HttpRemote,
    SyncService,
};
use grid_core::tracker::STATE_DIR;
use grid_fs::NormalizedPath;

use crate::error::{CliError, Result};

const CREDENTIALS_FILE: &str = "credentials";

/// Find the nearest ancestor of `cwd` holding a `.grid` directory.
///
/// Falls back to `cwd` itself when no ancestor has been synced before.
pub fn find_workspace_root(cwd: &Path) -> PathBuf {
    cwd.ancestors()
        .find(|dir| dir.join(STATE_DIR).is_dir())
        .unwrap_or(cwd)
        .to_path_buf()
}

/// Resolved paths and configuration shared by every command.
pub struct AppContext {
    pub root: NormalizedPath,
    pub config_dir: NormalizedPath,
    pub config: GridConfig,
}

impl AppContext {
    /// Resolve the context from the global CLI flags.
    ///
    /// # Errors
    ///
    /// Fails when no config directory can be determined or a config layer
    /// is invalid.
    pub fn load(root: Option<PathBuf>, config_dir: Option<PathBuf>) -> Result<Self> {
        let root = match root {
            Some(root) => root,
            None => find_workspace_root(&std::env::current_dir()?),
        };
        let config_dir = config_dir
            .or_else(|| dirs::config_dir().map(|d| d.join("grid")))
            .ok_or_else(|| CliError::user("Cannot determine the user config directory; pass --config-dir"))?;

        let root = NormalizedPath::new(root);
        let config = ConfigResolver::new(root.clone())
            .with_global_config_dir(&config_dir)
            .resolve()?;
        tracing::debug!(%root, api = %config.api_base_url, "Resolved context");

        Ok(Self {
            root,
            config_dir: NormalizedPath::new(config_dir),
            config,
        })
    }

    pub fn remote(&self) -> Result<Arc<HttpRemote>> {
        Ok(Arc::new(HttpRemote::new(
            self.config.api_base_url.clone(),
            self.config.request_timeout(),
        )?))
    }

    pub fn auth(&self) -> Result<Arc<AuthService>> {
        let store = FileCredentialStore::new(self.config_dir.join(CREDENTIALS_FILE));
        Ok(Arc::new(AuthService::new(Arc::new(store), self.remote()?)))
    }

    /// Sync engine for the workspace root; `create` forces creation of a
    /// missing cloud workspace.
    pub fn sync_service(&self, auth: Arc<AuthService>, create: bool) -> Result<SyncService> {
        let mut options = self.config.sync_options()?;
        options.create_if_missing |= create;
        Ok(SyncService::open(self.root.clone(), self.remote()?, auth, options)?)
    }

    pub fn config_sync(&self, auth: Arc<AuthService>) -> Result<ConfigSync> {
        Ok(ConfigSync::new(self.remote()?, auth, &self.config_dir))
    }
}
