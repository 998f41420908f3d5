//! Client configuration with layered resolution
//!
//! Sources, later overriding earlier:
//! 1. Built-in defaults
//! 2. Global config (`<config_dir>/grid/config.toml`)
//! 3. Workspace config (`<root>/.grid/config.toml`)
//! 4. `GRID_API_BASE_URL` environment variable
//!
//! Scalar settings are replaced by later layers; `ignore` patterns
//! accumulate.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use grid_fs::{ConfigStore, NormalizedPath};

use crate::detect::IgnoreRules;
use crate::sync::{RetryPolicy, SyncOptions};
use crate::tracker::STATE_DIR;
use crate::{Error, Result};

pub const DEFAULT_API_BASE_URL: &str = "https://grideditor.com/api";
pub const API_BASE_URL_ENV: &str = "GRID_API_BASE_URL";

const CONFIG_FILE: &str = "config.toml";

/// Effective client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridConfig {
    pub api_base_url: String,
    pub sync_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub max_attempts: u32,
    pub ignore: Vec<String>,
    /// Create the cloud workspace on first sync if none matches
    pub create_if_missing: bool,
    /// Cloud workspace name; the root directory name when unset
    pub workspace_name: Option<String>,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            sync_interval_secs: 300,
            request_timeout_secs: 30,
            max_attempts: 3,
            ignore: vec![".git/".to_string(), "node_modules/".to_string()],
            create_if_missing: false,
            workspace_name: None,
        }
    }
}

impl GridConfig {
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Engine options derived from these settings.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if an ignore pattern does not compile.
    pub fn sync_options(&self) -> Result<SyncOptions> {
        Ok(SyncOptions {
            workspace_name: self.workspace_name.clone(),
            create_if_missing: self.create_if_missing,
            request_timeout: self.request_timeout(),
            retry: RetryPolicy::new(self.max_attempts),
            ignore: IgnoreRules::new(&self.ignore)?,
            ..SyncOptions::default()
        })
    }

    fn apply(&mut self, layer: ConfigLayer) {
        if let Some(url) = layer.api_base_url {
            self.api_base_url = url;
        }
        if let Some(secs) = layer.sync_interval_secs {
            self.sync_interval_secs = secs;
        }
        if let Some(secs) = layer.request_timeout_secs {
            self.request_timeout_secs = secs;
        }
        if let Some(n) = layer.max_attempts {
            self.max_attempts = n;
        }
        if let Some(create) = layer.create_if_missing {
            self.create_if_missing = create;
        }
        if layer.workspace_name.is_some() {
            self.workspace_name = layer.workspace_name;
        }
        for pattern in layer.ignore {
            if !self.ignore.contains(&pattern) {
                self.ignore.push(pattern);
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if !(self.api_base_url.starts_with("https://") || self.api_base_url.starts_with("http://")) {
            return Err(Error::InvalidConfig {
                message: format!("api_base_url must be an http(s) URL, got {:?}", self.api_base_url),
            });
        }
        if self.sync_interval_secs == 0 {
            return Err(Error::InvalidConfig {
                message: "sync_interval_secs must be positive".to_string(),
            });
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::InvalidConfig {
                message: "request_timeout_secs must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// One config file; every field optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigLayer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_interval_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignore: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_if_missing: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_name: Option<String>,
}

/// Resolves [`GridConfig`] for a workspace root.
pub struct ConfigResolver {
    root: NormalizedPath,
    /// Override for the global config directory (used for testing)
    global_config_dir_override: Option<PathBuf>,
    env_base_url: Option<String>,
    store: ConfigStore,
}

impl ConfigResolver {
    pub fn new(root: NormalizedPath) -> Self {
        Self {
            root,
            global_config_dir_override: None,
            env_base_url: std::env::var(API_BASE_URL_ENV).ok().filter(|v| !v.is_empty()),
            store: ConfigStore::new(),
        }
    }

    /// Use `dir` instead of `<config_dir>/grid`.
    pub fn with_global_config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.global_config_dir_override = Some(dir.into());
        self
    }

    /// Replace the value read from `GRID_API_BASE_URL`.
    pub fn with_env_base_url(mut self, url: Option<String>) -> Self {
        self.env_base_url = url;
        self
    }

    fn global_config_dir(&self) -> Option<PathBuf> {
        if let Some(ref dir) = self.global_config_dir_override {
            return Some(dir.clone());
        }
        dirs::config_dir().map(|d| d.join("grid"))
    }

    pub fn global_config_path(&self) -> Option<NormalizedPath> {
        self.global_config_dir()
            .map(|d| NormalizedPath::new(d.join(CONFIG_FILE)))
    }

    pub fn workspace_config_path(&self) -> NormalizedPath {
        self.root.join(STATE_DIR).join(CONFIG_FILE)
    }

    /// Merge every layer; missing files are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if a present file does not parse or the merged
    /// result is invalid.
    pub fn resolve(&self) -> Result<GridConfig> {
        let mut config = GridConfig::default();

        if let Some(path) = self.global_config_path() {
            self.load_layer(&mut config, &path, "global")?;
        }
        self.load_layer(&mut config, &self.workspace_config_path(), "workspace")?;

        if let Some(url) = &self.env_base_url {
            tracing::debug!(%url, "Using API base URL from {API_BASE_URL_ENV}");
            config.api_base_url = url.clone();
        }

        config.validate()?;
        Ok(config)
    }

    fn load_layer(&self, config: &mut GridConfig, path: &NormalizedPath, name: &str) -> Result<()> {
        match self.store.load_optional::<ConfigLayer>(path)? {
            Some(layer) => {
                tracing::debug!(%path, layer = name, "Loading config layer");
                config.apply(layer);
            }
            None => tracing::debug!(%path, layer = name, "No config layer, skipping"),
        }
        Ok(())
    }
}
