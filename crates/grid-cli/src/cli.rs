//! CLI argument parsing using clap derive

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// GRID Cloud - Sync your workspace with the cloud
#[derive(Parser, Debug)]
#[command(name = "grid")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Workspace root (defaults to the current directory)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Directory holding credentials and global config
    #[arg(long, global = true, env = "GRID_CONFIG_DIR", hide_env_values = true)]
    pub config_dir: Option<PathBuf>,

    /// The command to run
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Log in with a GRID API key
    ///
    /// The key is validated against the server before it is stored.
    ///
    /// Examples:
    ///   grid login                        # Prompt for the key
    ///   grid login --api-key grid_xxxx    # Non-interactive
    Login {
        /// API key (prompted for when omitted)
        #[arg(long, env = "GRID_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },

    /// Forget the stored API key
    Logout,

    /// Show the logged-in account
    Whoami,

    /// Manage cloud workspaces
    Workspaces {
        #[command(subcommand)]
        action: WorkspaceAction,
    },

    /// Run one sync cycle
    Sync {
        /// Create the cloud workspace if none matches
        #[arg(long)]
        create: bool,

        /// Output the cycle report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show binding, cursor and pending changes without contacting the server
    Status {
        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// Sync periodically until interrupted
    Watch {
        /// Seconds between cycles (defaults to the configured interval)
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Forget the cursor and run a full sync
    Resync,

    /// Enterprise configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Register a build artifact with the releases API
    ///
    /// Requires GRID_API_SECRET; GRID_API_URL overrides the endpoint.
    ///
    /// Examples:
    ///   grid publish-release 1.2.0 dist/grid-setup.exe --repo grid/editor
    PublishRelease {
        /// Release version
        version: String,

        /// Path to the artifact
        file: PathBuf,

        /// Release channel
        #[arg(long, default_value = "stable")]
        channel: String,

        /// Target platform
        #[arg(long, default_value = "windows")]
        platform: String,

        /// Target architecture
        #[arg(long, default_value = "x64")]
        arch: String,

        /// GitHub repository hosting the artifact (owner/name)
        #[arg(long)]
        repo: Option<String>,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Workspace subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum WorkspaceAction {
    /// List cloud workspaces
    List,
    /// Register a new cloud workspace for this root
    Create {
        /// Workspace name
        name: String,
    },
}

/// Config subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigAction {
    /// Fetch and apply the enterprise configuration
    Pull,
    /// Print the effective client configuration
    Show,
}
