//! Command implementations for grid-cli

pub mod auth;
pub mod config;
pub mod release;
pub mod sync;
pub mod workspaces;

pub use auth::{run_login, run_logout, run_whoami};
pub use config::{run_pull, run_show};
pub use release::run_publish;
pub use sync::{run_resync, run_status, run_sync, run_watch};
pub use workspaces::{run_create, run_list};
