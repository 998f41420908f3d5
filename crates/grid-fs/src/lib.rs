//! Filesystem primitives for the GRID Cloud workspace client
//!
//! Provides workspace-relative path handling, content fingerprints and
//! crash-safe I/O used by the sync engine and its state store.

pub mod checksum;
pub mod config;
pub mod error;
pub mod io;
pub mod path;

pub use checksum::Fingerprint;
pub use config::ConfigStore;
pub use error::{Error, Result};
pub use io::RobustnessConfig;
pub use path::{NormalizedPath, validate_relative_path};
