//! Error types for grid-core

use std::fmt;

/// Result type for grid-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in grid-core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Tier or permission denied by the server; needs user action
    #[error("Access denied: {message}")]
    Auth { message: String },

    /// Transport failure or timeout; safe to retry
    #[error("Network error: {message}")]
    Network { message: String },

    /// Unexpected status or malformed response body
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// No credential is available
    #[error("Not logged in")]
    NotAuthenticated,

    /// API key rejected before or during validation
    #[error("Invalid API key: {reason}")]
    InvalidApiKey { reason: String },

    /// No cloud workspace is bound and creation was not requested
    #[error("Workspace \"{name}\" not found in cloud")]
    WorkspaceNotFound { name: String },

    /// Invalid value in a configuration layer
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    // Transparent wrappers for underlying crate errors
    /// Filesystem error from grid-fs
    #[error(transparent)]
    Fs(#[from] grid_fs::Error),

    /// Standard I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// TOML deserialization error
    #[error(transparent)]
    TomlDe(#[from] toml::de::Error),
}

/// Error taxonomy reported at the end of a sync cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncErrorKind {
    /// Not retried; the user must upgrade or re-authenticate
    Auth,
    /// Retried with backoff, then reported
    Network,
    /// Aborts the cycle with state unchanged
    Protocol,
    /// Excludes a single path; the cycle continues
    Io,
}

impl fmt::Display for SyncErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncErrorKind::Auth => "auth",
            SyncErrorKind::Network => "network",
            SyncErrorKind::Protocol => "protocol",
            SyncErrorKind::Io => "io",
        };
        f.write_str(s)
    }
}

impl Error {
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Where this error falls in the sync error taxonomy.
    pub fn kind(&self) -> SyncErrorKind {
        match self {
            Error::Auth { .. } | Error::NotAuthenticated | Error::InvalidApiKey { .. } => {
                SyncErrorKind::Auth
            }
            Error::Network { .. } => SyncErrorKind::Network,
            Error::Fs(_) | Error::Io(_) => SyncErrorKind::Io,
            _ => SyncErrorKind::Protocol,
        }
    }

    /// Whether the operation that produced this error may be retried as-is.
    pub fn is_retryable(&self) -> bool {
        self.kind() == SyncErrorKind::Network
    }
}
