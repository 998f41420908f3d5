//! Error types for grid-cli

pub type Result<T> = std::result::Result<T, CliError>;

/// Anything a `grid` subcommand can fail with; printed once by `main`.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] grid_core::Error),

    #[error(transparent)]
    Fs(#[from] grid_fs::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("Prompt failed: {0}")]
    Dialoguer(#[from] dialoguer::Error),

    /// Logging could not be initialized
    #[error("Cannot initialize logging: {0}")]
    Logging(String),

    /// Message shown to the user as-is
    #[error("{message}")]
    User { message: String },
}

impl CliError {
    pub fn user(message: impl Into<String>) -> Self {
        Self::User {
            message: message.into(),
        }
    }
}
