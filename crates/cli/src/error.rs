//! CLI error types.

use thiserror::Error;

use crate::config::ConfigError;

/// CLI errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// No data directory could be determined and none is configured.
    #[error("no database configured; set `database` in warden.toml")]
    NoDatabase,

    /// The requested permission is not held.
    #[error("{subject} does not hold {target}")]
    NotGranted { subject: String, target: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Permissions(#[from] permissions::Error),

    #[error(transparent)]
    Storage(#[from] storage::Error),

    #[error(transparent)]
    Scheduler(#[from] scheduler::Error),

    /// Malformed JSON on the command line.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
