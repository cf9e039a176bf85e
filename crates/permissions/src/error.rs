//! Permission error types.

use thiserror::Error;

/// Permission errors.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A specification's target key breaks the naming rules.
    #[error("invalid target key '{key}': {reason}")]
    InvalidTargetKey { key: String, reason: String },

    /// A specification is already registered under this key.
    #[error("target key already registered: {0}")]
    DuplicateTarget(String),

    /// A permission target name is a wildcard pattern or otherwise malformed.
    #[error("invalid target name: {0}")]
    InvalidTargetName(String),

    /// No specification resolves for the target.
    #[error("unknown target: {0}")]
    UnknownTarget(String),

    /// The subject may not access the target.
    ///
    /// Returned both when the target does not exist and when the subject
    /// lacks it, so callers cannot enumerate targets.
    #[error("unauthorized to perform action; request permission first")]
    Unauthorized,

    /// A caveat type is not on the target's allow-list.
    #[error("caveat '{caveat}' is not allowed for target '{target}'")]
    CaveatNotAllowed { target: String, caveat: String },

    /// The same caveat type appears more than once.
    #[error("duplicate caveat '{caveat}' for target '{target}'")]
    DuplicateCaveat { target: String, caveat: String },

    /// A caveat value does not have the shape its target expects.
    #[error("invalid caveat '{caveat}': {reason}")]
    InvalidCaveat { caveat: String, reason: String },

    /// A specification validator rejected the permission.
    #[error("permission validation failed: {0}")]
    Validation(String),

    /// The target is a restricted method, not an endowment.
    #[error("target is not an endowment: {0}")]
    NotAnEndowment(String),

    /// The target is an endowment, not an invocable method.
    #[error("target is not a restricted method: {0}")]
    NotAMethod(String),

    /// A restricted method implementation failed.
    #[error("method execution failed: {0}")]
    Execution(String),

    /// The persistence sink rejected a write.
    #[error("persistence error: {0}")]
    Persistence(String),
}

pub type Result<T> = std::result::Result<T, Error>;
