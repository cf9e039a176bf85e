//! Scheduler error types.

use thiserror::Error;

/// Scheduler errors.
///
/// Registration errors only concern the plugin or job they name.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The cronjob permission does not carry a well-formed job list.
    #[error("invalid cronjob payload for {plugin}: {reason}")]
    InvalidEndowmentPayload { plugin: String, reason: String },

    /// A job's cron expression could not be parsed.
    #[error("invalid cron expression '{expression}': {reason}")]
    InvalidCronExpression { expression: String, reason: String },

    /// No tokio runtime is available to run timers on.
    #[error("no tokio runtime available for cronjob timers")]
    NoRuntime,

    /// A cronjob request could not be delivered to its plugin.
    #[error("delivery failed: {0}")]
    Delivery(String),
}

pub type Result<T> = std::result::Result<T, Error>;
