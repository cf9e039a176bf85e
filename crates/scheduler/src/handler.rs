//! Delivery of cronjob requests to plugins.

use std::future::Future;

use serde_json::{Map, Value};

use crate::Result;

/// Origin tag attached to every cronjob request.
///
/// Requests come from the host, never from the plugin's own origin.
pub const SYSTEM_ORIGIN: &str = "system";

/// Trait for whatever hands a cronjob request to the plugin runtime.
///
/// Delivery is fire-and-forget from the scheduler's point of view: a failure
/// is logged and the next occurrence is the retry.
pub trait CronjobHandler: Send + Sync + 'static {
    fn deliver(
        &self,
        plugin: &str,
        origin: &str,
        request: Map<String, Value>,
    ) -> impl Future<Output = Result<()>> + Send;
}
