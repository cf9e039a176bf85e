//! Cronjob scheduling for plugins.
//!
//! Plugins holding `endowment:cronjob` list recurring jobs in their
//! permission's cronjob caveat. The [`CronjobService`] turns those into
//! timers and hands each job's request to a [`CronjobHandler`] when it is due.
//!
//! # Overview
//!
//! - [`CronjobService::register`] checks the permission store and arms a
//!   timer per job.
//! - On firing, the request is delivered with the [`SYSTEM_ORIGIN`] tag and
//!   the next occurrence is armed under the same job id.
//! - [`CronjobService::unregister`] cancels every job of a plugin; nothing is
//!   delivered for them afterwards.
//! - Timers run on the tokio runtime captured when the service is built
//!   ([`CronjobService::with_runtime`] names one explicitly).
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use permissions::{endowments, PermissionController, SpecificationRegistry};
//! use scheduler::{CronjobHandler, CronjobService};
//! use serde_json::{Map, Value};
//!
//! struct Printer;
//!
//! impl CronjobHandler for Printer {
//!     async fn deliver(
//!         &self,
//!         plugin: &str,
//!         origin: &str,
//!         request: Map<String, Value>,
//!     ) -> scheduler::Result<()> {
//!         println!("{origin} -> {plugin}: {request:?}");
//!         Ok(())
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut registry = SpecificationRegistry::new();
//! registry.register(endowments::cronjob())?;
//! let controller = Arc::new(PermissionController::new(registry));
//!
//! let service = CronjobService::new(controller, Printer);
//! service.register("npm:example")?;
//! # Ok(())
//! # }
//! ```

mod clock;
mod cronjob;
mod error;
mod handler;
mod service;
mod timer;

pub use clock::{Clock, MonotonicClock, SystemClock};
pub use cronjob::{delay_until, CronSchedule, JobId, JobInfo};
pub use error::{Error, Result};
pub use handler::{CronjobHandler, SYSTEM_ORIGIN};
pub use service::CronjobService;
pub use timer::Timer;
