//! SQLite-backed persistence for granted permissions.
//!
//! The [`PermissionDb`] keeps every grant made through a
//! [`permissions::PermissionController`] so that a host can restore them on
//! restart. It implements [`permissions::Persistence`], so the controller
//! writes through to it before changing its in-memory state.
//!
//! # Example
//!
//! ```no_run
//! use permissions::{endowments, PermissionController, SpecificationRegistry};
//! use storage::PermissionDb;
//!
//! let mut registry = SpecificationRegistry::new();
//! registry.register(endowments::long_running())?;
//!
//! // Restore grants from a previous run, then write new ones through.
//! let db = PermissionDb::open("permissions.db")?;
//! let saved = db.load_all()?;
//! let controller = PermissionController::new(registry).with_persistence(db);
//! controller.restore(saved)?;
//!
//! controller.grant("npm:example", "endowment:long-running", None)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod error;
mod store;

pub use error::{Error, Result};
pub use store::PermissionDb;
