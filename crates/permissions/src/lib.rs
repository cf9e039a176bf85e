//! Capability-based permissions for plugins.
//!
//! Core principle: **a plugin may only touch a restricted target it holds a
//! permission for.**
//!
//! # Overview
//!
//! - [`Permission`]: a grant binding a subject (plugin origin) to a target,
//!   optionally narrowed by [`Caveat`]s.
//! - [`PermissionSpecification`]: the rules for a target or a target family
//!   (`wallet_plugin_*`), registered in a [`SpecificationRegistry`].
//! - [`endowments`]: specifications that grant a flag or payload instead of a
//!   method, such as `endowment:cronjob`.
//! - [`PermissionController`]: stores grants and is the enforcement gate for
//!   method and endowment access.
//!
//! # Example
//!
//! ```
//! use permissions::{
//!     endowments, PermissionController, PermissionSpecification, RestrictedMethodArgs,
//!     SpecificationRegistry,
//! };
//!
//! let mut registry = SpecificationRegistry::new();
//! registry.register(PermissionSpecification::restricted_method(
//!     "wallet_plugin_*",
//!     |args: RestrictedMethodArgs| -> permissions::Result<serde_json::Value> {
//!         Ok(serde_json::json!({ "called": args.method }))
//!     },
//! ))?;
//! registry.register(endowments::network_access())?;
//!
//! let controller = PermissionController::new(registry);
//! controller.grant("npm:example", "wallet_plugin_npm:other", None)?;
//!
//! let result =
//!     controller.execute_restricted_method("npm:example", "wallet_plugin_npm:other", None)?;
//! assert_eq!(result["called"], "wallet_plugin_npm:other");
//! # Ok::<(), permissions::Error>(())
//! ```

mod caveat;
mod controller;
pub mod endowments;
mod error;
mod permission;
mod specification;
mod target;

pub use caveat::Caveat;
pub use controller::{Persistence, PermissionController, PermissionStore, SubjectPermissions};
pub use endowments::{CronjobDefinition, Endowment, EndowmentSpecification};
pub use error::{Error, Result};
pub use permission::{
    construct_permission, find_caveat, Permission, PermissionId, PermissionOptions,
};
pub use specification::{
    Constructed, Factory, Implementation, PermissionSpecification, RestrictedMethod,
    RestrictedMethodArgs, SpecificationRegistry, Validator,
};
pub use target::{validate_target_name, TargetKey};
