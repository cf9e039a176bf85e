//! JSON-RPC surface over the permission controller.
//!
//! Two methods are served without a permission:
//!
//! - `wallet_getPermissions` lists the caller's own permissions.
//! - `wallet_invokePlugin` is rewritten into `wallet_plugin_<id>` and then
//!   gated like any other method.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use permissions::{PermissionController, SpecificationRegistry};
//! use rpc::{JsonRpcRequest, RpcEngine, UNAUTHORIZED};
//!
//! let controller = Arc::new(PermissionController::new(SpecificationRegistry::new()));
//! let engine = RpcEngine::new(controller);
//!
//! let response = engine.handle("https://dapp.example", JsonRpcRequest::new(1, "wallet_secret"));
//! assert_eq!(response.error.map(|e| e.code), Some(UNAUTHORIZED));
//! ```

mod engine;
mod methods;
mod protocol;

pub use engine::RpcEngine;
pub use methods::{
    GET_PERMISSIONS, INVOKE_PLUGIN, PLUGIN_METHOD_PREFIX, get_permissions, invoke_plugin_sugar,
};
pub use protocol::{
    INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, JsonRpcError, JsonRpcRequest,
    JsonRpcResponse, PARSE_ERROR, RequestId, UNAUTHORIZED,
};
