//! Permitted RPC methods served without a permission.

use permissions::{Permission, SubjectPermissions};
use serde_json::{Value, json};

use crate::protocol::{JsonRpcError, JsonRpcRequest};

/// Returns the caller's permissions.
pub const GET_PERMISSIONS: &str = "wallet_getPermissions";

/// Sugar for `wallet_plugin_<id>`.
pub const INVOKE_PLUGIN: &str = "wallet_invokePlugin";

/// Prefix of the per-plugin method family.
pub const PLUGIN_METHOD_PREFIX: &str = "wallet_plugin_";

/// Serve `wallet_getPermissions`.
///
/// `get_permissions` is already scoped to the calling origin.
pub fn get_permissions(
    get_permissions: impl FnOnce() -> SubjectPermissions,
) -> Result<Value, JsonRpcError> {
    let permissions: Vec<Permission> = get_permissions().into_values().collect();
    serde_json::to_value(permissions).map_err(|e| JsonRpcError::internal(e.to_string()))
}

/// Rewrite `wallet_invokePlugin [id, request]` into `wallet_plugin_<id> [request]`.
pub fn invoke_plugin_sugar(mut request: JsonRpcRequest) -> Result<JsonRpcRequest, JsonRpcError> {
    let Some(Value::Array(params)) = request.params.take() else {
        return Err(JsonRpcError::invalid_params(
            "expected params [pluginId, request]",
        ));
    };

    let [Value::String(plugin), Value::Object(inner)] = <[Value; 2]>::try_from(params)
        .map_err(|_| JsonRpcError::invalid_params("expected params [pluginId, request]"))?
    else {
        return Err(JsonRpcError::invalid_params(
            "expected a string plugin id and an object request",
        ));
    };

    if plugin.is_empty() {
        return Err(JsonRpcError::invalid_params("plugin id must not be empty"));
    }

    request.method = format!("{PLUGIN_METHOD_PREFIX}{plugin}");
    request.params = Some(json!([inner]));
    Ok(request)
}
