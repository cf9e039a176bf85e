//! Origin-scoped request handling.

use std::sync::Arc;

use permissions::{PermissionController, PermissionStore};
use serde_json::Value;
use tracing::debug;

use crate::methods::{self, GET_PERMISSIONS, INVOKE_PLUGIN};
use crate::protocol::{
    INVALID_REQUEST, JsonRpcError, JsonRpcRequest, JsonRpcResponse, PARSE_ERROR, RequestId,
};

/// Serves JSON-RPC requests on behalf of a calling origin.
///
/// Permitted methods are answered directly. Everything else goes through
/// the controller's enforcement gate as a restricted method.
#[derive(Clone)]
pub struct RpcEngine {
    controller: Arc<PermissionController>,
}

impl RpcEngine {
    pub fn new(controller: Arc<PermissionController>) -> Self {
        Self { controller }
    }

    pub fn handle(&self, origin: &str, request: JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id.clone();
        match self.dispatch(origin, request) {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::failure(id, error),
        }
    }

    /// Handle a raw JSON request.
    pub fn handle_str(&self, origin: &str, raw: &str) -> JsonRpcResponse {
        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(e) => {
                return JsonRpcResponse::failure(
                    RequestId::Null,
                    JsonRpcError::new(PARSE_ERROR, e.to_string()),
                );
            }
        };

        match serde_json::from_value::<JsonRpcRequest>(value) {
            Ok(request) if request.jsonrpc == "2.0" => self.handle(origin, request),
            Ok(request) => JsonRpcResponse::failure(
                request.id,
                JsonRpcError::new(INVALID_REQUEST, "unsupported jsonrpc version"),
            ),
            Err(e) => JsonRpcResponse::failure(
                RequestId::Null,
                JsonRpcError::new(INVALID_REQUEST, e.to_string()),
            ),
        }
    }

    fn dispatch(&self, origin: &str, request: JsonRpcRequest) -> Result<Value, JsonRpcError> {
        let request = if request.method == INVOKE_PLUGIN {
            methods::invoke_plugin_sugar(request)?
        } else {
            request
        };

        debug!(origin, method = %request.method, "handling request");
        match request.method.as_str() {
            GET_PERMISSIONS => {
                methods::get_permissions(|| self.controller.get_permissions(origin))
            }
            method => self
                .controller
                .execute_restricted_method(origin, method, request.params)
                .map_err(JsonRpcError::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{INTERNAL_ERROR, INVALID_PARAMS, UNAUTHORIZED};
    use permissions::{
        PermissionSpecification, RestrictedMethodArgs, SpecificationRegistry, endowments,
    };
    use serde_json::json;

    fn echo(args: RestrictedMethodArgs) -> permissions::Result<Value> {
        Ok(json!({ "method": args.method, "origin": args.origin, "params": args.params }))
    }

    fn failing(_: RestrictedMethodArgs) -> permissions::Result<Value> {
        Err(permissions::Error::Execution("plugin crashed".into()))
    }

    fn engine() -> (RpcEngine, Arc<PermissionController>) {
        let mut registry = SpecificationRegistry::new();
        registry
            .register(PermissionSpecification::restricted_method("wallet_plugin_*", echo))
            .unwrap();
        registry
            .register(PermissionSpecification::restricted_method("wallet_fail", failing))
            .unwrap();
        registry.register(endowments::network_access()).unwrap();
        let controller = Arc::new(PermissionController::new(registry));
        (RpcEngine::new(controller.clone()), controller)
    }

    #[test]
    fn get_permissions_is_scoped_to_origin() {
        let (engine, controller) = engine();
        controller
            .grant("https://a.example", "wallet_plugin_npm:x", None)
            .unwrap();
        controller
            .grant("https://a.example", "endowment:network-access", None)
            .unwrap();
        controller
            .grant("https://b.example", "wallet_plugin_npm:y", None)
            .unwrap();

        let result = engine
            .handle("https://a.example", JsonRpcRequest::new(1, GET_PERMISSIONS))
            .into_result()
            .unwrap();
        let list = result.as_array().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0]["parentCapability"], "wallet_plugin_npm:x");
        assert_eq!(list[1]["parentCapability"], "endowment:network-access");
        assert!(list.iter().all(|p| p["invoker"] == "https://a.example"));
    }

    #[test]
    fn get_permissions_has_no_side_effects() {
        let (engine, controller) = engine();
        let request = JsonRpcRequest::new(1, GET_PERMISSIONS);
        let response = engine.handle("https://new.example", request);
        assert_eq!(response.into_result().unwrap(), json!([]));
        assert!(controller.subjects().is_empty());
    }

    #[test]
    fn invoke_plugin_routes_through_the_gate() {
        let (engine, controller) = engine();
        controller
            .grant("https://a.example", "wallet_plugin_npm:x", None)
            .unwrap();

        let request = JsonRpcRequest::new("r1", INVOKE_PLUGIN)
            .with_params(json!(["npm:x", { "method": "ping" }]));
        let response = engine.handle("https://a.example", request);
        assert_eq!(response.id, RequestId::String("r1".into()));
        let result = response.into_result().unwrap();
        assert_eq!(result["method"], "wallet_plugin_npm:x");
        assert_eq!(result["origin"], "https://a.example");
        assert_eq!(result["params"], json!([{ "method": "ping" }]));
    }

    #[test]
    fn missing_and_unknown_targets_look_the_same() {
        let (engine, _) = engine();
        let not_granted = engine
            .handle(
                "https://a.example",
                JsonRpcRequest::new(1, "wallet_plugin_npm:x").with_params(json!([{}])),
            )
            .into_result()
            .unwrap_err();
        let unknown = engine
            .handle("https://a.example", JsonRpcRequest::new(2, "wallet_nothing"))
            .into_result()
            .unwrap_err();
        assert_eq!(not_granted.code, UNAUTHORIZED);
        assert_eq!(not_granted, unknown);
    }

    #[test]
    fn malformed_sugar_is_invalid_params() {
        let (engine, _) = engine();
        let err = engine
            .handle(
                "https://a.example",
                JsonRpcRequest::new(1, INVOKE_PLUGIN).with_params(json!(["npm:x"])),
            )
            .into_result()
            .unwrap_err();
        assert_eq!(err.code, INVALID_PARAMS);
    }

    #[test]
    fn implementation_failures_are_internal_errors() {
        let (engine, controller) = engine();
        controller.grant("https://a.example", "wallet_fail", None).unwrap();
        let err = engine
            .handle("https://a.example", JsonRpcRequest::new(1, "wallet_fail"))
            .into_result()
            .unwrap_err();
        assert_eq!(err.code, INTERNAL_ERROR);
        assert_eq!(err.message, "plugin crashed");
    }

    #[test]
    fn raw_requests() {
        let (engine, _) = engine();
        let parse = engine.handle_str("https://a.example", "{not json");
        assert_eq!(parse.id, RequestId::Null);
        assert_eq!(parse.error.unwrap().code, PARSE_ERROR);

        let version = engine.handle_str(
            "https://a.example",
            r#"{"jsonrpc":"1.0","id":3,"method":"wallet_getPermissions"}"#,
        );
        assert_eq!(version.id, RequestId::Number(3));
        assert_eq!(version.error.unwrap().code, INVALID_REQUEST);

        let ok = engine.handle_str(
            "https://a.example",
            r#"{"jsonrpc":"2.0","id":4,"method":"wallet_getPermissions"}"#,
        );
        assert_eq!(ok.into_result().unwrap(), json!([]));
    }
}
