//! JSON-RPC 2.0 types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Parse error.
pub const PARSE_ERROR: i32 = -32700;
/// The request object is malformed.
pub const INVALID_REQUEST: i32 = -32600;
/// Invalid method parameters.
pub const INVALID_PARAMS: i32 = -32602;
/// Internal error.
pub const INTERNAL_ERROR: i32 = -32603;
/// The caller lacks the permission for the method (EIP-1193).
pub const UNAUTHORIZED: i32 = 4100;

/// JSON-RPC 2.0 request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.into(),
            method: method.into(),
            params: None,
        }
    }

    pub fn with_params(mut self, params: impl Serialize) -> Self {
        self.params = Some(serde_json::to_value(params).unwrap_or(Value::Null));
        self
    }
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: RequestId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: RequestId, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Returns the result if successful, or an error.
    pub fn into_result(self) -> Result<Value, JsonRpcError> {
        if let Some(error) = self.error {
            Err(error)
        } else {
            Ok(self.result.unwrap_or(Value::Null))
        }
    }
}

/// JSON-RPC 2.0 error.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Error)]
#[error("[{code}] {message}")]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR, message)
    }
}

impl From<permissions::Error> for JsonRpcError {
    fn from(e: permissions::Error) -> Self {
        match e {
            permissions::Error::Unauthorized => Self::new(UNAUTHORIZED, e.to_string()),
            permissions::Error::Execution(message) => Self::internal(message),
            permissions::Error::InvalidCaveat { .. } => Self::invalid_params(e.to_string()),
            other => Self::internal(other.to_string()),
        }
    }
}

/// Request ID (string, number, or null for unparseable requests).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    String(String),
    Number(i64),
    Null,
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_request() {
        let json = r#"{"jsonrpc":"2.0","id":"abc","method":"wallet_getPermissions"}"#;
        let req: JsonRpcRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.id, RequestId::String("abc".into()));
        assert_eq!(req.method, "wallet_getPermissions");
        assert!(req.params.is_none());
    }

    #[test]
    fn serialize_error_response() {
        let resp = JsonRpcResponse::failure(
            RequestId::Number(7),
            permissions::Error::Unauthorized.into(),
        );
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["error"]["code"], UNAUTHORIZED);
        assert!(json.get("result").is_none());
    }

    #[test]
    fn error_display() {
        let err = JsonRpcError::invalid_params("expected params [pluginId, request]");
        assert_eq!(err.to_string(), "[-32602] expected params [pluginId, request]");
    }

    #[test]
    fn null_id_round_trips() {
        let resp =
            JsonRpcResponse::failure(RequestId::Null, JsonRpcError::new(PARSE_ERROR, "bad"));
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"id\":null"));
        let back: JsonRpcResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, RequestId::Null);
    }
}
