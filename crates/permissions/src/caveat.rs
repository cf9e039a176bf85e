use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A typed restriction attached to a permission.
///
/// The engine only looks at `type`; the value is interpreted by the
/// target's own implementation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Caveat {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: Value,
}

impl Caveat {
    pub fn new(kind: impl Into<String>, value: Value) -> Self {
        Self {
            kind: kind.into(),
            value,
        }
    }
}
