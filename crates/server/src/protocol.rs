//! Wire messages.
//!
//! One JSON object per line in each direction:
//!
//! ```text
//! → {"id": 1, "method": "tasks/prioritize", "params": {"completed_ids": [3]}}
//! ← {"id": 1, "result": [ ...annotated tasks... ]}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use taskrank_prioritization::PrioritizeError;
use taskrank_storage::StorageError;

/// Error codes carried in [`RpcError::code`].
pub mod error_codes {
    /// Request line is not valid JSON
    pub const PARSE_ERROR: i32 = -32700;
    /// Unknown method
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Params missing, malformed or failing validation
    pub const INVALID_PARAMS: i32 = -32602;
    /// Storage or other internal failure
    pub const INTERNAL_ERROR: i32 = -32603;
    /// Referenced task does not exist
    pub const NOT_FOUND: i32 = -32004;
    /// No scorer is loaded
    pub const SCORER_UNAVAILABLE: i32 = -32010;
}

/// Incoming request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Echoed back in the response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    /// Operation name, e.g. `tasks/prioritize`
    pub method: String,
    /// Operation arguments
    #[serde(default)]
    pub params: Value,
}

impl Request {
    /// Build a request without an id.
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            id: None,
            method: method.into(),
            params,
        }
    }
}

/// Outgoing response. Exactly one of `result` and `error` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Request id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    /// Result data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl Response {
    /// Successful response.
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self { id, result: Some(result), error: None }
    }

    /// Failed response.
    pub fn failure(id: Option<Value>, error: RpcError) -> Self {
        Self { id, result: None, error: Some(error) }
    }
}

/// Error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    /// One of [`error_codes`]
    pub code: i32,
    /// Human-readable message
    pub message: String,
    /// Extra details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    /// Error without details.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), data: None }
    }

    /// Malformed params.
    pub fn invalid_params(e: impl std::fmt::Display) -> Self {
        Self::new(error_codes::INVALID_PARAMS, format!("Invalid params: {}", e))
    }
}

impl From<StorageError> for RpcError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(id) => Self {
                code: error_codes::NOT_FOUND,
                message: e.to_string(),
                data: Some(serde_json::json!({ "id": id })),
            },
            StorageError::Validation(_) => Self::new(error_codes::INVALID_PARAMS, e.to_string()),
            other => Self::new(error_codes::INTERNAL_ERROR, other.to_string()),
        }
    }
}

impl From<PrioritizeError> for RpcError {
    fn from(e: PrioritizeError) -> Self {
        match e {
            PrioritizeError::ScorerUnavailable { .. } => {
                Self::new(error_codes::SCORER_UNAVAILABLE, e.to_string())
            }
            other => Self::new(error_codes::INTERNAL_ERROR, other.to_string()),
        }
    }
}
