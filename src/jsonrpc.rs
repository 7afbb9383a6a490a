//! JSON-RPC 2.0 message types and request construction.
//!
//! The wire protocol is line-delimited JSON: one document per line, each
//! terminated by `\n`. Requests carry a builder-assigned integer id;
//! responses are correlated back to their request by that id.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

// ─── Messages ────────────────────────────────────────────────────────────────

/// JSON-RPC 2.0 request message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC request.
    pub fn new(id: u64, method: &str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.to_string(),
            params,
        }
    }
}

/// JSON-RPC 2.0 response message (success or error).
///
/// `id` is `None` when the server reports a protocol-level error it could
/// not attribute to any request (`"id": null`); such responses can never be
/// correlated and surface as unsolicited messages instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub jsonrpc: String,
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

// ─── Request Builder ─────────────────────────────────────────────────────────

/// Stamps outbound method/params pairs with the protocol envelope and a
/// fresh request id.
///
/// Each builder owns its own monotonic counter starting at 1. Ids are never
/// reset or recycled within a builder's lifetime, so a late response to an
/// abandoned request can never be mistaken for a live one. Builders in the
/// same process are independent of each other.
#[derive(Debug)]
pub struct RequestBuilder {
    next_id: AtomicU64,
}

impl RequestBuilder {
    /// Create a builder whose first request carries id 1.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocate the next request id.
    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Build a request for `method` with the next available id.
    pub fn build(&self, method: &str, params: Option<serde_json::Value>) -> JsonRpcRequest {
        JsonRpcRequest::new(self.next_id(), method, params)
    }
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
