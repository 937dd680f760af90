//! JSON-RPC 2.0 request handling.
//!
//! # Methods
//! - `reload_config() -> int`: 1 on success; failures are JSON-RPC errors
//!   whose `data` is the tagged reload outcome
//! - `system.listMethods() -> array`
//! - `system.methodHelp(name) -> string`
//! - `system.methodSignature(name) -> array`
//!
//! Introspection is read-only; `reload_config` is the only method that
//! changes anything.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::control::reload::{ReloadError, ReloadReport, ReloadResult, ReloadService};

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const RELOAD_FAILED: i64 = -32000;
pub const BUSY: i64 = -32001;

/// An incoming call.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default)]
    pub id: Value,
}

impl RpcRequest {
    pub fn new(method: impl Into<String>, params: Option<Value>, id: u64) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params,
            id: Value::from(id),
        }
    }
}

/// Error member of a response.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

/// A reply; exactly one of `result` and `error` is set.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    pub id: Value,
}

impl RpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn failure(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }
}

/// Static description of an exported method.
pub struct MethodInfo {
    pub name: &'static str,
    pub help: &'static str,
    /// Return type first, then parameter types.
    pub signature: &'static [&'static str],
}

pub const METHODS: &[MethodInfo] = &[
    MethodInfo {
        name: "reload_config",
        help: "Fetch configuration from the central authority, save it to disk and \
               signal the probe to reload it. Returns 1 on success.",
        signature: &["int"],
    },
    MethodInfo {
        name: "system.listMethods",
        help: "List the names of all exported methods.",
        signature: &["array"],
    },
    MethodInfo {
        name: "system.methodHelp",
        help: "Describe the method with the given name.",
        signature: &["string", "string"],
    },
    MethodInfo {
        name: "system.methodSignature",
        help: "List the signatures of the method with the given name.",
        signature: &["array", "string"],
    },
];

fn lookup(name: &str) -> Option<&'static MethodInfo> {
    METHODS.iter().find(|m| m.name == name)
}

/// Parse a request body and dispatch it.
pub async fn handle_body(service: &Arc<ReloadService>, body: &[u8]) -> RpcResponse {
    let value: Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(e) => {
            return RpcResponse::failure(Value::Null, RpcError::new(PARSE_ERROR, e.to_string()))
        }
    };
    let id = value.get("id").cloned().unwrap_or(Value::Null);

    let request: RpcRequest = match serde_json::from_value(value) {
        Ok(request) => request,
        Err(e) => return RpcResponse::failure(id, RpcError::new(INVALID_REQUEST, e.to_string())),
    };
    if request.jsonrpc != "2.0" {
        return RpcResponse::failure(
            request.id,
            RpcError::new(INVALID_REQUEST, "jsonrpc must be \"2.0\""),
        );
    }

    dispatch(service, request).await
}

/// Route a parsed request to its method.
pub async fn dispatch(service: &Arc<ReloadService>, request: RpcRequest) -> RpcResponse {
    let RpcRequest {
        method, params, id, ..
    } = request;
    tracing::debug!(method = %method, "RPC call");

    let outcome = match method.as_str() {
        "reload_config" => match no_params(&params) {
            Ok(()) => reload_config(service).await,
            Err(e) => Err(e),
        },
        "system.listMethods" => Ok(json!(METHODS.iter().map(|m| m.name).collect::<Vec<_>>())),
        "system.methodHelp" => method_param(&params).map(|info| json!(info.help)),
        "system.methodSignature" => method_param(&params).map(|info| json!([info.signature])),
        other => Err(RpcError::new(
            METHOD_NOT_FOUND,
            format!("method '{}' is not supported", other),
        )),
    };

    match outcome {
        Ok(result) => RpcResponse::success(id, result),
        Err(error) => RpcResponse::failure(id, error),
    }
}

async fn reload_config(service: &Arc<ReloadService>) -> Result<Value, RpcError> {
    let result = service.reload("rpc").await;
    let report = ReloadReport::from(&result);
    match result {
        ReloadResult::Applied(_) | ReloadResult::Unchanged(_) => Ok(json!(1)),
        ReloadResult::Failed(err) => {
            let code = match err {
                ReloadError::Busy => BUSY,
                _ => RELOAD_FAILED,
            };
            Err(RpcError {
                code,
                message: err.to_string(),
                data: serde_json::to_value(report).ok(),
            })
        }
    }
}

fn no_params(params: &Option<Value>) -> Result<(), RpcError> {
    match params {
        None | Some(Value::Null) => Ok(()),
        Some(Value::Array(items)) if items.is_empty() => Ok(()),
        Some(Value::Object(fields)) if fields.is_empty() => Ok(()),
        Some(_) => Err(RpcError::new(INVALID_PARAMS, "method takes no parameters")),
    }
}

fn method_param(params: &Option<Value>) -> Result<&'static MethodInfo, RpcError> {
    let name = match params {
        Some(Value::Array(items)) if items.len() == 1 => items[0].as_str(),
        _ => None,
    }
    .ok_or_else(|| RpcError::new(INVALID_PARAMS, "expected one method name"))?;

    lookup(name).ok_or_else(|| {
        RpcError::new(INVALID_PARAMS, format!("method '{}' is not supported", name))
    })
}
