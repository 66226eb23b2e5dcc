//! JSON-RPC 2.0 transport for [`AttestationApi`].
//!
//! A single endpoint, `POST /rpc/v0`, accepts one request object per call:
//!
//! - `attestation_checksumExists` with params `[hash]` returns a bool
//! - `attestation_getChecksum` with params `[{"start": n, "stop": n}]`
//!   returns the hex hash, or `""` when nothing was published for the range

use axum::body::Bytes;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::watch;

use index_attest_core::Epoch;

use crate::api::AttestationApi;
use crate::attestor::stopped;
use crate::error::{AttestError, Result};

/// Path the router serves.
pub const RPC_PATH: &str = "/rpc/v0";

pub const METHOD_CHECKSUM_EXISTS: &str = "attestation_checksumExists";
pub const METHOD_GET_CHECKSUM: &str = "attestation_getChecksum";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const SERVER_ERROR: i64 = -32000;

#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    fn ok(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    fn err(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RangeParam {
    start: Epoch,
    stop: Epoch,
}

/// Build the RPC router.
pub fn router(api: AttestationApi) -> Router {
    Router::new()
        .route(RPC_PATH, post(handle_rpc))
        .with_state(api)
}

/// Bind the RPC listener.
pub async fn bind(addr: &str) -> Result<TcpListener> {
    Ok(TcpListener::bind(addr).await?)
}

/// Serve the RPC router on `listener` until `shutdown` becomes true.
pub async fn serve_on(
    api: AttestationApi,
    listener: TcpListener,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    tracing::info!(addr = %listener.local_addr()?, path = RPC_PATH, "serving attestation RPC");

    axum::serve(listener, router(api))
        .with_graceful_shutdown(async move { stopped(&mut shutdown).await })
        .await?;

    tracing::info!("attestation RPC shut down");
    Ok(())
}

async fn handle_rpc(State(api): State<AttestationApi>, body: Bytes) -> Json<RpcResponse> {
    let request: RpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) if e.is_syntax() || e.is_eof() => {
            return Json(RpcResponse::err(Value::Null, PARSE_ERROR, e.to_string()));
        }
        Err(e) => {
            return Json(RpcResponse::err(Value::Null, INVALID_REQUEST, e.to_string()));
        }
    };

    if request.jsonrpc.as_deref().is_some_and(|v| v != "2.0") {
        return Json(RpcResponse::err(
            request.id,
            INVALID_REQUEST,
            "jsonrpc must be \"2.0\"",
        ));
    }

    tracing::debug!(method = %request.method, "rpc call");
    let id = request.id.clone();
    let response = match dispatch(&api, &request.method, request.params).await {
        Ok(result) => RpcResponse::ok(id, result),
        Err((code, message)) => {
            if code == SERVER_ERROR {
                tracing::error!(method = %request.method, error = %message, "rpc call failed");
            }
            RpcResponse::err(id, code, message)
        }
    };
    Json(response)
}

async fn dispatch(
    api: &AttestationApi,
    method: &str,
    params: Value,
) -> std::result::Result<Value, (i64, String)> {
    match method {
        METHOD_CHECKSUM_EXISTS => {
            let (hash,): (String,) = parse_params(params)?;
            let exists = api.checksum_exists(&hash).await.map_err(error_code)?;
            Ok(Value::Bool(exists))
        }
        METHOD_GET_CHECKSUM => {
            let (range,): (RangeParam,) = parse_params(params)?;
            let hash = api
                .get_checksum(range.start, range.stop)
                .await
                .map_err(error_code)?;
            Ok(Value::String(hash))
        }
        other => Err((METHOD_NOT_FOUND, format!("method not found: {}", other))),
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(
    params: Value,
) -> std::result::Result<T, (i64, String)> {
    serde_json::from_value(params).map_err(|e| (INVALID_PARAMS, format!("invalid params: {}", e)))
}

fn error_code(err: AttestError) -> (i64, String) {
    match err {
        AttestError::Core(e) => (INVALID_PARAMS, e.to_string()),
        other => (SERVER_ERROR, other.to_string()),
    }
}
