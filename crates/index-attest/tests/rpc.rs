//! Integration tests for the JSON-RPC endpoint.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tokio::sync::watch;
use tower::ServiceExt;

use index_attest::core::{ChecksumHash, ChecksumRecord, EpochRange};
use index_attest::rpc::{self, RPC_PATH};
use index_attest::store::{ChecksumRepository, MemoryChecksumRepo};
use index_attest::AttestationApi;

async fn router_with_record() -> (axum::Router, ChecksumHash) {
    let repo = MemoryChecksumRepo::new(10).unwrap();
    let hash = ChecksumHash::from_bytes([0xc4; 32]);
    repo.publish(&ChecksumRecord::new(EpochRange::new(0, 9).unwrap(), hash))
        .await
        .unwrap();
    (rpc::router(AttestationApi::new(Arc::new(repo))), hash)
}

/// Helper to make raw requests.
async fn post_raw(router: &axum::Router, body: impl Into<Body>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(RPC_PATH)
        .header("Content-Type", "application/json")
        .body(body.into())
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();

    let status = response.status();
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body_bytes).unwrap_or(Value::Null))
}

async fn call(router: &axum::Router, method: &str, params: Value) -> Value {
    let body = json!({"jsonrpc": "2.0", "id": 1, "method": method, "params": params});
    let (status, response) = post_raw(router, serde_json::to_vec(&body).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["jsonrpc"], "2.0");
    assert_eq!(response["id"], 1);
    response
}

#[tokio::test]
async fn test_get_checksum() {
    let (router, hash) = router_with_record().await;

    let found = call(&router, rpc::METHOD_GET_CHECKSUM, json!([{"start": 0, "stop": 9}])).await;
    assert_eq!(found["result"], hash.to_hex());

    let absent = call(&router, rpc::METHOD_GET_CHECKSUM, json!([{"start": 10, "stop": 19}])).await;
    assert_eq!(absent["result"], "");
    assert!(absent.get("error").is_none());
}

#[tokio::test]
async fn test_checksum_exists() {
    let (router, hash) = router_with_record().await;

    let yes = call(&router, rpc::METHOD_CHECKSUM_EXISTS, json!([hash.to_hex()])).await;
    assert_eq!(yes["result"], true);

    let no = call(&router, rpc::METHOD_CHECKSUM_EXISTS, json!(["ab".repeat(32)])).await;
    assert_eq!(no["result"], false);
}

#[tokio::test]
async fn test_unknown_method() {
    let (router, _) = router_with_record().await;
    let response = call(&router, "attestation_deleteEverything", json!([])).await;
    assert_eq!(response["error"]["code"], rpc::METHOD_NOT_FOUND);
    assert!(response.get("result").is_none());
}

#[tokio::test]
async fn test_invalid_params() {
    let (router, _) = router_with_record().await;

    let missing = call(&router, rpc::METHOD_CHECKSUM_EXISTS, Value::Null).await;
    assert_eq!(missing["error"]["code"], rpc::INVALID_PARAMS);

    let malformed = call(&router, rpc::METHOD_CHECKSUM_EXISTS, json!(["not-a-hash"])).await;
    assert_eq!(malformed["error"]["code"], rpc::INVALID_PARAMS);

    let inverted = call(&router, rpc::METHOD_GET_CHECKSUM, json!([{"start": 9, "stop": 0}])).await;
    assert_eq!(inverted["error"]["code"], rpc::INVALID_PARAMS);
}

#[tokio::test]
async fn test_unparseable_body() {
    let (router, _) = router_with_record().await;
    let (status, response) = post_raw(&router, "{not json").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["error"]["code"], rpc::PARSE_ERROR);
    assert_eq!(response["id"], Value::Null);
}

#[tokio::test]
async fn test_bind_fails_when_address_in_use() {
    let held = rpc::bind("127.0.0.1:0").await.unwrap();
    let addr = held.local_addr().unwrap().to_string();

    assert!(rpc::bind(&addr).await.is_err());
}

#[tokio::test]
async fn test_serve_on_stops_on_shutdown() {
    let api = AttestationApi::new(Arc::new(MemoryChecksumRepo::new(10).unwrap()));
    let listener = rpc::bind("127.0.0.1:0").await.unwrap();
    let (tx, rx) = watch::channel(false);

    let server = tokio::spawn(rpc::serve_on(api, listener, rx));
    tx.send(true).unwrap();

    let joined = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server ignored shutdown");
    joined.unwrap().unwrap();
}
