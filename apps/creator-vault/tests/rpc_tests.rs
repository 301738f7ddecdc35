//! Integration tests for the JSON-RPC fallback client.
//!
//! Uses wiremock to stand in for Ethereum nodes.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use creator_vault::rpc::{RpcClient, RpcError};
use creator_vault_core::Address;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn ok_result(result: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "jsonrpc": "2.0", "id": 1, "result": result }))
}

#[tokio::test]
async fn test_no_endpoints() {
    let client = RpcClient::new(Vec::new()).unwrap();
    let err = client.block_number().await.unwrap_err();
    assert!(matches!(err, RpcError::NoEndpoints));
}

#[tokio::test]
async fn test_block_number() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "eth_blockNumber" })))
        .respond_with(ok_result(json!("0x1b4")))
        .mount(&server)
        .await;

    let client = RpcClient::new(vec![server.uri()]).unwrap();
    assert_eq!(client.block_number().await.unwrap(), 436);
}

#[tokio::test]
async fn test_falls_back_to_next_url() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/primary"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/secondary"))
        .respond_with(ok_result(json!("0x6080")))
        .expect(1)
        .mount(&server)
        .await;

    let client = RpcClient::new(vec![
        format!("{}/primary", server.uri()),
        format!("{}/secondary", server.uri()),
    ])
    .unwrap();
    assert!(client.has_code(&Address([1u8; 20])).await.unwrap());
}

#[tokio::test]
async fn test_rpc_error_body_falls_back() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/a"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": -32000, "message": "header not found" },
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/b"))
        .respond_with(ok_result(json!("0x")))
        .mount(&server)
        .await;

    let client = RpcClient::new(vec![
        format!("{}/a", server.uri()),
        format!("{}/b", server.uri()),
    ])
    .unwrap();
    assert!(!client.has_code(&Address([1u8; 20])).await.unwrap());
}

#[tokio::test]
async fn test_all_endpoints_failing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = RpcClient::new(vec![
        format!("{}/a", server.uri()),
        format!("{}/b", server.uri()),
    ])
    .unwrap();
    match client.get_code(&Address([1u8; 20])).await.unwrap_err() {
        RpcError::AllFailed { attempts, last } => {
            assert_eq!(attempts, 2);
            assert!(last.contains("503"));
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_zero_code_is_not_a_contract() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ok_result(json!("0x0000")))
        .mount(&server)
        .await;

    let client = RpcClient::new(vec![server.uri()]).unwrap();
    assert!(!client.has_code(&Address([1u8; 20])).await.unwrap());
}

#[tokio::test]
async fn test_non_string_result_is_invalid() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ok_result(json!(42)))
        .mount(&server)
        .await;

    let client = RpcClient::new(vec![server.uri()]).unwrap();
    let err = client.get_code(&Address([1u8; 20])).await.unwrap_err();
    assert!(matches!(err, RpcError::InvalidResult(_)));
}
