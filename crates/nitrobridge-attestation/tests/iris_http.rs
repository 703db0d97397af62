//! HTTP client against a local mock service

use std::time::Duration;

use nitrobridge_attestation::{
    await_attestation, ApiVersion, AttestationClient, AttestationQuery, IrisClient, PollPolicy,
};
use nitrobridge_types::{Bytes32, TxHash};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn query() -> AttestationQuery {
    AttestationQuery {
        message_hash: Bytes32([0x11; 32]),
        source_domain: 0,
        burn_tx: TxHash([0x22; 32]),
    }
}

#[tokio::test]
async fn test_v1_not_found_is_pending() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/attestations/{}", "11".repeat(32))))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = IrisClient::new(server.uri(), ApiVersion::V1, Duration::from_secs(5)).unwrap();
    let response = client.fetch(&query()).await.unwrap();
    assert!(!response.is_ready());
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = IrisClient::new(server.uri(), ApiVersion::V2, Duration::from_secs(5)).unwrap();
    let err = client.fetch(&query()).await.unwrap_err();
    assert!(err.is_retriable());
}

#[tokio::test]
async fn test_v2_poll_until_complete() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/messages/0"))
        .and(query_param("transactionHash", format!("0x{}", "22".repeat(32))))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messages": [{ "status": "pending_confirmations", "attestation": "PENDING" }]
        })))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/messages/0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messages": [{ "status": "complete", "attestation": "0xaabb", "message": "0x0102" }]
        })))
        .mount(&server)
        .await;

    let client = IrisClient::new(server.uri(), ApiVersion::V2, Duration::from_secs(5)).unwrap();
    let policy = PollPolicy {
        interval: Duration::from_millis(10),
        timeout: Duration::from_secs(5),
    };
    let done = await_attestation(&client, &query(), &policy).await.unwrap();
    assert_eq!(done.polls, 3);
    assert_eq!(done.attestation, vec![0xaa, 0xbb]);
    assert_eq!(done.message, Some(vec![0x01, 0x02]));
}
