//! HTTP attestation client
//!
//! v1: `GET {base}/attestations/{hash}` -> `{status, attestation}`
//! v2: `GET {base}/v2/messages/{domain}?transactionHash={tx}` -> `{messages: [{status, attestation, message}]}`

use std::time::Duration;

use async_trait::async_trait;
use nitrobridge_types::{parse_hex_bytes, NitroBridgeError, Result};
use serde::Deserialize;
use tracing::debug;

use crate::{ApiVersion, AttestationClient, AttestationQuery, AttestationResponse};

/// Circle sandbox endpoint
pub const SANDBOX_BASE_URL: &str = "https://iris-api-sandbox.circle.com";

/// Attestation service over HTTP
#[derive(Debug, Clone)]
pub struct IrisClient {
    base_url: String,
    version: ApiVersion,
    client: reqwest::Client,
}

impl IrisClient {
    pub fn new(base_url: impl Into<String>, version: ApiVersion, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| NitroBridgeError::configuration(format!("HTTP client: {}", e)))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            version,
            client,
        })
    }

    pub fn sandbox(version: ApiVersion) -> Result<Self> {
        Self::new(SANDBOX_BASE_URL, version, Duration::from_secs(15))
    }

    /// Lookup URL for the configured generation
    pub fn url_for(&self, query: &AttestationQuery) -> String {
        match self.version {
            ApiVersion::V1 => {
                let hash = query.message_hash.to_string();
                format!(
                    "{}/attestations/{}",
                    self.base_url,
                    hash.trim_start_matches("0x")
                )
            }
            ApiVersion::V2 => format!(
                "{}/v2/messages/{}?transactionHash={}",
                self.base_url, query.source_domain, query.burn_tx
            ),
        }
    }
}

#[derive(Deserialize)]
struct V1Body {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    attestation: Option<String>,
}

#[derive(Deserialize)]
struct V2Body {
    #[serde(default)]
    messages: Vec<V2Message>,
}

#[derive(Deserialize)]
struct V2Message {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    attestation: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

fn malformed(reason: impl std::fmt::Display) -> NitroBridgeError {
    NitroBridgeError::protocol(format!("malformed attestation response: {}", reason))
}

fn decode_hex_field(field: &str, value: &str) -> Result<Vec<u8>> {
    parse_hex_bytes(value).map_err(|_| malformed(format!("{} is not hex", field)))
}

/// Parse a v1 body; the signature is only read once status is `complete`
pub fn parse_v1(body: &str) -> Result<AttestationResponse> {
    let parsed: V1Body = serde_json::from_str(body).map_err(malformed)?;
    match (parsed.status.as_deref(), parsed.attestation) {
        (Some("complete"), Some(attestation)) => Ok(AttestationResponse::complete(
            decode_hex_field("attestation", &attestation)?,
            None,
        )),
        _ => Ok(AttestationResponse::pending()),
    }
}

/// Parse a v2 body; only the first message of the burn transaction is used
pub fn parse_v2(body: &str) -> Result<AttestationResponse> {
    let parsed: V2Body = serde_json::from_str(body).map_err(malformed)?;
    let Some(first) = parsed.messages.into_iter().next() else {
        return Ok(AttestationResponse::pending());
    };
    match (first.status.as_deref(), first.attestation) {
        (Some("complete"), Some(attestation)) => {
            let message = first
                .message
                .map(|m| decode_hex_field("message", &m))
                .transpose()?;
            Ok(AttestationResponse::complete(
                decode_hex_field("attestation", &attestation)?,
                message,
            ))
        }
        _ => Ok(AttestationResponse::pending()),
    }
}

#[async_trait]
impl AttestationClient for IrisClient {
    fn api_version(&self) -> ApiVersion {
        self.version
    }

    async fn fetch(&self, query: &AttestationQuery) -> Result<AttestationResponse> {
        let url = self.url_for(query);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| NitroBridgeError::transient("attestation lookup", e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            debug!(url = %url, "Attestation not indexed yet");
            return Ok(AttestationResponse::pending());
        }
        if !status.is_success() {
            return Err(NitroBridgeError::transient(
                "attestation lookup",
                format!("HTTP {}", status),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| NitroBridgeError::transient("attestation lookup", e.to_string()))?;
        match self.version {
            ApiVersion::V1 => parse_v1(&body),
            ApiVersion::V2 => parse_v2(&body),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nitrobridge_types::{Bytes32, TxHash};

    fn query() -> AttestationQuery {
        AttestationQuery {
            message_hash: Bytes32([0xab; 32]),
            source_domain: 0,
            burn_tx: TxHash([0xcd; 32]),
        }
    }

    #[test]
    fn test_v1_url_strips_prefix() {
        let client = IrisClient::new("https://iris.example/", ApiVersion::V1, Duration::from_secs(1)).unwrap();
        assert_eq!(
            client.url_for(&query()),
            format!("https://iris.example/attestations/{}", "ab".repeat(32))
        );
    }

    #[test]
    fn test_v2_url_uses_domain_and_tx() {
        let client = IrisClient::new("https://iris.example", ApiVersion::V2, Duration::from_secs(1)).unwrap();
        assert_eq!(
            client.url_for(&query()),
            format!("https://iris.example/v2/messages/0?transactionHash=0x{}", "cd".repeat(32))
        );
    }

    #[test]
    fn test_v1_pending_placeholder_ignored() {
        let parsed = parse_v1(r#"{"status":"pending_confirmations","attestation":"PENDING"}"#).unwrap();
        assert!(!parsed.is_ready());
    }

    #[test]
    fn test_v1_complete() {
        let parsed = parse_v1(r#"{"status":"complete","attestation":"0x0102"}"#).unwrap();
        assert!(parsed.is_ready());
        assert_eq!(parsed.attestation, Some(vec![1, 2]));
    }

    #[test]
    fn test_v2_complete_carries_message() {
        let parsed =
            parse_v2(r#"{"messages":[{"status":"complete","attestation":"0xaa","message":"0xbbcc"}]}"#).unwrap();
        assert!(parsed.is_ready());
        assert_eq!(parsed.message, Some(vec![0xbb, 0xcc]));
    }

    #[test]
    fn test_v2_empty_is_pending() {
        assert!(!parse_v2(r#"{"messages":[]}"#).unwrap().is_ready());
        assert!(!parse_v2(r#"{}"#).unwrap().is_ready());
    }

    #[test]
    fn test_malformed_body() {
        let err = parse_v2("<html>").unwrap_err();
        assert_eq!(err.error_code(), "PROTOCOL_VIOLATION");
        let err = parse_v1(r#"{"status":"complete","attestation":"zz"}"#).unwrap_err();
        assert_eq!(err.error_code(), "PROTOCOL_VIOLATION");
    }
}
