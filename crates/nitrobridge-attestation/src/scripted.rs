//! Replayable attestation client
//!
//! Serves a fixed sequence of lookup outcomes, then `Pending` forever.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use nitrobridge_types::{NitroBridgeError, Result};
use tokio::sync::Mutex;

use crate::{ApiVersion, AttestationClient, AttestationQuery, AttestationResponse};

/// One scripted lookup outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptStep {
    Pending,
    Complete {
        attestation: Vec<u8>,
        message: Option<Vec<u8>>,
    },
    NetworkError,
    Malformed,
}

#[derive(Default)]
struct Script {
    steps: VecDeque<ScriptStep>,
    queries: Vec<AttestationQuery>,
}

#[derive(Clone)]
pub struct ScriptedAttestationClient {
    version: ApiVersion,
    script: Arc<Mutex<Script>>,
}

impl ScriptedAttestationClient {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self {
            version: ApiVersion::V1,
            script: Arc::new(Mutex::new(Script {
                steps: steps.into(),
                queries: Vec::new(),
            })),
        }
    }

    /// `pending_polls` pending lookups, then complete
    pub fn pending_then_complete(pending_polls: usize, attestation: Vec<u8>, message: Option<Vec<u8>>) -> Self {
        let mut steps = vec![ScriptStep::Pending; pending_polls];
        steps.push(ScriptStep::Complete { attestation, message });
        Self::new(steps)
    }

    pub fn always_pending() -> Self {
        Self::new(Vec::new())
    }

    pub fn with_version(mut self, version: ApiVersion) -> Self {
        self.version = version;
        self
    }

    /// Append outcomes after the current script
    pub async fn push(&self, step: ScriptStep) {
        self.script.lock().await.steps.push_back(step);
    }

    pub async fn calls(&self) -> usize {
        self.script.lock().await.queries.len()
    }

    pub async fn queries(&self) -> Vec<AttestationQuery> {
        self.script.lock().await.queries.clone()
    }
}

#[async_trait]
impl AttestationClient for ScriptedAttestationClient {
    fn api_version(&self) -> ApiVersion {
        self.version
    }

    async fn fetch(&self, query: &AttestationQuery) -> Result<AttestationResponse> {
        let mut script = self.script.lock().await;
        script.queries.push(*query);
        match script.steps.pop_front().unwrap_or(ScriptStep::Pending) {
            ScriptStep::Pending => Ok(AttestationResponse::pending()),
            ScriptStep::Complete { attestation, message } => Ok(AttestationResponse::complete(attestation, message)),
            ScriptStep::NetworkError => Err(NitroBridgeError::transient("attestation lookup", "connection refused")),
            ScriptStep::Malformed => Err(NitroBridgeError::protocol("malformed attestation response: expected value")),
        }
    }
}
