//! In-process clearing relay
//!
//! Speaks enough NitroRPC to drive a [`ChannelSession`](crate::ChannelSession)
//! without a network: the auth handshake, app sessions, transfers, balances
//! and pings. Every request it receives is logged for inspection.
//! [`RelayDialer`] hands out a fresh relay per dial for reconnect tests.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::protocol::{methods, LedgerBalance, RequestEnvelope, ResponseEnvelope, RpcFrame};
use crate::transport::{Dialer, MemoryTransport, Transport};
use crate::{now_millis, ChannelError, ChannelResult};

/// Relay behaviour switches
#[derive(Debug, Clone)]
pub struct RelayOptions {
    pub reject_auth: bool,
    /// Answer `create_app_session` without an id
    pub omit_session_id: bool,
    pub fail_transfers: bool,
    /// Do not answer pings
    pub ignore_pings: bool,
    pub balances: Vec<LedgerBalance>,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            reject_auth: false,
            omit_session_id: false,
            fail_transfers: false,
            ignore_pings: false,
            balances: vec![LedgerBalance {
                asset: "ytest.usd".to_string(),
                amount: "1000".to_string(),
            }],
        }
    }
}

pub struct RelayHandle {
    log: Arc<Mutex<Vec<RequestEnvelope>>>,
    push: mpsc::UnboundedSender<String>,
    task: JoinHandle<()>,
}

impl RelayHandle {
    pub async fn requests(&self) -> Vec<RequestEnvelope> {
        self.log.lock().await.clone()
    }

    /// Methods in arrival order
    pub async fn methods(&self) -> Vec<String> {
        self.log.lock().await.iter().map(|r| r.req.method().to_string()).collect()
    }

    pub async fn count(&self, method: &str) -> usize {
        self.log.lock().await.iter().filter(|r| r.req.method() == method).count()
    }

    /// Push an unsolicited balance update
    pub fn push_balances(&self, balances: Vec<LedgerBalance>) {
        let frame = response(0, "bu", json!([balances]));
        let _ = self.push.send(frame);
    }

    /// Drop the connection from the relay side
    pub fn drop_connection(&self) {
        self.task.abort();
    }
}

impl Drop for RelayHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn response(id: u64, method: &str, params: Value) -> String {
    let envelope = ResponseEnvelope {
        res: RpcFrame::new(id, method, params, now_millis()),
        sig: Vec::new(),
    };
    serde_json::to_string(&envelope).unwrap_or_default()
}

fn answer(options: &RelayOptions, request: &RequestEnvelope, transfers: &mut u64) -> Option<String> {
    let id = request.req.id();
    let reply = match request.req.method() {
        methods::AUTH_REQUEST => response(
            id,
            methods::AUTH_CHALLENGE,
            json!({ "challenge_message": format!("challenge-{}", id) }),
        ),
        methods::AUTH_VERIFY => {
            let params = if options.reject_auth {
                json!({ "success": false })
            } else {
                json!({ "success": true, "jwt_token": "relay-jwt" })
            };
            response(id, methods::AUTH_VERIFY, params)
        }
        methods::GET_ASSETS => response(id, methods::GET_ASSETS, json!({ "assets": [{ "symbol": "ytest.usd" }] })),
        methods::GET_LEDGER_BALANCES => response(id, methods::GET_LEDGER_BALANCES, json!([options.balances])),
        methods::CREATE_APP_SESSION => {
            let params = if options.omit_session_id {
                json!({ "status": "open" })
            } else {
                json!([{ "app_session_id": format!("0xsession{:04}", id), "status": "open" }])
            };
            response(id, methods::CREATE_APP_SESSION, params)
        }
        methods::TRANSFER if options.fail_transfers => {
            response(id, methods::ERROR, json!({ "error": "insufficient off-chain balance" }))
        }
        methods::TRANSFER => {
            *transfers += 1;
            response(id, methods::TRANSFER, json!({ "transactions": [{ "id": *transfers }] }))
        }
        methods::PING if options.ignore_pings => return None,
        methods::PING => response(id, methods::PONG, json!([])),
        other => response(id, methods::ERROR, json!({ "error": format!("unsupported method {}", other) })),
    };
    Some(reply)
}

/// Start a relay; returns the client end of the connection
pub fn spawn_relay(options: RelayOptions) -> (MemoryTransport, RelayHandle) {
    let (client, mut server) = MemoryTransport::pair();
    let log = Arc::new(Mutex::new(Vec::new()));
    let (push_tx, mut push_rx) = mpsc::unbounded_channel::<String>();

    let task_log = log.clone();
    let task = tokio::spawn(async move {
        let mut transfers = 0u64;
        loop {
            tokio::select! {
                frame = server.recv() => {
                    let Some(Ok(text)) = frame else { break };
                    let request: RequestEnvelope = match serde_json::from_str(&text) {
                        Ok(request) => request,
                        Err(e) => {
                            debug!(error = %e, "Relay ignoring malformed request");
                            continue;
                        }
                    };
                    let reply = answer(&options, &request, &mut transfers);
                    task_log.lock().await.push(request);
                    if let Some(reply) = reply {
                        if server.send(reply).await.is_err() {
                            break;
                        }
                    }
                }
                Some(pushed) = push_rx.recv() => {
                    if server.send(pushed).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    (
        client,
        RelayHandle {
            log,
            push: push_tx,
            task,
        },
    )
}

// ============================================================================
// Dialer
// ============================================================================

#[derive(Default)]
struct DialerState {
    relays: Vec<RelayHandle>,
    refusals: usize,
    attempts: usize,
}

/// Dialer that starts a new relay for every connection
#[derive(Clone)]
pub struct RelayDialer {
    options: RelayOptions,
    state: Arc<Mutex<DialerState>>,
}

impl RelayDialer {
    pub fn new(options: RelayOptions) -> Self {
        Self {
            options,
            state: Arc::new(Mutex::new(DialerState::default())),
        }
    }

    /// Fail the next `count` dials
    pub async fn refuse(&self, count: usize) {
        self.state.lock().await.refusals = count;
    }

    /// Connections handed out so far
    pub async fn connections(&self) -> usize {
        self.state.lock().await.relays.len()
    }

    /// Dial attempts, refused ones included
    pub async fn attempts(&self) -> usize {
        self.state.lock().await.attempts
    }

    /// Drop the most recent connection from the relay side
    pub async fn drop_connection(&self) {
        if let Some(relay) = self.state.lock().await.relays.last() {
            relay.drop_connection();
        }
    }

    /// Methods seen by the most recent relay
    pub async fn latest_methods(&self) -> Vec<String> {
        let state = self.state.lock().await;
        match state.relays.last() {
            Some(relay) => relay.methods().await,
            None => Vec::new(),
        }
    }
}

#[async_trait]
impl Dialer for RelayDialer {
    async fn dial(&self) -> ChannelResult<Box<dyn Transport>> {
        let mut state = self.state.lock().await;
        state.attempts += 1;
        if state.refusals > 0 {
            state.refusals -= 1;
            return Err(ChannelError::Transport("connection refused".to_string()));
        }
        let (transport, relay) = spawn_relay(self.options.clone());
        state.relays.push(relay);
        Ok(Box::new(transport))
    }
}
