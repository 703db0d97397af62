//! Channel session actor and handle
//!
//! The actor owns the transport and multiplexes three sources with
//! `tokio::select!`: commands from handles, inbound frames, and the
//! keepalive ticker. Pending requests wait on a oneshot keyed by request id;
//! when the socket ends every pending request fails with `Closed`, and
//! requests whose caller gave up are swept on the next dispatch or tick.
//!
//! Sessions opened through a [`Dialer`] keep their actor when the relay
//! drops. A supervisor task redials after `reconnect_delay`, doubling the
//! wait up to `max_reconnect_delay`, and authenticates the new transport.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use nitrobridge_types::{duration_secs, Address, MeterEvent, TokenAmount};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::meter::{MeterLedger, SettlementIntent};
use crate::protocol::{self, methods, Allowance, Inbound, InboundMessage, LedgerBalance, RequestEnvelope, RpcFrame};
use crate::signer::MessageSigner;
use crate::transport::{Dialer, Transport, WsDialer};
use crate::{now_millis, ChannelError, ChannelResult, ChannelSessionState, ConnectionStatus};

/// Session configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub ws_url: String,
    pub application: String,
    pub scope: String,
    /// Asset used for allocations, transfers and metering
    pub asset: String,
    pub allowances: Vec<Allowance>,
    #[serde(with = "duration_secs")]
    pub keepalive_interval: Duration,
    #[serde(with = "duration_secs")]
    pub session_expiry: Duration,
    /// Also bounds the WebSocket handshake
    #[serde(with = "duration_secs")]
    pub request_timeout: Duration,
    #[serde(with = "duration_secs")]
    pub reconnect_delay: Duration,
    #[serde(with = "duration_secs")]
    pub max_reconnect_delay: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            ws_url: "wss://clearnet-sandbox.yellow.com/ws".to_string(),
            application: "NitroBridge".to_string(),
            scope: "console".to_string(),
            asset: "ytest.usd".to_string(),
            allowances: vec![Allowance {
                asset: "ytest.usd".to_string(),
                amount: "10000".to_string(),
            }],
            keepalive_interval: Duration::from_secs(30),
            session_expiry: Duration::from_secs(24 * 60 * 60),
            request_timeout: Duration::from_secs(15),
            reconnect_delay: Duration::from_secs(5),
            max_reconnect_delay: Duration::from_secs(60),
        }
    }
}

// ============================================================================
// Actor
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum SignWith {
    Identity,
    SessionKey,
}

enum Command {
    Request {
        method: &'static str,
        params: Value,
        sign_with: SignWith,
        reply: oneshot::Sender<ChannelResult<InboundMessage>>,
    },
    /// Install a freshly dialed transport; replies with its generation
    Attach {
        transport: Box<dyn Transport>,
        reply: oneshot::Sender<u64>,
    },
    /// Drop the current transport but keep the session
    Detach,
    Disconnect {
        reply: oneshot::Sender<()>,
    },
}

struct PendingRequest {
    method: &'static str,
    reply: oneshot::Sender<ChannelResult<InboundMessage>>,
}

struct SessionActor {
    transport: Option<Box<dyn Transport>>,
    commands: mpsc::Receiver<Command>,
    state: watch::Sender<ChannelSessionState>,
    pending: HashMap<u64, PendingRequest>,
    next_id: u64,
    identity: Arc<dyn MessageSigner>,
    session_key: Arc<dyn MessageSigner>,
    keepalive: Duration,
    /// Present when a supervisor redials; receives the generation that was lost
    lost: Option<mpsc::UnboundedSender<u64>>,
    generation: u64,
}

async fn next_frame(transport: &mut Option<Box<dyn Transport>>) -> Option<ChannelResult<String>> {
    match transport {
        Some(transport) => transport.recv().await,
        None => std::future::pending().await,
    }
}

impl SessionActor {
    async fn run(mut self) {
        let period = self.keepalive.max(Duration::from_millis(1));
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Request { method, params, sign_with, reply }) => {
                        self.dispatch(method, params, sign_with, Some(reply)).await;
                    }
                    Some(Command::Attach { transport, reply }) => {
                        self.attach(transport).await;
                        let _ = reply.send(self.generation);
                    }
                    Some(Command::Detach) => {
                        self.detach(ConnectionStatus::Error, Some("authentication failed".to_string())).await;
                    }
                    Some(Command::Disconnect { reply }) => {
                        self.shutdown(ConnectionStatus::Disconnected, None).await;
                        let _ = reply.send(());
                        return;
                    }
                    None => {
                        self.shutdown(ConnectionStatus::Disconnected, None).await;
                        return;
                    }
                },
                frame = next_frame(&mut self.transport) => match frame {
                    Some(Ok(text)) => self.handle_frame(&text),
                    Some(Err(e)) => {
                        warn!(error = %e, "Channel transport failed");
                        if !self.lose(ConnectionStatus::Error, e.to_string()).await {
                            return;
                        }
                    }
                    None => {
                        info!("Channel closed by relay");
                        if !self.lose(ConnectionStatus::Disconnected, "closed by relay".to_string()).await {
                            return;
                        }
                    }
                },
                _ = ticker.tick() => {
                    self.sweep();
                    let connected = self.state.borrow().status == ConnectionStatus::Connected;
                    if connected {
                        debug!("Keepalive ping");
                        self.dispatch(methods::PING, json!([]), SignWith::SessionKey, None).await;
                    }
                }
            }
        }
    }

    async fn dispatch(
        &mut self,
        method: &'static str,
        params: Value,
        sign_with: SignWith,
        reply: Option<oneshot::Sender<ChannelResult<InboundMessage>>>,
    ) {
        self.sweep();
        let id = self.next_id;
        self.next_id += 1;

        let frame = RpcFrame::new(id, method, params, now_millis());
        let result = self.send_frame(frame, sign_with).await;

        if method == methods::AUTH_REQUEST && result.is_ok() {
            self.update(|s| s.status = ConnectionStatus::Authenticating);
        }

        match (result, reply) {
            (Ok(()), Some(reply)) => {
                self.pending.insert(id, PendingRequest { method, reply });
                self.publish_pending();
            }
            (Err(e), Some(reply)) => {
                let _ = reply.send(Err(e));
            }
            (Err(e), None) => warn!(method, error = %e, "Unsolicited send failed"),
            (Ok(()), None) => {}
        }
    }

    async fn send_frame(&mut self, frame: RpcFrame, sign_with: SignWith) -> ChannelResult<()> {
        if self.transport.is_none() {
            return Err(ChannelError::Closed);
        }
        let signer = match sign_with {
            SignWith::Identity => &self.identity,
            SignWith::SessionKey => &self.session_key,
        };
        let payload = serde_json::to_value(&frame).map_err(|e| ChannelError::Protocol(e.to_string()))?;
        let signature = signer.sign(&payload).await?;
        let envelope = RequestEnvelope {
            req: frame,
            sig: vec![signature],
        };
        let text = serde_json::to_string(&envelope).map_err(|e| ChannelError::Protocol(e.to_string()))?;
        match self.transport.as_mut() {
            Some(transport) => transport.send(text).await,
            None => Err(ChannelError::Closed),
        }
    }

    /// Forget requests whose caller stopped waiting
    fn sweep(&mut self) {
        let before = self.pending.len();
        self.pending.retain(|_, pending| !pending.reply.is_closed());
        let evicted = before - self.pending.len();
        if evicted > 0 {
            debug!(evicted, "Dropped abandoned requests");
            self.publish_pending();
        }
    }

    fn publish_pending(&self) {
        let count = self.pending.len();
        self.update(|s| s.pending_requests = count);
    }

    fn handle_frame(&mut self, text: &str) {
        let message = match protocol::decode(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Dropping undecodable frame");
                return;
            }
        };

        match &message.body {
            Inbound::Assets(assets) => {
                let assets = assets.clone();
                self.update(|s| s.assets = assets);
            }
            Inbound::LedgerBalances(balances) => {
                let balances = balances.clone();
                self.update(|s| s.ledger_balances = balances);
            }
            Inbound::AppSessionCreated {
                app_session_id: Some(id),
            } => {
                let id = id.clone();
                self.update(|s| s.session_id = Some(id));
            }
            Inbound::AuthVerify { success, jwt_token } => {
                let (success, token) = (*success, jwt_token.clone());
                self.update(|s| {
                    if success {
                        s.status = ConnectionStatus::Connected;
                        s.auth_token = token;
                        s.last_error = None;
                    } else {
                        s.status = ConnectionStatus::Error;
                        s.last_error = Some("authentication rejected".to_string());
                    }
                });
            }
            _ => {}
        }

        let Some(pending) = self.pending.remove(&message.id) else {
            match &message.body {
                Inbound::Error { message: reason } => {
                    warn!(reason = %reason, "Relay reported an error");
                    let reason = reason.clone();
                    self.update(|s| s.last_error = Some(reason));
                }
                Inbound::Pong => debug!("Pong"),
                other => debug!(message = ?other, "Unsolicited message"),
            }
            return;
        };

        self.publish_pending();

        let result = match message.body {
            Inbound::Error { message: reason } => Err(ChannelError::Rejected {
                method: pending.method.to_string(),
                message: reason,
            }),
            _ => Ok(message),
        };
        // The caller may have timed out already.
        let _ = pending.reply.send(result);
    }

    fn update(&self, apply: impl FnOnce(&mut ChannelSessionState)) {
        self.state.send_modify(apply);
    }

    async fn attach(&mut self, transport: Box<dyn Transport>) {
        if let Some(mut previous) = self.transport.replace(transport) {
            previous.close().await;
        }
        self.generation += 1;
        debug!(generation = self.generation, "Transport attached");
        self.update(|s| s.status = ConnectionStatus::Connecting);
    }

    /// React to the relay going away; returns false when the actor should stop
    async fn lose(&mut self, status: ConnectionStatus, reason: String) -> bool {
        match self.lost.clone() {
            Some(lost) => {
                self.detach(status, Some(reason)).await;
                let _ = lost.send(self.generation);
                true
            }
            None => {
                self.shutdown(status, Some(reason)).await;
                false
            }
        }
    }

    async fn detach(&mut self, status: ConnectionStatus, reason: Option<String>) {
        if let Some(mut transport) = self.transport.take() {
            transport.close().await;
        }
        for (_, pending) in self.pending.drain() {
            let _ = pending.reply.send(Err(ChannelError::Closed));
        }
        self.update(|s| {
            s.status = status;
            s.auth_token = None;
            s.pending_requests = 0;
            if reason.is_some() {
                s.last_error = reason;
            }
        });
    }

    async fn shutdown(&mut self, status: ConnectionStatus, reason: Option<String>) {
        self.detach(status, reason).await;
        self.commands.close();
    }
}

// ============================================================================
// Handle
// ============================================================================

/// Cloneable handle to a running session
#[derive(Clone)]
pub struct ChannelSession {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<ChannelSessionState>,
    config: Arc<ChannelConfig>,
    identity: Address,
    session_key: Arc<dyn MessageSigner>,
    meter: Arc<Mutex<Option<MeterLedger>>>,
}

impl ChannelSession {
    /// Dial the configured relay and authenticate; drops are redialed
    pub async fn connect_ws(
        config: ChannelConfig,
        identity: Arc<dyn MessageSigner>,
        session_key: Arc<dyn MessageSigner>,
    ) -> ChannelResult<Self> {
        let dialer = WsDialer::new(config.ws_url.clone(), config.request_timeout);
        Self::connect_with_dialer(Arc::new(dialer), config, identity, session_key).await
    }

    /// Dial through `dialer` and authenticate. When the relay later drops
    /// the connection the session redials and authenticates again.
    pub async fn connect_with_dialer(
        dialer: Arc<dyn Dialer>,
        config: ChannelConfig,
        identity: Arc<dyn MessageSigner>,
        session_key: Arc<dyn MessageSigner>,
    ) -> ChannelResult<Self> {
        let transport = dialer.dial().await?;
        let (lost_tx, lost_rx) = mpsc::unbounded_channel();
        let session = Self::start(transport, config, identity, session_key, Some(lost_tx)).await?;

        let supervisor = Reconnector {
            dialer,
            commands: session.commands.downgrade(),
            state: session.state.clone(),
            config: session.config.clone(),
            identity: session.identity,
            session_key: session.session_key.clone(),
            meter: session.meter.clone(),
        };
        tokio::spawn(supervisor.run(lost_rx, FIRST_GENERATION));
        Ok(session)
    }

    /// Start the actor on `transport` and run the authentication handshake.
    ///
    /// After authentication the assets and ledger balances are fetched;
    /// failures there are logged and do not fail the connection. The session
    /// ends for good when `transport` closes.
    pub async fn connect<T: Transport>(
        transport: T,
        config: ChannelConfig,
        identity: Arc<dyn MessageSigner>,
        session_key: Arc<dyn MessageSigner>,
    ) -> ChannelResult<Self> {
        Self::start(Box::new(transport), config, identity, session_key, None).await
    }

    async fn start(
        transport: Box<dyn Transport>,
        config: ChannelConfig,
        identity: Arc<dyn MessageSigner>,
        session_key: Arc<dyn MessageSigner>,
        lost: Option<mpsc::UnboundedSender<u64>>,
    ) -> ChannelResult<Self> {
        let (command_tx, command_rx) = mpsc::channel(64);
        let (state_tx, state_rx) = watch::channel(ChannelSessionState {
            status: ConnectionStatus::Connecting,
            ..Default::default()
        });

        let actor = SessionActor {
            transport: Some(transport),
            commands: command_rx,
            state: state_tx,
            pending: HashMap::new(),
            next_id: 1,
            identity: identity.clone(),
            session_key: session_key.clone(),
            keepalive: config.keepalive_interval,
            lost,
            generation: FIRST_GENERATION,
        };
        tokio::spawn(actor.run());

        let session = Self {
            commands: command_tx,
            state: state_rx,
            config: Arc::new(config),
            identity: identity.address(),
            session_key,
            meter: Arc::new(Mutex::new(None)),
        };

        if let Err(e) = session.authenticate().await {
            warn!(error = %e, "Channel authentication failed");
            session.disconnect().await;
            return Err(e);
        }
        info!(address = %session.identity, "Channel session authenticated");

        if let Err(e) = session.request(methods::GET_ASSETS, json!({}), SignWith::SessionKey).await {
            warn!(error = %e, "Failed to fetch assets");
        }
        if let Err(e) = session.refresh_balances().await {
            warn!(error = %e, "Failed to fetch ledger balances");
        }
        Ok(session)
    }

    /// Attach a freshly dialed transport and authenticate on it
    async fn reestablish(&self, dialer: &dyn Dialer) -> ChannelResult<u64> {
        let transport = dialer.dial().await?;
        let (reply, attached) = oneshot::channel();
        self.commands
            .send(Command::Attach { transport, reply })
            .await
            .map_err(|_| ChannelError::Closed)?;
        let generation = attached.await.map_err(|_| ChannelError::Closed)?;

        if let Err(e) = self.authenticate().await {
            let _ = self.commands.send(Command::Detach).await;
            return Err(e);
        }
        if let Err(e) = self.refresh_balances().await {
            warn!(error = %e, "Failed to fetch ledger balances after reconnect");
        }
        Ok(generation)
    }

    async fn authenticate(&self) -> ChannelResult<()> {
        let expires_at = chrono::Utc::now().timestamp() + self.config.session_expiry.as_secs() as i64;
        let params = protocol::auth_request_params(
            &self.identity.to_string(),
            &self.session_key.address().to_string(),
            &self.config.application,
            &self.config.scope,
            expires_at,
            &self.config.allowances,
        );

        let challenge = match self.request(methods::AUTH_REQUEST, params, SignWith::SessionKey).await?.body {
            Inbound::AuthChallenge { challenge } => challenge,
            other => {
                return Err(ChannelError::Protocol(format!("expected auth_challenge, got {:?}", other)));
            }
        };

        let verify = self
            .request(methods::AUTH_VERIFY, protocol::auth_verify_params(&challenge), SignWith::Identity)
            .await?;
        match verify.body {
            Inbound::AuthVerify { success: true, .. } => Ok(()),
            Inbound::AuthVerify { success: false, .. } => Err(ChannelError::Rejected {
                method: methods::AUTH_VERIFY.to_string(),
                message: "authentication rejected".to_string(),
            }),
            other => Err(ChannelError::Protocol(format!("expected auth_verify, got {:?}", other))),
        }
    }

    async fn request(&self, method: &'static str, params: Value, sign_with: SignWith) -> ChannelResult<InboundMessage> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Request {
                method,
                params,
                sign_with,
                reply,
            })
            .await
            .map_err(|_| ChannelError::Closed)?;

        match tokio::time::timeout(self.config.request_timeout, response).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ChannelError::Closed),
            Err(_) => Err(ChannelError::Timeout {
                method: method.to_string(),
            }),
        }
    }

    fn require_connected(&self) -> ChannelResult<()> {
        match self.status() {
            ConnectionStatus::Connected => Ok(()),
            status => Err(ChannelError::NotConnected { status }),
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.state.borrow().status
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    pub fn state(&self) -> ChannelSessionState {
        self.state.borrow().clone()
    }

    /// Watch for state changes
    pub fn subscribe(&self) -> watch::Receiver<ChannelSessionState> {
        self.state.clone()
    }

    pub fn address(&self) -> Address {
        self.identity
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Open an app session with `counterparty` (self when `None`).
    ///
    /// The relay must return the session id; a response without one is a
    /// protocol violation and no session is recorded.
    pub async fn create_app_session(&self, counterparty: Option<Address>) -> ChannelResult<String> {
        self.require_connected()?;
        let counterparty = counterparty.unwrap_or(self.identity);
        let params = protocol::create_app_session_params(
            &self.config.application,
            [&self.identity.to_string(), &counterparty.to_string()],
            &self.config.asset,
            now_millis(),
        );

        let response = self
            .request(methods::CREATE_APP_SESSION, params, SignWith::SessionKey)
            .await?;
        let session_id = match response.body {
            Inbound::AppSessionCreated {
                app_session_id: Some(id),
            } => id,
            Inbound::AppSessionCreated { app_session_id: None } => {
                return Err(ChannelError::Protocol(
                    "create_app_session response carried no app_session_id".to_string(),
                ));
            }
            other => {
                return Err(ChannelError::Protocol(format!("expected create_app_session, got {:?}", other)));
            }
        };

        *self.meter.lock().await = Some(MeterLedger::new(
            session_id.clone(),
            self.config.asset.clone(),
            self.identity,
            counterparty,
        ));
        info!(session_id = %session_id, counterparty = %counterparty, "App session opened");
        Ok(session_id)
    }

    /// Off-chain transfer of `amount` to `destination`; returns a reference
    /// to the relay's record of it
    pub async fn transfer(&self, destination: Address, amount: TokenAmount) -> ChannelResult<String> {
        self.require_connected()?;
        if amount.is_zero() {
            return Err(ChannelError::InvalidAmount("transfer amount must be positive".to_string()));
        }
        let params = protocol::transfer_params(&destination.to_string(), &self.config.asset, &amount.to_human());
        let response = self.request(methods::TRANSFER, params, SignWith::SessionKey).await?;

        let reference = match &response.body {
            Inbound::Transferred { params } => transfer_reference(params),
            _ => None,
        }
        .unwrap_or_else(|| format!("nitrorpc-{}", response.id));
        debug!(reference = %reference, destination = %destination, amount = %amount, "Channel transfer accepted");
        Ok(reference)
    }

    /// Fetch and publish the current off-chain balances
    pub async fn refresh_balances(&self) -> ChannelResult<Vec<LedgerBalance>> {
        let params = protocol::ledger_balances_params(&self.identity.to_string());
        match self
            .request(methods::GET_LEDGER_BALANCES, params, SignWith::SessionKey)
            .await?
            .body
        {
            Inbound::LedgerBalances(balances) => Ok(balances),
            other => Err(ChannelError::Protocol(format!("expected ledger balances, got {:?}", other))),
        }
    }

    pub async fn ping(&self) -> ChannelResult<()> {
        self.request(methods::PING, json!([]), SignWith::SessionKey).await.map(|_| ())
    }

    /// Sign and append a meter event against the open app session
    pub async fn record_meter_event(&self, action: &str, amount: TokenAmount) -> ChannelResult<MeterEvent> {
        self.require_connected()?;
        let mut meter = self.meter.lock().await;
        let ledger = meter.as_mut().ok_or(ChannelError::NoAppSession)?;
        let event = ledger
            .record(self.session_key.as_ref(), action, amount, chrono::Utc::now().timestamp_millis())
            .await?;
        debug!(action, amount = %amount, nonce = event.nonce, "Meter event recorded");
        Ok(event)
    }

    pub async fn meter_events(&self) -> Vec<MeterEvent> {
        self.meter
            .lock()
            .await
            .as_ref()
            .map(|m| m.events().to_vec())
            .unwrap_or_default()
    }

    pub async fn settlement_intent(&self) -> ChannelResult<SettlementIntent> {
        self.meter
            .lock()
            .await
            .as_ref()
            .map(MeterLedger::settlement_intent)
            .ok_or(ChannelError::NoAppSession)
    }

    /// Close the socket; pending requests fail and keepalive stops
    pub async fn disconnect(&self) {
        let (reply, done) = oneshot::channel();
        if self.commands.send(Command::Disconnect { reply }).await.is_ok() {
            let _ = done.await;
        }
    }
}

// ============================================================================
// Reconnect
// ============================================================================

const FIRST_GENERATION: u64 = 1;

/// Redials after the relay drops a session. Holds only a weak command
/// sender so dropping every handle still ends the actor.
struct Reconnector {
    dialer: Arc<dyn Dialer>,
    commands: mpsc::WeakSender<Command>,
    state: watch::Receiver<ChannelSessionState>,
    config: Arc<ChannelConfig>,
    identity: Address,
    session_key: Arc<dyn MessageSigner>,
    meter: Arc<Mutex<Option<MeterLedger>>>,
}

impl Reconnector {
    fn session(&self) -> Option<ChannelSession> {
        let commands = self.commands.upgrade()?;
        if commands.is_closed() {
            return None;
        }
        Some(ChannelSession {
            commands,
            state: self.state.clone(),
            config: self.config.clone(),
            identity: self.identity,
            session_key: self.session_key.clone(),
            meter: self.meter.clone(),
        })
    }

    async fn run(self, mut lost: mpsc::UnboundedReceiver<u64>, mut current: u64) {
        while let Some(generation) = lost.recv().await {
            // A transport that failed during an earlier attempt.
            if generation < current {
                continue;
            }
            let mut delay = self.config.reconnect_delay;
            let mut attempt = 0u32;
            loop {
                tokio::time::sleep(delay).await;
                attempt += 1;
                let Some(session) = self.session() else {
                    return;
                };
                match session.reestablish(self.dialer.as_ref()).await {
                    Ok(generation) => {
                        current = generation;
                        info!(attempt, generation, "Channel session re-established");
                        break;
                    }
                    Err(_) if session.commands.is_closed() => return,
                    Err(e) => {
                        delay = (delay * 2).min(self.config.max_reconnect_delay);
                        warn!(attempt, error = %e, retry_in = ?delay, "Channel reconnect failed");
                    }
                }
            }
        }
        debug!("Reconnect supervisor stopped");
    }
}

fn transfer_reference(params: &Value) -> Option<String> {
    let tx = params
        .get("transactions")
        .and_then(|t| t.as_array())
        .and_then(|t| t.first())
        .unwrap_or(params);
    let tx = match tx {
        Value::Array(items) => items.first()?,
        other => other,
    };
    match tx.get("id").or_else(|| tx.get("tx_id"))? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_reference_shapes() {
        assert_eq!(
            transfer_reference(&json!({"transactions": [{"id": 42}]})),
            Some("42".to_string())
        );
        assert_eq!(transfer_reference(&json!([{"tx_id": "abc"}])), Some("abc".to_string()));
        assert_eq!(transfer_reference(&json!({"status": "ok"})), None);
    }

    #[test]
    fn test_config_defaults() {
        let config = ChannelConfig::default();
        assert_eq!(config.application, "NitroBridge");
        assert_eq!(config.keepalive_interval, Duration::from_secs(30));
        assert_eq!(config.allowances[0].amount, "10000");
        assert_eq!(config.reconnect_delay, Duration::from_secs(5));
        assert!(config.max_reconnect_delay >= config.reconnect_delay);
    }
}
