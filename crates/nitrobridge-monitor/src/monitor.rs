//! Margin Monitor - one polling loop per account
//!
//! Each monitored account gets its own task, so a hung read for one account
//! never delays another. Cycles for one account never overlap: a cycle runs
//! inside the loop, and ticks missed while it ran are dropped, not queued.
//! Stopping waits for the in-flight cycle to finish. Start and stop are
//! serialized per account, so draining one account's loop never holds up
//! another account's lifecycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use nitrobridge_decision::{DecisionRequest, DecisionRouter};
use nitrobridge_ledger::{ConfirmationPolicy, CreditPolicy, LedgerClient, RetryPolicy};
use nitrobridge_types::{duration_secs, Account, Address, CreditLine, NitroBridgeError, Result, TokenAmount, TxHash};
use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::executor::{TopUpExecutor, DEFAULT_SUBMIT_TIMEOUT};
use crate::policy::{assess, Assessment, DEFAULT_THRESHOLD_RATIO};

/// `monitor` configuration section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    #[serde(with = "duration_secs")]
    pub interval: Duration,
    pub default_threshold: f64,
    /// Budget for the credit reads of one cycle
    #[serde(with = "duration_secs")]
    pub cycle_read_timeout: Duration,
    /// Budget for getting one top-up accepted by the node
    #[serde(with = "duration_secs")]
    pub submit_timeout: Duration,
    pub confirmation: ConfirmationPolicy,
    pub retry: RetryPolicy,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            default_threshold: DEFAULT_THRESHOLD_RATIO,
            cycle_read_timeout: Duration::from_secs(30),
            submit_timeout: DEFAULT_SUBMIT_TIMEOUT,
            confirmation: ConfirmationPolicy::default(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Per-account settings given at start
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MonitorOptions {
    /// Defaults to the configured threshold
    pub threshold_ratio: Option<f64>,
    /// Fixed top-up amount instead of the computed one
    pub top_up_override: Option<TokenAmount>,
}

impl MonitorOptions {
    /// Fill the threshold from the owner's published credit policy.
    /// An explicit threshold wins; `None` when the owner has turned
    /// automatic top-ups off.
    pub fn with_policy(self, policy: &CreditPolicy) -> Option<Self> {
        if !policy.auto_top_up_enabled {
            return None;
        }
        Some(Self {
            threshold_ratio: self.threshold_ratio.or(Some(policy.threshold_ratio())),
            ..self
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TopUpTrigger {
    Threshold,
    Decision,
}

/// Result of one cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    NoCreditLine,
    NoAction {
        assessment: Assessment,
        /// Reason given by the decision router, when consulted
        decision: Option<String>,
    },
    ToppedUp {
        trigger: TopUpTrigger,
        amount: TokenAmount,
        settlement_tx: TxHash,
        channel_tx_ref: Option<String>,
    },
    TopUpFailed {
        trigger: TopUpTrigger,
        amount: TokenAmount,
        error: String,
    },
    ReadFailed {
        error: String,
    },
}

/// Live state of one monitored account
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorTarget {
    pub account: Account,
    pub threshold_ratio: f64,
    pub top_up_override: Option<TokenAmount>,
    pub last_check_at: Option<DateTime<Utc>>,
    pub last_top_up_at: Option<DateTime<Utc>>,
    /// Cycles started
    pub cycles: u64,
    /// Ticks dropped because a cycle overran the interval
    pub skipped_ticks: u64,
    pub last_outcome: Option<CycleOutcome>,
}

impl MonitorTarget {
    fn new(account: Account, threshold_ratio: f64, top_up_override: Option<TokenAmount>) -> Self {
        Self {
            account,
            threshold_ratio,
            top_up_override,
            last_check_at: None,
            last_top_up_at: None,
            cycles: 0,
            skipped_ticks: 0,
            last_outcome: None,
        }
    }
}

struct MonitorHandle {
    target: Arc<RwLock<MonitorTarget>>,
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Signal the loop and wait for its in-flight cycle
    async fn halt(self, address: &Address) -> MonitorTarget {
        let _ = self.stop.send(());
        Self::drain(address, self.target, self.task).await
    }

    async fn drain(address: &Address, target: Arc<RwLock<MonitorTarget>>, task: JoinHandle<()>) -> MonitorTarget {
        if let Err(e) = task.await {
            error!(account = %address, error = %e, "Monitor loop ended abnormally");
        }
        let last = target.read().await.clone();
        last
    }
}

/// At most one loop per account lives in its slot
type Slot = Arc<Mutex<Option<MonitorHandle>>>;

/// Everything one cycle needs
#[derive(Clone)]
struct CycleContext {
    ledger: Arc<dyn LedgerClient>,
    executor: Arc<TopUpExecutor>,
    router: Option<Arc<DecisionRouter>>,
    read_timeout: Duration,
}

impl CycleContext {
    async fn run_cycle(&self, target: &RwLock<MonitorTarget>) -> CycleOutcome {
        let (address, threshold, override_amount) = {
            let mut t = target.write().await;
            t.cycles += 1;
            t.last_check_at = Some(Utc::now());
            (t.account.address, t.threshold_ratio, t.top_up_override)
        };

        let outcome = self.evaluate(address, threshold, override_amount).await;

        let mut t = target.write().await;
        if matches!(outcome, CycleOutcome::ToppedUp { .. }) {
            t.last_top_up_at = Some(Utc::now());
        }
        t.last_outcome = Some(outcome.clone());
        outcome
    }

    async fn read(&self, address: Address) -> Result<(CreditLine, TokenAmount)> {
        let reads = async {
            let line = self.ledger.credit_line(address).await?;
            let available = self.ledger.available_credit(address).await?;
            Ok::<_, NitroBridgeError>((line, available))
        };
        tokio::time::timeout(self.read_timeout, reads)
            .await
            .map_err(|_| NitroBridgeError::timeout("credit reads", self.read_timeout))?
    }

    async fn evaluate(&self, address: Address, threshold: f64, override_amount: Option<TokenAmount>) -> CycleOutcome {
        let (line, available) = match self.read(address).await {
            Ok(reading) => reading,
            Err(e) => {
                warn!(account = %address, error = %e, "Credit read failed, retrying next cycle");
                return CycleOutcome::ReadFailed { error: e.to_string() };
            }
        };

        let assessment = assess(&line, available, threshold, override_amount);
        debug!(
            account = %address,
            available = %available,
            limit = %line.credit_limit,
            utilization = line.utilization_pct(),
            assessment = ?assessment,
            "Cycle assessed"
        );

        match assessment {
            Assessment::NoCreditLine => {
                info!(account = %address, "No credit line established, skipping");
                CycleOutcome::NoCreditLine
            }
            Assessment::TopUp { ratio, amount } => {
                info!(
                    account = %address,
                    ratio,
                    threshold,
                    amount = %amount,
                    "Available credit below threshold, topping up"
                );
                self.top_up(address, amount, TopUpTrigger::Threshold).await
            }
            other => {
                let Some(router) = &self.router else {
                    return CycleOutcome::NoAction {
                        assessment: other,
                        decision: None,
                    };
                };
                let routed = router.decide(&DecisionRequest::from_credit(address, &line)).await;
                if routed.decision.wants_top_up() {
                    info!(
                        account = %address,
                        amount = %routed.decision.amount,
                        reason = %routed.decision.reason,
                        fallback = routed.is_fallback(),
                        "Decision advised a top-up"
                    );
                    return self.top_up(address, routed.decision.amount, TopUpTrigger::Decision).await;
                }
                CycleOutcome::NoAction {
                    assessment: other,
                    decision: Some(routed.decision.reason),
                }
            }
        }
    }

    async fn top_up(&self, address: Address, amount: TokenAmount, trigger: TopUpTrigger) -> CycleOutcome {
        match self.executor.execute(address, amount).await {
            Ok(outcome) => CycleOutcome::ToppedUp {
                trigger,
                amount,
                settlement_tx: outcome.settlement_tx,
                channel_tx_ref: outcome.channel_tx_ref,
            },
            Err(e) => {
                error!(account = %address, amount = %amount, error = %e, "Top-up failed, next cycle retries");
                CycleOutcome::TopUpFailed {
                    trigger,
                    amount,
                    error: e.to_string(),
                }
            }
        }
    }
}

async fn run_loop(
    ctx: CycleContext,
    target: Arc<RwLock<MonitorTarget>>,
    interval: Duration,
    mut stop: oneshot::Receiver<()>,
) {
    let account = target.read().await.account.clone();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            // Also fires when the handle is dropped.
            _ = &mut stop => break,
            _ = ticker.tick() => {
                let started = Instant::now();
                ctx.run_cycle(&target).await;
                let elapsed = started.elapsed();
                if elapsed >= interval {
                    let skipped = (elapsed.as_millis() / interval.as_millis().max(1)) as u64;
                    target.write().await.skipped_ticks += skipped;
                    warn!(
                        account = %account,
                        elapsed_ms = elapsed.as_millis() as u64,
                        skipped,
                        "Cycle overran its interval, skipping missed ticks"
                    );
                    ticker.reset();
                }
            }
        }
    }
    debug!(account = %account, "Monitor loop exited");
}

/// Registry of per-account monitoring loops
pub struct MarginMonitor {
    ledger: Arc<dyn LedgerClient>,
    executor: Arc<TopUpExecutor>,
    router: Option<Arc<DecisionRouter>>,
    config: MonitorConfig,
    slots: DashMap<Address, Slot>,
    /// Live targets, readable without touching a slot
    targets: DashMap<Address, Arc<RwLock<MonitorTarget>>>,
    authorization_checked: AtomicBool,
}

impl MarginMonitor {
    /// The executor's submission budget is taken from `config`
    pub fn new(executor: TopUpExecutor, config: MonitorConfig) -> Self {
        let executor = executor.with_submit_timeout(config.submit_timeout);
        Self {
            ledger: executor.ledger().clone(),
            executor: Arc::new(executor),
            router: None,
            config,
            slots: DashMap::new(),
            targets: DashMap::new(),
            authorization_checked: AtomicBool::new(false),
        }
    }

    /// Consult `router` on cycles where the threshold rule does not fire
    pub fn with_decision_router(mut self, router: Arc<DecisionRouter>) -> Self {
        self.router = Some(router);
        self
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    fn context(&self) -> CycleContext {
        CycleContext {
            ledger: self.ledger.clone(),
            executor: self.executor.clone(),
            router: self.router.clone(),
            read_timeout: self.config.cycle_read_timeout,
        }
    }

    fn slot(&self, address: Address) -> Slot {
        self.slots.entry(address).or_default().clone()
    }

    /// Whether the signing agent may top up on the credit terminal; `None`
    /// when the check itself failed
    pub async fn check_authorization(&self) -> Option<bool> {
        let agent = self.ledger.signer();
        match self.ledger.is_authorized_agent(agent).await {
            Ok(true) => {
                info!(agent = %agent, "Agent authorized on credit terminal");
                Some(true)
            }
            Ok(false) => {
                warn!(agent = %agent, "Agent is not authorized on the credit terminal, top-ups will revert");
                Some(false)
            }
            Err(e) => {
                warn!(agent = %agent, error = %e, "Could not check agent authorization");
                None
            }
        }
    }

    /// Start a loop for `account`, replacing any loop already running for it
    pub async fn start_monitoring(&self, account: Account, options: MonitorOptions) -> Result<()> {
        if account.chain != self.ledger.chain().key {
            return Err(NitroBridgeError::invalid_input(
                "account",
                format!("monitor runs on '{}', not '{}'", self.ledger.chain().key, account.chain),
            ));
        }
        let threshold = options.threshold_ratio.unwrap_or(self.config.default_threshold);
        if !(threshold > 0.0 && threshold < 1.0) {
            return Err(NitroBridgeError::invalid_input(
                "threshold_ratio",
                format!("{} is not between 0 and 1", threshold),
            ));
        }

        if !self.authorization_checked.swap(true, Ordering::SeqCst) {
            self.check_authorization().await;
        }

        let slot = self.slot(account.address);
        let mut current = slot.lock().await;
        if let Some(previous) = current.take() {
            info!(account = %account, "Replacing existing monitor");
            previous.halt(&account.address).await;
        }

        let target = Arc::new(RwLock::new(MonitorTarget::new(
            account.clone(),
            threshold,
            options.top_up_override,
        )));
        let (stop, stop_rx) = oneshot::channel();
        let interval = self.config.interval.max(Duration::from_millis(1));
        let task = tokio::spawn(run_loop(self.context(), target.clone(), interval, stop_rx));
        self.targets.insert(account.address, target.clone());
        *current = Some(MonitorHandle { target, stop, task });

        info!(
            account = %account,
            threshold,
            interval_secs = interval.as_secs(),
            "Monitoring started"
        );
        Ok(())
    }

    /// Stop monitoring `address`; returns the final target state
    pub async fn stop_monitoring(&self, address: &Address) -> Option<MonitorTarget> {
        let slot = self.slots.get(address).map(|s| s.value().clone())?;
        let mut current = slot.lock().await;
        let handle = current.take()?;
        self.targets.remove(address);
        let stopped = handle.halt(address).await;
        info!(account = %address, "Monitoring stopped");
        Some(stopped)
    }

    /// Signal every loop, then wait for all in-flight cycles
    pub async fn stop_all(&self) -> Vec<MonitorTarget> {
        let mut addresses: Vec<Address> = self.slots.iter().map(|e| *e.key()).collect();
        addresses.sort();

        let mut draining = Vec::with_capacity(addresses.len());
        for address in addresses {
            let Some(slot) = self.slots.get(&address).map(|s| s.value().clone()) else {
                continue;
            };
            let mut current = slot.lock_owned().await;
            if let Some(MonitorHandle { target, stop, task }) = current.take() {
                self.targets.remove(&address);
                let _ = stop.send(());
                draining.push((address, target, task, current));
            }
        }

        let mut stopped = Vec::with_capacity(draining.len());
        for (address, target, task, _slot) in draining {
            stopped.push(MonitorHandle::drain(&address, target, task).await);
        }
        info!(count = stopped.len(), "All monitors stopped");
        stopped
    }

    pub fn is_monitoring(&self, address: &Address) -> bool {
        self.targets.contains_key(address)
    }

    pub async fn target(&self, address: &Address) -> Option<MonitorTarget> {
        let target = self.targets.get(address).map(|t| t.value().clone())?;
        let snapshot = target.read().await.clone();
        Some(snapshot)
    }

    pub async fn targets(&self) -> Vec<MonitorTarget> {
        let targets: Vec<_> = self.targets.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::with_capacity(targets.len());
        for target in targets {
            out.push(target.read().await.clone());
        }
        out
    }
}
