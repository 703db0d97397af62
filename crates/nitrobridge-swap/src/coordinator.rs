//! Commit-Reveal Coordinator
//!
//! Drives one trader's swap on one pool through
//! `IDLE -> COMMITTED -> REVEALED -> EXECUTED`; any failed step moves it to
//! `ERROR`, from which only a fresh commit starts over. Steps are serialized
//! by holding the state lock for the whole step, and every submission is
//! confirmed before the next step may begin.
//!
//! The nonce lives only in process memory until `reveal` submits it.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use nitrobridge_ledger::abi::{commitment_hash, pool_id, REQUIRE_COMMIT_HOOK_DATA};
use nitrobridge_ledger::{confirm, ConfirmationPolicy, LedgerClient, RetryPolicy};
use nitrobridge_types::{
    duration_secs, Address, Bytes32, Commitment, NitroBridgeError, PoolKey, Result, SwapPhase, SwapRequest,
    TokenAmount, TxHash, TxReceipt,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// `swap` configuration section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwapConfig {
    /// Blocks between commit inclusion and reveal inclusion
    pub min_commit_age: u64,
    /// `false` sells currency1 for currency0
    pub zero_for_one: bool,
    #[serde(with = "duration_secs")]
    pub block_poll_interval: Duration,
    /// Upper bound on waiting for a commitment to mature
    #[serde(with = "duration_secs")]
    pub maturity_timeout: Duration,
    pub confirmation: ConfirmationPolicy,
    pub retry: RetryPolicy,
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            min_commit_age: 1,
            zero_for_one: false,
            block_poll_interval: Duration::from_secs(2),
            maturity_timeout: Duration::from_secs(120),
            confirmation: ConfirmationPolicy::default(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Observable progress of one commit-reveal swap; never carries the nonce
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwapStatus {
    pub trader: Address,
    pub pool_id: Bytes32,
    pub phase: SwapPhase,
    pub amount: Option<TokenAmount>,
    pub commitment_hash: Option<Bytes32>,
    pub commit_block: Option<u64>,
    pub commit_tx: Option<TxHash>,
    pub reveal_tx: Option<TxHash>,
    pub swap_tx: Option<TxHash>,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone)]
struct CommitSecret {
    amount: TokenAmount,
    nonce: Bytes32,
    hash: Bytes32,
}

impl fmt::Debug for CommitSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommitSecret")
            .field("amount", &self.amount)
            .field("nonce", &"[REDACTED]")
            .field("hash", &self.hash)
            .finish()
    }
}

struct SwapState {
    status: SwapStatus,
    secret: Option<CommitSecret>,
}

impl SwapState {
    fn set_phase(&mut self, phase: SwapPhase) {
        self.status.phase = phase;
        self.status.updated_at = Utc::now();
    }
}

pub struct CommitRevealCoordinator {
    ledger: Arc<dyn LedgerClient>,
    pool_key: PoolKey,
    pool_id: Bytes32,
    config: SwapConfig,
    state: Mutex<SwapState>,
}

impl CommitRevealCoordinator {
    /// The pool must be hooked by the chain's commit-reveal hook, and the
    /// chain must have a pool manager.
    pub fn new(ledger: Arc<dyn LedgerClient>, pool_key: PoolKey, config: SwapConfig) -> Result<Self> {
        let chain = ledger.chain();
        let hook = chain.commit_hook()?;
        chain.pool_manager()?;
        if pool_key.hooks != hook {
            return Err(NitroBridgeError::configuration(format!(
                "pool hook {} is not the commit-reveal hook {} on {}",
                pool_key.hooks, hook, chain.key
            )));
        }

        let pool_id = pool_id(&pool_key);
        let status = SwapStatus {
            trader: ledger.signer(),
            pool_id,
            phase: SwapPhase::Idle,
            amount: None,
            commitment_hash: None,
            commit_block: None,
            commit_tx: None,
            reveal_tx: None,
            swap_tx: None,
            last_error: None,
            updated_at: Utc::now(),
        };
        Ok(Self {
            ledger,
            pool_key,
            pool_id,
            config,
            state: Mutex::new(SwapState { status, secret: None }),
        })
    }

    pub fn pool_id(&self) -> Bytes32 {
        self.pool_id
    }

    pub fn pool_key(&self) -> &PoolKey {
        &self.pool_key
    }

    pub fn trader(&self) -> Address {
        self.ledger.signer()
    }

    pub async fn status(&self) -> SwapStatus {
        self.state.lock().await.status.clone()
    }

    pub async fn phase(&self) -> SwapPhase {
        self.state.lock().await.status.phase
    }

    /// Commit, wait for maturity, reveal and swap
    pub async fn run(&self, amount: TokenAmount) -> Result<SwapStatus> {
        self.commit(amount).await?;
        self.wait_until_revealable().await?;
        self.reveal().await?;
        self.execute_swap().await?;
        Ok(self.status().await)
    }

    /// Hide `amount` behind a fresh random nonce and commit its hash.
    ///
    /// Committing again before revealing is submitted as-is; whether the
    /// ledger replaced the earlier commitment or kept it is read back and
    /// reported, never assumed.
    pub async fn commit(&self, amount: TokenAmount) -> Result<TxHash> {
        if amount.is_zero() {
            return Err(NitroBridgeError::invalid_input("amount", "must be positive"));
        }
        let mut state = self.state.lock().await;
        if state.status.phase == SwapPhase::Revealed {
            return Err(NitroBridgeError::InvalidState {
                reason: "a revealed commitment is waiting for its swap".to_string(),
            });
        }

        let trader = self.trader();
        let nonce = Bytes32(rand::random::<[u8; 32]>());
        let hash = commitment_hash(amount, &nonce, &trader);
        let secret = CommitSecret { amount, nonce, hash };
        let earlier = state.secret.clone().filter(|_| state.status.phase == SwapPhase::Committed);

        let pool = self.pool_id;
        let submitted = self.submit("commit", || self.ledger.commit(hash, pool)).await;

        let on_chain = match &submitted {
            Ok(_) => self.on_chain_commitment().await,
            // A reverted re-commit may leave the earlier commitment standing.
            Err(NitroBridgeError::TransactionReverted { .. }) if earlier.is_some() => self.on_chain_commitment().await,
            Err(_) => Ok(None),
        };

        match (submitted, on_chain) {
            (Ok(receipt), Ok(Some(c))) if c.hash == hash => {
                if earlier.is_some() {
                    info!(trader = %trader, pool_id = %pool, "Ledger replaced the earlier pending commitment");
                }
                state.secret = Some(secret);
                let status = &mut state.status;
                status.amount = Some(amount);
                status.commitment_hash = Some(hash);
                status.commit_block = Some(c.block_number);
                status.commit_tx = Some(receipt.tx_hash);
                status.reveal_tx = None;
                status.swap_tx = None;
                status.last_error = None;
                state.set_phase(SwapPhase::Committed);
                info!(
                    trader = %trader,
                    pool_id = %pool,
                    amount = %amount,
                    block = c.block_number,
                    tx = %receipt.tx_hash,
                    "Commitment recorded"
                );
                Ok(receipt.tx_hash)
            }
            (result, Ok(Some(c))) if earlier.as_ref().is_some_and(|e| e.hash == c.hash) => {
                let err = match result {
                    Err(e) => e,
                    Ok(_) => NitroBridgeError::LedgerRejected {
                        operation: "commit".to_string(),
                        reason: "ledger kept the earlier pending commitment".to_string(),
                    },
                };
                warn!(
                    trader = %trader,
                    pool_id = %pool,
                    error = %err,
                    "Ledger kept the earlier pending commitment"
                );
                state.status.last_error = Some(err.to_string());
                Err(err)
            }
            (Err(e), _) | (Ok(_), Err(e)) => Err(self.fail(&mut state, "commit", e)),
            (Ok(receipt), Ok(_)) => {
                let err = NitroBridgeError::protocol(format!(
                    "commit {} confirmed but the ledger holds no matching commitment",
                    receipt.tx_hash
                ));
                Err(self.fail(&mut state, "commit", err))
            }
        }
    }

    /// Submit the stored amount and nonce.
    ///
    /// Rejected locally, with nothing submitted, while the commitment is too
    /// young or when the stored secret no longer hashes to the on-chain
    /// commitment. A mismatch is final.
    pub async fn reveal(&self) -> Result<TxHash> {
        let mut state = self.state.lock().await;
        if state.status.phase != SwapPhase::Committed {
            return Err(NitroBridgeError::InvalidState {
                reason: format!("cannot reveal in phase {}", state.status.phase),
            });
        }
        let Some(secret) = state.secret.clone() else {
            return Err(NitroBridgeError::internal("committed phase without a stored secret"));
        };

        let commitment = match self.on_chain_commitment().await? {
            Some(c) => c,
            None => {
                let err = NitroBridgeError::InvalidState {
                    reason: format!("no commitment on-chain for pool {}", self.pool_id),
                };
                return Err(self.fail(&mut state, "reveal", err));
            }
        };

        let trader = self.trader();
        let recomputed = commitment_hash(secret.amount, &secret.nonce, &trader);
        if recomputed != commitment.hash {
            let err = NitroBridgeError::HashMismatch {
                expected: commitment.hash.to_string(),
                actual: recomputed.to_string(),
            };
            return Err(self.fail(&mut state, "reveal", err));
        }

        self.check_maturity(&commitment).await?;

        let (amount, nonce, key) = (secret.amount, secret.nonce, self.pool_key);
        match self.submit("reveal", || self.ledger.reveal(amount, nonce, &key)).await {
            Ok(receipt) => {
                state.status.reveal_tx = Some(receipt.tx_hash);
                state.set_phase(SwapPhase::Revealed);
                info!(trader = %trader, pool_id = %self.pool_id, tx = %receipt.tx_hash, "Commitment revealed");
                Ok(receipt.tx_hash)
            }
            Err(e) => Err(self.fail(&mut state, "reveal", e)),
        }
    }

    /// Swap the revealed amount, tagged so the hook checks the reveal
    pub async fn execute_swap(&self) -> Result<TxHash> {
        let mut state = self.state.lock().await;
        if state.status.phase != SwapPhase::Revealed {
            return Err(NitroBridgeError::InvalidState {
                reason: format!("cannot swap in phase {}", state.status.phase),
            });
        }
        let Some(amount) = state.secret.as_ref().map(|s| s.amount) else {
            return Err(NitroBridgeError::internal("revealed phase without a stored amount"));
        };

        if let Err(e) = self.ensure_allowance(amount).await {
            return Err(self.fail(&mut state, "approve", e));
        }

        let request = SwapRequest {
            zero_for_one: self.config.zero_for_one,
            amount_in: amount,
        };
        let key = self.pool_key;
        match self
            .submit("swap", || self.ledger.swap(&key, request, REQUIRE_COMMIT_HOOK_DATA))
            .await
        {
            Ok(receipt) => {
                state.status.swap_tx = Some(receipt.tx_hash);
                state.secret = None;
                state.set_phase(SwapPhase::Executed);
                info!(
                    trader = %self.trader(),
                    pool_id = %self.pool_id,
                    amount = %amount,
                    tx = %receipt.tx_hash,
                    "Swap executed"
                );
                Ok(receipt.tx_hash)
            }
            Err(e) => Err(self.fail(&mut state, "swap", e)),
        }
    }

    /// Poll block height until a reveal would be accepted
    pub async fn wait_until_revealable(&self) -> Result<()> {
        let started = Instant::now();
        loop {
            let commitment = self
                .on_chain_commitment()
                .await?
                .ok_or_else(|| NitroBridgeError::InvalidState {
                    reason: format!("no commitment on-chain for pool {}", self.pool_id),
                })?;
            match self.check_maturity(&commitment).await {
                Ok(()) => return Ok(()),
                Err(NitroBridgeError::RevealTooEarly { current_block, earliest_block }) => {
                    if started.elapsed() >= self.config.maturity_timeout {
                        return Err(NitroBridgeError::timeout("commitment maturity", started.elapsed()));
                    }
                    debug!(current_block, earliest_block, "Waiting for commitment to mature");
                    tokio::time::sleep(self.config.block_poll_interval).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    // ── Internals ────────────────────────────────────────────────────────────

    async fn on_chain_commitment(&self) -> Result<Option<Commitment>> {
        self.ledger.commitment(self.trader(), self.pool_id).await
    }

    /// A reveal lands no earlier than the block after the current one
    async fn check_maturity(&self, commitment: &Commitment) -> Result<()> {
        let current_block = self.ledger.block_number().await?;
        let min_age = self.config.min_commit_age;
        if commitment.is_mature(current_block.saturating_add(1), min_age) {
            Ok(())
        } else {
            Err(NitroBridgeError::RevealTooEarly {
                current_block,
                earliest_block: commitment.earliest_reveal_block(min_age),
            })
        }
    }

    async fn ensure_allowance(&self, amount: TokenAmount) -> Result<()> {
        let chain = self.ledger.chain();
        let input = if self.config.zero_for_one {
            self.pool_key.currency0
        } else {
            self.pool_key.currency1
        };
        if input != chain.contracts.usdc {
            debug!(token = %input, "Input token is not the configured stablecoin, no approval");
            return Ok(());
        }
        let pool_manager = chain.pool_manager()?;
        let current = self.ledger.allowance(self.trader(), pool_manager).await?;
        if current >= amount {
            debug!(allowance = %current, "Pool manager allowance sufficient");
            return Ok(());
        }
        self.submit("approve", || self.ledger.approve(pool_manager, amount)).await?;
        Ok(())
    }

    async fn submit<F, Fut>(&self, operation: &str, op: F) -> Result<TxReceipt>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<TxHash>>,
    {
        let tx = self.config.retry.run(operation, op).await?;
        debug!(operation, tx = %tx, "Submitted, awaiting confirmation");
        confirm(self.ledger.as_ref(), tx, operation, &self.config.confirmation).await
    }

    fn fail(&self, state: &mut SwapState, step: &str, err: NitroBridgeError) -> NitroBridgeError {
        warn!(
            trader = %self.trader(),
            pool_id = %self.pool_id,
            step,
            from = %state.status.phase,
            error = %err,
            "Commit-reveal step failed"
        );
        state.status.last_error = Some(err.to_string());
        state.set_phase(SwapPhase::Error);
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_debug_hides_nonce() {
        let secret = CommitSecret {
            amount: TokenAmount::from_whole(5),
            nonce: Bytes32([0xab; 32]),
            hash: Bytes32([1; 32]),
        };
        let rendered = format!("{:?}", secret);
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("abab"));
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: SwapConfig = serde_json::from_str(r#"{"min_commit_age": 3}"#).unwrap();
        assert_eq!(config.min_commit_age, 3);
        assert_eq!(config.maturity_timeout, Duration::from_secs(120));
        assert!(!config.zero_for_one);
    }
}
