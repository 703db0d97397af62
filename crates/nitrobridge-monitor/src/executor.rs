//! Top-up execution
//!
//! Two legs: an optional off-chain channel transfer for speed, then the
//! authoritative on-chain `agentTopUp`. The channel leg never blocks or
//! aborts settlement. Settlement counts only once its receipt reports
//! success. Submission and confirmation each run under their own deadline.

use std::sync::Arc;
use std::time::Duration;

use nitrobridge_channel::ChannelSession;
use nitrobridge_ledger::{confirm, ConfirmationPolicy, LedgerClient, RetryPolicy};
use nitrobridge_types::{Address, NitroBridgeError, Result, TokenAmount, TxHash};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopUpOutcome {
    pub settled: bool,
    /// Relay reference of the off-chain transfer, when it was accepted
    pub channel_tx_ref: Option<String>,
    pub settlement_tx: TxHash,
}

pub struct TopUpExecutor {
    ledger: Arc<dyn LedgerClient>,
    channel: Option<ChannelSession>,
    confirmation: ConfirmationPolicy,
    retry: RetryPolicy,
    submit_timeout: Duration,
}

pub const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_secs(60);

impl TopUpExecutor {
    pub fn new(ledger: Arc<dyn LedgerClient>, confirmation: ConfirmationPolicy) -> Self {
        Self {
            ledger,
            channel: None,
            confirmation,
            retry: RetryPolicy::default(),
            submit_timeout: DEFAULT_SUBMIT_TIMEOUT,
        }
    }

    pub fn with_channel(mut self, channel: ChannelSession) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Budget for getting `agentTopUp` accepted, retries included
    pub fn with_submit_timeout(mut self, timeout: Duration) -> Self {
        self.submit_timeout = timeout;
        self
    }

    pub fn ledger(&self) -> &Arc<dyn LedgerClient> {
        &self.ledger
    }

    /// Move `amount` of collateral into `account`'s credit line.
    ///
    /// The executor does not deduplicate; callers must not overlap calls for
    /// one account.
    pub async fn execute(&self, account: Address, amount: TokenAmount) -> Result<TopUpOutcome> {
        let channel_tx_ref = self.channel_leg(account, amount).await;

        let ledger = self.ledger.clone();
        let submission = self.retry.run("agentTopUp", || ledger.agent_top_up(account, amount));
        let tx = tokio::time::timeout(self.submit_timeout, submission)
            .await
            .map_err(|_| NitroBridgeError::timeout("agentTopUp submission", self.submit_timeout))??;
        info!(account = %account, amount = %amount, tx = %tx, "Top-up submitted");

        confirm(self.ledger.as_ref(), tx, "agentTopUp", &self.confirmation).await?;
        info!(account = %account, amount = %amount, tx = %tx, "Top-up settled");

        Ok(TopUpOutcome {
            settled: true,
            channel_tx_ref,
            settlement_tx: tx,
        })
    }

    async fn channel_leg(&self, account: Address, amount: TokenAmount) -> Option<String> {
        let channel = self.channel.as_ref().filter(|c| c.is_connected())?;
        match channel.transfer(account, amount).await {
            Ok(reference) => {
                info!(account = %account, amount = %amount, reference = %reference, "Off-chain transfer sent");
                Some(reference)
            }
            Err(e) => {
                warn!(account = %account, amount = %amount, error = %e, "Off-chain transfer failed, settling on-chain only");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nitrobridge_channel::{spawn_relay, ChannelConfig, RelayOptions};
    use nitrobridge_crypto::SessionKey;
    use nitrobridge_ledger::{ChainRegistry, InMemoryLedger, LedgerFault};
    use nitrobridge_types::{Bytes32, ChainKey, CreditLine};
    use std::time::Duration;

    const AGENT: Address = Address([0xa6; 20]);
    const USER: Address = Address([0x11; 20]);

    async fn arc_ledger() -> InMemoryLedger {
        let chain = ChainRegistry::testnets().get(&ChainKey::new("arc")).cloned().unwrap();
        let ledger = InMemoryLedger::new(chain, AGENT);
        ledger.mint_tokens(AGENT, TokenAmount::from_whole(50_000)).await;
        ledger.authorize_agent(AGENT).await;
        ledger
            .set_credit_line(
                USER,
                CreditLine {
                    deposited: TokenAmount::from_whole(1_000),
                    borrowed: TokenAmount::from_whole(900),
                    credit_limit: TokenAmount::from_whole(1_500),
                    last_update: 0,
                    ens_hash: Bytes32::zero(),
                },
            )
            .await;
        ledger
    }

    fn policy() -> ConfirmationPolicy {
        ConfirmationPolicy {
            poll_interval: Duration::from_millis(1),
            timeout: Duration::from_secs(1),
        }
    }

    async fn channel(options: RelayOptions) -> (ChannelSession, nitrobridge_channel::RelayHandle) {
        let (transport, relay) = spawn_relay(options);
        let session = ChannelSession::connect(
            transport,
            ChannelConfig::default(),
            Arc::new(SessionKey::generate()),
            Arc::new(SessionKey::generate()),
        )
        .await
        .unwrap();
        (session, relay)
    }

    #[tokio::test]
    async fn test_settles_on_chain_without_channel() {
        let ledger = arc_ledger().await;
        let executor = TopUpExecutor::new(Arc::new(ledger.clone()), policy());

        let outcome = executor.execute(USER, TokenAmount::from_whole(200)).await.unwrap();

        assert!(outcome.settled);
        assert_eq!(outcome.channel_tx_ref, None);
        let line = ledger.credit_line(USER).await.unwrap();
        assert_eq!(line.deposited, TokenAmount::from_whole(1_200));
    }

    #[tokio::test]
    async fn test_channel_leg_then_settlement() {
        let ledger = arc_ledger().await;
        let (session, relay) = channel(RelayOptions::default()).await;
        let executor = TopUpExecutor::new(Arc::new(ledger.clone()), policy()).with_channel(session);

        let outcome = executor.execute(USER, TokenAmount::from_whole(200)).await.unwrap();

        assert_eq!(outcome.channel_tx_ref.as_deref(), Some("1"));
        assert_eq!(relay.count("transfer").await, 1);
        assert_eq!(ledger.submitted_for("agent_top_up").await.len(), 1);
    }

    #[tokio::test]
    async fn test_channel_failure_does_not_block_settlement() {
        let ledger = arc_ledger().await;
        let (session, _relay) = channel(RelayOptions {
            fail_transfers: true,
            ..Default::default()
        })
        .await;
        let executor = TopUpExecutor::new(Arc::new(ledger.clone()), policy()).with_channel(session);

        let outcome = executor.execute(USER, TokenAmount::from_whole(200)).await.unwrap();

        assert!(outcome.settled);
        assert_eq!(outcome.channel_tx_ref, None);
    }

    #[tokio::test]
    async fn test_reverted_settlement_is_failure() {
        let ledger = arc_ledger().await;
        ledger.inject_fault("agent_top_up", LedgerFault::Revert).await;
        let executor = TopUpExecutor::new(Arc::new(ledger.clone()), policy());

        let err = executor.execute(USER, TokenAmount::from_whole(200)).await.unwrap_err();

        assert_eq!(err.error_code(), "TRANSACTION_REVERTED");
        let line = ledger.credit_line(USER).await.unwrap();
        assert_eq!(line.deposited, TokenAmount::from_whole(1_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_submission_times_out() {
        let ledger = arc_ledger().await;
        ledger.inject_fault("agent_top_up", LedgerFault::Hang).await;
        let executor =
            TopUpExecutor::new(Arc::new(ledger.clone()), policy()).with_submit_timeout(Duration::from_secs(20));

        let started = tokio::time::Instant::now();
        let err = executor.execute(USER, TokenAmount::from_whole(200)).await.unwrap_err();

        assert_eq!(err.error_code(), "TIMEOUT");
        assert!(started.elapsed() < Duration::from_secs(21));
        assert!(ledger.submitted_for("agent_top_up").await.is_empty());
    }
}
