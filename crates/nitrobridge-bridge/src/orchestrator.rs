//! Bridge orchestrator
//!
//! Drives one transfer through approve → burn → attest → mint. Steps run
//! strictly in order and each one is idempotent given the persisted record:
//! a submitted transaction hash is saved before its receipt is awaited, and
//! a resumed step waits on that hash instead of submitting again.

use std::collections::BTreeMap;
use std::sync::Arc;

use nitrobridge_attestation::{await_attestation, AttestationClient, AttestationQuery, PollPolicy};
use nitrobridge_ledger::{confirm, ConfirmationPolicy, LedgerClient, RetryPolicy};
use nitrobridge_types::{
    Address, BridgeState, BridgeStep, BridgeTransfer, ChainKey, NitroBridgeError, Result, TokenAmount,
    TransferId, TxHash,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::decoder::{extract_burn_message, ExpectedBurn};
use crate::store::TransferStore;

/// Timing and retry settings for transfers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Submission retries for transient network errors
    pub retry: RetryPolicy,
    pub confirmation: ConfirmationPolicy,
    pub attestation: PollPolicy,
}

/// A transfer request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub amount: TokenAmount,
    pub source: ChainKey,
    pub dest: ChainKey,
    pub recipient: Address,
}

/// Bridge failures
///
/// `Rejected` means nothing was recorded or submitted. `Failed` carries the
/// persisted record, which names the failed step and where the funds sit.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Transfer rejected: {0}")]
    Rejected(#[source] NitroBridgeError),

    #[error("Transfer {} failed: {source}", .transfer.id)]
    Failed {
        transfer: Box<BridgeTransfer>,
        #[source]
        source: NitroBridgeError,
    },
}

impl BridgeError {
    /// The failed transfer record, if one exists
    pub fn transfer(&self) -> Option<&BridgeTransfer> {
        match self {
            Self::Rejected(_) => None,
            Self::Failed { transfer, .. } => Some(transfer),
        }
    }

    pub fn error(&self) -> &NitroBridgeError {
        match self {
            Self::Rejected(e) | Self::Failed { source: e, .. } => e,
        }
    }

    pub fn is_resumable(&self) -> bool {
        self.transfer()
            .and_then(|t| t.failure.as_ref())
            .is_some_and(|f| f.resumable)
    }
}

impl From<BridgeError> for NitroBridgeError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Rejected(e) | BridgeError::Failed { source: e, .. } => e,
        }
    }
}

pub type BridgeResult<T> = std::result::Result<T, BridgeError>;

/// Balance of one owner on one chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainBalance {
    pub chain: ChainKey,
    pub balance: Option<TokenAmount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Burn → attest → mint coordinator over a set of chains
pub struct BridgeOrchestrator {
    ledgers: BTreeMap<ChainKey, Arc<dyn LedgerClient>>,
    attestation: Arc<dyn AttestationClient>,
    store: Arc<dyn TransferStore>,
    config: BridgeConfig,
}

impl BridgeOrchestrator {
    pub fn new(
        attestation: Arc<dyn AttestationClient>,
        store: Arc<dyn TransferStore>,
        config: BridgeConfig,
    ) -> Self {
        Self {
            ledgers: BTreeMap::new(),
            attestation,
            store,
            config,
        }
    }

    /// Register the client for one chain, keyed by its chain key
    pub fn with_ledger(mut self, ledger: Arc<dyn LedgerClient>) -> Self {
        self.ledgers.insert(ledger.chain().key.clone(), ledger);
        self
    }

    pub fn store(&self) -> &Arc<dyn TransferStore> {
        &self.store
    }

    fn ledger(&self, chain: &ChainKey) -> Result<&Arc<dyn LedgerClient>> {
        self.ledgers.get(chain).ok_or_else(|| NitroBridgeError::UnknownChain {
            chain: chain.to_string(),
        })
    }

    // ── Entry points ─────────────────────────────────────────────────────────

    /// Bridge `amount` from `source` to `recipient` on `dest`
    pub async fn transfer(&self, request: TransferRequest) -> BridgeResult<BridgeTransfer> {
        let transfer = self.prepare(&request).await.map_err(BridgeError::Rejected)?;
        info!(
            transfer_id = %transfer.id,
            source = %transfer.source_chain,
            dest = %transfer.dest_chain,
            amount = %transfer.amount,
            recipient = %transfer.recipient,
            "Bridge transfer started"
        );
        self.drive(transfer).await
    }

    /// Continue a persisted transfer from its last confirmed step
    pub async fn resume(&self, id: &TransferId) -> BridgeResult<BridgeTransfer> {
        let mut transfer = self.store.load(id).await.map_err(BridgeError::Rejected)?;
        if transfer.is_complete() {
            return Ok(transfer);
        }
        if let Some(failure) = &transfer.failure {
            if !failure.resumable {
                return Err(BridgeError::Rejected(NitroBridgeError::InvalidState {
                    reason: format!(
                        "transfer {} failed at {} and is not resumable: {}",
                        transfer.id, failure.step, failure.message
                    ),
                }));
            }
        }
        let Some(step) = transfer.next_step() else {
            return Ok(transfer);
        };
        info!(transfer_id = %transfer.id, step = ?step, "Resuming bridge transfer");
        transfer.failure = None;
        transfer.transition(step.pending_state());
        self.drive(transfer).await
    }

    /// Attest and mint from a burn transaction alone
    ///
    /// The record is rebuilt from the burn receipt. A burn already owned by a
    /// stored transfer resumes that transfer instead, so it is never minted twice.
    pub async fn resume_from_burn(
        &self,
        source: &ChainKey,
        dest: &ChainKey,
        burn_tx: TxHash,
    ) -> BridgeResult<BridgeTransfer> {
        if let Some(existing) = self.store.find_by_burn(&burn_tx).await.map_err(BridgeError::Rejected)? {
            info!(transfer_id = %existing.id, burn_tx = %burn_tx, "Burn already journaled");
            return self.resume(&existing.id).await;
        }

        let transfer = self
            .reconstruct(source, dest, burn_tx)
            .await
            .map_err(BridgeError::Rejected)?;
        info!(transfer_id = %transfer.id, burn_tx = %burn_tx, amount = %transfer.amount, "Transfer reconstructed from burn");
        self.drive(transfer).await
    }

    /// Stablecoin balance of `owner` on every configured chain
    pub async fn balances(&self, owner: Address) -> Vec<ChainBalance> {
        let mut out = Vec::with_capacity(self.ledgers.len());
        for (key, ledger) in &self.ledgers {
            match ledger.balance_of(owner).await {
                Ok(balance) => out.push(ChainBalance {
                    chain: key.clone(),
                    balance: Some(balance),
                    error: None,
                }),
                Err(e) => {
                    warn!(chain = %key, owner = %owner, error = %e, "Balance read failed");
                    out.push(ChainBalance {
                        chain: key.clone(),
                        balance: None,
                        error: Some(e.to_string()),
                    });
                }
            }
        }
        out
    }

    // ── Preparation ──────────────────────────────────────────────────────────

    async fn prepare(&self, request: &TransferRequest) -> Result<BridgeTransfer> {
        if request.amount.is_zero() {
            return Err(NitroBridgeError::invalid_input("amount", "must be positive"));
        }
        if request.source == request.dest {
            return Err(NitroBridgeError::invalid_input("dest", "must differ from source"));
        }
        let source = self.ledger(&request.source)?;
        let dest = self.ledger(&request.dest)?;
        source.chain().token_messenger()?;
        dest.chain().message_transmitter()?;

        let sender = source.signer();
        let balance = self
            .config
            .retry
            .run("balanceOf", || source.balance_of(sender))
            .await?;
        if balance < request.amount {
            return Err(NitroBridgeError::InsufficientBalance {
                account: sender.to_string(),
                requested: request.amount.to_string(),
                available: balance.to_string(),
            });
        }

        let transfer = BridgeTransfer::new(
            request.source.clone(),
            request.dest.clone(),
            dest.chain().domain,
            request.amount,
            sender,
            request.recipient,
        );
        self.store.save(&transfer).await?;
        Ok(transfer)
    }

    async fn reconstruct(&self, source: &ChainKey, dest: &ChainKey, burn_tx: TxHash) -> Result<BridgeTransfer> {
        let source_ledger = self.ledger(source)?;
        let dest_ledger = self.ledger(dest)?;
        let receipt = confirm(source_ledger.as_ref(), burn_tx, "depositForBurn", &self.config.confirmation).await?;
        let evidence = extract_burn_message(&receipt, &source_ledger.chain().message_transmitter()?)?;

        let message = &evidence.message;
        if message.destination_domain != dest_ledger.chain().domain {
            return Err(NitroBridgeError::protocol(format!(
                "burn {} targets domain {}, but {} is domain {}",
                burn_tx,
                message.destination_domain,
                dest,
                dest_ledger.chain().domain
            )));
        }
        let recipient = Address::from_bytes32(&message.mint_recipient)
            .ok_or_else(|| NitroBridgeError::protocol("mint recipient is not an EVM address"))?;
        let sender = Address::from_bytes32(&message.message_sender).unwrap_or_else(|| source_ledger.signer());

        let mut transfer = BridgeTransfer::new(
            source.clone(),
            dest.clone(),
            message.destination_domain,
            message.amount,
            sender,
            recipient,
        );
        transfer.burn_tx = Some(burn_tx);
        transfer.message_hash = Some(evidence.message_hash);
        transfer.message_bytes = Some(evidence.message_bytes);
        transfer.transition(BridgeState::PendingAttestation);
        self.store.save(&transfer).await?;
        Ok(transfer)
    }

    // ── Step driver ──────────────────────────────────────────────────────────

    async fn drive(&self, mut transfer: BridgeTransfer) -> BridgeResult<BridgeTransfer> {
        while let Some(step) = transfer.state.pending_step() {
            let outcome = match step {
                BridgeStep::Approve => self.approve(&mut transfer).await,
                BridgeStep::Burn => self.burn(&mut transfer).await,
                BridgeStep::Attest => self.attest(&mut transfer).await,
                BridgeStep::Mint => self.mint(&mut transfer).await,
            };
            if let Err(e) = outcome {
                return Err(self.fail(transfer, step, e).await);
            }
        }
        Ok(transfer)
    }

    async fn fail(&self, mut transfer: BridgeTransfer, step: BridgeStep, error: NitroBridgeError) -> BridgeError {
        let resumable = error.is_resumable();
        transfer.fail(step, error.kind(), error.to_string(), resumable);
        warn!(
            transfer_id = %transfer.id,
            step = ?step,
            error_code = error.error_code(),
            resumable,
            funds = ?transfer.funds_location(),
            error = %error,
            "Bridge transfer failed"
        );
        if let Err(e) = self.store.save(&transfer).await {
            warn!(transfer_id = %transfer.id, error = %e, "Could not persist failed transfer");
        }
        BridgeError::Failed {
            transfer: Box::new(transfer),
            source: error,
        }
    }

    async fn advance(&self, transfer: &mut BridgeTransfer, state: BridgeState) -> Result<()> {
        transfer.transition(state);
        self.store.save(transfer).await?;
        info!(transfer_id = %transfer.id, state = %state, "Bridge transfer advanced");
        Ok(())
    }

    async fn approve(&self, transfer: &mut BridgeTransfer) -> Result<()> {
        let ledger = self.ledger(&transfer.source_chain)?;
        let messenger = ledger.chain().token_messenger()?;

        if let Some(tx) = transfer.approve_tx {
            confirm(ledger.as_ref(), tx, "approve", &self.config.confirmation).await?;
        }

        let owner = ledger.signer();
        let allowance = self
            .config
            .retry
            .run("allowance", || ledger.allowance(owner, messenger))
            .await?;
        if allowance < transfer.amount {
            let amount = transfer.amount;
            let tx = self
                .config
                .retry
                .run("approve", || ledger.approve(messenger, amount))
                .await?;
            transfer.approve_tx = Some(tx);
            self.store.save(transfer).await?;
            info!(transfer_id = %transfer.id, tx = %tx, "Approval submitted");
            confirm(ledger.as_ref(), tx, "approve", &self.config.confirmation).await?;
        } else {
            info!(transfer_id = %transfer.id, allowance = %allowance, "Allowance already sufficient");
        }
        self.advance(transfer, BridgeState::PendingBurn).await
    }

    async fn burn(&self, transfer: &mut BridgeTransfer) -> Result<()> {
        let source = self.ledger(&transfer.source_chain)?;
        let transmitter = source.chain().message_transmitter()?;
        let usdc = source.chain().contracts.usdc;
        let expected = ExpectedBurn {
            amount: transfer.amount,
            destination_domain: transfer.dest_domain,
            mint_recipient: transfer.recipient.to_bytes32(),
        };

        let tx = match transfer.burn_tx {
            Some(tx) => {
                info!(transfer_id = %transfer.id, tx = %tx, "Waiting on previously submitted burn");
                tx
            }
            None => {
                let tx = self
                    .config
                    .retry
                    .run("depositForBurn", || {
                        source.deposit_for_burn(expected.amount, expected.destination_domain, expected.mint_recipient, usdc)
                    })
                    .await?;
                transfer.burn_tx = Some(tx);
                self.store.save(transfer).await?;
                info!(transfer_id = %transfer.id, tx = %tx, "Burn submitted");
                tx
            }
        };

        let receipt = confirm(source.as_ref(), tx, "depositForBurn", &self.config.confirmation).await?;
        let evidence = extract_burn_message(&receipt, &transmitter)?;
        evidence.check(&expected)?;

        info!(
            transfer_id = %transfer.id,
            message_hash = %evidence.message_hash,
            nonce = evidence.message.nonce,
            "Burn confirmed"
        );
        transfer.message_hash = Some(evidence.message_hash);
        transfer.message_bytes = Some(evidence.message_bytes);
        self.advance(transfer, BridgeState::PendingAttestation).await
    }

    async fn attest(&self, transfer: &mut BridgeTransfer) -> Result<()> {
        let (Some(message_hash), Some(burn_tx)) = (transfer.message_hash, transfer.burn_tx) else {
            return Err(NitroBridgeError::InvalidState {
                reason: "attestation requested before the burn was confirmed".to_string(),
            });
        };
        let source = self.ledger(&transfer.source_chain)?;
        let query = AttestationQuery {
            message_hash,
            source_domain: source.chain().domain,
            burn_tx,
        };
        info!(transfer_id = %transfer.id, message_hash = %message_hash, "Waiting for attestation");
        let completed = await_attestation(self.attestation.as_ref(), &query, &self.config.attestation).await?;
        completed.verify_message(&message_hash)?;

        transfer.attestation = Some(completed.attestation);
        self.advance(transfer, BridgeState::PendingMint).await
    }

    async fn mint(&self, transfer: &mut BridgeTransfer) -> Result<()> {
        let dest = self.ledger(&transfer.dest_chain)?;
        let (Some(message), Some(attestation)) = (transfer.message_bytes.clone(), transfer.attestation.clone()) else {
            return Err(NitroBridgeError::InvalidState {
                reason: "mint requested without message and attestation".to_string(),
            });
        };

        let tx = match transfer.mint_tx {
            Some(tx) => {
                info!(transfer_id = %transfer.id, tx = %tx, "Waiting on previously submitted mint");
                tx
            }
            None => {
                let tx = self
                    .config
                    .retry
                    .run("receiveMessage", || dest.receive_message(&message, &attestation))
                    .await?;
                transfer.mint_tx = Some(tx);
                self.store.save(transfer).await?;
                info!(transfer_id = %transfer.id, tx = %tx, "Mint submitted");
                tx
            }
        };

        confirm(dest.as_ref(), tx, "receiveMessage", &self.config.confirmation).await?;
        transfer.mint_confirmed = true;
        info!(
            transfer_id = %transfer.id,
            burn_tx = ?transfer.burn_tx,
            mint_tx = %tx,
            "Bridge transfer complete"
        );
        self.advance(transfer, BridgeState::Complete).await
    }
}
