//! In-memory simulated chain
//!
//! Implements the same contract semantics the workflows rely on: ERC-20
//! balances and allowances, CCTP burn and mint with replay protection, the
//! credit terminal and the commit-reveal hook. Every submitted transaction
//! mines into its own block and leaves a receipt, reverted or not.
//!
//! Faults can be queued per operation to exercise retry and failure paths.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use nitrobridge_crypto::{event_topic, keccak256_all, keccak_word};
use nitrobridge_types::{
    Address, Bytes32, Commitment, CreditLine, LogEntry, NitroBridgeError, PoolKey, Result, SwapRequest,
    TokenAmount, TxHash, TxReceipt,
};
use tokio::sync::RwLock;
use tracing::debug;

use crate::abi::{self, signatures, REQUIRE_COMMIT_HOOK_DATA};
use crate::cctp::BurnMessage;
use crate::{ChainConfig, LedgerClient};

/// An injected failure for the next call of one operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerFault {
    /// The call fails before submission with a transient network error
    Transient,
    /// The transaction mines with `success = false`
    Revert,
    /// `depositForBurn` mines successfully but without a `MessageSent` log
    OmitMessageEvent,
    /// The receipt stays unavailable for this many polls
    DelayReceipt(u32),
    /// The call never returns and nothing is submitted
    Hang,
}

/// What the simulated chain recorded for each submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedTx {
    pub tx_hash: TxHash,
    pub operation: &'static str,
    pub success: bool,
    /// Raw arguments for calls whose inputs tests inspect
    pub args: Vec<Vec<u8>>,
}

/// Whether a second commit before reveal replaces the first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitPolicy {
    Overwrite,
    Reject,
}

#[derive(Default)]
struct ChainState {
    block: u64,
    balances: HashMap<Address, u128>,
    allowances: HashMap<(Address, Address), u128>,
    credit: HashMap<Address, CreditLine>,
    available_override: HashMap<Address, TokenAmount>,
    authorized_agents: HashSet<Address>,
    receipts: HashMap<TxHash, TxReceipt>,
    receipt_delays: HashMap<TxHash, u32>,
    submitted: Vec<SubmittedTx>,
    used_nonces: HashSet<(u32, u64)>,
    next_message_nonce: u64,
    commitments: HashMap<(Address, Bytes32), Commitment>,
    revealed_amounts: HashMap<(Address, Bytes32), TokenAmount>,
    faults: HashMap<&'static str, VecDeque<LedgerFault>>,
    stalled_reads: HashSet<Address>,
}

/// Outcome of executing a transaction against the state
struct Execution {
    success: bool,
    logs: Vec<LogEntry>,
}

impl Execution {
    fn ok(logs: Vec<LogEntry>) -> Self {
        Self { success: true, logs }
    }

    fn revert(reason: &str) -> Self {
        debug!(reason, "Simulated transaction reverted");
        Self {
            success: false,
            logs: vec![],
        }
    }
}

/// A deterministic simulated chain
#[derive(Clone)]
pub struct InMemoryLedger {
    chain: ChainConfig,
    signer: Address,
    min_commit_age: u64,
    commit_policy: CommitPolicy,
    state: Arc<RwLock<ChainState>>,
    tx_counter: Arc<AtomicU64>,
}

impl InMemoryLedger {
    pub fn new(chain: ChainConfig, signer: Address) -> Self {
        Self {
            chain,
            signer,
            min_commit_age: 1,
            commit_policy: CommitPolicy::Overwrite,
            state: Arc::new(RwLock::new(ChainState {
                block: 1,
                ..Default::default()
            })),
            tx_counter: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Minimum blocks between commit inclusion and reveal
    pub fn with_min_commit_age(mut self, blocks: u64) -> Self {
        self.min_commit_age = blocks;
        self
    }

    pub fn with_commit_policy(mut self, policy: CommitPolicy) -> Self {
        self.commit_policy = policy;
        self
    }

    /// Same chain state, different signing account
    pub fn as_signer(&self, signer: Address) -> Self {
        let mut other = self.clone();
        other.signer = signer;
        other
    }

    pub fn min_commit_age(&self) -> u64 {
        self.min_commit_age
    }

    // ── Setup ────────────────────────────────────────────────────────────────

    pub async fn mint_tokens(&self, owner: Address, amount: TokenAmount) {
        let mut state = self.state.write().await;
        *state.balances.entry(owner).or_default() += amount.raw();
    }

    pub async fn set_credit_line(&self, account: Address, line: CreditLine) {
        self.state.write().await.credit.insert(account, line);
    }

    /// Pin `getAvailableCredit` for an account instead of deriving it
    pub async fn set_available_credit(&self, account: Address, available: TokenAmount) {
        self.state.write().await.available_override.insert(account, available);
    }

    pub async fn authorize_agent(&self, agent: Address) {
        self.state.write().await.authorized_agents.insert(agent);
    }

    /// Queue a fault for the next call of `operation` (e.g. `"approve"`)
    pub async fn inject_fault(&self, operation: &'static str, fault: LedgerFault) {
        self.state
            .write()
            .await
            .faults
            .entry(operation)
            .or_default()
            .push_back(fault);
    }

    /// Make credit reads for `account` hang forever
    pub async fn stall_reads_for(&self, account: Address) {
        self.state.write().await.stalled_reads.insert(account);
    }

    pub async fn resume_reads_for(&self, account: Address) {
        self.state.write().await.stalled_reads.remove(&account);
    }

    /// Mine `n` empty blocks
    pub async fn advance_blocks(&self, n: u64) {
        self.state.write().await.block += n;
    }

    // ── Inspection ───────────────────────────────────────────────────────────

    pub async fn submitted(&self) -> Vec<SubmittedTx> {
        self.state.read().await.submitted.clone()
    }

    /// Submissions of one operation
    pub async fn submitted_for(&self, operation: &str) -> Vec<SubmittedTx> {
        self.state
            .read()
            .await
            .submitted
            .iter()
            .filter(|tx| tx.operation == operation)
            .cloned()
            .collect()
    }

    pub async fn current_block(&self) -> u64 {
        self.state.read().await.block
    }

    // ── Internals ────────────────────────────────────────────────────────────

    fn next_tx_hash(&self) -> TxHash {
        let n = self.tx_counter.fetch_add(1, Ordering::SeqCst);
        TxHash(keccak256_all(&[
            self.chain.key.as_str().as_bytes(),
            &n.to_be_bytes()[..],
            &self.signer.0[..],
        ]))
    }

    fn take_fault(state: &mut ChainState, operation: &str) -> Option<LedgerFault> {
        state.faults.get_mut(operation).and_then(|q| q.pop_front())
    }

    fn available(state: &ChainState, account: &Address) -> TokenAmount {
        if let Some(pinned) = state.available_override.get(account) {
            return *pinned;
        }
        state
            .credit
            .get(account)
            .map(|line| line.deposited.saturating_sub(line.borrowed))
            .unwrap_or(TokenAmount::ZERO)
    }

    /// Submit: apply faults, execute, mine, record
    async fn submit<F>(&self, operation: &'static str, args: Vec<Vec<u8>>, execute: F) -> Result<TxHash>
    where
        F: FnOnce(&mut ChainState, Address, u64) -> Execution + Send,
    {
        let mut state = self.state.write().await;
        let fault = Self::take_fault(&mut state, operation);
        match fault {
            Some(LedgerFault::Transient) => {
                return Err(NitroBridgeError::transient(operation, "simulated connection reset"));
            }
            Some(LedgerFault::Hang) => {
                drop(state);
                return std::future::pending::<Result<TxHash>>().await;
            }
            _ => {}
        }

        let tx_hash = self.next_tx_hash();
        state.block += 1;
        let block = state.block;

        let mut execution = if fault == Some(LedgerFault::Revert) {
            Execution::revert("injected revert")
        } else {
            execute(&mut *state, self.signer, block)
        };
        if fault == Some(LedgerFault::OmitMessageEvent) {
            execution.logs.clear();
        }
        if let Some(LedgerFault::DelayReceipt(polls)) = fault {
            state.receipt_delays.insert(tx_hash, polls);
        }

        state.receipts.insert(
            tx_hash,
            TxReceipt {
                tx_hash,
                block_number: block,
                success: execution.success,
                gas_used: Some(21_000),
                logs: execution.logs,
            },
        );
        state.submitted.push(SubmittedTx {
            tx_hash,
            operation,
            success: execution.success,
            args,
        });
        debug!(chain = %self.chain.key, operation, tx = %tx_hash, block, success = execution.success, "Simulated transaction mined");
        Ok(tx_hash)
    }
}

fn debit(balances: &mut HashMap<Address, u128>, owner: Address, amount: u128) -> bool {
    let balance = balances.entry(owner).or_default();
    if *balance < amount {
        return false;
    }
    *balance -= amount;
    true
}

fn spend_allowance(allowances: &mut HashMap<(Address, Address), u128>, owner: Address, spender: Address, amount: u128) -> bool {
    let allowance = allowances.entry((owner, spender)).or_default();
    if *allowance < amount {
        return false;
    }
    *allowance -= amount;
    true
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    fn chain(&self) -> &ChainConfig {
        &self.chain
    }

    fn signer(&self) -> Address {
        self.signer
    }

    async fn block_number(&self) -> Result<u64> {
        let mut state = self.state.write().await;
        if let Some(LedgerFault::Transient) = Self::take_fault(&mut state, "block_number") {
            return Err(NitroBridgeError::transient("eth_blockNumber", "simulated connection reset"));
        }
        Ok(state.block)
    }

    async fn balance_of(&self, owner: Address) -> Result<TokenAmount> {
        let state = self.state.read().await;
        Ok(TokenAmount::from_raw(state.balances.get(&owner).copied().unwrap_or(0)))
    }

    async fn allowance(&self, owner: Address, spender: Address) -> Result<TokenAmount> {
        let state = self.state.read().await;
        Ok(TokenAmount::from_raw(
            state.allowances.get(&(owner, spender)).copied().unwrap_or(0),
        ))
    }

    async fn credit_line(&self, account: Address) -> Result<CreditLine> {
        self.chain.credit_terminal()?;
        let stalled = {
            let mut state = self.state.write().await;
            if let Some(LedgerFault::Transient) = Self::take_fault(&mut state, "credit_line") {
                return Err(NitroBridgeError::transient("getCreditInfo", "simulated connection reset"));
            }
            state.stalled_reads.contains(&account)
        };
        if stalled {
            std::future::pending::<()>().await;
        }
        let state = self.state.read().await;
        Ok(state.credit.get(&account).copied().unwrap_or_else(CreditLine::empty))
    }

    async fn available_credit(&self, account: Address) -> Result<TokenAmount> {
        self.chain.credit_terminal()?;
        let state = self.state.read().await;
        Ok(Self::available(&state, &account))
    }

    async fn is_authorized_agent(&self, agent: Address) -> Result<bool> {
        self.chain.credit_terminal()?;
        Ok(self.state.read().await.authorized_agents.contains(&agent))
    }

    async fn commitment(&self, trader: Address, pool_id: Bytes32) -> Result<Option<Commitment>> {
        self.chain.commit_hook()?;
        Ok(self.state.read().await.commitments.get(&(trader, pool_id)).cloned())
    }

    async fn transaction_receipt(&self, tx: TxHash) -> Result<Option<TxReceipt>> {
        let mut state = self.state.write().await;
        match Self::take_fault(&mut state, "transaction_receipt") {
            Some(LedgerFault::Transient) => {
                return Err(NitroBridgeError::transient("eth_getTransactionReceipt", "simulated timeout"));
            }
            Some(LedgerFault::Hang) => {
                drop(state);
                return std::future::pending::<Result<Option<TxReceipt>>>().await;
            }
            _ => {}
        }
        if let Some(remaining) = state.receipt_delays.get_mut(&tx) {
            if *remaining > 0 {
                *remaining -= 1;
                return Ok(None);
            }
        }
        Ok(state.receipts.get(&tx).cloned())
    }

    async fn approve(&self, spender: Address, amount: TokenAmount) -> Result<TxHash> {
        self.submit("approve", vec![spender.0.to_vec(), amount.to_be_word().to_vec()], move |state, signer, _| {
            state.allowances.insert((signer, spender), amount.raw());
            Execution::ok(vec![])
        })
        .await
    }

    async fn deposit_for_burn(
        &self,
        amount: TokenAmount,
        destination_domain: u32,
        mint_recipient: Bytes32,
        burn_token: Address,
    ) -> Result<TxHash> {
        let messenger = self.chain.token_messenger()?;
        let transmitter = self.chain.message_transmitter()?;
        let source_domain = self.chain.domain;
        let usdc = self.chain.contracts.usdc;
        self.submit(
            "deposit_for_burn",
            vec![amount.to_be_word().to_vec(), destination_domain.to_be_bytes().to_vec(), mint_recipient.0.to_vec()],
            move |state, signer, _| {
                if burn_token != usdc {
                    return Execution::revert("unsupported burn token");
                }
                if amount.is_zero() {
                    return Execution::revert("amount must be nonzero");
                }
                if !spend_allowance(&mut state.allowances, signer, messenger, amount.raw()) {
                    return Execution::revert("ERC20: insufficient allowance");
                }
                if !debit(&mut state.balances, signer, amount.raw()) {
                    return Execution::revert("ERC20: transfer amount exceeds balance");
                }
                let nonce = state.next_message_nonce;
                state.next_message_nonce += 1;
                let message = BurnMessage {
                    version: 0,
                    source_domain,
                    destination_domain,
                    nonce,
                    sender: messenger.to_bytes32(),
                    recipient: Bytes32::zero(),
                    destination_caller: Bytes32::zero(),
                    burn_token: burn_token.to_bytes32(),
                    mint_recipient,
                    amount,
                    message_sender: signer.to_bytes32(),
                };
                Execution::ok(vec![LogEntry {
                    address: transmitter,
                    topics: vec![event_topic(signatures::MESSAGE_SENT_EVENT)],
                    data: abi::encode_bytes(&message.encode()),
                }])
            },
        )
        .await
    }

    async fn receive_message(&self, message: &[u8], attestation: &[u8]) -> Result<TxHash> {
        self.chain.message_transmitter()?;
        let local_domain = self.chain.domain;
        let message = message.to_vec();
        let attestation = attestation.to_vec();
        self.submit(
            "receive_message",
            vec![message.clone(), attestation.clone()],
            move |state, _, _| {
                if attestation.is_empty() {
                    return Execution::revert("invalid attestation length");
                }
                let Ok(decoded) = BurnMessage::decode(&message) else {
                    return Execution::revert("invalid message");
                };
                if decoded.destination_domain != local_domain {
                    return Execution::revert("invalid destination domain");
                }
                if !state.used_nonces.insert(decoded.source_and_nonce()) {
                    return Execution::revert("nonce already used");
                }
                let Some(recipient) = Address::from_bytes32(&decoded.mint_recipient) else {
                    return Execution::revert("invalid mint recipient");
                };
                *state.balances.entry(recipient).or_default() += decoded.amount.raw();
                Execution::ok(vec![LogEntry {
                    address: recipient,
                    topics: vec![event_topic("MintAndWithdraw(address,uint256,address)")],
                    data: decoded.amount.to_be_word().to_vec(),
                }])
            },
        )
        .await
    }

    async fn agent_top_up(&self, user: Address, amount: TokenAmount) -> Result<TxHash> {
        self.chain.credit_terminal()?;
        self.submit(
            "agent_top_up",
            vec![user.0.to_vec(), amount.to_be_word().to_vec()],
            move |state, signer, block| {
                if !state.authorized_agents.contains(&signer) {
                    return Execution::revert("not authorized agent");
                }
                if !debit(&mut state.balances, signer, amount.raw()) {
                    return Execution::revert("ERC20: transfer amount exceeds balance");
                }
                let line = state.credit.entry(user).or_insert_with(CreditLine::empty);
                line.deposited = line.deposited + amount;
                line.credit_limit = line.deposited.mul_div(150, 100).unwrap_or(line.credit_limit);
                line.last_update = block;
                if let Some(pinned) = state.available_override.get_mut(&user) {
                    *pinned = *pinned + amount;
                }
                Execution::ok(vec![])
            },
        )
        .await
    }

    async fn request_margin_top_up(&self, amount: TokenAmount) -> Result<TxHash> {
        self.chain.credit_terminal()?;
        self.submit(
            "request_margin_top_up",
            vec![amount.to_be_word().to_vec()],
            move |state, signer, block| {
                let line = state.credit.entry(signer).or_insert_with(CreditLine::empty);
                let borrowed = line.borrowed + amount;
                if borrowed > line.credit_limit {
                    return Execution::revert("exceeds credit limit");
                }
                line.borrowed = borrowed;
                line.last_update = block;
                *state.balances.entry(signer).or_default() += amount.raw();
                Execution::ok(vec![])
            },
        )
        .await
    }

    async fn settle_credit(&self, amount: TokenAmount) -> Result<TxHash> {
        self.chain.credit_terminal()?;
        self.submit(
            "settle_credit",
            vec![amount.to_be_word().to_vec()],
            move |state, signer, block| {
                let borrowed = state.credit.get(&signer).map(|l| l.borrowed).unwrap_or(TokenAmount::ZERO);
                if amount > borrowed {
                    return Execution::revert("amount exceeds borrowed");
                }
                if !debit(&mut state.balances, signer, amount.raw()) {
                    return Execution::revert("ERC20: transfer amount exceeds balance");
                }
                if let Some(line) = state.credit.get_mut(&signer) {
                    line.borrowed = line.borrowed - amount;
                    line.last_update = block;
                }
                Execution::ok(vec![])
            },
        )
        .await
    }

    async fn commit(&self, hash: Bytes32, pool_id: Bytes32) -> Result<TxHash> {
        self.chain.commit_hook()?;
        let policy = self.commit_policy;
        let tx = self
            .submit("commit", vec![hash.0.to_vec(), pool_id.0.to_vec()], move |state, signer, block| {
                if let Some(existing) = state.commitments.get(&(signer, pool_id)) {
                    if !existing.revealed && policy == CommitPolicy::Reject {
                        return Execution::revert("commitment already pending");
                    }
                }
                state.revealed_amounts.remove(&(signer, pool_id));
                state.commitments.insert(
                    (signer, pool_id),
                    Commitment {
                        trader: signer,
                        pool_id,
                        hash,
                        block_number: block,
                        revealed: false,
                        commit_tx: None,
                    },
                );
                Execution::ok(vec![])
            })
            .await?;
        let mut state = self.state.write().await;
        if let Some(c) = state.commitments.get_mut(&(self.signer, pool_id)) {
            if c.hash == hash && c.commit_tx.is_none() {
                c.commit_tx = Some(tx);
            }
        }
        Ok(tx)
    }

    async fn reveal(&self, amount: TokenAmount, nonce: Bytes32, pool_key: &PoolKey) -> Result<TxHash> {
        self.chain.commit_hook()?;
        let pool_id = abi::pool_id(pool_key);
        let min_age = self.min_commit_age;
        self.submit(
            "reveal",
            vec![amount.to_be_word().to_vec(), nonce.0.to_vec(), pool_id.0.to_vec()],
            move |state, signer, block| {
                let Some(commitment) = state.commitments.get_mut(&(signer, pool_id)) else {
                    return Execution::revert("no commitment");
                };
                if commitment.revealed {
                    return Execution::revert("already revealed");
                }
                // The reveal executes in `block`; the commit must be at least `min_age` blocks older.
                if block < commitment.block_number + min_age {
                    return Execution::revert("commitment too young");
                }
                if abi::commitment_hash(amount, &nonce, &signer) != commitment.hash {
                    return Execution::revert("hash mismatch");
                }
                commitment.revealed = true;
                state.revealed_amounts.insert((signer, pool_id), amount);
                Execution::ok(vec![])
            },
        )
        .await
    }

    async fn swap(&self, pool_key: &PoolKey, request: SwapRequest, hook_data: &[u8]) -> Result<TxHash> {
        let pool_manager = self.chain.pool_manager()?;
        let pool_id = abi::pool_id(pool_key);
        let requires_commit = hook_data == REQUIRE_COMMIT_HOOK_DATA;
        let usdc = self.chain.contracts.usdc;
        let input_token = if request.zero_for_one { pool_key.currency0 } else { pool_key.currency1 };
        self.submit(
            "swap",
            vec![pool_id.0.to_vec(), request.amount_in.to_be_word().to_vec(), hook_data.to_vec()],
            move |state, signer, _| {
                if requires_commit {
                    let revealed = state.revealed_amounts.get(&(signer, pool_id)).copied();
                    match revealed {
                        Some(amount) if amount >= request.amount_in => {}
                        Some(_) => return Execution::revert("swap exceeds revealed amount"),
                        None => return Execution::revert("no revealed commitment"),
                    }
                }
                if input_token == usdc {
                    if !spend_allowance(&mut state.allowances, signer, pool_manager, request.amount_in.raw()) {
                        return Execution::revert("ERC20: insufficient allowance");
                    }
                    if !debit(&mut state.balances, signer, request.amount_in.raw()) {
                        return Execution::revert("ERC20: transfer amount exceeds balance");
                    }
                }
                if requires_commit {
                    state.revealed_amounts.remove(&(signer, pool_id));
                    state.commitments.remove(&(signer, pool_id));
                }
                Execution::ok(vec![LogEntry {
                    address: pool_manager,
                    topics: vec![keccak_word(b"Swap"), pool_id],
                    data: request.amount_in.to_be_word().to_vec(),
                }])
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{confirm, ChainRegistry, ConfirmationPolicy};
    use nitrobridge_types::ChainKey;

    fn ledger() -> InMemoryLedger {
        let chain = ChainRegistry::testnets().get(&ChainKey::new("arc")).cloned().unwrap();
        InMemoryLedger::new(chain, Address([7; 20]))
    }

    #[tokio::test]
    async fn test_approve_sets_allowance() {
        let ledger = ledger();
        let spender = Address([9; 20]);
        let tx = ledger.approve(spender, TokenAmount::from_whole(5)).await.unwrap();
        let receipt = ledger.transaction_receipt(tx).await.unwrap().unwrap();
        assert!(receipt.success);
        assert_eq!(
            ledger.allowance(ledger.signer(), spender).await.unwrap(),
            TokenAmount::from_whole(5)
        );
    }

    #[tokio::test]
    async fn test_burn_without_allowance_reverts() {
        let ledger = ledger();
        ledger.mint_tokens(ledger.signer(), TokenAmount::from_whole(10)).await;
        let usdc = ledger.chain().contracts.usdc;
        let tx = ledger
            .deposit_for_burn(TokenAmount::from_whole(1), 0, Address([1; 20]).to_bytes32(), usdc)
            .await
            .unwrap();
        let err = confirm(&ledger, tx, "depositForBurn", &ConfirmationPolicy::default())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "TRANSACTION_REVERTED");
        assert_eq!(ledger.balance_of(ledger.signer()).await.unwrap(), TokenAmount::from_whole(10));
    }

    #[tokio::test]
    async fn test_transient_fault_consumed_once() {
        let ledger = ledger();
        ledger.inject_fault("approve", LedgerFault::Transient).await;
        assert!(ledger.approve(Address([1; 20]), TokenAmount::from_whole(1)).await.is_err());
        assert!(ledger.approve(Address([1; 20]), TokenAmount::from_whole(1)).await.is_ok());
        assert_eq!(ledger.submitted_for("approve").await.len(), 1);
    }

    #[tokio::test]
    async fn test_agent_top_up_requires_authorization() {
        let ledger = ledger();
        let user = Address([3; 20]);
        ledger.mint_tokens(ledger.signer(), TokenAmount::from_whole(100)).await;
        let tx = ledger.agent_top_up(user, TokenAmount::from_whole(10)).await.unwrap();
        assert!(!ledger.transaction_receipt(tx).await.unwrap().unwrap().success);

        ledger.authorize_agent(ledger.signer()).await;
        let tx = ledger.agent_top_up(user, TokenAmount::from_whole(10)).await.unwrap();
        assert!(ledger.transaction_receipt(tx).await.unwrap().unwrap().success);
        let line = ledger.credit_line(user).await.unwrap();
        assert_eq!(line.deposited, TokenAmount::from_whole(10));
        assert_eq!(line.credit_limit, TokenAmount::from_whole(15));
    }

    #[tokio::test]
    async fn test_delayed_receipt() {
        let ledger = ledger();
        ledger.inject_fault("approve", LedgerFault::DelayReceipt(2)).await;
        let tx = ledger.approve(Address([1; 20]), TokenAmount::from_whole(1)).await.unwrap();
        assert!(ledger.transaction_receipt(tx).await.unwrap().is_none());
        assert!(ledger.transaction_receipt(tx).await.unwrap().is_none());
        assert!(ledger.transaction_receipt(tx).await.unwrap().is_some());
    }
}
