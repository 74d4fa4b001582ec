//! Mock Ledger
//!
//! A scriptable in-memory ledger. Balances, allowance, confirmation behavior and
//! injected transport failures are configured up front with the builder
//! methods; every call is recorded so tests can assert on what the orchestrator
//! actually did.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::error::LedgerError;
use crate::ledger::{ConfirmationStatus, DepositParams, LedgerClient};
use crate::types::TxId;

/// One recorded ledger call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerCall {
    NativeBalance { address: String },
    TokenBalance { address: String },
    Allowance { owner: String, spender: String },
    Approval { owner: String, spender: String, amount: u128 },
    Deposit(DepositParams),
    Confirmation { tx_id: TxId, min_confirmations: u64 },
}

/// When submitted transactions confirm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Confirmation {
    /// Confirmed starting with the n-th poll of a transaction
    AfterPolls(u64),
    Never,
}

#[derive(Debug)]
struct MockState {
    native_balance: u128,
    token_balance: u128,
    allowance: u128,
    confirmation: Confirmation,
    revert_approval: bool,
    revert_deposit: bool,
    /// Remaining reads that fail with `read_failure`
    failing_reads: u32,
    read_failure: LedgerError,
    /// Remaining confirmation polls that fail with a transient network error
    failing_polls: u32,
    submit_error: Option<LedgerError>,
    read_delay: Option<Duration>,
    approval_delay: Option<Duration>,
    deposit_delay: Option<Duration>,
    polls: HashMap<TxId, u64>,
    deposits: Vec<TxId>,
    next_tx: u64,
    calls: Vec<LedgerCall>,
}

/// In-memory [`LedgerClient`]
#[derive(Debug)]
pub struct MockLedger {
    state: Mutex<MockState>,
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLedger {
    /// 1 ETH of gas, no tokens, no allowance, confirming on the first poll
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                native_balance: 1_000_000_000_000_000_000,
                token_balance: 0,
                allowance: 0,
                confirmation: Confirmation::AfterPolls(1),
                revert_approval: false,
                revert_deposit: false,
                failing_reads: 0,
                read_failure: LedgerError::network("network request failed")
                    .with_detail("error sending request: connection reset by peer"),
                failing_polls: 0,
                submit_error: None,
                read_delay: None,
                approval_delay: None,
                deposit_delay: None,
                polls: HashMap::new(),
                deposits: Vec::new(),
                next_tx: 1,
                calls: Vec::new(),
            }),
        }
    }

    // ------------------------------------------------------------------------
    // Builder
    // ------------------------------------------------------------------------

    pub fn with_native_balance(self, wei: u128) -> Self {
        self.state().native_balance = wei;
        self
    }

    pub fn with_token_balance(self, base_units: u128) -> Self {
        self.state().token_balance = base_units;
        self
    }

    pub fn with_allowance(self, base_units: u128) -> Self {
        self.state().allowance = base_units;
        self
    }

    /// Report a transaction as confirmed starting with its n-th poll
    pub fn confirm_after_polls(self, polls: u64) -> Self {
        self.state().confirmation = Confirmation::AfterPolls(polls.max(1));
        self
    }

    /// Keep every transaction pending forever
    pub fn never_confirm(self) -> Self {
        self.state().confirmation = Confirmation::Never;
        self
    }

    pub fn revert_approval(self) -> Self {
        self.state().revert_approval = true;
        self
    }

    pub fn revert_deposit(self) -> Self {
        self.state().revert_deposit = true;
        self
    }

    /// Fail the next `count` balance/allowance reads with a network error
    pub fn fail_reads(self, count: u32) -> Self {
        self.state().failing_reads = count;
        self
    }

    /// Fail the next `count` balance/allowance reads with the given error
    pub fn fail_reads_with(self, count: u32, error: LedgerError) -> Self {
        {
            let mut state = self.state();
            state.failing_reads = count;
            state.read_failure = error;
        }
        self
    }

    /// Fail the next `count` confirmation polls with a network error
    pub fn fail_polls(self, count: u32) -> Self {
        self.state().failing_polls = count;
        self
    }

    /// Reject every submission with the given error
    pub fn reject_submissions(self, error: LedgerError) -> Self {
        self.state().submit_error = Some(error);
        self
    }

    /// Delay every read, to exercise deadlines and cancellation
    pub fn with_read_delay(self, delay: Duration) -> Self {
        self.state().read_delay = Some(delay);
        self
    }

    /// Hold approvals for `delay` before answering, like a wallet waiting on
    /// its user
    pub fn delay_approvals(self, delay: Duration) -> Self {
        self.state().approval_delay = Some(delay);
        self
    }

    /// Hold deposits for `delay` before answering
    pub fn delay_deposits(self, delay: Duration) -> Self {
        self.state().deposit_delay = Some(delay);
        self
    }

    // ------------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------------

    /// Every call made so far, in order
    pub fn calls(&self) -> Vec<LedgerCall> {
        self.state().calls.clone()
    }

    pub fn approval_count(&self) -> usize {
        self.count(|call| matches!(call, LedgerCall::Approval { .. }))
    }

    pub fn deposit_count(&self) -> usize {
        self.count(|call| matches!(call, LedgerCall::Deposit(_)))
    }

    pub fn confirmation_polls(&self) -> usize {
        self.count(|call| matches!(call, LedgerCall::Confirmation { .. }))
    }

    /// Parameters of the most recent deposit
    pub fn last_deposit(&self) -> Option<DepositParams> {
        self.state().calls.iter().rev().find_map(|call| match call {
            LedgerCall::Deposit(params) => Some(params.clone()),
            _ => None,
        })
    }

    pub fn current_allowance(&self) -> u128 {
        self.state().allowance
    }

    fn count(&self, predicate: impl Fn(&LedgerCall) -> bool) -> usize {
        self.state().calls.iter().filter(|call| predicate(call)).count()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        // A panicking test thread must not hide the recorded calls from others
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record a read and decide whether it fails
    async fn read(&self, call: LedgerCall) -> Result<(), LedgerError> {
        let delay = {
            let mut state = self.state();
            state.calls.push(call);
            state.read_delay
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        if state.failing_reads > 0 {
            state.failing_reads -= 1;
            return Err(state.read_failure.clone());
        }
        Ok(())
    }

    /// Record a submission and hold it for the configured delay
    async fn submit(&self, call: LedgerCall) {
        let delay = {
            let mut state = self.state();
            let delay = match call {
                LedgerCall::Deposit(_) => state.deposit_delay,
                _ => state.approval_delay,
            };
            state.calls.push(call);
            delay
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn next_tx_id(state: &mut MockState) -> TxId {
        let id = TxId::new(format!("0x{:064x}", state.next_tx));
        state.next_tx += 1;
        id
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn get_native_balance(&self, address: &str) -> Result<u128, LedgerError> {
        self.read(LedgerCall::NativeBalance {
            address: address.to_string(),
        })
        .await?;
        Ok(self.state().native_balance)
    }

    async fn get_token_balance(&self, address: &str) -> Result<u128, LedgerError> {
        self.read(LedgerCall::TokenBalance {
            address: address.to_string(),
        })
        .await?;
        Ok(self.state().token_balance)
    }

    async fn get_allowance(&self, owner: &str, spender: &str) -> Result<u128, LedgerError> {
        self.read(LedgerCall::Allowance {
            owner: owner.to_string(),
            spender: spender.to_string(),
        })
        .await?;
        Ok(self.state().allowance)
    }

    async fn submit_approval(
        &self,
        owner: &str,
        spender: &str,
        amount: u128,
    ) -> Result<TxId, LedgerError> {
        self.submit(LedgerCall::Approval {
            owner: owner.to_string(),
            spender: spender.to_string(),
            amount,
        })
        .await;

        let mut state = self.state();
        if let Some(err) = state.submit_error.clone() {
            return Err(err);
        }

        state.allowance = amount;
        Ok(Self::next_tx_id(&mut state))
    }

    async fn submit_deposit(&self, params: &DepositParams) -> Result<TxId, LedgerError> {
        self.submit(LedgerCall::Deposit(params.clone())).await;

        let mut state = self.state();
        if let Some(err) = state.submit_error.clone() {
            return Err(err);
        }

        let tx_id = Self::next_tx_id(&mut state);
        state.deposits.push(tx_id.clone());
        Ok(tx_id)
    }

    async fn wait_for_confirmation(
        &self,
        tx_id: &TxId,
        min_confirmations: u64,
    ) -> Result<ConfirmationStatus, LedgerError> {
        let mut state = self.state();
        state.calls.push(LedgerCall::Confirmation {
            tx_id: tx_id.clone(),
            min_confirmations,
        });

        if state.failing_polls > 0 {
            state.failing_polls -= 1;
            return Err(LedgerError::network("network request failed")
                .with_detail("HTTP error 503 Service Unavailable"));
        }

        let polls = {
            let count = state.polls.entry(tx_id.clone()).or_insert(0);
            *count += 1;
            *count
        };

        let is_deposit = state.deposits.contains(tx_id);
        let reverts = if is_deposit {
            state.revert_deposit
        } else {
            state.revert_approval
        };

        let confirmations = match state.confirmation {
            Confirmation::AfterPolls(first) if polls >= first => polls - first + 1,
            _ => 0,
        };

        if reverts && confirmations > 0 {
            return Err(LedgerError::reverted("transaction reverted on chain")
                .with_detail(format!("transaction {} failed with status 0", tx_id)));
        }

        if confirmations >= min_confirmations.max(1) {
            Ok(ConfirmationStatus::Confirmed { confirmations })
        } else {
            Ok(ConfirmationStatus::Pending { confirmations })
        }
    }
}
