//! Bridge orchestrator
//!
//! Drives one Ethereum -> Stacks transfer through the state machine:
//!
//! ```text
//! Idle -> ValidatingInput -> CheckingBalance -> CheckingAllowance
//!      -> [Approving ->] Depositing -> AwaitingConfirmation
//!      -> AwaitingSettlement -> Complete
//! ```
//!
//! `Failed` is reachable from every non-terminal state. Each transition emits
//! exactly one [`ProgressEvent`] before the step runs.
//!
//! Every ledger call, submissions included, races the run's deadline and cancel
//! signal. A submission abandoned that way may still have been broadcast; the
//! error says so and carries every id recorded before it.
//!
//! Destination-side settlement is not observed. After the deposit confirms the
//! run waits a fixed grace period and then reports completion.

use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::address_codec::{recipient_for, EncodedRecipient};
use crate::config::BridgeConfig;
use crate::error::{BridgeError, ErrorKind, LedgerErrorKind};
use crate::ledger::{DepositParams, LedgerClient};
use crate::progress::{ProgressEvent, ProgressSender};
use crate::retry::with_retry;
use crate::types::{BridgeOperation, BridgeRequest, BridgeResult, BridgeState, ChainKind, TxId};
use crate::units::{format_units, to_base_units};
use crate::validation::validate_request;

/// Lower bound on the delay between confirmation polls
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Expected seconds until bridged funds are usable on the destination chain
pub fn estimate_bridge_time(source: ChainKind) -> u64 {
    match source {
        ChainKind::Ethereum => 180,
        ChainKind::Stacks => 240,
    }
}

// ============================================================================
// Cancellation
// ============================================================================

/// Caller side of a cancellation flag
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

/// Run side of a cancellation flag
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// A signal to hand to a run; any number may be created
    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Request cancellation of every run holding a signal from this handle
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl CancelSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancellation is requested
    ///
    /// Never resolves if the handle is dropped without cancelling.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Per-run limits
#[derive(Debug, Clone, Default)]
pub struct RunControls {
    /// Overall deadline for the run, measured from its start
    pub timeout: Option<Duration>,
    pub cancel: Option<CancelSignal>,
}

impl RunControls {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancel(mut self, signal: CancelSignal) -> Self {
        self.cancel = Some(signal);
        self
    }
}

/// Why a guarded await stopped early
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    Cancelled,
    Deadline,
}

struct RunLimits {
    deadline: Option<Instant>,
    cancel: Option<CancelSignal>,
}

impl RunLimits {
    /// Race a future against the deadline and the cancel signal
    async fn guard<F: Future>(&mut self, fut: F) -> Result<F::Output, Interrupt> {
        let deadline = self.deadline;
        let cancel = self.cancel.as_mut();

        tokio::select! {
            biased;
            _ = wait_cancelled(cancel) => Err(Interrupt::Cancelled),
            _ = wait_deadline(deadline) => Err(Interrupt::Deadline),
            output = fut => Ok(output),
        }
    }

    /// Check for an interrupt without waiting
    fn check(&self) -> Result<(), Interrupt> {
        if self.cancel.as_ref().map_or(false, CancelSignal::is_cancelled) {
            return Err(Interrupt::Cancelled);
        }
        if self.deadline.map_or(false, |d| Instant::now() >= d) {
            return Err(Interrupt::Deadline);
        }
        Ok(())
    }
}

async fn wait_cancelled(signal: Option<&mut CancelSignal>) {
    match signal {
        Some(signal) => signal.cancelled().await,
        None => std::future::pending().await,
    }
}

async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

// ============================================================================
// Run state
// ============================================================================

struct Run {
    op: BridgeOperation,
    progress: ProgressSender,
    limits: RunLimits,
    recipient: Option<EncodedRecipient>,
}

impl Run {
    fn transition(&mut self, state: BridgeState, message: impl Into<String>) {
        let message = message.into();
        self.op.state = state;

        debug!(
            operation_id = %self.op.operation_id,
            state = %state,
            "{}", message
        );

        self.progress.emit(ProgressEvent {
            operation_id: self.op.operation_id.clone(),
            state,
            message,
            timestamp: Utc::now(),
        });
    }

    /// Map an interrupt to an error, depending on whether anything was broadcast
    fn interrupted(&self, interrupt: Interrupt) -> BridgeError {
        match (interrupt, self.op.last_submitted()) {
            (Interrupt::Cancelled, None) => BridgeError::new(
                ErrorKind::Cancelled,
                "Bridge cancelled before any transaction was submitted",
            ),
            (Interrupt::Cancelled, Some(tx_id)) => BridgeError::new(
                ErrorKind::CancelledWhilePending,
                format!(
                    "Bridge cancelled while transaction {} was pending; it may still be mined",
                    tx_id
                ),
            ),
            (Interrupt::Deadline, None) => BridgeError::new(
                ErrorKind::Timeout,
                "Deadline reached before any transaction was submitted",
            ),
            (Interrupt::Deadline, Some(tx_id)) => BridgeError::new(
                ErrorKind::ConfirmationTimeout,
                format!("Deadline reached while waiting for transaction {}", tx_id),
            ),
        }
    }

    /// Map an interrupt that arrived while `what` was being submitted
    fn abandoned_submission(&self, interrupt: Interrupt, what: &str) -> BridgeError {
        warn!(
            operation_id = %self.op.operation_id,
            interrupt = ?interrupt,
            "{} submission abandoned; broadcast outcome unknown", what
        );
        self.interrupted(interrupt).with_detail(format!(
            "{} submission was in flight when the run stopped; it may still be broadcast",
            what
        ))
    }

    /// Finalize a failure: attach run context, record it and emit `Failed`
    fn fail(&mut self, mut err: BridgeError) -> BridgeError {
        err.operation_id = Some(self.op.operation_id.clone());
        if err.approval_tx_id.is_none() {
            err.approval_tx_id = self.op.approval_tx_id.clone();
        }
        if err.source_tx_id.is_none() {
            err.source_tx_id = self.op.source_tx_id.clone();
        }

        error!(
            operation_id = %self.op.operation_id,
            failed_in = %self.op.state,
            kind = %err.kind,
            source_tx_id = ?err.source_tx_id,
            detail = ?err.detail,
            "Bridge failed: {}", err.message
        );

        self.op.failure = Some(err.clone());
        self.transition(BridgeState::Failed, err.message.clone());
        err
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Runs bridge transfers against a shared ledger client
///
/// Runs are independent; one orchestrator may drive any number of them
/// concurrently.
pub struct BridgeOrchestrator<L: LedgerClient> {
    ledger: Arc<L>,
    config: BridgeConfig,
}

impl<L: LedgerClient> BridgeOrchestrator<L> {
    pub fn new(ledger: Arc<L>, config: BridgeConfig) -> Self {
        Self { ledger, config }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<L> {
        &self.ledger
    }

    /// Run a transfer without a deadline or cancellation
    pub async fn run(
        &self,
        request: BridgeRequest,
        progress: ProgressSender,
    ) -> Result<BridgeResult, BridgeError> {
        self.run_with(request, progress, RunControls::default()).await
    }

    /// Run a transfer under the given deadline and cancel signal
    pub async fn run_with(
        &self,
        request: BridgeRequest,
        progress: ProgressSender,
        controls: RunControls,
    ) -> Result<BridgeResult, BridgeError> {
        let mut run = Run {
            op: BridgeOperation::new(request),
            progress,
            limits: RunLimits {
                deadline: controls.timeout.map(|t| Instant::now() + t),
                cancel: controls.cancel,
            },
            recipient: None,
        };

        info!(
            operation_id = %run.op.operation_id,
            source = %run.op.request.source_chain,
            destination = %run.op.request.destination_chain,
            amount = run.op.request.amount,
            recipient = %run.op.request.destination_address,
            "Starting bridge"
        );

        match self.execute(&mut run).await {
            Ok(result) => {
                info!(
                    operation_id = %result.operation_id,
                    source_tx_id = %result.source_tx_id,
                    elapsed = ?result.elapsed,
                    "Bridge complete"
                );
                Ok(result)
            }
            Err(err) => Err(run.fail(err)),
        }
    }

    async fn execute(&self, run: &mut Run) -> Result<BridgeResult, BridgeError> {
        self.validate_input(run)?;
        self.check_balances(run).await?;

        let approval_needed = self.check_allowance(run).await?;
        if approval_needed {
            self.approve(run).await?;
        }

        self.deposit(run, approval_needed).await?;
        self.await_deposit(run).await?;
        self.await_settlement(run).await?;

        let op = &run.op;
        let result = BridgeResult {
            operation_id: op.operation_id.clone(),
            source_chain: op.request.source_chain,
            destination_chain: op.request.destination_chain,
            source_tx_id: op
                .source_tx_id
                .clone()
                .ok_or_else(|| BridgeError::unknown("Deposit", "no transaction id recorded"))?,
            approval_tx_id: op.approval_tx_id.clone(),
            amount: op.request.amount,
            amount_base_units: op.amount_base_units,
            estimated_seconds: estimate_bridge_time(op.request.source_chain),
            elapsed: op.elapsed(),
        };

        run.transition(
            BridgeState::Complete,
            format!(
                "Bridge complete; funds expected on {} within about {} seconds",
                result.destination_chain, result.estimated_seconds
            ),
        );
        Ok(result)
    }

    // ------------------------------------------------------------------------
    // Steps
    // ------------------------------------------------------------------------

    /// Local checks only; no ledger access
    fn validate_input(&self, run: &mut Run) -> Result<(), BridgeError> {
        run.transition(BridgeState::ValidatingInput, "Validating bridge request");

        let request = &run.op.request;
        validate_request(request)?;

        if request.source_chain != ChainKind::Ethereum {
            return Err(BridgeError::invalid_request(format!(
                "Bridging from {} is not supported",
                request.source_chain
            )));
        }

        let decimals = self.config.token_decimals;
        let amount = to_base_units(request.amount, decimals)?;
        if amount == 0 {
            return Err(BridgeError::invalid_request("Amount must be greater than 0"));
        }
        let max_fee = to_base_units(request.max_fee, decimals)?;
        let recipient = recipient_for(request.destination_chain, &request.destination_address)?;

        run.op.amount_base_units = amount;
        run.op.max_fee_base_units = max_fee;
        run.recipient = Some(recipient);
        Ok(())
    }

    async fn check_balances(&self, run: &mut Run) -> Result<(), BridgeError> {
        run.transition(BridgeState::CheckingBalance, "Checking ETH and USDC balances");

        let owner = run.op.request.source_address.clone();
        let decimals = self.config.token_decimals;

        let native = run
            .limits
            .guard(with_retry(&self.config.retry, "native balance", || {
                self.ledger.get_native_balance(&owner)
            }))
            .await
            .map_err(|i| run.interrupted(i))?
            .map_err(|e| BridgeError::from_ledger("Reading ETH balance", e))?;

        let required_gas = self.config.min_native_balance.max(1);
        if native < required_gas {
            return Err(BridgeError::new(
                ErrorKind::InsufficientGas,
                format!(
                    "Insufficient ETH for gas: balance {} wei, need at least {} wei",
                    native, required_gas
                ),
            ));
        }

        let available = run
            .limits
            .guard(with_retry(&self.config.retry, "token balance", || {
                self.ledger.get_token_balance(&owner)
            }))
            .await
            .map_err(|i| run.interrupted(i))?
            .map_err(|e| BridgeError::from_ledger("Reading USDC balance", e))?;

        let required = run.op.amount_base_units;
        if available < required {
            return Err(BridgeError::new(
                ErrorKind::InsufficientFunds,
                format!(
                    "Insufficient USDC balance: required {} ({} USDC), available {} ({} USDC)",
                    required,
                    format_units(required, decimals),
                    available,
                    format_units(available, decimals)
                ),
            ));
        }

        debug!(
            operation_id = %run.op.operation_id,
            native_wei = native,
            token_balance = available,
            "Balances sufficient"
        );
        Ok(())
    }

    /// Returns whether an approval is needed
    async fn check_allowance(&self, run: &mut Run) -> Result<bool, BridgeError> {
        run.transition(
            BridgeState::CheckingAllowance,
            "Checking USDC allowance for xReserve",
        );

        let owner = run.op.request.source_address.clone();
        let spender = self.config.bridge_contract.clone();

        let allowance = run
            .limits
            .guard(with_retry(&self.config.retry, "allowance", || {
                self.ledger.get_allowance(&owner, &spender)
            }))
            .await
            .map_err(|i| run.interrupted(i))?
            .map_err(|e| BridgeError::from_ledger("Reading USDC allowance", e))?;

        debug!(
            operation_id = %run.op.operation_id,
            allowance = allowance,
            required = run.op.amount_base_units,
            "Allowance read"
        );
        Ok(allowance < run.op.amount_base_units)
    }

    async fn approve(&self, run: &mut Run) -> Result<(), BridgeError> {
        let amount = run.op.amount_base_units;
        run.transition(
            BridgeState::Approving,
            format!(
                "Approving {} USDC for xReserve",
                format_units(amount, self.config.token_decimals)
            ),
        );

        let owner = run.op.request.source_address.clone();
        let tx_id = run
            .limits
            .guard(
                self.ledger
                    .submit_approval(&owner, &self.config.bridge_contract, amount),
            )
            .await
            .map_err(|i| run.abandoned_submission(i, "Approval"))?
            .map_err(|e| BridgeError::from_ledger("Approval failed", e))?;

        info!(
            operation_id = %run.op.operation_id,
            tx_id = %tx_id,
            amount = amount,
            "Approval submitted"
        );
        run.op.approval_tx_id = Some(tx_id.clone());
        run.limits.check().map_err(|i| run.interrupted(i))?;

        let required = self.config.approval_confirmations.max(1);
        self.await_confirmations(run, &tx_id, required, "Approval")
            .await?;
        Ok(())
    }

    async fn deposit(&self, run: &mut Run, approved: bool) -> Result<(), BridgeError> {
        let decimals = self.config.token_decimals;
        let amount = format_units(run.op.amount_base_units, decimals);
        let message = if approved {
            format!(
                "Depositing {} USDC to {}",
                amount, run.op.request.destination_address
            )
        } else {
            format!(
                "Allowance already sufficient; depositing {} USDC to {}",
                amount, run.op.request.destination_address
            )
        };
        run.transition(BridgeState::Depositing, message);

        let remote_recipient = run
            .recipient
            .ok_or_else(|| BridgeError::encoding("Recipient was not encoded"))?;
        let params = DepositParams {
            owner: run.op.request.source_address.clone(),
            bridge_contract: self.config.bridge_contract.clone(),
            value: run.op.amount_base_units,
            remote_domain: self.config.remote_domain,
            remote_recipient,
            local_token: self.config.token_contract.clone(),
            max_fee: run.op.max_fee_base_units,
            hook_data: Vec::new(),
        };

        let tx_id = run
            .limits
            .guard(self.ledger.submit_deposit(&params))
            .await
            .map_err(|i| run.abandoned_submission(i, "Deposit"))?
            .map_err(|e| BridgeError::from_ledger("Deposit failed", e))?;

        info!(
            operation_id = %run.op.operation_id,
            tx_id = %tx_id,
            remote_domain = params.remote_domain,
            recipient = %params.remote_recipient,
            value = params.value,
            max_fee = params.max_fee,
            "Deposit submitted"
        );
        run.op.source_tx_id = Some(tx_id);
        run.limits.check().map_err(|i| run.interrupted(i))
    }

    async fn await_deposit(&self, run: &mut Run) -> Result<(), BridgeError> {
        let tx_id = run
            .op
            .source_tx_id
            .clone()
            .ok_or_else(|| BridgeError::unknown("Deposit", "no transaction id recorded"))?;
        let required = self.config.confirmations.max(1);

        run.transition(
            BridgeState::AwaitingConfirmation,
            format!(
                "Waiting for {} confirmation(s) of deposit {}",
                required, tx_id
            ),
        );

        let confirmations = self
            .await_confirmations(run, &tx_id, required, "Deposit")
            .await?;
        run.op.observe_confirmations(confirmations);
        Ok(())
    }

    async fn await_settlement(&self, run: &mut Run) -> Result<(), BridgeError> {
        let grace = self.config.settlement_grace;
        run.transition(
            BridgeState::AwaitingSettlement,
            format!(
                "Deposit confirmed; allowing {} ms for {} settlement",
                grace.as_millis(),
                run.op.request.destination_chain
            ),
        );

        run.limits
            .guard(tokio::time::sleep(grace))
            .await
            .map_err(|i| run.interrupted(i))
    }

    /// Poll a submitted transaction until it reaches `required` confirmations
    ///
    /// Transient poll failures are logged and polling continues until the
    /// confirmation timeout or the run deadline.
    async fn await_confirmations(
        &self,
        run: &mut Run,
        tx_id: &TxId,
        required: u64,
        what: &str,
    ) -> Result<u64, BridgeError> {
        let interval = self.config.poll_interval.max(MIN_POLL_INTERVAL);
        let max_wait = self.config.confirmation_timeout;
        let started = Instant::now();
        let tracks_deposit = run.op.source_tx_id.as_ref() == Some(tx_id);
        let mut polls: u64 = 0;

        loop {
            polls += 1;
            let poll = run
                .limits
                .guard(self.ledger.wait_for_confirmation(tx_id, required))
                .await
                .map_err(|i| run.interrupted(i))?;

            match poll {
                Ok(status) if status.is_confirmed() => {
                    let confirmations = status.confirmations();
                    info!(
                        operation_id = %run.op.operation_id,
                        tx_id = %tx_id,
                        confirmations = confirmations,
                        polls = polls,
                        "{} confirmed", what
                    );
                    return Ok(confirmations);
                }
                Ok(status) => {
                    let confirmations = status.confirmations();
                    if tracks_deposit {
                        run.op.observe_confirmations(confirmations);
                    }
                    debug!(
                        operation_id = %run.op.operation_id,
                        tx_id = %tx_id,
                        confirmations = confirmations,
                        required = required,
                        "{} pending", what
                    );
                }
                Err(e) if e.kind == LedgerErrorKind::Reverted => {
                    return Err(BridgeError::new(
                        ErrorKind::ChainError,
                        format!("{} transaction {} reverted", what, tx_id),
                    )
                    .with_detail(e.detail.unwrap_or(e.message)));
                }
                Err(e) if e.is_transient() => {
                    warn!(
                        operation_id = %run.op.operation_id,
                        tx_id = %tx_id,
                        error = %e,
                        "Confirmation poll failed, will keep polling"
                    );
                }
                Err(e) => {
                    return Err(BridgeError::from_ledger(
                        &format!("Checking {} confirmation", what.to_lowercase()),
                        e,
                    ));
                }
            }

            if started.elapsed() >= max_wait {
                return Err(BridgeError::new(
                    ErrorKind::ConfirmationTimeout,
                    format!(
                        "{} transaction {} not confirmed within {} seconds",
                        what,
                        tx_id,
                        max_wait.as_secs()
                    ),
                ));
            }

            run.limits
                .guard(tokio::time::sleep(interval))
                .await
                .map_err(|i| run.interrupted(i))?;
        }
    }
}
