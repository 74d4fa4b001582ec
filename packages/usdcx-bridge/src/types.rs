//! Common types for bridge operations
//!
//! Requests, per-run operation state, results and the state machine values shared
//! by the orchestrator, the progress channel and the ledger adapters.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

use crate::error::BridgeError;

// ============================================================================
// Chains
// ============================================================================

/// One of the two ledgers a bridge transfer moves value between
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainKind {
    /// Ethereum (EVM, USDC + xReserve)
    Ethereum,
    /// Stacks (c32check addresses, USDCx)
    Stacks,
}

impl ChainKind {
    /// Get the chain as a lowercase string
    pub fn as_str(&self) -> &'static str {
        match self {
            ChainKind::Ethereum => "ethereum",
            ChainKind::Stacks => "stacks",
        }
    }
}

impl fmt::Display for ChainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Transaction ID
// ============================================================================

/// Opaque transaction identifier returned by a ledger write
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxId(pub String);

impl TxId {
    pub fn new(id: impl Into<String>) -> Self {
        TxId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TxId {
    fn from(id: String) -> Self {
        TxId(id)
    }
}

impl From<&str> for TxId {
    fn from(id: &str) -> Self {
        TxId(id.to_string())
    }
}

// ============================================================================
// Bridge Request
// ============================================================================

/// Caller-supplied parameters of one bridge transfer
///
/// Amounts are in human-readable units of the source asset (e.g. `10.5` USDC).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeRequest {
    pub source_chain: ChainKind,
    pub destination_chain: ChainKind,
    pub amount: f64,
    /// Account on the source chain authorizing the transfer
    pub source_address: String,
    /// Recipient on the destination chain
    pub destination_address: String,
    /// Fee ceiling the caller accepts, same denomination as `amount`
    #[serde(default)]
    pub max_fee: f64,
}

impl BridgeRequest {
    /// Build an Ethereum -> Stacks request with a zero fee ceiling
    pub fn ethereum_to_stacks(
        amount: f64,
        eth_address: impl Into<String>,
        stacks_address: impl Into<String>,
    ) -> Self {
        Self {
            source_chain: ChainKind::Ethereum,
            destination_chain: ChainKind::Stacks,
            amount,
            source_address: eth_address.into(),
            destination_address: stacks_address.into(),
            max_fee: 0.0,
        }
    }

    /// Set the fee ceiling
    pub fn with_max_fee(mut self, max_fee: f64) -> Self {
        self.max_fee = max_fee;
        self
    }
}

// ============================================================================
// State Machine
// ============================================================================

/// Orchestrator state
///
/// `Idle` is initial, `Complete` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeState {
    Idle,
    ValidatingInput,
    CheckingBalance,
    CheckingAllowance,
    Approving,
    Depositing,
    AwaitingConfirmation,
    AwaitingSettlement,
    Complete,
    Failed,
}

impl BridgeState {
    /// Stable token used in serialized progress events
    pub fn as_str(&self) -> &'static str {
        match self {
            BridgeState::Idle => "idle",
            BridgeState::ValidatingInput => "validating_input",
            BridgeState::CheckingBalance => "checking_balance",
            BridgeState::CheckingAllowance => "checking_allowance",
            BridgeState::Approving => "approving",
            BridgeState::Depositing => "depositing",
            BridgeState::AwaitingConfirmation => "awaiting_confirmation",
            BridgeState::AwaitingSettlement => "awaiting_settlement",
            BridgeState::Complete => "complete",
            BridgeState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BridgeState::Complete | BridgeState::Failed)
    }
}

impl fmt::Display for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Bridge Operation
// ============================================================================

/// Mutable record of a single orchestration run
///
/// Created when a run starts and owned by the orchestrator for its duration.
/// The id is for log correlation only and is never reused for replay.
#[derive(Debug, Clone)]
pub struct BridgeOperation {
    pub operation_id: String,
    pub request: BridgeRequest,
    pub state: BridgeState,
    pub amount_base_units: u128,
    pub max_fee_base_units: u128,
    pub approval_tx_id: Option<TxId>,
    pub source_tx_id: Option<TxId>,
    pub confirmation_count: u64,
    pub failure: Option<BridgeError>,
    pub started_at: Instant,
}

impl BridgeOperation {
    /// Start a new operation in the `Idle` state
    pub fn new(request: BridgeRequest) -> Self {
        Self {
            operation_id: generate_operation_id(),
            request,
            state: BridgeState::Idle,
            amount_base_units: 0,
            max_fee_base_units: 0,
            approval_tx_id: None,
            source_tx_id: None,
            confirmation_count: 0,
            failure: None,
            started_at: Instant::now(),
        }
    }

    /// Record a confirmation count, never moving backwards
    pub fn observe_confirmations(&mut self, confirmations: u64) {
        self.confirmation_count = self.confirmation_count.max(confirmations);
    }

    /// Most recently broadcast transaction, if any
    pub fn last_submitted(&self) -> Option<&TxId> {
        self.source_tx_id.as_ref().or(self.approval_tx_id.as_ref())
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Generate a `bridge_<unix-millis>_<9 base36 chars>` operation id
pub fn generate_operation_id() -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    let mut rng = rand::thread_rng();
    let suffix: String = (0..9)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();

    format!("bridge_{}_{}", chrono::Utc::now().timestamp_millis(), suffix)
}

// ============================================================================
// Bridge Result
// ============================================================================

/// Successful outcome of a bridge run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeResult {
    pub operation_id: String,
    pub source_chain: ChainKind,
    pub destination_chain: ChainKind,
    /// Deposit transaction on the source chain
    pub source_tx_id: TxId,
    /// Approval transaction, if one was needed
    pub approval_tx_id: Option<TxId>,
    /// Requested amount in human units
    pub amount: f64,
    pub amount_base_units: u128,
    /// Expected end-to-end time until funds are usable on the destination chain
    pub estimated_seconds: u64,
    /// Time this run actually took
    pub elapsed: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_tokens_are_stable() {
        assert_eq!(BridgeState::ValidatingInput.as_str(), "validating_input");
        assert_eq!(BridgeState::AwaitingSettlement.as_str(), "awaiting_settlement");
        assert_eq!(
            serde_json::to_string(&BridgeState::CheckingAllowance).unwrap(),
            "\"checking_allowance\""
        );
        assert_eq!(format!("{}", BridgeState::Complete), "complete");
    }

    #[test]
    fn test_terminal_states() {
        assert!(BridgeState::Complete.is_terminal());
        assert!(BridgeState::Failed.is_terminal());
        assert!(!BridgeState::Idle.is_terminal());
        assert!(!BridgeState::AwaitingConfirmation.is_terminal());
    }

    #[test]
    fn test_operation_id_format() {
        let id = generate_operation_id();
        let parts: Vec<&str> = id.split('_').collect();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "bridge");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 9);
        assert!(parts[2]
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));

        assert_ne!(generate_operation_id(), generate_operation_id());
    }

    #[test]
    fn test_confirmations_never_decrease() {
        let mut op = BridgeOperation::new(BridgeRequest::ethereum_to_stacks(1.0, "0x", "SP"));
        op.observe_confirmations(3);
        op.observe_confirmations(1);
        assert_eq!(op.confirmation_count, 3);
        op.observe_confirmations(5);
        assert_eq!(op.confirmation_count, 5);
    }

    #[test]
    fn test_last_submitted_prefers_deposit() {
        let mut op = BridgeOperation::new(BridgeRequest::ethereum_to_stacks(1.0, "0x", "SP"));
        assert!(op.last_submitted().is_none());

        op.approval_tx_id = Some(TxId::from("0xa1"));
        assert_eq!(op.last_submitted(), Some(&TxId::from("0xa1")));

        op.source_tx_id = Some(TxId::from("0xd1"));
        assert_eq!(op.last_submitted(), Some(&TxId::from("0xd1")));
    }

    #[test]
    fn test_request_builder() {
        let request = BridgeRequest::ethereum_to_stacks(
            10.0,
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266",
            "SP2J6ZY48GV1EZ5V2V5RB9MP66SW86PYKKNRV9EJ7",
        )
        .with_max_fee(0.5);

        assert_eq!(request.source_chain, ChainKind::Ethereum);
        assert_eq!(request.destination_chain, ChainKind::Stacks);
        assert_eq!(request.max_fee, 0.5);
    }
}
