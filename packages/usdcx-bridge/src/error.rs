//! Error taxonomy for bridge runs and ledger calls
//!
//! Ledger adapters classify provider failures into [`LedgerErrorKind`] at the
//! boundary. The orchestrator only branches on kinds and surfaces a [`BridgeError`]
//! whose `message` is user-facing; raw provider text is kept in `detail`.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::types::TxId;

// ============================================================================
// Bridge Errors
// ============================================================================

/// Kind of a failed bridge run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad address or amount, or source == destination
    InvalidRequest,
    /// Not enough native currency to pay for gas
    InsufficientGas,
    /// Token balance lower than the requested amount
    InsufficientFunds,
    /// Transient RPC failure that survived the read retries
    NetworkError,
    /// The chain rejected or reverted a transaction
    ChainError,
    /// Submitted transaction not confirmed before the deadline
    ConfirmationTimeout,
    /// Overall deadline elapsed before anything was submitted
    Timeout,
    /// Caller cancelled before anything was submitted
    Cancelled,
    /// Caller cancelled while a submitted transaction was still pending
    CancelledWhilePending,
    /// Recipient address could not be encoded
    EncodingError,
    UnknownError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::InsufficientGas => "insufficient_gas",
            ErrorKind::InsufficientFunds => "insufficient_funds",
            ErrorKind::NetworkError => "network_error",
            ErrorKind::ChainError => "chain_error",
            ErrorKind::ConfirmationTimeout => "confirmation_timeout",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::CancelledWhilePending => "cancelled_while_pending",
            ErrorKind::EncodingError => "encoding_error",
            ErrorKind::UnknownError => "unknown_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A classified bridge failure
///
/// Transaction ids recorded before the failure are always carried along so the
/// caller can check the source chain manually.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}: {message}")]
pub struct BridgeError {
    pub kind: ErrorKind,
    /// Non-technical message suitable for display
    pub message: String,
    pub operation_id: Option<String>,
    pub approval_tx_id: Option<TxId>,
    pub source_tx_id: Option<TxId>,
    /// Raw underlying error text, for diagnostics only
    pub detail: Option<String>,
}

impl BridgeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            operation_id: None,
            approval_tx_id: None,
            source_tx_id: None,
            detail: None,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, message)
    }

    pub fn encoding(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::EncodingError, message)
    }

    /// Wrap an unrecognized failure, preserving its original text
    pub fn unknown(context: &str, original: impl fmt::Display) -> Self {
        Self::new(ErrorKind::UnknownError, format!("{} failed unexpectedly", context))
            .with_detail(original.to_string())
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Convert a ledger failure raised while performing `context`
    ///
    /// A provider-side timeout is a transport failure here. Confirmation
    /// timeouts are raised by the orchestrator's own polling budget, never by
    /// this conversion.
    pub fn from_ledger(context: &str, err: LedgerError) -> Self {
        let kind = match err.kind {
            LedgerErrorKind::Network | LedgerErrorKind::Timeout => ErrorKind::NetworkError,
            LedgerErrorKind::Chain | LedgerErrorKind::Reverted => ErrorKind::ChainError,
            LedgerErrorKind::Unknown => ErrorKind::UnknownError,
        };
        let mut error = Self::new(kind, format!("{}: {}", context, err.message));
        error.detail = err.detail.or(Some(err.message));
        error
    }

    pub fn is_retryable(&self) -> bool {
        self.kind == ErrorKind::NetworkError
    }
}

// ============================================================================
// Ledger Errors
// ============================================================================

/// Classification of a ledger call failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerErrorKind {
    /// Transient transport failure - safe to retry the same call
    Network,
    /// The chain refused the call (invalid tx, insufficient funds, nonce...)
    Chain,
    /// The transaction was mined but execution reverted
    Reverted,
    /// The provider gave up waiting
    Timeout,
    Unknown,
}

impl LedgerErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerErrorKind::Network => "network",
            LedgerErrorKind::Chain => "chain",
            LedgerErrorKind::Reverted => "reverted",
            LedgerErrorKind::Timeout => "timeout",
            LedgerErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for LedgerErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A failed ledger call, already classified by the adapter
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} error: {message}")]
pub struct LedgerError {
    pub kind: LedgerErrorKind,
    /// Non-technical description
    pub message: String,
    /// Raw provider text
    pub detail: Option<String>,
}

impl LedgerError {
    pub fn new(kind: LedgerErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            detail: None,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(LedgerErrorKind::Network, message)
    }

    pub fn chain(message: impl Into<String>) -> Self {
        Self::new(LedgerErrorKind::Chain, message)
    }

    pub fn reverted(message: impl Into<String>) -> Self {
        Self::new(LedgerErrorKind::Reverted, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(LedgerErrorKind::Timeout, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(LedgerErrorKind::Unknown, message)
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Whether repeating the same read may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self.kind, LedgerErrorKind::Network | LedgerErrorKind::Timeout)
    }

    /// Classify a raw provider error string
    ///
    /// Only ledger adapters call this; the message becomes a display-safe
    /// summary and the raw text is kept as `detail`.
    pub fn from_provider_message(raw: &str) -> Self {
        let (kind, message) = classify_provider_message(raw);
        Self::new(kind, message).with_detail(raw)
    }
}

/// Map provider error text to a ledger error kind and a display message
pub fn classify_provider_message(error: &str) -> (LedgerErrorKind, &'static str) {
    let error_lower = error.to_lowercase();

    // Wallet-side refusals
    if error_lower.contains("user rejected") || error_lower.contains("user denied") {
        return (LedgerErrorKind::Chain, "transaction rejected by user");
    }

    if error_lower.contains("insufficient funds") {
        return (LedgerErrorKind::Chain, "insufficient funds for transaction");
    }

    // Execution failures
    if error_lower.contains("execution reverted") || error_lower.contains("reverted") {
        return (LedgerErrorKind::Reverted, "transaction reverted on chain");
    }

    if error_lower.contains("nonce too low")
        || error_lower.contains("nonce too high")
        || error_lower.contains("already known")
        || error_lower.contains("underpriced")
        || error_lower.contains("gas price too low")
        || error_lower.contains("max fee per gas less than")
        || error_lower.contains("out of gas")
        || error_lower.contains("invalid signature")
    {
        return (LedgerErrorKind::Chain, "transaction rejected by the chain");
    }

    // Transient errors
    if error_lower.contains("timeout")
        || error_lower.contains("timed out")
        || error_lower.contains("connection")
        || error_lower.contains("network")
        || error_lower.contains("rate limit")
        || error_lower.contains("too many requests")
        || error_lower.contains("503")
        || error_lower.contains("502")
        || error_lower.contains("temporarily unavailable")
    {
        return (LedgerErrorKind::Network, "network request failed");
    }

    (LedgerErrorKind::Unknown, "unexpected provider error")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_classification() {
        assert_eq!(
            classify_provider_message("connection timeout").0,
            LedgerErrorKind::Network
        );
        assert_eq!(
            classify_provider_message("HTTP error 503 Service Unavailable").0,
            LedgerErrorKind::Network
        );
        assert_eq!(
            classify_provider_message("execution reverted: ERC20: insufficient allowance").0,
            LedgerErrorKind::Reverted
        );
        assert_eq!(
            classify_provider_message("replacement transaction underpriced").0,
            LedgerErrorKind::Chain
        );
        assert_eq!(
            classify_provider_message("some unknown error").0,
            LedgerErrorKind::Unknown
        );
    }

    #[test]
    fn test_wallet_refusals_get_friendly_messages() {
        let err = LedgerError::from_provider_message("MetaMask: User rejected the request");
        assert_eq!(err.kind, LedgerErrorKind::Chain);
        assert_eq!(err.message, "transaction rejected by user");
        assert_eq!(
            err.detail.as_deref(),
            Some("MetaMask: User rejected the request")
        );

        let err = LedgerError::from_provider_message("insufficient funds for gas * price + value");
        assert_eq!(err.message, "insufficient funds for transaction");
    }

    #[test]
    fn test_bridge_error_from_ledger() {
        let err = BridgeError::from_ledger(
            "Reading USDC balance",
            LedgerError::network("network request failed").with_detail("error sending request"),
        );
        assert_eq!(err.kind, ErrorKind::NetworkError);
        assert!(err.is_retryable());
        assert_eq!(err.message, "Reading USDC balance: network request failed");
        assert_eq!(err.detail.as_deref(), Some("error sending request"));

        let err = BridgeError::from_ledger("Deposit", LedgerError::reverted("reverted"));
        assert_eq!(err.kind, ErrorKind::ChainError);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_provider_timeout_is_a_network_error() {
        let timeout = LedgerError::timeout("request timed out");
        assert!(timeout.is_transient());

        let err = BridgeError::from_ledger("Reading USDC balance", timeout);
        assert_eq!(err.kind, ErrorKind::NetworkError);
        assert_ne!(err.kind, ErrorKind::ConfirmationTimeout);
        assert!(err.source_tx_id.is_none());
    }

    #[test]
    fn test_unknown_preserves_original_message() {
        let err = BridgeError::unknown("Deposit", "weird provider blob 0xdeadbeef");
        assert_eq!(err.kind, ErrorKind::UnknownError);
        assert_eq!(err.detail.as_deref(), Some("weird provider blob 0xdeadbeef"));
        assert!(!err.message.contains("0xdeadbeef"));
    }

    #[test]
    fn test_display() {
        let err = BridgeError::invalid_request("Amount must be greater than 0");
        assert_eq!(err.to_string(), "invalid_request: Amount must be greater than 0");
    }
}
