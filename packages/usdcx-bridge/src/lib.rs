//! USDCx Bridge: Ethereum -> Stacks Bridge Orchestration Engine
//!
//! This crate drives a single-direction USDC bridge transfer through the xReserve
//! contract on Ethereum and reports fine-grained progress to the caller:
//!
//! - **Validation** - Pure address and amount checks run before any network access
//! - **Units** - Exact decimal <-> base unit conversion (no silent rounding)
//! - **Address Encoding** - c32check Stacks addresses <-> 32-byte xReserve recipients
//! - **Ledger** - Async capability trait for the source chain (reads, writes, confirmations)
//! - **Orchestrator** - The bridge state machine (balance, allowance, approval, deposit, confirmation)
//! - **Progress** - Ordered, unbounded stream of state transitions
//! - **EVM Module** - alloy-backed `LedgerClient` for Ethereum
//! - **Testing Module** - In-memory `MockLedger` for deterministic tests
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use usdcx_bridge::{progress_channel, BridgeConfig, BridgeOrchestrator, BridgeRequest, Network};
//!
//! let config = BridgeConfig::for_network(Network::Testnet);
//! let orchestrator = BridgeOrchestrator::new(Arc::new(ledger), config);
//! let (tx, mut rx) = progress_channel();
//! let request = BridgeRequest::ethereum_to_stacks(10.0, "0x...", "ST...");
//! let result = orchestrator.run(request, tx).await?;
//! ```
//!
//! ## Feature Flags
//!
//! - `evm` - Enable the alloy Ethereum ledger client (default)
//! - `testing` - Enable the in-memory mock ledger for downstream tests
//! - `full` - Enable all features

// Core modules (always available)
pub mod address_codec;
pub mod config;
pub mod error;
pub mod ledger;
pub mod orchestrator;
pub mod progress;
pub mod retry;
pub mod types;
pub mod units;
pub mod validation;

// Chain-specific modules (feature-gated)
#[cfg(feature = "evm")]
pub mod evm;

// Testing utilities (feature-gated, always built for unit tests)
#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export commonly used items at the crate root
pub use address_codec::{
    c32_address, c32_address_decode, decode_recipient, encode_recipient, recipient_for,
    EncodedRecipient, StacksAddress,
};
pub use config::{BridgeConfig, Network};
pub use error::{BridgeError, ErrorKind, LedgerError, LedgerErrorKind};
pub use ledger::{ConfirmationStatus, DepositParams, LedgerClient};
pub use orchestrator::{estimate_bridge_time, BridgeOrchestrator, CancelHandle, CancelSignal, RunControls};
pub use progress::{progress_channel, ProgressEvent, ProgressReceiver, ProgressSender};
pub use retry::RetryConfig;
pub use types::{BridgeOperation, BridgeRequest, BridgeResult, BridgeState, ChainKind, TxId};
pub use units::{format_amount, format_units, parse_units, to_base_units, USDC_DECIMALS};
pub use validation::{
    validate_address, validate_amount, validate_destination_address, validate_max_fee,
    validate_request, validate_source_address,
};
