//! EVM Module
//!
//! alloy-backed [`LedgerClient`](crate::ledger::LedgerClient) for the Ethereum
//! side of the bridge.
//!
//! ## Submodules
//!
//! - `client` - `EvmLedgerClient`: balances, allowance, approve, deposit, receipts
//! - `contracts` - sol! bindings for ERC20 and xReserve

pub mod client;
pub mod contracts;

pub use client::{classify_transport_error, EvmLedgerClient, EvmLedgerConfig};
pub use contracts::{XReserve, ERC20};
