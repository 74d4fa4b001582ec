//! Testing Utilities
//!
//! In-memory stand-ins for the source chain, for unit tests and downstream
//! crates (enable the `testing` feature).
//!
//! ## Submodules
//!
//! - `mock_ledger` - Scriptable [`LedgerClient`](crate::ledger::LedgerClient) that records every call

pub mod mock_ledger;

pub use mock_ledger::{LedgerCall, MockLedger};
