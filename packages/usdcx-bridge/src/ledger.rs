//! Source-chain ledger capability
//!
//! The orchestrator talks to the source chain only through [`LedgerClient`].
//! Implementations are shared across concurrent runs, so they must be
//! `Send + Sync` and must not keep per-run mutable state.
//!
//! Amounts at this boundary are integers in base units. Balances that exceed
//! `u128` (e.g. unlimited approvals) saturate at `u128::MAX`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::address_codec::EncodedRecipient;
use crate::error::LedgerError;
use crate::types::TxId;

/// Parameters of an xReserve `depositToRemote` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositParams {
    /// Account the deposit is sent from
    pub owner: String,
    /// xReserve contract receiving the call
    pub bridge_contract: String,
    /// Amount in base units
    pub value: u128,
    /// xReserve domain of the destination chain
    pub remote_domain: u32,
    pub remote_recipient: EncodedRecipient,
    /// Token contract on the source chain
    pub local_token: String,
    /// Fee ceiling in base units
    pub max_fee: u128,
    /// Opaque hook payload, empty in the default flow
    pub hook_data: Vec<u8>,
}

/// Snapshot of a submitted transaction's progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConfirmationStatus {
    /// Not mined yet, or mined with fewer than the requested confirmations
    Pending { confirmations: u64 },
    /// Mined, succeeded, and buried under enough blocks
    Confirmed { confirmations: u64 },
}

impl ConfirmationStatus {
    pub fn confirmations(&self) -> u64 {
        match self {
            ConfirmationStatus::Pending { confirmations }
            | ConfirmationStatus::Confirmed { confirmations } => *confirmations,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, ConfirmationStatus::Confirmed { .. })
    }
}

/// Read and write access to the source chain
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Native currency balance, used for gas sufficiency checks
    async fn get_native_balance(&self, address: &str) -> Result<u128, LedgerError>;

    /// Bridged token balance
    async fn get_token_balance(&self, address: &str) -> Result<u128, LedgerError>;

    /// Amount `spender` may move out of `owner`'s token balance
    async fn get_allowance(&self, owner: &str, spender: &str) -> Result<u128, LedgerError>;

    /// Broadcast a token approval; returns as soon as the transaction is sent
    async fn submit_approval(
        &self,
        owner: &str,
        spender: &str,
        amount: u128,
    ) -> Result<TxId, LedgerError>;

    /// Broadcast the bridge deposit; returns as soon as the transaction is sent
    async fn submit_deposit(&self, params: &DepositParams) -> Result<TxId, LedgerError>;

    /// Check how far a transaction has progressed towards `min_confirmations`
    ///
    /// This is a single bounded poll. A mined transaction whose execution
    /// failed is reported as a [`LedgerErrorKind::Reverted`] error.
    ///
    /// [`LedgerErrorKind::Reverted`]: crate::error::LedgerErrorKind::Reverted
    async fn wait_for_confirmation(
        &self,
        tx_id: &TxId,
        min_confirmations: u64,
    ) -> Result<ConfirmationStatus, LedgerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirmation_status() {
        let pending = ConfirmationStatus::Pending { confirmations: 0 };
        assert!(!pending.is_confirmed());
        assert_eq!(pending.confirmations(), 0);

        let confirmed = ConfirmationStatus::Confirmed { confirmations: 3 };
        assert!(confirmed.is_confirmed());
        assert_eq!(confirmed.confirmations(), 3);

        assert_eq!(
            serde_json::to_string(&confirmed).unwrap(),
            r#"{"status":"confirmed","confirmations":3}"#
        );
    }
}
