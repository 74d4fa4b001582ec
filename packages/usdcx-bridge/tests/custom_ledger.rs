//! Orchestration against a ledger implemented outside the crate
//!
//! Exercises the public `LedgerClient` seam the way an embedding application
//! would plug in its own chain access.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use usdcx_bridge::{
    progress_channel, BridgeConfig, BridgeOrchestrator, BridgeRequest, BridgeState,
    ConfirmationStatus, DepositParams, ErrorKind, LedgerClient, LedgerError, Network,
    ProgressSender, TxId,
};

const ETH: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
const STX: &str = "ST2J6ZY48GV1EZ5V2V5RB9MP66SW86PYKKQYAC0RQ";

/// Funded account that confirms every transaction after two blocks
struct TwoBlockLedger {
    balance: u128,
    allowance: u128,
    polls: AtomicU64,
}

impl TwoBlockLedger {
    fn new(balance: u128, allowance: u128) -> Self {
        Self {
            balance,
            allowance,
            polls: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl LedgerClient for TwoBlockLedger {
    async fn get_native_balance(&self, _address: &str) -> Result<u128, LedgerError> {
        Ok(10u128.pow(17))
    }

    async fn get_token_balance(&self, _address: &str) -> Result<u128, LedgerError> {
        Ok(self.balance)
    }

    async fn get_allowance(&self, _owner: &str, _spender: &str) -> Result<u128, LedgerError> {
        Ok(self.allowance)
    }

    async fn submit_approval(
        &self,
        _owner: &str,
        _spender: &str,
        _amount: u128,
    ) -> Result<TxId, LedgerError> {
        Ok(TxId::from("0xa11ce"))
    }

    async fn submit_deposit(&self, params: &DepositParams) -> Result<TxId, LedgerError> {
        if params.remote_domain != 10003 {
            return Err(LedgerError::chain("unknown remote domain"));
        }
        Ok(TxId::from("0xdeposit"))
    }

    async fn wait_for_confirmation(
        &self,
        _tx_id: &TxId,
        min_confirmations: u64,
    ) -> Result<ConfirmationStatus, LedgerError> {
        let confirmations = self.polls.fetch_add(1, Ordering::SeqCst);
        if confirmations >= min_confirmations {
            Ok(ConfirmationStatus::Confirmed { confirmations })
        } else {
            Ok(ConfirmationStatus::Pending { confirmations })
        }
    }
}

fn config() -> BridgeConfig {
    let mut config = BridgeConfig::for_network(Network::Testnet);
    config.poll_interval = Duration::from_millis(10);
    config.settlement_grace = Duration::from_millis(1);
    config.confirmations = 2;
    config
}

#[test]
fn test_bridge_with_custom_ledger() {
    let ledger = Arc::new(TwoBlockLedger::new(25_000_000, 25_000_000));
    let orchestrator = BridgeOrchestrator::new(ledger.clone(), config());
    let (tx, mut rx) = progress_channel();

    let result = tokio_test::block_on(
        orchestrator.run(BridgeRequest::ethereum_to_stacks(25.0, ETH, STX), tx),
    )
    .unwrap();

    assert_eq!(result.source_tx_id, TxId::from("0xdeposit"));
    assert_eq!(result.amount_base_units, 25_000_000);
    assert!(result.approval_tx_id.is_none());
    assert_eq!(ledger.polls.load(Ordering::SeqCst), 3);

    let states: Vec<_> = rx.drain().into_iter().map(|e| e.state).collect();
    assert_eq!(states.first(), Some(&BridgeState::ValidatingInput));
    assert_eq!(states.last(), Some(&BridgeState::Complete));
}

#[test]
fn test_custom_ledger_insufficient_funds() {
    let ledger = Arc::new(TwoBlockLedger::new(6_000_000, 0));
    let orchestrator = BridgeOrchestrator::new(ledger, config());

    let err = tokio_test::block_on(orchestrator.run(
        BridgeRequest::ethereum_to_stacks(10.0, ETH, STX),
        ProgressSender::discard(),
    ))
    .unwrap_err();

    assert_eq!(err.kind, ErrorKind::InsufficientFunds);
    assert!(err.message.contains("required 10000000"));
    assert!(err.message.contains("available 6000000"));
}
