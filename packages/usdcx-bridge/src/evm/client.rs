//! EVM Ledger Client
//!
//! [`LedgerClient`] over JSON-RPC using alloy.
//!
//! # Transaction Building
//!
//! Reads go through a plain HTTP `RootProvider`. Writes build a wallet provider
//! with `with_recommended_fillers()` so nonce, gas limit and EIP-1559 fees are
//! populated automatically. Submissions return as soon as the node accepts the
//! transaction; confirmation depth is checked separately by polling receipts.
//!
//! # Error Classification
//!
//! Transport failures (connection refused, HTTP 5xx, rate limits) are
//! [`LedgerErrorKind::Network`](crate::error::LedgerErrorKind::Network).
//! JSON-RPC error responses are classified by their message; the raw provider
//! text is always kept as the error detail.

use alloy::{
    network::EthereumWallet,
    primitives::{Address, Bytes, FixedBytes, B256, U256},
    providers::{Provider, ProviderBuilder, RootProvider},
    signers::local::PrivateKeySigner,
    transports::{
        http::{Client, Http},
        RpcError, TransportError,
    },
};
use async_trait::async_trait;
use eyre::{eyre, Result, WrapErr};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

use crate::config::BridgeConfig;
use crate::error::LedgerError;
use crate::evm::contracts::{XReserve, ERC20};
use crate::ledger::{ConfirmationStatus, DepositParams, LedgerClient};
use crate::types::TxId;

/// EVM ledger client configuration
#[derive(Clone)]
pub struct EvmLedgerConfig {
    /// RPC URL (e.g., "http://localhost:8545")
    pub rpc_url: String,
    /// Chain ID
    pub chain_id: u64,
    /// Bridged ERC20 token (USDC)
    pub token: String,
    /// Private key for signing (optional, required for approvals and deposits)
    pub private_key: Option<String>,
}

impl fmt::Debug for EvmLedgerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvmLedgerConfig")
            .field("rpc_url", &self.rpc_url)
            .field("chain_id", &self.chain_id)
            .field("token", &self.token)
            .field(
                "private_key",
                &self.private_key.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

impl From<&BridgeConfig> for EvmLedgerConfig {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            rpc_url: config.eth_rpc_url.clone(),
            chain_id: config.eth_chain_id,
            token: config.token_contract.clone(),
            private_key: config.private_key.clone(),
        }
    }
}

/// Ethereum ledger client
pub struct EvmLedgerClient {
    provider: RootProvider<Http<Client>>,
    rpc_url: String,
    chain_id: u64,
    token: Address,
    signer: Option<PrivateKeySigner>,
}

impl EvmLedgerClient {
    /// Create a new client; no network access happens here
    pub fn new(config: EvmLedgerConfig) -> Result<Self> {
        let provider = ProviderBuilder::new().on_http(
            config
                .rpc_url
                .parse()
                .map_err(|e| eyre!("Invalid RPC URL: {}", e))?,
        );

        let token = Address::from_str(&config.token).wrap_err("Invalid token address")?;

        let signer = match config.private_key.as_deref() {
            Some(key) => Some(
                key.parse::<PrivateKeySigner>()
                    .map_err(|e| eyre!("Invalid private key: {}", e))?,
            ),
            None => None,
        };

        info!(
            chain_id = config.chain_id,
            token = %token,
            signer = ?signer.as_ref().map(|s| s.address()),
            "Created EVM ledger client"
        );

        Ok(Self {
            provider,
            rpc_url: config.rpc_url,
            chain_id: config.chain_id,
            token,
            signer,
        })
    }

    /// Create a client from the bridge configuration
    pub fn from_bridge_config(config: &BridgeConfig) -> Result<Self> {
        Self::new(EvmLedgerConfig::from(config))
    }

    /// Address transactions are signed with, if a key was configured
    pub fn signer_address(&self) -> Option<Address> {
        self.signer.as_ref().map(|s| s.address())
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Check that the RPC endpoint serves the configured chain
    pub async fn verify_chain_id(&self) -> Result<()> {
        let remote = self
            .provider
            .get_chain_id()
            .await
            .wrap_err("Failed to query chain id")?;

        if remote != self.chain_id {
            return Err(eyre!(
                "RPC serves chain {} but {} is configured",
                remote,
                self.chain_id
            ));
        }
        Ok(())
    }

    /// Wallet for `owner`, which must be the configured signer
    fn wallet_for(&self, owner: &str) -> Result<EthereumWallet, LedgerError> {
        let signer = self
            .signer
            .as_ref()
            .ok_or_else(|| LedgerError::unknown("no signing key configured"))?;

        let owner = parse_address(owner)?;
        if owner != signer.address() {
            return Err(LedgerError::unknown(format!(
                "cannot sign for {}, configured signer is {}",
                owner,
                signer.address()
            )));
        }

        Ok(EthereumWallet::from(signer.clone()))
    }

    fn parse_rpc_url<T: FromStr>(&self) -> Result<T, LedgerError>
    where
        T::Err: fmt::Display,
    {
        self.rpc_url
            .parse()
            .map_err(|e: T::Err| LedgerError::unknown("invalid RPC URL").with_detail(e.to_string()))
    }
}

#[async_trait]
impl LedgerClient for EvmLedgerClient {
    async fn get_native_balance(&self, address: &str) -> Result<u128, LedgerError> {
        let address = parse_address(address)?;
        let balance = self
            .provider
            .get_balance(address)
            .await
            .map_err(|e| classify_transport_error(&e))?;
        Ok(saturating_u128(balance))
    }

    async fn get_token_balance(&self, address: &str) -> Result<u128, LedgerError> {
        let account = parse_address(address)?;
        let contract = ERC20::new(self.token, &self.provider);
        let balance = contract
            .balanceOf(account)
            .call()
            .await
            .map_err(classify_contract_error)?;
        Ok(saturating_u128(balance._0))
    }

    async fn get_allowance(&self, owner: &str, spender: &str) -> Result<u128, LedgerError> {
        let owner = parse_address(owner)?;
        let spender = parse_address(spender)?;
        let contract = ERC20::new(self.token, &self.provider);
        let allowance = contract
            .allowance(owner, spender)
            .call()
            .await
            .map_err(classify_contract_error)?;
        Ok(saturating_u128(allowance._0))
    }

    async fn submit_approval(
        &self,
        owner: &str,
        spender: &str,
        amount: u128,
    ) -> Result<TxId, LedgerError> {
        let wallet = self.wallet_for(owner)?;
        let spender = parse_address(spender)?;

        // Recommended fillers populate nonce, gas and fees
        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(wallet)
            .on_http(self.parse_rpc_url()?);

        let contract = ERC20::new(self.token, &provider);
        let pending = contract
            .approve(spender, U256::from(amount))
            .send()
            .await
            .map_err(classify_contract_error)?;

        let tx_hash = *pending.tx_hash();
        info!(tx_hash = %tx_hash, spender = %spender, amount = amount, "Approval sent");

        Ok(TxId::new(format!("0x{:x}", tx_hash)))
    }

    async fn submit_deposit(&self, params: &DepositParams) -> Result<TxId, LedgerError> {
        let wallet = self.wallet_for(&params.owner)?;
        let local_token = parse_address(&params.local_token)?;
        let bridge = parse_address(&params.bridge_contract)?;

        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(wallet)
            .on_http(self.parse_rpc_url()?);

        let contract = XReserve::new(bridge, &provider);

        debug!(
            bridge = %bridge,
            remote_domain = params.remote_domain,
            remote_recipient = %params.remote_recipient,
            value = params.value,
            max_fee = params.max_fee,
            "Submitting depositToRemote"
        );

        let pending = contract
            .depositToRemote(
                U256::from(params.value),
                params.remote_domain,
                FixedBytes::from(*params.remote_recipient.as_bytes()),
                local_token,
                U256::from(params.max_fee),
                Bytes::from(params.hook_data.clone()),
            )
            .send()
            .await
            .map_err(classify_contract_error)?;

        let tx_hash = *pending.tx_hash();
        info!(tx_hash = %tx_hash, "Deposit transaction sent");

        Ok(TxId::new(format!("0x{:x}", tx_hash)))
    }

    async fn wait_for_confirmation(
        &self,
        tx_id: &TxId,
        min_confirmations: u64,
    ) -> Result<ConfirmationStatus, LedgerError> {
        let tx_hash = parse_tx_hash(tx_id)?;

        let receipt = match self
            .provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| classify_transport_error(&e))?
        {
            Some(receipt) => receipt,
            None => return Ok(ConfirmationStatus::Pending { confirmations: 0 }),
        };

        if !receipt.status() {
            return Err(LedgerError::reverted("transaction reverted on chain")
                .with_detail(format!("receipt status 0 for {}", tx_id)));
        }

        let head = self
            .provider
            .get_block_number()
            .await
            .map_err(|e| classify_transport_error(&e))?;
        let confirmations = receipt
            .block_number
            .map(|mined| confirmation_depth(head, mined))
            .unwrap_or(0);

        if confirmations >= min_confirmations.max(1) {
            Ok(ConfirmationStatus::Confirmed { confirmations })
        } else {
            Ok(ConfirmationStatus::Pending { confirmations })
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Classify an RPC/transport failure
pub fn classify_transport_error(err: &TransportError) -> LedgerError {
    match err {
        RpcError::Transport(kind) => {
            LedgerError::network("network request failed").with_detail(kind.to_string())
        }
        other => LedgerError::from_provider_message(&other.to_string()),
    }
}

fn classify_contract_error(err: alloy::contract::Error) -> LedgerError {
    match err {
        alloy::contract::Error::TransportError(e) => classify_transport_error(&e),
        other => LedgerError::from_provider_message(&other.to_string()),
    }
}

fn parse_address(value: &str) -> Result<Address, LedgerError> {
    Address::from_str(value).map_err(|e| {
        LedgerError::unknown(format!("invalid EVM address {}", value)).with_detail(e.to_string())
    })
}

fn parse_tx_hash(tx_id: &TxId) -> Result<B256, LedgerError> {
    B256::from_str(tx_id.as_str()).map_err(|e| {
        LedgerError::unknown(format!("invalid transaction hash {}", tx_id)).with_detail(e.to_string())
    })
}

/// Values above `u128::MAX` (unlimited approvals) saturate
fn saturating_u128(value: U256) -> u128 {
    u128::try_from(value).unwrap_or(u128::MAX)
}

/// Blocks on top of the mined block, counting the block itself
fn confirmation_depth(head: u64, mined: u64) -> u64 {
    if head < mined {
        // Load-balanced RPCs can briefly report a stale head
        1
    } else {
        head - mined + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LedgerErrorKind;
    use alloy::transports::TransportErrorKind;

    /// Anvil account #0
    const ANVIL_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const ANVIL_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
    const USDC: &str = "0x1c7D4B196Cb0C7B01d743Fbc6116a902379C7238";

    fn config(private_key: Option<&str>) -> EvmLedgerConfig {
        EvmLedgerConfig {
            rpc_url: "http://localhost:8545".to_string(),
            chain_id: 31337,
            token: USDC.to_string(),
            private_key: private_key.map(str::to_string),
        }
    }

    #[test]
    fn test_saturating_u128() {
        assert_eq!(saturating_u128(U256::from(42u64)), 42);
        assert_eq!(saturating_u128(U256::from(u128::MAX)), u128::MAX);
        assert_eq!(saturating_u128(U256::MAX), u128::MAX);
    }

    #[test]
    fn test_confirmation_depth() {
        assert_eq!(confirmation_depth(100, 100), 1);
        assert_eq!(confirmation_depth(105, 100), 6);
        assert_eq!(confirmation_depth(99, 100), 1);
    }

    #[test]
    fn test_parse_tx_hash() {
        let tx = TxId::new(format!("0x{}", "ab".repeat(32)));
        assert!(parse_tx_hash(&tx).is_ok());

        let err = parse_tx_hash(&TxId::new("0x1234")).unwrap_err();
        assert_eq!(err.kind, LedgerErrorKind::Unknown);
    }

    #[test]
    fn test_transport_errors_are_network() {
        let err = classify_transport_error(&TransportErrorKind::custom_str("connection refused"));
        assert_eq!(err.kind, LedgerErrorKind::Network);
        assert!(err.detail.unwrap().contains("connection refused"));

        let err = classify_transport_error(&TransportErrorKind::backend_gone());
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_client_construction() {
        let client = EvmLedgerClient::new(config(Some(ANVIL_KEY))).unwrap();
        assert_eq!(
            client.signer_address(),
            Some(Address::from_str(ANVIL_ADDRESS).unwrap())
        );
        assert_eq!(client.chain_id(), 31337);

        let read_only = EvmLedgerClient::new(config(None)).unwrap();
        assert!(read_only.signer_address().is_none());

        assert!(EvmLedgerClient::new(config(Some("not-a-key"))).is_err());
    }

    #[tokio::test]
    async fn test_wallet_requires_matching_owner() {
        let client = EvmLedgerClient::new(config(Some(ANVIL_KEY))).unwrap();
        assert!(client.wallet_for(ANVIL_ADDRESS).is_ok());

        let err = client
            .wallet_for("0x70997970C51812dc3A010C7d01b50e0d17dc79C8")
            .unwrap_err();
        assert_eq!(err.kind, LedgerErrorKind::Unknown);

        let read_only = EvmLedgerClient::new(config(None)).unwrap();
        assert!(read_only.wallet_for(ANVIL_ADDRESS).is_err());
    }

    #[test]
    fn test_config_debug_redacts_key() {
        let debug = format!("{:?}", config(Some(ANVIL_KEY)));
        assert!(!debug.contains("ac0974"));
    }
}
