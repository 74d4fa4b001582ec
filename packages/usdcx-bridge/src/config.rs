//! Bridge configuration
//!
//! Network presets for the xReserve deployment plus orchestration tuning.
//! [`BridgeConfig::from_env`] layers environment overrides (and an optional
//! `.env` file) on top of the preset.

use eyre::{eyre, Result, WrapErr};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::retry::RetryConfig;

/// xReserve contract, same address on mainnet and Sepolia
pub const X_RESERVE_CONTRACT: &str = "0x008888878f94C0d87defdf0B07f46B93C1934442";

/// USDC on Ethereum mainnet
pub const MAINNET_USDC_CONTRACT: &str = "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48";

/// USDC on Sepolia
pub const TESTNET_USDC_CONTRACT: &str = "0x1c7D4B196Cb0C7B01d743Fbc6116a902379C7238";

/// xReserve domain id of Stacks
pub const STACKS_DOMAIN: u32 = 10003;

/// Deployment the bridge talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
        }
    }

    /// Native chain id of the Ethereum side
    pub fn eth_chain_id(&self) -> u64 {
        match self {
            Network::Mainnet => 1,
            Network::Testnet => 11_155_111,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Network {
    type Err = eyre::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "mainnet" => Ok(Network::Mainnet),
            "testnet" | "sepolia" => Ok(Network::Testnet),
            other => Err(eyre!(
                "Network must be \"mainnet\" or \"testnet\", got {:?}",
                other
            )),
        }
    }
}

/// Orchestrator configuration
#[derive(Clone)]
pub struct BridgeConfig {
    pub network: Network,
    /// Ethereum JSON-RPC endpoint
    pub eth_rpc_url: String,
    /// Native chain id of the Ethereum side
    pub eth_chain_id: u64,
    /// xReserve bridge contract (allowance spender and deposit target)
    pub bridge_contract: String,
    /// USDC token contract on Ethereum
    pub token_contract: String,
    /// Decimals of the bridged token
    pub token_decimals: u8,
    /// xReserve domain of the destination chain
    pub remote_domain: u32,
    /// Confirmations required on the deposit before it is considered final
    pub confirmations: u64,
    /// Confirmations required on the approval before depositing
    pub approval_confirmations: u64,
    /// Delay between confirmation polls
    pub poll_interval: Duration,
    /// Maximum wait for a single transaction to confirm
    pub confirmation_timeout: Duration,
    /// Grace period before declaring destination-side settlement
    pub settlement_grace: Duration,
    /// Minimum native balance (wei) required to attempt the transfer
    pub min_native_balance: u128,
    /// Retry policy for balance and allowance reads
    pub retry: RetryConfig,
    /// Signing key for the EVM ledger client (never logged)
    pub private_key: Option<String>,
}

impl BridgeConfig {
    /// Preset for a network
    pub fn for_network(network: Network) -> Self {
        let (eth_rpc_url, token_contract) = match network {
            Network::Mainnet => (
                "https://eth-mainnet.g.alchemy.com/v2/demo",
                MAINNET_USDC_CONTRACT,
            ),
            Network::Testnet => (
                "https://ethereum-sepolia.publicnode.com",
                TESTNET_USDC_CONTRACT,
            ),
        };

        Self {
            network,
            eth_rpc_url: eth_rpc_url.to_string(),
            eth_chain_id: network.eth_chain_id(),
            bridge_contract: X_RESERVE_CONTRACT.to_string(),
            token_contract: token_contract.to_string(),
            token_decimals: crate::units::USDC_DECIMALS,
            remote_domain: STACKS_DOMAIN,
            confirmations: 1,
            approval_confirmations: 1,
            poll_interval: Duration::from_secs(2),
            confirmation_timeout: Duration::from_secs(600),
            settlement_grace: Duration::from_secs(5),
            min_native_balance: 0,
            retry: RetryConfig::default(),
            private_key: None,
        }
    }

    /// Load configuration from environment
    pub fn from_env() -> Result<Self> {
        Self::from_env_for(None)
    }

    /// Load configuration from environment, with an explicit network taking
    /// precedence over `BRIDGE_NETWORK`
    pub fn from_env_for(network: Option<Network>) -> Result<Self> {
        // Try to load .env file
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("Loaded .env from {:?}", path);
        }

        let network = match (network, env::var("BRIDGE_NETWORK")) {
            (Some(network), _) => network,
            (None, Ok(value)) => value.parse()?,
            (None, Err(_)) => Network::Testnet,
        };

        let mut config = Self::for_network(network);

        if let Ok(url) = env::var("ETH_RPC_URL") {
            config.eth_rpc_url = url;
        }
        if let Some(chain_id) = parse_var("ETH_CHAIN_ID")? {
            config.eth_chain_id = chain_id;
        }
        if let Ok(contract) = env::var("X_RESERVE_CONTRACT") {
            config.bridge_contract = normalize_hex_address(&contract);
        }
        if let Ok(contract) = env::var("ETH_USDC_CONTRACT") {
            config.token_contract = normalize_hex_address(&contract);
        }
        if let Some(domain) = parse_var("STACKS_DOMAIN")? {
            config.remote_domain = domain;
        }
        if let Some(confirmations) = parse_var("CONFIRMATIONS")? {
            config.confirmations = confirmations;
        }
        if let Some(ms) = parse_var::<u64>("POLL_INTERVAL_MS")? {
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_var::<u64>("CONFIRMATION_TIMEOUT_SECS")? {
            config.confirmation_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = parse_var::<u64>("SETTLEMENT_GRACE_MS")? {
            config.settlement_grace = Duration::from_millis(ms);
        }
        if let Some(wei) = parse_var("MIN_NATIVE_BALANCE_WEI")? {
            config.min_native_balance = wei;
        }
        config.private_key = env::var("EVM_PRIVATE_KEY").ok();

        config.validate()?;
        Ok(config)
    }

    /// Sanity-check values that would make a run meaningless
    pub fn validate(&self) -> Result<()> {
        if self.confirmations == 0 {
            return Err(eyre!("CONFIRMATIONS must be at least 1"));
        }
        if self.poll_interval.is_zero() {
            return Err(eyre!("POLL_INTERVAL_MS must be greater than 0"));
        }
        if self.eth_rpc_url.is_empty() {
            return Err(eyre!("ETH_RPC_URL must not be empty"));
        }
        Ok(())
    }
}

impl fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("network", &self.network)
            .field("eth_rpc_url", &self.eth_rpc_url)
            .field("eth_chain_id", &self.eth_chain_id)
            .field("bridge_contract", &self.bridge_contract)
            .field("token_contract", &self.token_contract)
            .field("token_decimals", &self.token_decimals)
            .field("remote_domain", &self.remote_domain)
            .field("confirmations", &self.confirmations)
            .field("approval_confirmations", &self.approval_confirmations)
            .field("poll_interval", &self.poll_interval)
            .field("confirmation_timeout", &self.confirmation_timeout)
            .field("settlement_grace", &self.settlement_grace)
            .field("min_native_balance", &self.min_native_balance)
            .field("retry", &self.retry)
            .field(
                "private_key",
                &self.private_key.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Parse an optional environment variable
fn parse_var<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .wrap_err_with(|| format!("Invalid {}", name)),
        Err(_) => Ok(None),
    }
}

/// Accept addresses with or without the 0x prefix
fn normalize_hex_address(value: &str) -> String {
    let value = value.trim();
    if value.starts_with("0x") {
        value.to_string()
    } else {
        format!("0x{}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_presets() {
        let mainnet = BridgeConfig::for_network(Network::Mainnet);
        assert_eq!(mainnet.token_contract, MAINNET_USDC_CONTRACT);
        assert_eq!(mainnet.bridge_contract, X_RESERVE_CONTRACT);
        assert_eq!(mainnet.remote_domain, 10003);
        assert_eq!(mainnet.eth_chain_id, 1);

        let testnet = BridgeConfig::for_network(Network::Testnet);
        assert_eq!(testnet.token_contract, TESTNET_USDC_CONTRACT);
        assert_eq!(testnet.eth_chain_id, 11_155_111);
        assert_eq!(testnet.settlement_grace, Duration::from_secs(5));
        assert!(testnet.validate().is_ok());
    }

    #[test]
    fn test_network_parsing() {
        assert_eq!("mainnet".parse::<Network>().unwrap(), Network::Mainnet);
        assert_eq!("Testnet".parse::<Network>().unwrap(), Network::Testnet);
        assert_eq!("sepolia".parse::<Network>().unwrap(), Network::Testnet);
        assert!("devnet".parse::<Network>().is_err());
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let mut config = BridgeConfig::for_network(Network::Testnet);
        config.private_key = Some("0xac0974bec39a17e36ba4a6b4d238ff944bacb478".to_string());

        let debug = format!("{:?}", config);
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("ac0974"));
    }

    #[test]
    fn test_validate_rejects_zero_confirmations() {
        let mut config = BridgeConfig::for_network(Network::Testnet);
        config.confirmations = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_normalize_hex_address() {
        assert_eq!(normalize_hex_address("0xabc"), "0xabc");
        assert_eq!(normalize_hex_address(" abc "), "0xabc");
    }
}
