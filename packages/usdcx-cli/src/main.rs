//! USDCx Bridge CLI
//!
//! Drives a USDC -> USDCx transfer from Ethereum to Stacks through xReserve and
//! streams progress events to stdout as JSON lines. Logs go to stderr.
//!
//! # Configuration
//!
//! Read from the environment (and `.env`): `BRIDGE_NETWORK`, `ETH_RPC_URL`,
//! `EVM_PRIVATE_KEY`, `X_RESERVE_CONTRACT`, `ETH_USDC_CONTRACT`, ...
//!
//! # Usage
//!
//! ```text
//! usdcx-bridge deposit --amount 10.5 --recipient SP2J6ZY48GV1EZ5V2V5RB9MP66SW86PYKKNRV9EJ7
//! usdcx-bridge encode SP2J6ZY48GV1EZ5V2V5RB9MP66SW86PYKKNRV9EJ7
//! usdcx-bridge decode 0x0000000000000000000000169...
//! usdcx-bridge estimate --from ethereum
//! usdcx-bridge balance
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{eyre, Result, WrapErr};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use usdcx_bridge::evm::EvmLedgerClient;
use usdcx_bridge::{
    decode_recipient, encode_recipient, estimate_bridge_time, format_amount, format_units,
    progress_channel, BridgeConfig, BridgeOrchestrator, BridgeRequest, CancelHandle, ChainKind,
    EncodedRecipient, LedgerClient, Network, RunControls, USDC_DECIMALS,
};

#[derive(Debug, Parser)]
#[command(name = "usdcx-bridge")]
#[command(about = "Bridge USDC from Ethereum to USDCx on Stacks", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Network preset, overrides BRIDGE_NETWORK
    #[arg(short, long, global = true, value_enum)]
    network: Option<NetworkArg>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum NetworkArg {
    Mainnet,
    #[value(alias = "sepolia")]
    Testnet,
}

impl From<NetworkArg> for Network {
    fn from(arg: NetworkArg) -> Self {
        match arg {
            NetworkArg::Mainnet => Network::Mainnet,
            NetworkArg::Testnet => Network::Testnet,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ChainArg {
    #[value(alias = "eth")]
    Ethereum,
    #[value(alias = "stx")]
    Stacks,
}

impl From<ChainArg> for ChainKind {
    fn from(arg: ChainArg) -> Self {
        match arg {
            ChainArg::Ethereum => ChainKind::Ethereum,
            ChainArg::Stacks => ChainKind::Stacks,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Deposit USDC into xReserve for a Stacks recipient
    Deposit {
        /// Amount of USDC to bridge (e.g. 10.5)
        #[arg(short, long)]
        amount: f64,

        /// Stacks recipient address (SP... or ST...)
        #[arg(short, long)]
        recipient: String,

        /// Maximum fee accepted, in USDC
        #[arg(long, default_value_t = 0.0)]
        max_fee: f64,

        /// Give up if the bridge has not finished after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Encode a Stacks address as an xReserve bytes32 recipient
    Encode {
        /// Stacks address
        address: String,
    },

    /// Decode an xReserve bytes32 recipient back into a Stacks address
    Decode {
        /// 0x-prefixed 32-byte hex value
        recipient: String,
    },

    /// Print the expected end-to-end bridge time
    Estimate {
        /// Source chain
        #[arg(long, value_enum, default_value_t = ChainArg::Ethereum)]
        from: ChainArg,
    },

    /// Show ETH and USDC balances and the xReserve allowance
    Balance {
        /// Account to inspect (defaults to the signer)
        #[arg(long)]
        address: Option<String>,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let network = cli.network.map(Network::from);

    match cli.command {
        Commands::Deposit {
            amount,
            recipient,
            max_fee,
            timeout_secs,
        } => deposit(network, amount, recipient, max_fee, timeout_secs).await,
        Commands::Encode { address } => {
            let encoded = encode_recipient(&address)?;
            println!("{}", encoded.to_hex());
            Ok(())
        }
        Commands::Decode { recipient } => {
            let encoded = EncodedRecipient::from_hex(&recipient)?;
            println!("{}", decode_recipient(&encoded)?);
            Ok(())
        }
        Commands::Estimate { from } => {
            println!("{}", estimate_bridge_time(from.into()));
            Ok(())
        }
        Commands::Balance { address } => balance(network, address).await,
    }
}

async fn deposit(
    network: Option<Network>,
    amount: f64,
    recipient: String,
    max_fee: f64,
    timeout_secs: Option<u64>,
) -> Result<()> {
    let config = BridgeConfig::from_env_for(network)?;
    info!(
        network = %config.network,
        eth_rpc = %config.eth_rpc_url,
        bridge = %config.bridge_contract,
        token = %config.token_contract,
        "Configuration loaded"
    );

    let ledger = EvmLedgerClient::from_bridge_config(&config)?;
    let sender = ledger
        .signer_address()
        .ok_or_else(|| eyre!("EVM_PRIVATE_KEY is required for deposits"))?;
    ledger.verify_chain_id().await?;

    let orchestrator = BridgeOrchestrator::new(Arc::new(ledger), config);
    let request = BridgeRequest::ethereum_to_stacks(amount, sender.to_string(), recipient)
        .with_max_fee(max_fee);

    let cancel = CancelHandle::new();
    let mut controls = RunControls::default().with_cancel(cancel.signal());
    if let Some(secs) = timeout_secs {
        controls = controls.with_timeout(Duration::from_secs(secs));
    }

    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        cancel.cancel();
    });

    let (progress, mut events) = progress_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e) => warn!(error = %e, "Failed to serialize progress event"),
            }
        }
    });

    let outcome = orchestrator.run_with(request, progress, controls).await;
    printer.await.wrap_err("Progress printer task failed")?;

    match outcome {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            info!(
                amount = %format_amount(result.amount_base_units),
                source_tx_id = %result.source_tx_id,
                "Funds will arrive in about {} seconds",
                result.estimated_seconds
            );
            Ok(())
        }
        Err(e) => {
            if let Some(tx_id) = &e.source_tx_id {
                warn!(tx_id = %tx_id, "Deposit was submitted; check it on a block explorer");
            }
            Err(e.into())
        }
    }
}

async fn balance(network: Option<Network>, address: Option<String>) -> Result<()> {
    let config = BridgeConfig::from_env_for(network)?;
    let ledger = EvmLedgerClient::from_bridge_config(&config)?;

    let address = match address {
        Some(address) => address,
        None => ledger
            .signer_address()
            .map(|a| a.to_string())
            .ok_or_else(|| eyre!("Pass --address or set EVM_PRIVATE_KEY"))?,
    };

    let eth = ledger.get_native_balance(&address).await?;
    let usdc = ledger.get_token_balance(&address).await?;
    let allowance = ledger
        .get_allowance(&address, &config.bridge_contract)
        .await?;

    println!("address:   {}", address);
    println!("ETH:       {}", format_units(eth, 18));
    println!("USDC:      {}", format_units(usdc, USDC_DECIMALS));
    println!("allowance: {}", format_units(allowance, USDC_DECIMALS));
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,usdcx_bridge=debug"));

    // stdout carries the progress stream
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, cancelling bridge");
        }
        _ = terminate => {
            info!("Received SIGTERM, cancelling bridge");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_network_and_chain_args() {
        let cli = Cli::try_parse_from([
            "usdcx-bridge",
            "--network",
            "sepolia",
            "estimate",
            "--from",
            "stx",
        ])
        .unwrap();
        assert!(matches!(cli.network, Some(NetworkArg::Testnet)));
        match cli.command {
            Commands::Estimate { from } => assert_eq!(ChainKind::from(from), ChainKind::Stacks),
            _ => panic!("expected estimate"),
        }

        let cli = Cli::try_parse_from(["usdcx-bridge", "estimate"]).unwrap();
        assert!(cli.network.is_none());
        assert!(matches!(cli.command, Commands::Estimate { from: ChainArg::Ethereum }));
    }

    #[test]
    fn test_unknown_values_are_usage_errors() {
        let err =
            Cli::try_parse_from(["usdcx-bridge", "--network", "devnet", "estimate"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue);

        let err =
            Cli::try_parse_from(["usdcx-bridge", "estimate", "--from", "solana"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue);
    }
}
