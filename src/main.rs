//! Bridge Engine CLI - quote, submit and track cross-chain transfers
//!
//! Reads the configuration named by `BRIDGE_ENGINE_CONFIG` (default
//! `config/default.toml`). Commands that submit transactions sign with the
//! private key held in the environment variable set in `[wallet]`.

use anyhow::{Context, Result};
use bridge_engine::chain::WalletSigner;
use bridge_engine::config::Settings;
use bridge_engine::tx::BridgeRequest;
use bridge_engine::validation::parse_transaction_id;
use bridge_engine::{metrics, BridgeEngine};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "bridge-engine", version, about = "Cross-chain bridge transaction engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check the relay service and both chains
    Health,
    /// Find a token's counterpart on the other chain
    Resolve {
        token: String,
        #[arg(long)]
        chain: u64,
    },
    /// Estimate the cost of a transfer
    Quote {
        token: String,
        amount: String,
        #[arg(long)]
        chain: u64,
    },
    /// Current status of a transfer
    Status {
        id: String,
        #[arg(long)]
        chain: u64,
    },
    /// Transfers involving an address
    History {
        address: String,
        #[arg(long)]
        pending: bool,
    },
    /// Checkpointed withdrawals waiting for an exit
    Exitable { address: String },
    /// Submit a deposit or withdrawal
    Bridge {
        token: String,
        amount: String,
        recipient: String,
        #[arg(long)]
        chain: u64,
    },
    /// Claim a checkpointed withdrawal on the root chain
    Exit { id: String, recipient: String },
    /// Re-request relay for an address's pending transfers
    Sweep { address: String },
    /// Print metrics in the Prometheus text format
    Metrics,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let settings = Settings::load()?;
    info!(
        "Loaded configuration for pair {} -> {}",
        settings.pair.root_chain_id, settings.pair.child_chain_id
    );
    let engine = BridgeEngine::from_settings(&settings)?;

    match cli.command {
        Command::Health => {
            let health = engine.health().await;
            if !health.is_healthy() {
                warn!("Engine is degraded");
            }
            print_json(&health)?;
        }
        Command::Resolve { token, chain } => {
            let counterpart = engine.resolve(&token, chain).await?;
            println!("{:?}", counterpart);
        }
        Command::Quote {
            token,
            amount,
            chain,
        } => print_json(&engine.quote(&token, &amount, chain).await?)?,
        Command::Status { id, chain } => {
            let id = parse_transaction_id(&id)?;
            print_json(&engine.get_status(id, chain).await?)?;
        }
        Command::History { address, pending } => {
            let transactions = if pending {
                engine.pending_of(&address).await?
            } else {
                engine.history_of(&address).await?
            };
            print_json(&transactions)?;
        }
        Command::Exitable { address } => print_json(&engine.list_exitable(&address).await?)?,
        Command::Bridge {
            token,
            amount,
            recipient,
            chain,
        } => {
            let signer = signer(&settings, chain)?;
            let request = BridgeRequest {
                token: &token,
                amount: &amount,
                recipient: &recipient,
                source_chain: chain,
                quote: None,
            };
            let transaction = engine.bridge(&request, &signer).await?;
            // The process exits right after, so wait for the relay request here
            if let Err(e) = engine.relay().request_relay(transaction.id(), chain).await {
                warn!("Relay request for {:?} failed, run sweep later: {}", transaction.id(), e);
            }
            print_json(&transaction)?;
        }
        Command::Exit { id, recipient } => {
            let id = parse_transaction_id(&id)?;
            let signer = signer(&settings, settings.pair.root_chain_id)?;
            let hash = engine.exit(id, &recipient, &signer).await?;
            let child_chain = settings.pair.child_chain_id;
            if let Err(e) = engine.relay().request_relay(id, child_chain).await {
                warn!("Relay request for {:?} failed, run sweep later: {}", id, e);
            }
            println!("{:?}", hash);
        }
        Command::Sweep { address } => print_json(&engine.sweep(&address).await?)?,
        Command::Metrics => print!("{}", metrics::render()),
    }

    Ok(())
}

fn signer(settings: &Settings, chain_id: u64) -> Result<WalletSigner> {
    let var = settings
        .wallet
        .private_key_env
        .as_deref()
        .context("No wallet configured. Set wallet.private_key_env")?;
    let rpc_url = settings
        .get_chain_by_id(chain_id)
        .and_then(|c| c.rpc_urls.first())
        .with_context(|| format!("Chain {} is not configured", chain_id))?;

    Ok(WalletSigner::from_env(var, rpc_url, chain_id)?)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,bridge_engine=debug,hyper=warn,reqwest=warn")
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true).with_writer(std::io::stderr))
        .init();
}
