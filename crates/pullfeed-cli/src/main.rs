//! pullfeed: contract calls that fetch their own oracle data.
//!
//! Reads and writes are simulated through an on-chain aggregator. Whenever a
//! contract reverts asking for price data, the data is fetched from the
//! configured price service and fed to the contract ahead of the call.

mod commands;
mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, U256};
use anyhow::Context;
use clap::{Parser, Subcommand};
use pullfeed_engine::Engine;
use pullfeed_price::{HermesClient, OracleResolver};
use pullfeed_rpc::{ChainNode, HttpNode};
use tracing::{debug, info};

use crate::config::PullfeedConfig;

#[derive(Parser)]
#[command(name = "pullfeed", about = "Contract calls with on-demand oracle data")]
#[command(version)]
struct Cli {
    /// Config file (default: $PULLFEED_CONFIG, then ./pullfeed.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Chain RPC endpoint, overriding the config file
    #[arg(long, global = true, env = "PULLFEED_RPC_URL")]
    rpc_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read from a contract
    Call {
        /// Contract address
        target: Address,
        /// Function signature, or function name when --abi is given
        function: String,
        /// Arguments as Solidity literals
        args: Vec<String>,
        /// JSON ABI file to look the function up in
        #[arg(long)]
        abi: Option<PathBuf>,
    },
    /// Read from a contract once per argument list, in one batch
    CallMany {
        /// Contract address
        target: Address,
        /// Function signature, or function name when --abi is given
        function: String,
        /// JSON file holding an array of argument arrays
        args_file: PathBuf,
        /// JSON ABI file to look the function up in
        #[arg(long)]
        abi: Option<PathBuf>,
    },
    /// Converge a write and print the unsigned transaction
    Prepare {
        /// Contract address
        target: Address,
        /// Function signature, or function name when --abi is given
        function: String,
        /// Arguments as Solidity literals
        args: Vec<String>,
        /// Sender address (default: chain.sender from the config file)
        #[arg(long)]
        from: Option<Address>,
        /// Value to attach, in wei
        #[arg(long)]
        value: Option<U256>,
        /// JSON ABI file to look the function up in
        #[arg(long)]
        abi: Option<PathBuf>,
    },
    /// Submit an already-signed transaction
    SendRaw {
        /// Signed transaction as hex
        raw: String,
    },
    /// Print prices for symbols or feed ids
    Price {
        /// Registered symbols or 32-byte feed ids
        #[arg(required = true)]
        items: Vec<String>,
        /// Fetch prices as of this unix time
        #[arg(long)]
        publish_time: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = PullfeedConfig::load(cli.config.as_deref())?;
    if let Some(url) = cli.rpc_url {
        config.chain.rpc_url = url;
    }

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("pullfeed={}", config.logging.level).parse()?),
        )
        .init();

    debug!(rpc_url = %config.chain.rpc_url, "configuration loaded");

    let node: Arc<dyn ChainNode> = Arc::new(HttpNode::new(
        &config.chain.rpc_url,
        Duration::from_secs(config.chain.timeout_secs),
    )?);
    let service = Arc::new(HermesClient::new(config.hermes())?);
    let resolver = OracleResolver::new(service, config.resolver())
        .with_registry(Arc::new(config.registry()?));

    match cli.command {
        Commands::Call {
            target,
            function,
            args,
            abi,
        } => {
            let function = commands::load_function(&function, abi.as_deref())?;
            let engine = Engine::new(node, resolver, config.engine()?);
            commands::call(&engine, target, &function, &args).await
        }
        Commands::CallMany {
            target,
            function,
            args_file,
            abi,
        } => {
            let function = commands::load_function(&function, abi.as_deref())?;
            let engine = Engine::new(node, resolver, config.engine()?);
            commands::call_many(&engine, target, &function, &args_file).await
        }
        Commands::Prepare {
            target,
            function,
            args,
            from,
            value,
            abi,
        } => {
            let sender = match from {
                Some(address) => address,
                None => config
                    .sender()?
                    .context("no sender: pass --from or set chain.sender")?,
            };
            let function = commands::load_function(&function, abi.as_deref())?;
            let engine = Engine::new(node, resolver, config.engine()?);
            info!(sender = %sender, target = %target, "preparing write");
            commands::prepare(&engine, sender, target, &function, &args, value).await
        }
        Commands::SendRaw { raw } => commands::send_raw(node, &raw).await,
        Commands::Price {
            items,
            publish_time,
        } => commands::price(&resolver, &items, publish_time).await,
    }
}
