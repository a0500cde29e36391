//! Subcommand handlers.

use std::path::Path;
use std::sync::Arc;

use alloy_dyn_abi::DynSolValue;
use alloy_json_abi::Function;
use alloy_primitives::{Address, U256};
use anyhow::Context;
use pullfeed_abi::codec::{coerce_args, render};
use pullfeed_abi::{function_from_abi, parse_function};
use pullfeed_engine::{Engine, Session};
use pullfeed_price::OracleResolver;
use pullfeed_rpc::ChainNode;
use pullfeed_types::{parse_feed_id, FeedId, PriceUpdate};
use tracing::info;

/// Load a function description from a signature, or by name from a JSON ABI file.
pub fn load_function(signature: &str, abi: Option<&Path>) -> anyhow::Result<Function> {
    match abi {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading ABI {}", path.display()))?;
            Ok(function_from_abi(&json, signature)?)
        }
        None => Ok(parse_function(signature)?),
    }
}

/// `call`: one read, printed as rendered values.
pub async fn call(
    engine: &Engine,
    target: Address,
    function: &Function,
    args: &[String],
) -> anyhow::Result<()> {
    let args = coerce_args(function, args)?;
    let value = engine.call_once(target, function, &args).await?;
    println!("{}", render(&value));
    Ok(())
}

/// `call-many`: batched reads from a JSON file holding a list of argument lists.
pub async fn call_many(
    engine: &Engine,
    target: Address,
    function: &Function,
    args_file: &Path,
) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(args_file)
        .with_context(|| format!("reading {}", args_file.display()))?;
    let raw: Vec<Vec<String>> = serde_json::from_str(&content)
        .with_context(|| format!("{} must be a JSON array of string arrays", args_file.display()))?;
    let args_list = raw
        .iter()
        .map(|args| coerce_args(function, args))
        .collect::<Result<Vec<Vec<DynSolValue>>, _>>()?;

    let values = engine.call_many(target, function, &args_list).await?;
    info!(calls = values.len(), "batched read complete");
    for value in &values {
        println!("{}", render(value));
    }
    Ok(())
}

/// `prepare`: converge a write and print the unsigned transaction as JSON.
pub async fn prepare(
    engine: &Engine,
    sender: Address,
    target: Address,
    function: &Function,
    args: &[String],
    value: Option<U256>,
) -> anyhow::Result<()> {
    let args = coerce_args(function, args)?;
    let session = Session::connect(engine.node().as_ref(), sender).await?;
    let tx = engine
        .prepare_write(&session, target, function, &args, value)
        .await?;
    println!("{}", serde_json::to_string_pretty(&tx)?);
    Ok(())
}

/// `send-raw`: submit an already-signed transaction.
pub async fn send_raw(node: Arc<dyn ChainNode>, raw_hex: &str) -> anyhow::Result<()> {
    let raw = hex::decode(raw_hex.trim().trim_start_matches("0x"))
        .context("signed transaction must be hex")?;
    let hash = node.send_raw_transaction(&raw).await?;
    println!("{hash}");
    Ok(())
}

/// `price`: print prices for symbols or feed ids.
pub async fn price(
    resolver: &OracleResolver,
    items: &[String],
    publish_time: Option<u64>,
) -> anyhow::Result<()> {
    let update = if items.iter().all(|item| parse_feed_id(item).is_ok()) {
        let ids = items
            .iter()
            .map(|item| parse_feed_id(item))
            .collect::<Result<Vec<FeedId>, _>>()?;
        match publish_time {
            None => resolver.resolve_latest(&ids).await?,
            Some(time) => {
                let [id] = ids.as_slice() else {
                    anyhow::bail!("a publish time can be given for exactly one feed id");
                };
                resolver.resolve_benchmark(*id, time, None).await?
            }
        }
    } else {
        resolver.resolve_symbols(items, publish_time).await?
    };
    print_prices(&update);
    Ok(())
}

fn print_prices(update: &PriceUpdate) {
    for (id, meta) in &update.feeds {
        let label = meta.symbol.as_deref().unwrap_or("-");
        println!(
            "{label:>8}  {value:>18.8}  publish_time={time}  {id}",
            value = meta.value(),
            time = meta.publish_time,
        );
    }
    println!("{} update payload(s)", update.payloads.len());
}
