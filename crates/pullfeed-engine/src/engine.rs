//! The convergence engine.
//!
//! Every public operation builds a fresh outstanding call set and runs the
//! same loop:
//!
//! ```text
//! simulate ──ok──▶ done
//!    │
//!  revert ──▶ classify ──unclassified──▶ fail with the raw bytes
//!                │
//!             requests ──▶ reverse ──▶ coalesce ──▶ resolve (concurrently)
//!                                                      │
//!               simulate again ◀── prepend fulfillment calls
//! ```
//!
//! The loop is bounded by `2 * distinct feeds + 3` simulations, where the
//! feed count covers every feed requested so far in the operation.

use std::collections::BTreeSet;
use std::sync::Arc;

use alloy_dyn_abi::DynSolValue;
use alloy_json_abi::Function;
use alloy_primitives::{address, Address, Bytes, U256};
use futures::future::try_join_all;
use pullfeed_abi::{decode, decode_aggregate_results, encode, encode_aggregate};
use pullfeed_price::OracleResolver;
use pullfeed_revert::{classify, is_sequencing_stale, revert_reason};
use pullfeed_rpc::{CallRequest, ChainNode, NodeError};
use pullfeed_types::{
    total_value, Call, CallResult, FeedId, OracleRequest, TransactionRequest, UpdateType,
    DEFAULT_GAS_LIMIT,
};
use tracing::{debug, info, warn};

use crate::fulfill::{build_fulfillment, coalesce_requests};
use crate::retry::RetryPolicy;
use crate::session::Session;
use crate::{EngineError, Result};

/// Aggregator deployed at the same address on most EVM chains.
pub const DEFAULT_MULTICALL_ADDRESS: Address =
    address!("cA11bde05977b3631167028862bE2a173976CA11");

/// Default multiplier applied to gas estimates.
pub const DEFAULT_GAS_MULTIPLIER: f64 = 1.5;

/// Engine options.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Aggregator contract batches are sent through.
    pub multicall: Address,
    /// The chain is a local fork. Benchmark requests are capped at the fork's clock.
    pub is_fork: bool,
    /// Estimate gas for writes instead of using `default_gas_limit`.
    pub use_estimate_gas: bool,
    /// Multiplier applied to gas estimates.
    pub gas_multiplier: f64,
    /// Gas limit for writes when estimation is disabled.
    pub default_gas_limit: u64,
    /// Retry budget for price lookups.
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            multicall: DEFAULT_MULTICALL_ADDRESS,
            is_fork: false,
            use_estimate_gas: true,
            gas_multiplier: DEFAULT_GAS_MULTIPLIER,
            default_gas_limit: DEFAULT_GAS_LIMIT,
            retry: RetryPolicy::default(),
        }
    }
}

/// Outcome of a converged call set.
#[derive(Debug, Clone)]
struct Converged {
    calls: Vec<Call>,
    results: Vec<CallResult>,
}

/// Drives calls to success by fulfilling the oracle data they ask for.
pub struct Engine {
    node: Arc<dyn ChainNode>,
    resolver: OracleResolver,
    config: EngineConfig,
}

impl Engine {
    /// Create an engine.
    pub fn new(node: Arc<dyn ChainNode>, resolver: OracleResolver, config: EngineConfig) -> Self {
        Self {
            node,
            resolver,
            config,
        }
    }

    /// Engine options.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The chain node.
    pub fn node(&self) -> &Arc<dyn ChainNode> {
        &self.node
    }

    /// The oracle resolver.
    pub fn resolver(&self) -> &OracleResolver {
        &self.resolver
    }

    /// Call `function` on `target` and decode its declared outputs.
    pub async fn call_once(
        &self,
        target: Address,
        function: &Function,
        args: &[DynSolValue],
    ) -> Result<DynSolValue> {
        let data = encode(function, args)?;
        let converged = self.converge(vec![Call::new(target, data)], None).await?;
        let mut values = decode_tail(function, &converged.results, 1)?;
        values
            .pop()
            .ok_or_else(|| EngineError::Decoding("no result for call".to_string()))
    }

    /// Call `function` on `target` once per argument list, in one batch.
    ///
    /// Results come back in the order of `args_list`.
    pub async fn call_many(
        &self,
        target: Address,
        function: &Function,
        args_list: &[Vec<DynSolValue>],
    ) -> Result<Vec<DynSolValue>> {
        if args_list.is_empty() {
            return Ok(Vec::new());
        }
        let calls = args_list
            .iter()
            .map(|args| Ok(Call::new(target, encode(function, args)?)))
            .collect::<Result<Vec<_>>>()?;
        let converged = self.converge(calls, None).await?;
        decode_tail(function, &converged.results, args_list.len())
    }

    /// Build the unsigned transaction for a state-changing call.
    ///
    /// The call is converged by simulation first. The returned transaction
    /// sends the whole converged set through the aggregator, carrying the
    /// sum of every call's value.
    pub async fn prepare_write(
        &self,
        session: &Session,
        target: Address,
        function: &Function,
        args: &[DynSolValue],
        value: Option<U256>,
    ) -> Result<TransactionRequest> {
        let data = encode(function, args)?;
        let call = Call::new(target, data).with_value(value.unwrap_or_default());
        let converged = self.converge(vec![call], Some(session)).await?;

        let data = encode_aggregate(&converged.calls);
        let value = total_value(&converged.calls);
        let gas_limit = self
            .gas_limit(session.address(), data.clone(), value)
            .await?;
        let tx = TransactionRequest {
            from: session.address(),
            to: self.config.multicall,
            value,
            data,
            gas_limit,
            nonce: session.nonce().await,
            chain_id: session.chain_id(),
        };
        info!(
            to = %tx.to,
            calls = converged.calls.len(),
            value = %tx.value,
            gas_limit = tx.gas_limit,
            nonce = tx.nonce,
            "write prepared"
        );
        Ok(tx)
    }

    async fn gas_limit(&self, from: Address, data: Bytes, value: U256) -> Result<u64> {
        if !self.config.use_estimate_gas {
            return Ok(self.config.default_gas_limit);
        }
        let request = CallRequest::new(self.config.multicall, data)
            .with_sender(from)
            .with_value(value);
        let estimate = self.node.estimate_gas(&request).await?;
        Ok(scale_gas(estimate, self.config.gas_multiplier))
    }

    async fn converge(&self, calls: Vec<Call>, session: Option<&Session>) -> Result<Converged> {
        let from = session.map(Session::address);
        let mut outstanding = calls;
        let mut feeds: BTreeSet<FeedId> = BTreeSet::new();
        let mut simulations = 0usize;
        let mut refreshed = false;

        loop {
            let limit = 2 * feeds.len() + 3;
            if simulations >= limit {
                warn!(simulations, limit, "oracle data still missing, giving up");
                return Err(EngineError::ConvergenceExceeded {
                    attempts: simulations,
                });
            }

            let mut request = CallRequest::new(self.config.multicall, encode_aggregate(&outstanding))
                .with_value(total_value(&outstanding));
            if let Some(from) = from {
                request = request.with_sender(from);
            }

            simulations += 1;
            debug!(simulation = simulations, calls = outstanding.len(), "simulating batch");
            let revert = match self.node.call(&request).await {
                Ok(returned) => {
                    let results = decode_aggregate_results(&returned)?;
                    info!(simulations, calls = outstanding.len(), "batch converged");
                    return Ok(Converged {
                        calls: outstanding,
                        results,
                    });
                }
                Err(NodeError::Reverted { data, .. }) => data,
                Err(e) => match session {
                    Some(session) if !refreshed && is_sequencing_stale(e.message()) => {
                        session.refresh_nonce(self.node.as_ref()).await?;
                        refreshed = true;
                        simulations -= 1;
                        continue;
                    }
                    _ => return Err(e.into()),
                },
            };
            refreshed = false;

            let classified = classify(&revert);
            if classified.is_fatal() {
                let reason = revert_reason(&revert);
                warn!(data = %revert, reason = ?reason, "unclassified revert");
                return Err(EngineError::Unclassified {
                    data: revert,
                    reason,
                });
            }
            let mut requests = classified.oracle_requests().unwrap_or_default();
            requests.reverse();
            for request in &requests {
                feeds.extend(request.feed_ids.iter().copied());
            }

            let groups = coalesce_requests(requests);
            let chain_now = self.chain_now(&groups).await?;
            let fulfillments =
                try_join_all(groups.iter().map(|group| self.fulfill(group, chain_now))).await?;
            info!(
                simulation = simulations,
                fulfillments = fulfillments.len(),
                feeds = feeds.len(),
                "oracle data required"
            );
            outstanding.splice(0..0, fulfillments);
        }
    }

    async fn chain_now(&self, groups: &[OracleRequest]) -> Result<Option<u64>> {
        let any_benchmark = groups
            .iter()
            .any(|group| group.update_type == UpdateType::Benchmark);
        if !(self.config.is_fork && any_benchmark) {
            return Ok(None);
        }
        Ok(Some(self.node.block_timestamp().await?))
    }

    /// Resolve one request and build its fulfillment call.
    ///
    /// A benchmark fulfillment declares the publish time the data was fetched
    /// at, which differs from the requested one when capped on a fork.
    async fn fulfill(&self, request: &OracleRequest, chain_now: Option<u64>) -> Result<Call> {
        let (update, answered) = match request.update_type {
            UpdateType::Latest => {
                let update = self
                    .config
                    .retry
                    .run(move || self.resolver.resolve_latest(&request.feed_ids))
                    .await;
                (update, request.clone())
            }
            UpdateType::Benchmark => {
                let feed = request.feed_ids.first().copied().ok_or_else(|| {
                    EngineError::Decoding("benchmark request names no feed".to_string())
                })?;
                let publish_time = self
                    .resolver
                    .benchmark_time(request.staleness_or_publish_time, chain_now);
                if publish_time != request.staleness_or_publish_time {
                    warn!(
                        requested = request.staleness_or_publish_time,
                        publish_time,
                        "benchmark time is ahead of the forked chain, capping"
                    );
                }
                let update = self
                    .config
                    .retry
                    .run(move || self.resolver.resolve_benchmark(feed, publish_time, None))
                    .await;
                let answered = OracleRequest {
                    staleness_or_publish_time: publish_time,
                    ..request.clone()
                };
                (update, answered)
            }
        };
        let update = update.map_err(EngineError::OracleServiceUnavailable)?;
        Ok(build_fulfillment(&answered, &update))
    }
}

/// Decode the last `count` results against `function`.
fn decode_tail(function: &Function, results: &[CallResult], count: usize) -> Result<Vec<DynSolValue>> {
    let start = results.len().checked_sub(count).ok_or_else(|| {
        EngineError::Decoding(format!(
            "expected at least {count} results, got {}",
            results.len()
        ))
    })?;
    results[start..]
        .iter()
        .map(|result| {
            if !result.success {
                return Err(EngineError::Decoding(format!(
                    "call failed inside the batch: {}",
                    result.return_data
                )));
            }
            decode(function, &result.return_data).map_err(EngineError::from)
        })
        .collect()
}

fn scale_gas(estimate: u64, multiplier: f64) -> u64 {
    let scaled = (estimate as f64 * multiplier).ceil();
    if scaled.is_finite() && scaled >= estimate as f64 {
        scaled as u64
    } else {
        estimate
    }
}
