//! # pullfeed-integration-tests
//!
//! End-to-end tests for the pullfeed workspace live under `tests/`. This
//! library holds the in-memory chain node and price service they drive the
//! engine against.
//!
//! - [`FakeNode`] decodes every simulated batch, records it, and answers
//!   according to a [`Script`]: reverts with oracle-data errors until enough
//!   fulfillment calls are in the batch, then echoes each call's arguments as
//!   its return data.
//! - [`FakePriceService`] records every lookup and answers with payloads
//!   derived from the request, so tests can tell updates apart.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use alloy_dyn_abi::DynSolValue;
use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use async_trait::async_trait;
use pullfeed_abi::{decode_aggregate_calls, encode_aggregate_results};
use pullfeed_engine::fulfill::{decode_fulfillment, Fulfillment};
use pullfeed_engine::{EngineConfig, RetryPolicy};
use pullfeed_price::{PriceError, PriceService};
use pullfeed_rpc::{CallRequest, ChainNode, NodeError};
use pullfeed_types::{Call, CallResult, FeedId, PriceMeta, PriceUpdate};
use tokio::sync::Mutex;

/// How a [`FakeNode`] answers simulations.
#[derive(Debug, Clone)]
pub enum Script {
    /// Revert with `reverts[k]` while the batch carries `k` fulfillment calls.
    /// Once the batch carries `reverts.len()` or more, every call succeeds.
    Staged(Vec<Bytes>),
    /// Revert with the same data forever.
    Always(Bytes),
}

/// One simulated batch as the node saw it.
#[derive(Debug, Clone)]
pub struct Simulation {
    /// Sender of the simulation, if any.
    pub from: Option<Address>,
    /// Value attached to the aggregator call.
    pub value: U256,
    /// Calls in batch order.
    pub calls: Vec<Call>,
}

impl Simulation {
    /// Fulfillment calls in the batch, with their adapter.
    pub fn fulfillments(&self) -> Vec<(Address, Fulfillment)> {
        fulfillments(&self.calls)
    }
}

/// In-memory chain node.
pub struct FakeNode {
    script: Script,
    block_timestamp: u64,
    chain_id: u64,
    gas_estimate: u64,
    pending_nonce: AtomicU64,
    stale_simulations: AtomicUsize,
    simulations: Mutex<Vec<Simulation>>,
    sent: Mutex<Vec<Bytes>>,
}

impl FakeNode {
    /// Node answering simulations with `script`.
    pub fn new(script: Script) -> Self {
        Self {
            script,
            block_timestamp: 1_700_000_000,
            chain_id: 8453,
            gas_estimate: 200_000,
            pending_nonce: AtomicU64::new(0),
            stale_simulations: AtomicUsize::new(0),
            simulations: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Node that never reverts.
    pub fn succeeding() -> Self {
        Self::new(Script::Staged(Vec::new()))
    }

    /// Set the latest block time.
    pub fn with_block_timestamp(mut self, timestamp: u64) -> Self {
        self.block_timestamp = timestamp;
        self
    }

    /// Set the gas estimate returned for every request.
    pub fn with_gas_estimate(mut self, gas: u64) -> Self {
        self.gas_estimate = gas;
        self
    }

    /// Set the pending transaction count of every address.
    pub fn with_pending_nonce(self, nonce: u64) -> Self {
        self.pending_nonce.store(nonce, Ordering::SeqCst);
        self
    }

    /// Reject the next `count` simulations with a stale-nonce error.
    pub fn with_stale_simulations(self, count: usize) -> Self {
        self.stale_simulations.store(count, Ordering::SeqCst);
        self
    }

    /// Simulations answered so far, stale-nonce rejections excluded.
    pub async fn simulations(&self) -> Vec<Simulation> {
        self.simulations.lock().await.clone()
    }

    /// Number of simulations answered so far.
    pub async fn simulation_count(&self) -> usize {
        self.simulations.lock().await.len()
    }

    /// The most recent simulation.
    pub async fn last_simulation(&self) -> Option<Simulation> {
        self.simulations.lock().await.last().cloned()
    }

    /// Raw transactions submitted so far.
    pub async fn sent(&self) -> Vec<Bytes> {
        self.sent.lock().await.clone()
    }

    fn answer(&self, calls: &[Call]) -> pullfeed_rpc::Result<Bytes> {
        let fulfilled = fulfillments(calls).len();
        let revert = match &self.script {
            Script::Always(data) => Some(data.clone()),
            Script::Staged(reverts) => reverts.get(fulfilled).cloned(),
        };
        if let Some(data) = revert {
            return Err(NodeError::Reverted {
                data,
                message: "execution reverted".to_string(),
            });
        }
        let results: Vec<CallResult> = calls
            .iter()
            .map(|call| CallResult {
                success: true,
                return_data: echo(call),
            })
            .collect();
        Ok(encode_aggregate_results(&results))
    }
}

#[async_trait]
impl ChainNode for FakeNode {
    async fn call(&self, request: &CallRequest) -> pullfeed_rpc::Result<Bytes> {
        let stale = self
            .stale_simulations
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if stale {
            return Err(NodeError::Rpc {
                code: -32000,
                message: "nonce too low".to_string(),
            });
        }

        let calls = decode_aggregate_calls(&request.data)
            .map_err(|e| NodeError::InvalidResponse(e.to_string()))?;
        self.simulations.lock().await.push(Simulation {
            from: request.from,
            value: request.value,
            calls: calls.clone(),
        });
        self.answer(&calls)
    }

    async fn estimate_gas(&self, _request: &CallRequest) -> pullfeed_rpc::Result<u64> {
        Ok(self.gas_estimate)
    }

    async fn transaction_count(&self, _address: Address) -> pullfeed_rpc::Result<u64> {
        Ok(self.pending_nonce.load(Ordering::SeqCst))
    }

    async fn block_timestamp(&self) -> pullfeed_rpc::Result<u64> {
        Ok(self.block_timestamp)
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> pullfeed_rpc::Result<B256> {
        self.sent.lock().await.push(Bytes::copy_from_slice(raw));
        self.pending_nonce.fetch_add(1, Ordering::SeqCst);
        Ok(keccak256(raw))
    }

    async fn chain_id(&self) -> pullfeed_rpc::Result<u64> {
        Ok(self.chain_id)
    }
}

/// Return data of a successful call: its arguments, selector stripped.
fn echo(call: &Call) -> Bytes {
    if decode_fulfillment(&call.data).is_some() {
        return Bytes::new();
    }
    call.data
        .get(4..)
        .map(Bytes::copy_from_slice)
        .unwrap_or_default()
}

/// Fulfillment calls in `calls`, with their adapter, in batch order.
pub fn fulfillments(calls: &[Call]) -> Vec<(Address, Fulfillment)> {
    calls
        .iter()
        .filter_map(|call| decode_fulfillment(&call.data).map(|f| (call.target, f)))
        .collect()
}

/// In-memory price service.
#[derive(Default)]
pub struct FakePriceService {
    unknown: Vec<FeedId>,
    failures: AtomicUsize,
    latest_calls: Mutex<Vec<Vec<FeedId>>>,
    benchmark_calls: Mutex<Vec<(FeedId, u64)>>,
}

impl FakePriceService {
    /// Service that knows every feed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat `feeds` as unknown to the service.
    pub fn with_unknown(mut self, feeds: Vec<FeedId>) -> Self {
        self.unknown = feeds;
        self
    }

    /// Fail the next `count` lookups as unavailable.
    pub fn with_failures(self, count: usize) -> Self {
        self.failures.store(count, Ordering::SeqCst);
        self
    }

    /// Feed sets passed to every latest lookup.
    pub async fn latest_calls(&self) -> Vec<Vec<FeedId>> {
        self.latest_calls.lock().await.clone()
    }

    /// Feed and publish time of every benchmark lookup.
    pub async fn benchmark_calls(&self) -> Vec<(FeedId, u64)> {
        self.benchmark_calls.lock().await.clone()
    }

    fn take_failure(&self) -> bool {
        self.failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl PriceService for FakePriceService {
    async fn latest(&self, feed_ids: &[FeedId]) -> pullfeed_price::Result<PriceUpdate> {
        self.latest_calls.lock().await.push(feed_ids.to_vec());
        if self.take_failure() {
            return Err(PriceError::Unavailable("service down".to_string()));
        }
        let missing: Vec<FeedId> = feed_ids
            .iter()
            .filter(|id| self.unknown.contains(id))
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(PriceError::FeedsNotFound(missing));
        }

        let mut payload = vec![0x01];
        for id in feed_ids {
            payload.extend_from_slice(id.as_slice());
        }
        Ok(PriceUpdate::new(
            vec![Bytes::from(payload)],
            metas(feed_ids, unix_now()),
        ))
    }

    async fn at_time(&self, feed_id: FeedId, publish_time: u64) -> pullfeed_price::Result<PriceUpdate> {
        self.benchmark_calls.lock().await.push((feed_id, publish_time));
        if self.take_failure() {
            return Err(PriceError::Unavailable("service down".to_string()));
        }
        let mut payload = vec![0x02];
        payload.extend_from_slice(feed_id.as_slice());
        payload.extend_from_slice(&publish_time.to_be_bytes());
        Ok(PriceUpdate::new(
            vec![Bytes::from(payload)],
            metas(&[feed_id], publish_time),
        ))
    }
}

fn metas(feed_ids: &[FeedId], publish_time: u64) -> BTreeMap<FeedId, PriceMeta> {
    feed_ids
        .iter()
        .map(|id| {
            let meta = PriceMeta {
                symbol: None,
                price: 250_000,
                expo: -2,
                publish_time,
            };
            (*id, meta)
        })
        .collect()
}

/// Engine options with price lookups tried exactly once.
pub fn single_try_config() -> EngineConfig {
    EngineConfig {
        retry: RetryPolicy::none(),
        ..EngineConfig::default()
    }
}

/// Engine options retrying price lookups `attempts` times without pausing.
pub fn retrying_config(attempts: u32) -> EngineConfig {
    EngineConfig {
        retry: RetryPolicy {
            attempts,
            delay: Duration::ZERO,
        },
        ..EngineConfig::default()
    }
}

/// Feed id made of one repeated byte.
pub fn feed(byte: u8) -> FeedId {
    B256::repeat_byte(byte)
}

/// `uint256` argument.
pub fn uint(value: u64) -> DynSolValue {
    DynSolValue::Uint(U256::from(value), 256)
}

/// Current unix time in seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
