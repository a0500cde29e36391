//! Oracle requests and resolved price payloads.
//!
//! An [`OracleRequest`] is what a reverting contract asks for: which feeds,
//! in which form, and for how much. A [`PriceUpdate`] is what the price
//! service hands back for it.

use std::collections::BTreeMap;
use std::fmt;

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::{TypeError, MIN_FEE_PER_FEED_WEI};

/// A 32-byte price feed identifier.
pub type FeedId = B256;

/// Parse a feed id from hex, with or without a `0x` prefix.
pub fn parse_feed_id(raw: &str) -> crate::Result<FeedId> {
    let trimmed = raw.trim();
    let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    if digits.len() != 64 {
        return Err(TypeError::InvalidFeedId(raw.to_string()));
    }
    digits
        .parse::<FeedId>()
        .map_err(|_| TypeError::InvalidFeedId(raw.to_string()))
}

/// Form of oracle data a contract requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum UpdateType {
    /// Freshest price, accepted up to a staleness bound.
    Latest = 1,
    /// Price as of a specific past publish time.
    Benchmark = 2,
}

impl UpdateType {
    /// Wire value of this update type.
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for UpdateType {
    type Error = TypeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Latest),
            2 => Ok(Self::Benchmark),
            other => Err(TypeError::UnknownUpdateType(other)),
        }
    }
}

impl fmt::Display for UpdateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest => f.write_str("latest"),
            Self::Benchmark => f.write_str("benchmark"),
        }
    }
}

/// A decoded request for oracle data, reported by a reverting contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OracleRequest {
    /// Oracle adapter contract that accepts the fulfillment.
    pub adapter: Address,
    /// Requested form of the data.
    pub update_type: UpdateType,
    /// Requested feeds. A benchmark request always has exactly one.
    pub feed_ids: Vec<FeedId>,
    /// Staleness tolerance in seconds for `Latest`, publish time for `Benchmark`.
    pub staleness_or_publish_time: u64,
    /// Fee reported by the contract, zero when none was reported.
    pub fee: U256,
}

impl OracleRequest {
    /// Request the latest prices for `feed_ids`, tolerating `staleness` seconds.
    pub fn latest(adapter: Address, feed_ids: Vec<FeedId>, staleness: u64) -> Self {
        Self {
            adapter,
            update_type: UpdateType::Latest,
            feed_ids,
            staleness_or_publish_time: staleness,
            fee: U256::ZERO,
        }
    }

    /// Request the price of `feed_id` as of `publish_time`.
    pub fn benchmark(adapter: Address, feed_id: FeedId, publish_time: u64) -> Self {
        Self {
            adapter,
            update_type: UpdateType::Benchmark,
            feed_ids: vec![feed_id],
            staleness_or_publish_time: publish_time,
            fee: U256::ZERO,
        }
    }

    /// Return a copy of this request with the reported fee set.
    pub fn with_fee(self, fee: U256) -> Self {
        Self { fee, ..self }
    }

    /// Native value to attach to the fulfillment call.
    ///
    /// The reported fee, floored at one wei per requested feed.
    pub fn payment(&self) -> U256 {
        let floor = U256::from(MIN_FEE_PER_FEED_WEI)
            .saturating_mul(U256::from(self.feed_ids.len()));
        self.fee.max(floor)
    }
}

/// Diagnostic metadata for one feed in a [`PriceUpdate`].
///
/// Never used as on-chain truth; the opaque payload is what the adapter verifies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceMeta {
    /// Human-readable symbol, when the feed is registered.
    pub symbol: Option<String>,
    /// Integer price mantissa.
    pub price: i64,
    /// Decimal exponent applied to `price`.
    pub expo: i32,
    /// Unix time the price was published.
    pub publish_time: u64,
}

impl PriceMeta {
    /// Price as a floating point value, `price * 10^expo`.
    pub fn value(&self) -> f64 {
        self.price as f64 * 10f64.powi(self.expo)
    }
}

/// Update data returned by the price service for one or more feeds.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceUpdate {
    /// Opaque update blobs, forwarded verbatim to the adapter.
    pub payloads: Vec<Bytes>,
    /// Per-feed diagnostics keyed by feed id.
    pub feeds: BTreeMap<FeedId, PriceMeta>,
    /// When this update was fetched from the service.
    pub fetched_at: Instant,
}

impl PriceUpdate {
    /// Create an update stamped with the current time.
    pub fn new(payloads: Vec<Bytes>, feeds: BTreeMap<FeedId, PriceMeta>) -> Self {
        Self {
            payloads,
            feeds,
            fetched_at: Instant::now(),
        }
    }

    /// Feed ids covered by this update, in ascending order.
    pub fn feed_ids(&self) -> Vec<FeedId> {
        self.feeds.keys().copied().collect()
    }
}
