//! Fulfillment calls.
//!
//! An oracle adapter accepts resolved price data through
//! `fulfillOracleQuery(bytes signedOffchainData)`, where the argument is the
//! ABI encoding of
//!
//! ```text
//! (uint8 updateType, uint64 stalenessOrPublishTime, bytes32[] feedIds, bytes[] updateData)
//! ```
//!
//! The call carries the reported fee as value, floored at one wei per feed.

use alloy_primitives::{Address, Bytes, B256};
use alloy_sol_types::sol_data::{self, Array, FixedBytes, Uint};
use alloy_sol_types::{sol, SolCall, SolType};
use pullfeed_types::{Call, OracleRequest, PriceUpdate, UpdateType};
use tracing::{debug, warn};

sol! {
    function fulfillOracleQuery(bytes signedOffchainData) payable;
}

type SignedOffchainData = (Uint<8>, Uint<64>, Array<FixedBytes<32>>, Array<sol_data::Bytes>);

/// Selector of `fulfillOracleQuery(bytes)`.
pub const FULFILL_ORACLE_QUERY_SELECTOR: [u8; 4] = fulfillOracleQueryCall::SELECTOR;

/// Build the fulfillment call answering `request` with `update`.
///
/// Only feeds present in `update` are declared, so the query always matches
/// the signed payloads it carries. The benchmark publish time is encoded as
/// given in `request`; callers pass the time the data was fetched at.
pub fn build_fulfillment(request: &OracleRequest, update: &PriceUpdate) -> Call {
    let answered = answered_request(request, update);
    let signed = encode_signed_data(&answered, &update.payloads);
    let data = fulfillOracleQueryCall {
        signedOffchainData: signed,
    }
    .abi_encode();
    let value = answered.payment();
    debug!(
        adapter = %answered.adapter,
        update_type = %answered.update_type,
        feeds = answered.feed_ids.len(),
        value = %value,
        "built fulfillment call"
    );
    Call::new(answered.adapter, data).with_value(value)
}

/// `request` restricted to the feeds `update` carries data for.
pub fn answered_request(request: &OracleRequest, update: &PriceUpdate) -> OracleRequest {
    let feed_ids: Vec<_> = request
        .feed_ids
        .iter()
        .filter(|id| update.feeds.contains_key(*id))
        .copied()
        .collect();
    if feed_ids.len() != request.feed_ids.len() {
        warn!(
            adapter = %request.adapter,
            requested = request.feed_ids.len(),
            answered = feed_ids.len(),
            "fulfilling a subset of the requested feeds"
        );
    }
    OracleRequest {
        feed_ids,
        ..request.clone()
    }
}

/// ABI-encode the adapter argument for `request` carrying `payloads`.
pub fn encode_signed_data(request: &OracleRequest, payloads: &[Bytes]) -> Bytes {
    <SignedOffchainData as SolType>::abi_encode_params(&(
        request.update_type.as_u8(),
        request.staleness_or_publish_time,
        request.feed_ids.clone(),
        payloads.to_vec(),
    ))
    .into()
}

/// A decoded fulfillment call, for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fulfillment {
    /// Update type byte.
    pub update_type: u8,
    /// Staleness tolerance or publish time.
    pub staleness_or_publish_time: u64,
    /// Feeds being fulfilled.
    pub feed_ids: Vec<B256>,
    /// Update blobs.
    pub payloads: Vec<Bytes>,
}

/// Decode `fulfillOracleQuery` calldata. `None` if `data` is anything else.
pub fn decode_fulfillment(data: &[u8]) -> Option<Fulfillment> {
    let call = fulfillOracleQueryCall::abi_decode(data).ok()?;
    let (update_type, staleness_or_publish_time, feed_ids, payloads) =
        <SignedOffchainData as SolType>::abi_decode_params(&call.signedOffchainData).ok()?;
    Some(Fulfillment {
        update_type,
        staleness_or_publish_time,
        feed_ids,
        payloads,
    })
}

/// Merge requests that can share one price lookup.
///
/// Latest requests to the same adapter collapse into one, at the position of
/// the first of them, with the union of their feeds, the tightest staleness
/// bound and the sum of their fees. Benchmark requests are kept as they are.
pub fn coalesce_requests(requests: Vec<OracleRequest>) -> Vec<OracleRequest> {
    let mut merged: Vec<OracleRequest> = Vec::with_capacity(requests.len());
    let mut latest_slot: Vec<(Address, usize)> = Vec::new();

    for request in requests {
        if request.update_type != UpdateType::Latest {
            merged.push(request);
            continue;
        }
        let slot = latest_slot
            .iter()
            .find(|(adapter, _)| *adapter == request.adapter)
            .map(|(_, index)| *index);
        match slot.and_then(|index| merged.get_mut(index)) {
            Some(group) => {
                for id in request.feed_ids {
                    if !group.feed_ids.contains(&id) {
                        group.feed_ids.push(id);
                    }
                }
                group.staleness_or_publish_time = group
                    .staleness_or_publish_time
                    .min(request.staleness_or_publish_time);
                group.fee = group.fee.saturating_add(request.fee);
            }
            None => {
                latest_slot.push((request.adapter, merged.len()));
                merged.push(request);
            }
        }
    }
    merged
}
