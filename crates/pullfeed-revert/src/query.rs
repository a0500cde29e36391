//! Oracle query layouts.
//!
//! The query bytes carried by an oracle-data-required error start with the
//! update type, which selects one of two layouts:
//!
//! ```text
//! Latest    (1): (uint8 updateType, uint64 stalenessTolerance, bytes32[] feedIds)
//! Benchmark (2): (uint8 updateType, uint64 publishTime,        bytes32   feedId)
//! ```

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::sol_data::{Array, FixedBytes, Uint};
use alloy_sol_types::SolType;
use pullfeed_types::{OracleRequest, UpdateType};

use crate::{Result, RevertError};

type LatestQuery = (Uint<8>, Uint<64>, Array<FixedBytes<32>>);
type BenchmarkQuery = (Uint<8>, Uint<64>, FixedBytes<32>);

/// Size of one ABI word.
const WORD: usize = 32;

/// Decode `query` into an [`OracleRequest`] addressed to `adapter`.
///
/// # Errors
///
/// - [`RevertError::Truncated`] if the query is shorter than one word
/// - [`RevertError::Layout`] if the update type is unknown, the bytes do not
///   match its layout, or a latest query names no feeds
pub fn decode_query(adapter: Address, query: &[u8], fee: U256) -> Result<OracleRequest> {
    if query.len() < WORD {
        return Err(RevertError::Truncated {
            required: WORD,
            available: query.len(),
        });
    }
    if query[..WORD - 1].iter().any(|b| *b != 0) {
        return Err(RevertError::Layout("update type word is not a uint8".to_string()));
    }
    let update_type =
        UpdateType::try_from(query[WORD - 1]).map_err(|e| RevertError::Layout(e.to_string()))?;

    let request = match update_type {
        UpdateType::Latest => {
            let (_, staleness, feed_ids) = <LatestQuery as SolType>::abi_decode_params(query)
                .map_err(|e| RevertError::Layout(format!("latest query: {e}")))?;
            if feed_ids.is_empty() {
                return Err(RevertError::Layout("latest query names no feeds".to_string()));
            }
            OracleRequest::latest(adapter, feed_ids, staleness)
        }
        UpdateType::Benchmark => {
            let (_, publish_time, feed_id) = <BenchmarkQuery as SolType>::abi_decode_params(query)
                .map_err(|e| RevertError::Layout(format!("benchmark query: {e}")))?;
            OracleRequest::benchmark(adapter, feed_id, publish_time)
        }
    };
    Ok(request.with_fee(fee))
}

/// Encode the query bytes for `request`.
///
/// A benchmark request is encoded with its first feed id only.
pub fn encode_query(request: &OracleRequest) -> Bytes {
    let encoded = match request.update_type {
        UpdateType::Latest => <LatestQuery as SolType>::abi_encode_params(&(
            request.update_type.as_u8(),
            request.staleness_or_publish_time,
            request.feed_ids.clone(),
        )),
        UpdateType::Benchmark => <BenchmarkQuery as SolType>::abi_encode_params(&(
            request.update_type.as_u8(),
            request.staleness_or_publish_time,
            request.feed_ids.first().copied().unwrap_or(B256::ZERO),
        )),
    };
    encoded.into()
}
