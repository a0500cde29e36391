//! Aggregator wire format.
//!
//! Batches are sent to an on-chain aggregator exposing
//!
//! ```text
//! aggregate3Value((address target, bool requireSuccess, uint256 value, bytes callData)[])
//!     payable returns ((bool success, bytes returnData)[])
//! ```
//!
//! The same calldata is used for static simulation and for the final
//! state-changing transaction. An entry with `requireSuccess` set bubbles its
//! revert data up as the revert data of the whole batch.

use alloy_sol_types::sol_data::Array;
use alloy_sol_types::{sol, SolCall, SolType};
use pullfeed_types::{Call, CallResult};

use crate::{AbiError, Result};

sol! {
    struct AggregateCall {
        address target;
        bool requireSuccess;
        uint256 value;
        bytes callData;
    }

    struct AggregateResult {
        bool success;
        bytes returnData;
    }

    function aggregate3Value(AggregateCall[] calls) payable returns (AggregateResult[] returnData);
}

/// Selector of `aggregate3Value`.
pub const AGGREGATE3_VALUE_SELECTOR: [u8; 4] = aggregate3ValueCall::SELECTOR;

/// Encode `calls` as `aggregate3Value` calldata.
pub fn encode_aggregate(calls: &[Call]) -> alloy_primitives::Bytes {
    let calls = calls
        .iter()
        .map(|call| AggregateCall {
            target: call.target,
            requireSuccess: call.require_success,
            value: call.value,
            callData: call.data.clone(),
        })
        .collect();
    aggregate3ValueCall { calls }.abi_encode().into()
}

/// Recover the call list from `aggregate3Value` calldata.
pub fn decode_aggregate_calls(data: &[u8]) -> Result<Vec<Call>> {
    let decoded = aggregate3ValueCall::abi_decode(data)
        .map_err(|e| AbiError::Aggregate(format!("calldata: {e}")))?;
    Ok(decoded
        .calls
        .into_iter()
        .map(|entry| Call {
            target: entry.target,
            require_success: entry.requireSuccess,
            value: entry.value,
            data: entry.callData,
        })
        .collect())
}

/// Decode the return data of `aggregate3Value`.
pub fn decode_aggregate_results(data: &[u8]) -> Result<Vec<CallResult>> {
    let decoded = <Array<AggregateResult> as SolType>::abi_decode(data)
        .map_err(|e| AbiError::Aggregate(format!("return data: {e}")))?;
    Ok(decoded
        .into_iter()
        .map(|entry| CallResult {
            success: entry.success,
            return_data: entry.returnData,
        })
        .collect())
}

/// Encode `results` the way the aggregator returns them.
pub fn encode_aggregate_results(results: &[CallResult]) -> alloy_primitives::Bytes {
    let entries: Vec<AggregateResult> = results
        .iter()
        .map(|result| AggregateResult {
            success: result.success,
            returnData: result.return_data.clone(),
        })
        .collect();
    <Array<AggregateResult> as SolType>::abi_encode(&entries).into()
}
