//! Revert classification.
//!
//! Three selectors are recognized:
//!
//! | Error | Meaning |
//! |-------|---------|
//! | `OracleDataRequired(address,bytes)` | one oracle query, no fee reported |
//! | `OracleDataRequired(address,bytes,uint256)` | one oracle query with a fee |
//! | `Errors(bytes[])` | a list of further revert payloads |
//!
//! Wrapped lists are classified recursively and keep their declared order.
//! Consumers resolve them in reverse so that the most deeply nested missing
//! input is fulfilled first.

use alloy_primitives::{Bytes, U256};
use alloy_sol_types::{sol, SolError};
use pullfeed_types::OracleRequest;

use crate::query::{decode_query, encode_query};

sol! {
    error OracleDataRequired(address oracleContract, bytes oracleQuery);
    error Errors(bytes[] errors);
}

mod with_fee {
    alloy_sol_types::sol! {
        error OracleDataRequired(address oracleContract, bytes oracleQuery, uint256 feeRequired);
    }
}

/// Selector of `OracleDataRequired(address,bytes)`.
pub const ORACLE_DATA_REQUIRED: [u8; 4] = OracleDataRequired::SELECTOR;

/// Selector of `OracleDataRequired(address,bytes,uint256)`.
pub const ORACLE_DATA_REQUIRED_WITH_FEE: [u8; 4] = with_fee::OracleDataRequired::SELECTOR;

/// Selector of `Errors(bytes[])`.
pub const ERRORS: [u8; 4] = Errors::SELECTOR;

/// Wrapped lists nested deeper than this are not expanded.
pub const MAX_NESTING: usize = 8;

/// A classified revert payload.
///
/// Every variant keeps the raw bytes it was classified from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuredError {
    /// A single oracle request without a reported fee.
    OracleDataRequired {
        /// Decoded request.
        request: OracleRequest,
        /// Raw revert bytes.
        data: Bytes,
    },
    /// A single oracle request carrying a fee.
    OracleDataRequiredWithFee {
        /// Decoded request, fee included.
        request: OracleRequest,
        /// Raw revert bytes.
        data: Bytes,
    },
    /// Several errors reported by one revert, in declared order.
    WrappedErrorList {
        /// Classified children.
        children: Vec<StructuredError>,
        /// Raw revert bytes.
        data: Bytes,
    },
    /// Anything outside this protocol. Fatal.
    Unclassified {
        /// Raw revert bytes, unchanged.
        data: Bytes,
    },
}

impl StructuredError {
    /// Raw bytes this error was classified from.
    pub fn data(&self) -> &Bytes {
        match self {
            Self::OracleDataRequired { data, .. }
            | Self::OracleDataRequiredWithFee { data, .. }
            | Self::WrappedErrorList { data, .. }
            | Self::Unclassified { data } => data,
        }
    }

    /// Leading 4-byte selector, if the payload has one.
    pub fn selector(&self) -> Option<[u8; 4]> {
        let data = self.data();
        data.get(..4).and_then(|s| <[u8; 4]>::try_from(s).ok())
    }

    /// Payload following the selector.
    pub fn payload(&self) -> &[u8] {
        self.data().get(4..).unwrap_or_default()
    }

    /// Whether this error, or any error nested in it, is outside the protocol.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::OracleDataRequired { .. } | Self::OracleDataRequiredWithFee { .. } => false,
            Self::WrappedErrorList { children, .. } => children.iter().any(Self::is_fatal),
            Self::Unclassified { .. } => true,
        }
    }

    /// All oracle requests in declared order, nested lists expanded in place.
    ///
    /// Returns `None` if any nested error is unclassified.
    pub fn oracle_requests(&self) -> Option<Vec<OracleRequest>> {
        let mut out = Vec::new();
        self.collect_requests(&mut out).then_some(out)
    }

    fn collect_requests(&self, out: &mut Vec<OracleRequest>) -> bool {
        match self {
            Self::OracleDataRequired { request, .. }
            | Self::OracleDataRequiredWithFee { request, .. } => {
                out.push(request.clone());
                true
            }
            Self::WrappedErrorList { children, .. } => {
                children.iter().all(|child| child.collect_requests(out))
            }
            Self::Unclassified { .. } => false,
        }
    }
}

/// Classify raw revert bytes.
pub fn classify(data: &[u8]) -> StructuredError {
    classify_at_depth(data, 0)
}

fn classify_at_depth(data: &[u8], depth: usize) -> StructuredError {
    let raw = Bytes::copy_from_slice(data);
    let unclassified = || StructuredError::Unclassified { data: raw.clone() };

    let Some(selector) = data.get(..4) else {
        return unclassified();
    };

    if selector == ORACLE_DATA_REQUIRED {
        let Ok(decoded) = OracleDataRequired::abi_decode(data) else {
            return unclassified();
        };
        match decode_query(decoded.oracleContract, &decoded.oracleQuery, U256::ZERO) {
            Ok(request) => StructuredError::OracleDataRequired {
                request,
                data: raw,
            },
            Err(e) => {
                tracing::debug!(error = %e, "oracle query did not decode");
                unclassified()
            }
        }
    } else if selector == ORACLE_DATA_REQUIRED_WITH_FEE {
        let Ok(decoded) = with_fee::OracleDataRequired::abi_decode(data) else {
            return unclassified();
        };
        match decode_query(decoded.oracleContract, &decoded.oracleQuery, decoded.feeRequired) {
            Ok(request) => StructuredError::OracleDataRequiredWithFee {
                request,
                data: raw,
            },
            Err(e) => {
                tracing::debug!(error = %e, "oracle query with fee did not decode");
                unclassified()
            }
        }
    } else if selector == ERRORS {
        if depth >= MAX_NESTING {
            tracing::warn!(depth, "wrapped error list nested too deeply");
            return unclassified();
        }
        let Ok(decoded) = Errors::abi_decode(data) else {
            return unclassified();
        };
        let children = decoded
            .errors
            .iter()
            .map(|child| classify_at_depth(child, depth + 1))
            .collect();
        StructuredError::WrappedErrorList {
            children,
            data: raw,
        }
    } else {
        unclassified()
    }
}

/// Whether a node error message reports a stale sequencing number.
pub fn is_sequencing_stale(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("nonce too low") || lower.contains("nonce has already been used")
}

/// Human-readable reason for a standard `Error(string)` or `Panic(uint256)` revert.
pub fn revert_reason(data: &[u8]) -> Option<String> {
    alloy_sol_types::decode_revert_reason(data)
}

/// Encode an oracle-data-required revert for `request`.
///
/// Uses the fee-bearing selector when the request carries a non-zero fee.
pub fn encode_oracle_data_required(request: &OracleRequest) -> Bytes {
    let query = encode_query(request);
    if request.fee.is_zero() {
        OracleDataRequired {
            oracleContract: request.adapter,
            oracleQuery: query,
        }
        .abi_encode()
        .into()
    } else {
        with_fee::OracleDataRequired {
            oracleContract: request.adapter,
            oracleQuery: query,
            feeRequired: request.fee,
        }
        .abi_encode()
        .into()
    }
}

/// Encode an `Errors(bytes[])` revert wrapping `errors`.
pub fn encode_errors(errors: &[Bytes]) -> Bytes {
    Errors {
        errors: errors.to_vec(),
    }
    .abi_encode()
    .into()
}
