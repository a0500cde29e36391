//! # pullfeed-abi
//!
//! Binary encoding for contract calls and the batched-call aggregator.
//!
//! ## Modules
//!
//! - [`codec`]: encode call arguments and decode return data against a
//!   parsed function description
//! - [`multicall`]: the `aggregate3Value` wire format used to batch
//!   simulations and writes

pub mod codec;
pub mod multicall;

pub use codec::{decode, encode, function_from_abi, parse_function};
pub use multicall::{
    decode_aggregate_calls, decode_aggregate_results, encode_aggregate, encode_aggregate_results,
};

/// Error types for ABI operations.
#[derive(Debug, thiserror::Error)]
pub enum AbiError {
    /// A function signature or JSON ABI could not be parsed.
    #[error("invalid function description: {0}")]
    Signature(String),

    /// Arguments do not match the declared inputs.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Return data does not match the declared outputs.
    #[error("decoding error: {0}")]
    Decoding(String),

    /// Aggregator calldata or return data is malformed.
    #[error("aggregate error: {0}")]
    Aggregate(String),
}

/// Result type alias for ABI operations.
pub type Result<T> = std::result::Result<T, AbiError>;
