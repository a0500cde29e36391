//! # pullfeed-engine
//!
//! Convergence of contract calls that need on-demand oracle data.
//!
//! A call is simulated through the aggregator. When it reverts asking for
//! oracle data, the requested prices are fetched, fulfillment calls are
//! prepended to the batch, and the batch is simulated again until it
//! succeeds or fails for a reason outside the protocol.
//!
//! ## Modules
//!
//! - [`fulfill`]: fulfillment calls and coalescing of oracle requests
//! - [`retry`]: bounded retry of price lookups
//! - [`session`]: per-signer sequencing counter and transaction submission
//! - [`engine`]: the [`Engine`] and its public operations

pub mod engine;
pub mod fulfill;
pub mod retry;
pub mod session;

pub use engine::{Engine, EngineConfig, DEFAULT_MULTICALL_ADDRESS};
pub use fulfill::{build_fulfillment, coalesce_requests};
pub use retry::RetryPolicy;
pub use session::{Session, TransactionSigner};

use alloy_primitives::Bytes;
use pullfeed_abi::AbiError;
use pullfeed_price::PriceError;
use pullfeed_rpc::NodeError;

/// Error types for the convergence engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Arguments do not match the function description.
    #[error("encoding failed: {0}")]
    Encoding(String),

    /// Return data does not match the declared outputs.
    #[error("decoding failed: {0}")]
    Decoding(String),

    /// The batch reverted with data outside the oracle protocol.
    #[error("call reverted with unclassified data {data}{}", fmt_reason(.reason))]
    Unclassified {
        /// Revert bytes, exactly as returned by the node.
        data: Bytes,
        /// Decoded `Error(string)` or `Panic(uint256)` reason, when present.
        reason: Option<String>,
    },

    /// Price data could not be obtained within the retry budget.
    #[error("oracle service unavailable: {0}")]
    OracleServiceUnavailable(#[source] PriceError),

    /// The batch kept asking for oracle data past the attempt guard.
    #[error("convergence exceeded after {attempts} simulations")]
    ConvergenceExceeded {
        /// Number of simulations performed.
        attempts: usize,
    },

    /// The chain node failed for a reason other than a revert.
    #[error("chain node error: {0}")]
    Node(#[from] NodeError),

    /// The transaction signer failed.
    #[error("signer error: {0}")]
    Signer(String),
}

fn fmt_reason(reason: &Option<String>) -> String {
    reason
        .as_deref()
        .map(|r| format!(" ({r})"))
        .unwrap_or_default()
}

impl From<AbiError> for EngineError {
    fn from(err: AbiError) -> Self {
        match err {
            AbiError::Decoding(msg) | AbiError::Aggregate(msg) => Self::Decoding(msg),
            AbiError::Encoding(msg) | AbiError::Signature(msg) => Self::Encoding(msg),
        }
    }
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
