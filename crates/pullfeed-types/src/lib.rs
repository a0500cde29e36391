//! # pullfeed-types
//!
//! Shared domain types used across the pullfeed workspace.
//!
//! ## Modules
//!
//! - [`call`]: batched-call entries and their results
//! - [`oracle`]: oracle requests, update types and resolved price payloads
//! - [`tx`]: the typed, unsigned transaction request produced for writes

pub mod call;
pub mod oracle;
pub mod tx;

pub use alloy_primitives::{Address, Bytes, B256, U256};
pub use call::{total_value, Call, CallResult};
pub use oracle::{parse_feed_id, FeedId, OracleRequest, PriceMeta, PriceUpdate, UpdateType};
pub use tx::TransactionRequest;

/// Gas limit used for writes when estimation is disabled.
pub const DEFAULT_GAS_LIMIT: u64 = 1_500_000;

/// Payment floor per requested feed, in wei, when the contract reports no fee.
pub const MIN_FEE_PER_FEED_WEI: u64 = 1;

/// Error types for domain type conversions.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TypeError {
    /// The update type byte is not one of the known variants.
    #[error("unknown oracle update type: {0}")]
    UnknownUpdateType(u8),

    /// A feed id could not be parsed from its hex form.
    #[error("invalid feed id: {0}")]
    InvalidFeedId(String),
}

/// Result type alias for type conversions.
pub type Result<T> = std::result::Result<T, TypeError>;
