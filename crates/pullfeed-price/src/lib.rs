//! # pullfeed-price
//!
//! Off-chain price data for oracle fulfillment.
//!
//! ## Modules
//!
//! - [`service`]: the [`PriceService`] seam every price source implements
//! - [`hermes`]: HTTP client for a Hermes-compatible price-update service
//! - [`cache`]: read-through cache for latest-price lookups
//! - [`registry`]: symbol to feed id lookup
//! - [`resolver`]: the [`OracleResolver`] used by the engine

pub mod cache;
pub mod hermes;
pub mod registry;
pub mod resolver;
pub mod service;

pub use cache::PriceCache;
pub use hermes::{HermesClient, HermesConfig, PayloadEncoding};
pub use registry::FeedRegistry;
pub use resolver::{OracleResolver, ResolverConfig};
pub use service::PriceService;

use pullfeed_types::FeedId;

/// Error types for price resolution.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PriceError {
    /// The service could not be reached or answered with a failure.
    #[error("price service unavailable: {0}")]
    Unavailable(String),

    /// The service does not know some of the requested feeds.
    #[error("price feeds not found: {}", format_ids(.0))]
    FeedsNotFound(Vec<FeedId>),

    /// The service answered with a body that could not be interpreted.
    #[error("invalid price service response: {0}")]
    InvalidResponse(String),

    /// Every requested feed was unknown to the service.
    #[error("none of the requested feeds are known to the price service")]
    NoKnownFeeds,

    /// A symbol has no registered feed id.
    #[error("unknown price feed symbol: {0}")]
    UnknownSymbol(String),
}

fn format_ids(ids: &[FeedId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type alias for price operations.
pub type Result<T> = std::result::Result<T, PriceError>;
