//! Price service seam.

use async_trait::async_trait;
use pullfeed_types::{FeedId, PriceUpdate};

use crate::Result;

/// A source of signed price updates.
///
/// Implementations perform exactly one round trip per call and never retry.
#[async_trait]
pub trait PriceService: Send + Sync {
    /// Latest update covering every feed in `feed_ids`.
    ///
    /// Fails with [`crate::PriceError::FeedsNotFound`] naming the unknown ids
    /// when the service does not know some of them.
    async fn latest(&self, feed_ids: &[FeedId]) -> Result<PriceUpdate>;

    /// Update for `feed_id` as published at `publish_time` (unix seconds).
    async fn at_time(&self, feed_id: FeedId, publish_time: u64) -> Result<PriceUpdate>;
}
