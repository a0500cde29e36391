//! Oracle data resolver.
//!
//! Sits between the engine and a [`PriceService`]:
//!
//! - latest lookups go through the shared [`PriceCache`] and are narrowed
//!   when the service reports unknown feeds
//! - benchmark lookups are never cached, and on a forked chain are clamped so
//!   that the requested publish time is not ahead of the simulated chain
//! - registered symbols are attached to the diagnostic metadata
//!
//! The resolver does not retry failures. Retrying is the caller's decision.

use std::sync::Arc;
use std::time::Duration;

use futures::future::try_join_all;
use pullfeed_types::{FeedId, PriceUpdate};
use tracing::{debug, info, warn};

use crate::cache::PriceCache;
use crate::registry::FeedRegistry;
use crate::service::PriceService;
use crate::{PriceError, Result};

/// Default latest-price cache lifetime.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

/// Default distance kept between a benchmark request and a forked chain's clock.
pub const DEFAULT_FORK_MARGIN_SECS: u64 = 5;

/// Resolver options.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Lifetime of cached latest updates. Zero disables caching.
    pub cache_ttl: Duration,
    /// Seconds subtracted from a forked chain's block time for benchmark requests.
    pub fork_margin_secs: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_CACHE_TTL,
            fork_margin_secs: DEFAULT_FORK_MARGIN_SECS,
        }
    }
}

/// Resolves oracle requests into price updates.
#[derive(Clone)]
pub struct OracleResolver {
    service: Arc<dyn PriceService>,
    cache: Arc<PriceCache>,
    registry: Arc<FeedRegistry>,
    config: ResolverConfig,
}

impl OracleResolver {
    /// Create a resolver with its own cache sized from `config`.
    pub fn new(service: Arc<dyn PriceService>, config: ResolverConfig) -> Self {
        let cache = Arc::new(PriceCache::new(config.cache_ttl));
        Self {
            service,
            cache,
            registry: Arc::new(FeedRegistry::new()),
            config,
        }
    }

    /// Share an existing cache instead of the one built from the config.
    pub fn with_cache(mut self, cache: Arc<PriceCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Attach a symbol registry.
    pub fn with_registry(mut self, registry: Arc<FeedRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// The cache in front of latest lookups.
    pub fn cache(&self) -> &Arc<PriceCache> {
        &self.cache
    }

    /// The symbol registry.
    pub fn registry(&self) -> &FeedRegistry {
        &self.registry
    }

    /// Resolver options.
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Latest update for `feed_ids` in a single round trip.
    ///
    /// Feeds the service does not know are dropped and the request is
    /// repeated with the remainder.
    ///
    /// # Errors
    ///
    /// - [`PriceError::NoKnownFeeds`] if nothing is left after narrowing
    /// - any error of the underlying service
    pub async fn resolve_latest(&self, feed_ids: &[FeedId]) -> Result<PriceUpdate> {
        let key = PriceCache::key(feed_ids);
        if let Some(hit) = self.cache.get(&key).await {
            debug!(feeds = key.len(), "latest price update served from cache");
            return Ok(hit);
        }

        let mut wanted = key.clone();
        let update = loop {
            if wanted.is_empty() {
                return Err(PriceError::NoKnownFeeds);
            }
            match self.service.latest(&wanted).await {
                Ok(update) => break update,
                Err(PriceError::FeedsNotFound(missing)) => {
                    let before = wanted.len();
                    wanted.retain(|id| !missing.contains(id));
                    if wanted.len() == before {
                        return Err(PriceError::FeedsNotFound(missing));
                    }
                    warn!(
                        dropped = before - wanted.len(),
                        remaining = wanted.len(),
                        "price service does not know some feeds, narrowing request"
                    );
                }
                Err(e) => return Err(e),
            }
        };

        let update = self.annotate(update);
        info!(
            feeds = update.feeds.len(),
            payloads = update.payloads.len(),
            "latest price update resolved"
        );
        self.cache.insert(key, update.clone()).await;
        Ok(update)
    }

    /// Update for `feed_id` as of `publish_time`.
    ///
    /// `chain_now` is the block time of a forked chain. When given, the
    /// requested time is capped at `chain_now - fork_margin_secs`.
    pub async fn resolve_benchmark(
        &self,
        feed_id: FeedId,
        publish_time: u64,
        chain_now: Option<u64>,
    ) -> Result<PriceUpdate> {
        let effective = self.benchmark_time(publish_time, chain_now);
        if effective != publish_time {
            warn!(
                requested = publish_time,
                effective, "benchmark time is ahead of the forked chain, clamping"
            );
        }
        let update = self.service.at_time(feed_id, effective).await?;
        info!(feed = %feed_id, publish_time = effective, "benchmark price update resolved");
        Ok(self.annotate(update))
    }

    /// Publish time actually requested for a benchmark lookup.
    pub fn benchmark_time(&self, publish_time: u64, chain_now: Option<u64>) -> u64 {
        match chain_now {
            Some(now) => publish_time.min(now.saturating_sub(self.config.fork_margin_secs)),
            None => publish_time,
        }
    }

    /// Resolve registered symbols.
    ///
    /// Without a publish time this is one latest lookup. With one, each feed
    /// is fetched as a benchmark and the results are merged.
    pub async fn resolve_symbols<S: AsRef<str>>(
        &self,
        symbols: &[S],
        publish_time: Option<u64>,
    ) -> Result<PriceUpdate> {
        let feed_ids = self.registry.resolve(symbols)?;
        match publish_time {
            None => self.resolve_latest(&feed_ids).await,
            Some(time) => {
                let updates = try_join_all(
                    feed_ids
                        .iter()
                        .map(|id| self.resolve_benchmark(*id, time, None)),
                )
                .await?;
                Ok(merge(updates))
            }
        }
    }

    fn annotate(&self, mut update: PriceUpdate) -> PriceUpdate {
        for (id, meta) in update.feeds.iter_mut() {
            if meta.symbol.is_none() {
                meta.symbol = self.registry.symbol(id).map(str::to_string);
            }
        }
        update
    }
}

/// Combine several updates into one, keeping the earliest fetch time.
fn merge(updates: Vec<PriceUpdate>) -> PriceUpdate {
    let mut iter = updates.into_iter();
    let Some(mut merged) = iter.next() else {
        return PriceUpdate::new(Vec::new(), Default::default());
    };
    for update in iter {
        merged.payloads.extend(update.payloads);
        merged.feeds.extend(update.feeds);
        merged.fetched_at = merged.fetched_at.min(update.fetched_at);
    }
    merged
}
