//! Symbol to feed id lookup.

use std::collections::{BTreeMap, HashMap};

use pullfeed_types::FeedId;
use tracing::info;

use crate::{PriceError, Result};

/// Bidirectional mapping between market symbols and feed ids.
#[derive(Debug, Clone, Default)]
pub struct FeedRegistry {
    by_symbol: BTreeMap<String, FeedId>,
    by_id: HashMap<FeedId, String>,
}

impl FeedRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from `(symbol, feed id)` pairs.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, FeedId)>,
        S: Into<String>,
    {
        let mut registry = Self::new();
        registry.extend(pairs);
        registry
    }

    /// Add or replace entries. A symbol re-mapped to a new id drops its old id.
    pub fn extend<I, S>(&mut self, pairs: I)
    where
        I: IntoIterator<Item = (S, FeedId)>,
        S: Into<String>,
    {
        for (symbol, id) in pairs {
            let symbol = symbol.into();
            if let Some(previous) = self.by_symbol.insert(symbol.clone(), id) {
                self.by_id.remove(&previous);
            }
            self.by_id.insert(id, symbol);
        }
        info!(symbols = self.by_symbol.len(), "feed registry updated");
    }

    /// Feed id registered for `symbol`.
    pub fn feed_id(&self, symbol: &str) -> Option<FeedId> {
        self.by_symbol.get(symbol).copied()
    }

    /// Symbol registered for `id`.
    pub fn symbol(&self, id: &FeedId) -> Option<&str> {
        self.by_id.get(id).map(String::as_str)
    }

    /// Feed ids for every symbol in `symbols`, in the same order.
    ///
    /// # Errors
    ///
    /// [`PriceError::UnknownSymbol`] naming the first unmapped symbol.
    pub fn resolve<S: AsRef<str>>(&self, symbols: &[S]) -> Result<Vec<FeedId>> {
        symbols
            .iter()
            .map(|symbol| {
                let symbol = symbol.as_ref();
                self.feed_id(symbol)
                    .ok_or_else(|| PriceError::UnknownSymbol(symbol.to_string()))
            })
            .collect()
    }

    /// Registered symbols, sorted.
    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.by_symbol.keys().map(String::as_str)
    }

    /// Number of registered feeds.
    pub fn len(&self) -> usize {
        self.by_symbol.len()
    }

    /// Whether no feed is registered.
    pub fn is_empty(&self) -> bool {
        self.by_symbol.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::B256;

    fn registry() -> FeedRegistry {
        FeedRegistry::from_pairs([("ETH", B256::repeat_byte(1)), ("BTC", B256::repeat_byte(2))])
    }

    #[test]
    fn test_lookup_both_directions() {
        let registry = registry();
        assert_eq!(registry.feed_id("ETH"), Some(B256::repeat_byte(1)));
        assert_eq!(registry.symbol(&B256::repeat_byte(2)), Some("BTC"));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.symbols().collect::<Vec<_>>(), vec!["BTC", "ETH"]);
    }

    #[test]
    fn test_resolve_preserves_order() {
        let ids = registry().resolve(&["BTC", "ETH"]).expect("resolve");
        assert_eq!(ids, vec![B256::repeat_byte(2), B256::repeat_byte(1)]);
    }

    #[test]
    fn test_resolve_unknown_symbol() {
        let err = registry().resolve(&["ETH", "DOGE"]).unwrap_err();
        assert_eq!(err, PriceError::UnknownSymbol("DOGE".to_string()));
    }

    #[test]
    fn test_remap_symbol_drops_old_id() {
        let mut registry = registry();
        registry.extend([("ETH", B256::repeat_byte(9))]);
        assert_eq!(registry.feed_id("ETH"), Some(B256::repeat_byte(9)));
        assert_eq!(registry.symbol(&B256::repeat_byte(1)), None);
    }
}
