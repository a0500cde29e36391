//! HTTP client for a Hermes-compatible price-update service.
//!
//! Two endpoints are used:
//!
//! - `GET {endpoint}/v2/updates/price/latest?ids[]=..&encoding=hex`
//! - `GET {endpoint}/v2/updates/price/{publish_time}?ids[]=..&encoding=hex`
//!
//! Both answer with
//!
//! ```json
//! {
//!   "binary": { "encoding": "hex", "data": ["504e4155..."] },
//!   "parsed": [
//!     { "id": "ff61...", "price": { "price": "6119285000000", "expo": -8, "publish_time": 1700000000 } }
//!   ]
//! }
//! ```
//!
//! An unknown feed id is reported as a 404 whose body lists the offending ids.

use std::collections::BTreeMap;
use std::time::Duration;

use alloy_primitives::Bytes;
use async_trait::async_trait;
use base64::Engine as _;
use pullfeed_types::{parse_feed_id, FeedId, PriceMeta, PriceUpdate};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::service::PriceService;
use crate::{PriceError, Result};

/// Default public endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://hermes.pyth.network";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Encoding the service uses for update blobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadEncoding {
    /// Lowercase hex without a `0x` prefix.
    #[default]
    Hex,
    /// Standard base64.
    Base64,
}

impl PayloadEncoding {
    /// Query parameter value for this encoding.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hex => "hex",
            Self::Base64 => "base64",
        }
    }

    fn decode(self, blob: &str) -> Result<Bytes> {
        let decoded = match self {
            Self::Hex => hex::decode(blob.trim_start_matches("0x"))
                .map_err(|e| PriceError::InvalidResponse(format!("hex payload: {e}")))?,
            Self::Base64 => base64::engine::general_purpose::STANDARD
                .decode(blob)
                .map_err(|e| PriceError::InvalidResponse(format!("base64 payload: {e}")))?,
        };
        Ok(Bytes::from(decoded))
    }
}

/// Connection settings for [`HermesClient`].
#[derive(Debug, Clone)]
pub struct HermesConfig {
    /// Base URL, without a trailing path.
    pub endpoint: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Requested payload encoding.
    pub encoding: PayloadEncoding,
}

impl Default for HermesConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: DEFAULT_TIMEOUT,
            encoding: PayloadEncoding::Hex,
        }
    }
}

/// Price service client over HTTP.
pub struct HermesClient {
    client: reqwest::Client,
    config: HermesConfig,
}

impl HermesClient {
    /// Create a client for `config`.
    pub fn new(config: HermesConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PriceError::Unavailable(format!("building HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Configured endpoint.
    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    async fn fetch(&self, path: &str, feed_ids: &[FeedId]) -> Result<PriceUpdate> {
        let url = format!("{}/{path}", self.config.endpoint.trim_end_matches('/'));
        let mut query: Vec<(&str, String)> = feed_ids
            .iter()
            .map(|id| ("ids[]", id.to_string()))
            .collect();
        query.push(("encoding", self.config.encoding.as_str().to_string()));

        debug!(url = %url, feeds = feed_ids.len(), "requesting price update");
        let resp = self
            .client
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(|e| PriceError::Unavailable(format!("{url}: {e}")))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| PriceError::Unavailable(format!("reading response body: {e}")))?;

        if matches!(status, StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST) {
            if let Some(missing) = parse_missing_ids(&text) {
                return Err(PriceError::FeedsNotFound(missing));
            }
        }
        if !status.is_success() {
            return Err(PriceError::Unavailable(format!("HTTP {status}: {text}")));
        }
        parse_update(&text, self.config.encoding)
    }
}

#[async_trait]
impl PriceService for HermesClient {
    async fn latest(&self, feed_ids: &[FeedId]) -> Result<PriceUpdate> {
        self.fetch("v2/updates/price/latest", feed_ids).await
    }

    async fn at_time(&self, feed_id: FeedId, publish_time: u64) -> Result<PriceUpdate> {
        self.fetch(&format!("v2/updates/price/{publish_time}"), &[feed_id])
            .await
    }
}

#[derive(Debug, Deserialize)]
struct UpdateResponse {
    binary: BinaryBlock,
    #[serde(default)]
    parsed: Vec<ParsedFeed>,
}

#[derive(Debug, Deserialize)]
struct BinaryBlock {
    data: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ParsedFeed {
    id: String,
    price: ParsedPrice,
}

#[derive(Debug, Deserialize)]
struct ParsedPrice {
    price: String,
    expo: i32,
    publish_time: u64,
}

/// Parse an update response body.
pub(crate) fn parse_update(body: &str, encoding: PayloadEncoding) -> Result<PriceUpdate> {
    let response: UpdateResponse = serde_json::from_str(body)
        .map_err(|e| PriceError::InvalidResponse(format!("invalid JSON: {e}")))?;

    let payloads = response
        .binary
        .data
        .iter()
        .map(|blob| encoding.decode(blob))
        .collect::<Result<Vec<_>>>()?;
    if payloads.is_empty() {
        return Err(PriceError::InvalidResponse(
            "response carries no update data".to_string(),
        ));
    }

    let mut feeds = BTreeMap::new();
    for entry in response.parsed {
        let id = parse_feed_id(&entry.id)
            .map_err(|e| PriceError::InvalidResponse(e.to_string()))?;
        let price = entry.price.price.parse::<i64>().map_err(|e| {
            PriceError::InvalidResponse(format!("price {:?}: {e}", entry.price.price))
        })?;
        feeds.insert(
            id,
            PriceMeta {
                symbol: None,
                price,
                expo: entry.price.expo,
                publish_time: entry.price.publish_time,
            },
        );
    }
    Ok(PriceUpdate::new(payloads, feeds))
}

/// Extract the feed ids named in a not-found error body.
pub(crate) fn parse_missing_ids(body: &str) -> Option<Vec<FeedId>> {
    let mut ids: Vec<FeedId> = body
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter_map(|token| parse_feed_id(token).ok())
        .collect();
    ids.dedup();
    (!ids.is_empty()).then_some(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ETH: &str = "ff61491a931112ddf1bd8147cd1b641375f79f5825126d665480874634fd0ace";

    fn body(blob: &str) -> String {
        format!(
            r#"{{
                "binary": {{"encoding": "hex", "data": ["{blob}"]}},
                "parsed": [{{
                    "id": "{ETH}",
                    "price": {{"price": "250000000000", "conf": "1", "expo": -8, "publish_time": 1700000000}},
                    "ema_price": {{"price": "1", "conf": "1", "expo": -8, "publish_time": 1700000000}}
                }}]
            }}"#
        )
    }

    #[test]
    fn test_parse_update_hex() {
        let update = parse_update(&body("504e4155"), PayloadEncoding::Hex).expect("parse");
        assert_eq!(update.payloads, vec![Bytes::from(vec![0x50, 0x4e, 0x41, 0x55])]);
        let id = parse_feed_id(ETH).expect("id");
        let meta = update.feeds.get(&id).expect("meta");
        assert_eq!(meta.price, 250_000_000_000);
        assert_eq!(meta.expo, -8);
        assert_eq!(meta.publish_time, 1_700_000_000);
        assert_eq!(meta.symbol, None);
    }

    #[test]
    fn test_parse_update_base64() {
        let update = parse_update(&body("UE5BVQ=="), PayloadEncoding::Base64).expect("parse");
        assert_eq!(update.payloads, vec![Bytes::from(vec![0x50, 0x4e, 0x41, 0x55])]);
    }

    #[test]
    fn test_parse_update_rejects_bad_blob() {
        let err = parse_update(&body("zz"), PayloadEncoding::Hex).unwrap_err();
        assert!(matches!(err, PriceError::InvalidResponse(_)));
    }

    #[test]
    fn test_parse_update_rejects_empty_data() {
        let err = parse_update(r#"{"binary": {"data": []}}"#, PayloadEncoding::Hex).unwrap_err();
        assert!(matches!(err, PriceError::InvalidResponse(_)));
    }

    #[test]
    fn test_parse_update_rejects_garbage() {
        assert!(parse_update("not json", PayloadEncoding::Hex).is_err());
    }

    #[test]
    fn test_parse_missing_ids() {
        let other = "e62df6c8b4a85fe1a67db44dc12de5db330f7ac66b72dc658afedf0f4a415b43";
        let text = format!("Price ids not found: [\"0x{ETH}\", \"{other}\"]");
        let ids = parse_missing_ids(&text).expect("ids");
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0], parse_feed_id(ETH).expect("id"));
    }

    #[test]
    fn test_parse_missing_ids_none() {
        assert_eq!(parse_missing_ids("internal error"), None);
    }

    #[test]
    fn test_client_builds_with_defaults() {
        let client = HermesClient::new(HermesConfig::default()).expect("client");
        assert_eq!(client.endpoint(), DEFAULT_ENDPOINT);
        assert_eq!(PayloadEncoding::default().as_str(), "hex");
    }
}
