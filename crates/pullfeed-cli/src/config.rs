//! Configuration file management.
//!
//! ```toml
//! [chain]
//! rpc_url = "http://127.0.0.1:8545"
//! is_fork = true
//!
//! [price_service]
//! endpoint = "https://hermes.pyth.network"
//! cache_ttl_secs = 60
//!
//! [engine]
//! gas_multiplier = 1.5
//!
//! [feeds]
//! ETH = "0xff61491a931112ddf1bd8147cd1b641375f79f5825126d665480874634fd0ace"
//!
//! [logging]
//! level = "debug"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use alloy_primitives::Address;
use anyhow::Context;
use pullfeed_engine::{EngineConfig, RetryPolicy, DEFAULT_MULTICALL_ADDRESS};
use pullfeed_price::{FeedRegistry, HermesConfig, PayloadEncoding, ResolverConfig};
use pullfeed_types::{parse_feed_id, DEFAULT_GAS_LIMIT};
use serde::{Deserialize, Serialize};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "PULLFEED_CONFIG";

/// Config file used when neither a flag nor the environment names one.
pub const DEFAULT_CONFIG_FILE: &str = "pullfeed.toml";

/// Complete client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PullfeedConfig {
    /// Chain node settings.
    #[serde(default)]
    pub chain: ChainConfig,
    /// Price service settings.
    #[serde(default)]
    pub price_service: PriceServiceConfig,
    /// Convergence engine settings.
    #[serde(default)]
    pub engine: EngineSection,
    /// Symbol to feed id table.
    #[serde(default)]
    pub feeds: BTreeMap<String, String>,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Chain node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// JSON-RPC endpoint.
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_rpc_timeout")]
    pub timeout_secs: u64,
    /// Aggregator contract address.
    #[serde(default = "default_multicall")]
    pub multicall_address: String,
    /// The node is a local fork of a live chain.
    #[serde(default)]
    pub is_fork: bool,
    /// Default sender for writes. Empty = must be given on the command line.
    #[serde(default)]
    pub sender: String,
}

/// Price service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceServiceConfig {
    /// Base URL.
    #[serde(default = "default_price_endpoint")]
    pub endpoint: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_price_timeout")]
    pub timeout_secs: u64,
    /// Payload encoding requested from the service.
    #[serde(default)]
    pub encoding: PayloadEncoding,
    /// Lifetime of cached latest prices. 0 disables the cache.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
    /// Tries per price lookup, the first included.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Pause between tries in milliseconds.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
}

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSection {
    /// Estimate gas for writes.
    #[serde(default = "default_true")]
    pub use_estimate_gas: bool,
    /// Multiplier applied to gas estimates.
    #[serde(default = "default_gas_multiplier")]
    pub gas_multiplier: f64,
    /// Gas limit when estimation is off.
    #[serde(default = "default_gas_limit")]
    pub default_gas_limit: u64,
    /// Seconds kept between benchmark requests and a fork's clock.
    #[serde(default = "default_fork_margin")]
    pub fork_margin_secs: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace" | "debug" | "info" | "warn" | "error".
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions

fn default_rpc_url() -> String {
    "http://127.0.0.1:8545".to_string()
}

fn default_rpc_timeout() -> u64 {
    30
}

fn default_multicall() -> String {
    DEFAULT_MULTICALL_ADDRESS.to_string()
}

fn default_price_endpoint() -> String {
    pullfeed_price::hermes::DEFAULT_ENDPOINT.to_string()
}

fn default_price_timeout() -> u64 {
    10
}

fn default_cache_ttl() -> u64 {
    60
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

fn default_gas_multiplier() -> f64 {
    pullfeed_engine::engine::DEFAULT_GAS_MULTIPLIER
}

fn default_gas_limit() -> u64 {
    DEFAULT_GAS_LIMIT
}

fn default_fork_margin() -> u64 {
    pullfeed_price::resolver::DEFAULT_FORK_MARGIN_SECS
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            timeout_secs: default_rpc_timeout(),
            multicall_address: default_multicall(),
            is_fork: false,
            sender: String::new(),
        }
    }
}

impl Default for PriceServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: default_price_endpoint(),
            timeout_secs: default_price_timeout(),
            encoding: PayloadEncoding::default(),
            cache_ttl_secs: default_cache_ttl(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay(),
        }
    }
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            use_estimate_gas: true,
            gas_multiplier: default_gas_multiplier(),
            default_gas_limit: default_gas_limit(),
            fork_margin_secs: default_fork_margin(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl PullfeedConfig {
    /// Load configuration from `explicit`, `$PULLFEED_CONFIG` or `./pullfeed.toml`.
    ///
    /// Falls back to defaults if the file does not exist.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let path = Self::config_path(explicit);
        if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            Self::parse(&content).with_context(|| format!("parsing {}", path.display()))
        } else if explicit.is_some() {
            anyhow::bail!("config file {} does not exist", path.display())
        } else {
            Ok(Self::default())
        }
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Resolve the config file path.
    fn config_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return PathBuf::from(path);
        }
        PathBuf::from(DEFAULT_CONFIG_FILE)
    }

    /// Price service client settings.
    pub fn hermes(&self) -> HermesConfig {
        HermesConfig {
            endpoint: self.price_service.endpoint.clone(),
            timeout: Duration::from_secs(self.price_service.timeout_secs),
            encoding: self.price_service.encoding,
        }
    }

    /// Resolver settings.
    pub fn resolver(&self) -> ResolverConfig {
        ResolverConfig {
            cache_ttl: Duration::from_secs(self.price_service.cache_ttl_secs),
            fork_margin_secs: self.engine.fork_margin_secs,
        }
    }

    /// Engine settings.
    pub fn engine(&self) -> anyhow::Result<EngineConfig> {
        let multicall: Address = self
            .chain
            .multicall_address
            .parse()
            .with_context(|| format!("invalid multicall address {}", self.chain.multicall_address))?;
        Ok(EngineConfig {
            multicall,
            is_fork: self.chain.is_fork,
            use_estimate_gas: self.engine.use_estimate_gas,
            gas_multiplier: self.engine.gas_multiplier,
            default_gas_limit: self.engine.default_gas_limit,
            retry: RetryPolicy {
                attempts: self.price_service.retry_attempts,
                delay: Duration::from_millis(self.price_service.retry_delay_ms),
            },
        })
    }

    /// Symbol registry built from `[feeds]`.
    pub fn registry(&self) -> anyhow::Result<FeedRegistry> {
        let pairs = self
            .feeds
            .iter()
            .map(|(symbol, id)| {
                parse_feed_id(id)
                    .map(|id| (symbol.clone(), id))
                    .with_context(|| format!("feed {symbol}"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(FeedRegistry::from_pairs(pairs))
    }

    /// Configured default sender, if any.
    pub fn sender(&self) -> anyhow::Result<Option<Address>> {
        if self.chain.sender.is_empty() {
            return Ok(None);
        }
        let address: Address = self
            .chain
            .sender
            .parse()
            .with_context(|| format!("invalid sender address {}", self.chain.sender))?;
        Ok(Some(address))
    }
}
