use crate::error::{AppError, Result};
use std::env;
use std::time::Duration;

/// Base URLs for every upstream provider.
#[derive(Debug, Clone)]
pub struct ProviderEndpoints {
    /// DefiLlama coins API.
    pub defillama: String,
    /// CoinGecko API (public or pro, chosen from the API key when unset).
    pub coingecko: Option<String>,
    /// DexScreener API.
    pub dexscreener: String,
    /// OpenSea API.
    pub opensea: String,
    /// Overrides the per-chain Reservoir host for every chain.
    pub reservoir: Option<String>,
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            defillama: "https://coins.llama.fi".to_string(),
            coingecko: None,
            dexscreener: "https://api.dexscreener.com".to_string(),
            opensea: "https://api.opensea.io".to_string(),
            reservoir: None,
        }
    }
}

/// Time-to-live per data volatility.
#[derive(Debug, Clone, Copy)]
pub struct CacheTtls {
    /// Current prices and anything that may still move.
    pub current: Duration,
    /// Settled historical prices.
    pub historical: Duration,
    /// Identifier lookups (collection slugs).
    pub lookup: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            current: Duration::from_secs(300),
            historical: Duration::from_secs(86_400),
            lookup: Duration::from_secs(7 * 86_400),
        }
    }
}

/// Pacing for bulk backfills.
#[derive(Debug, Clone, Copy)]
pub struct ThrottleConfig {
    /// Maximum requests in flight.
    pub max_in_flight: usize,
    /// Minimum spacing between request starts.
    pub min_spacing: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 2,
            min_spacing: Duration::from_millis(1_500),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Redis URL for the shared cache. In-process cache when unset.
    pub redis_url: Option<String>,
    /// Whether caching is enabled at all.
    pub cache_enabled: bool,
    /// CoinGecko API key (optional, switches to the pro endpoint).
    pub coingecko_api_key: Option<String>,
    /// OpenSea API key.
    pub opensea_api_key: Option<String>,
    /// Reservoir API key (optional, raises rate limits).
    pub reservoir_api_key: Option<String>,
    /// Provider base URLs.
    pub endpoints: ProviderEndpoints,
    /// Timeout applied to each adapter call.
    pub request_timeout: Duration,
    /// Cache TTLs.
    pub ttls: CacheTtls,
    /// Concurrent snapshot resolutions in `snapshots_many`.
    pub max_concurrency: usize,
    /// Backfill pacing.
    pub throttle: ThrottleConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redis_url: None,
            cache_enabled: true,
            coingecko_api_key: None,
            opensea_api_key: None,
            reservoir_api_key: None,
            endpoints: ProviderEndpoints::default(),
            request_timeout: Duration::from_millis(10_000),
            ttls: CacheTtls::default(),
            max_concurrency: 4,
            throttle: ThrottleConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let endpoints = ProviderEndpoints {
            defillama: env::var("DEFILLAMA_API_URL").unwrap_or(defaults.endpoints.defillama),
            coingecko: non_empty("COINGECKO_API_URL"),
            dexscreener: env::var("DEXSCREENER_API_URL")
                .unwrap_or(defaults.endpoints.dexscreener),
            opensea: env::var("OPENSEA_API_URL").unwrap_or(defaults.endpoints.opensea),
            reservoir: non_empty("RESERVOIR_API_URL"),
        };

        Self {
            redis_url: non_empty("REDIS_URL"),
            cache_enabled: env::var("CACHE_ENABLED")
                .ok()
                .map(|v| parse_bool(&v))
                .unwrap_or(defaults.cache_enabled),
            coingecko_api_key: non_empty("COINGECKO_API_KEY"),
            opensea_api_key: non_empty("OPENSEA_API_KEY"),
            reservoir_api_key: non_empty("RESERVOIR_API_KEY"),
            endpoints,
            request_timeout: env::var("REQUEST_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.request_timeout),
            ttls: CacheTtls {
                current: env::var("CURRENT_TTL_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.ttls.current),
                historical: env::var("HISTORICAL_TTL_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.ttls.historical),
                lookup: defaults.ttls.lookup,
            },
            max_concurrency: env::var("MAX_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.max_concurrency),
            throttle: ThrottleConfig {
                max_in_flight: env::var("BACKFILL_MAX_IN_FLIGHT")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .filter(|n: &usize| *n > 0)
                    .unwrap_or(defaults.throttle.max_in_flight),
                min_spacing: env::var("BACKFILL_SPACING_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.throttle.min_spacing),
            },
        }
    }

    /// Reject settings that would make every lookup fail.
    pub fn validate(&self) -> Result<()> {
        if let Some(ref url) = self.redis_url {
            if !REDIS_SCHEMES.iter().any(|scheme| url.starts_with(scheme)) {
                return Err(AppError::Config(format!("unsupported REDIS_URL: {}", url)));
            }
        }
        if self.request_timeout.is_zero() {
            return Err(AppError::Config(
                "REQUEST_TIMEOUT_MS must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

const REDIS_SCHEMES: [&str; 3] = ["redis://", "rediss://", "unix://"];

fn non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}
