//! Price provider adapters.
//!
//! Adapters report raw numbers or a [`SourceError`]. Nothing outside this
//! module calls them directly: [`lookup`] and [`lookup_series`] apply the
//! timeout, log failures and turn them into absence, and drop values that
//! are not valid prices.

pub mod coingecko;
pub mod defillama;
pub mod dexscreener;
pub mod opensea;
pub mod reservoir;

pub use coingecko::CoinGeckoClient;
pub use defillama::DefiLlamaClient;
pub use dexscreener::DexScreenerClient;
pub use opensea::OpenSeaClient;
pub use reservoir::ReservoirClient;

use crate::types::{
    is_valid_price, normalize_floor_series, AssetReference, FloorPoint, PricePoint, PriceSource,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

const USER_AGENT: &str = "calltrack/0.1 (signal performance tracker)";

/// Failure inside a single adapter call.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("operation not supported by this source")]
    Unsupported,

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(reqwest::StatusCode),

    #[error("malformed payload: {0}")]
    Decode(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// A single external price provider.
///
/// `Ok(None)` means the provider has no data. Capabilities a provider lacks
/// keep the default `Unsupported` implementation.
#[async_trait]
pub trait PriceAdapter: Send + Sync {
    fn source(&self) -> PriceSource;

    /// Current price (or floor, for NFT collections).
    async fn current_price(&self, _asset: &AssetReference) -> SourceResult<Option<f64>> {
        Err(SourceError::Unsupported)
    }

    /// Price for a UTC calendar day.
    async fn price_at_date(
        &self,
        _asset: &AssetReference,
        _date: NaiveDate,
    ) -> SourceResult<Option<f64>> {
        Err(SourceError::Unsupported)
    }

    /// Price near an exact instant.
    async fn price_at_instant(
        &self,
        _asset: &AssetReference,
        _instant: DateTime<Utc>,
    ) -> SourceResult<Option<f64>> {
        Err(SourceError::Unsupported)
    }

    /// Daily floor series between two dates, inclusive.
    async fn floor_series(
        &self,
        _asset: &AssetReference,
        _from: NaiveDate,
        _to: NaiveDate,
    ) -> SourceResult<Vec<FloorPoint>> {
        Err(SourceError::Unsupported)
    }
}

/// What to ask an adapter for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    Current,
    AtDate(NaiveDate),
    AtInstant(DateTime<Utc>),
}

/// Ask one adapter, converting every failure into absence.
pub async fn lookup(
    adapter: &dyn PriceAdapter,
    asset: &AssetReference,
    query: Query,
    timeout: Duration,
) -> Option<PricePoint> {
    let source = adapter.source();
    let call = async {
        match query {
            Query::Current => adapter.current_price(asset).await,
            Query::AtDate(date) => adapter.price_at_date(asset, date).await,
            Query::AtInstant(instant) => adapter.price_at_instant(asset, instant).await,
        }
    };

    let result = match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(SourceError::Timeout(timeout)),
    };

    match result {
        Ok(Some(value)) if is_valid_price(value) => {
            let as_of = match query {
                Query::Current => Utc::now(),
                Query::AtDate(date) => start_of_day(date),
                Query::AtInstant(instant) => instant,
            };
            PricePoint::new(value, as_of, source)
        }
        Ok(Some(value)) => {
            warn!(
                "{} returned invalid price {} for {} ({:?}); ignoring",
                source, value, asset, query
            );
            None
        }
        Ok(None) => {
            debug!("{} has no price for {} ({:?})", source, asset, query);
            None
        }
        Err(SourceError::Unsupported) => None,
        Err(e) => {
            warn!("{} lookup for {} ({:?}) failed: {}", source, asset, query, e);
            None
        }
    }
}

/// Ask one adapter for a floor series, converting failures into an empty one.
pub async fn lookup_series(
    adapter: &dyn PriceAdapter,
    asset: &AssetReference,
    from: NaiveDate,
    to: NaiveDate,
    timeout: Duration,
) -> Vec<FloorPoint> {
    let source = adapter.source();
    let result = match tokio::time::timeout(timeout, adapter.floor_series(asset, from, to)).await
    {
        Ok(result) => result,
        Err(_) => Err(SourceError::Timeout(timeout)),
    };

    match result {
        Ok(points) => normalize_floor_series(points)
            .into_iter()
            .filter(|p| p.date >= from && p.date <= to)
            .collect(),
        Err(SourceError::Unsupported) => Vec::new(),
        Err(e) => {
            warn!("{} floor series for {} failed: {}", source, asset, e);
            Vec::new()
        }
    }
}

/// Midnight UTC at the start of `date`.
pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::default()).and_utc()
}

/// Build the HTTP client every adapter uses.
pub(crate) fn http_client(timeout: Duration) -> Client {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Fail on non-success statuses; 404 means "no data" and yields `None`.
pub(crate) async fn fetch_json<T: serde::de::DeserializeOwned>(
    request: reqwest::RequestBuilder,
) -> SourceResult<Option<T>> {
    let response = request.header("Accept", "application/json").send().await?;
    let status = response.status();

    if status == reqwest::StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if !status.is_success() {
        return Err(SourceError::Status(status));
    }

    let body = response.bytes().await?;
    serde_json::from_slice(&body)
        .map(Some)
        .map_err(|e| SourceError::Decode(e.to_string()))
}

/// Parse a JSON number that some APIs send as a string.
pub(crate) fn parse_number(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
