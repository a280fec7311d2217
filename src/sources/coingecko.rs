use crate::config::CacheTtls;
use crate::services::cache::{get_json, set_json, CacheHandle};
use crate::sources::{fetch_json, http_client, PriceAdapter, SourceResult};
use crate::types::{AssetReference, CacheKey, CacheOp, FloorPoint, PriceSource};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, DurationRound, NaiveDate, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

const COINGECKO_API_URL: &str = "https://api.coingecko.com/api/v3";
const COINGECKO_PRO_API_URL: &str = "https://pro-api.coingecko.com/api/v3";

/// Furthest a 5-minute bucket may sit from the requested instant.
pub const MAX_INSTANT_DISTANCE_SECS: i64 = 30 * 60;

/// Depth of the NFT floor chart.
const NFT_CHART_DAYS: i64 = 30;

#[derive(Debug, Deserialize)]
struct SimplePriceQuote {
    usd: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct CoinHistory {
    market_data: Option<CoinHistoryMarketData>,
}

#[derive(Debug, Deserialize)]
struct CoinHistoryMarketData {
    current_price: HashMap<String, f64>,
}

#[derive(Debug, Deserialize)]
struct MarketChartRange {
    #[serde(default)]
    prices: Vec<[f64; 2]>,
}

#[derive(Debug, Deserialize)]
struct NftCollection {
    floor_price: Option<NftFloorPrice>,
}

#[derive(Debug, Deserialize)]
struct NftFloorPrice {
    native_currency: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct NftMarketChart {
    #[serde(default)]
    floor_price_native: Vec<[f64; 2]>,
}

/// CoinGecko REST client.
///
/// Coin-id assets: current price, daily history and a 5-minute series used
/// for sub-day lookups. NFT collections: current floor and a 30-day daily
/// floor chart.
#[derive(Clone)]
pub struct CoinGeckoClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    cache: CacheHandle,
    ttls: CacheTtls,
}

impl CoinGeckoClient {
    /// Create a new CoinGecko client.
    pub fn new(
        api_key: Option<String>,
        base_url: Option<String>,
        cache: CacheHandle,
        ttls: CacheTtls,
        timeout: Duration,
    ) -> Self {
        let base_url = base_url
            .unwrap_or_else(|| {
                if api_key.is_some() {
                    COINGECKO_PRO_API_URL.to_string()
                } else {
                    COINGECKO_API_URL.to_string()
                }
            })
            .trim_end_matches('/')
            .to_string();

        Self {
            client: http_client(timeout),
            api_key,
            base_url,
            cache,
            ttls,
        }
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        let request = self.client.get(format!("{}{}", self.base_url, path));
        match self.api_key {
            Some(ref key) => request.query(&[("x_cg_pro_api_key", key)]),
            None => request,
        }
    }

    async fn simple_price(&self, id: &str) -> SourceResult<Option<f64>> {
        let request = self
            .get("/simple/price")
            .query(&[("ids", id), ("vs_currencies", "usd")]);

        let quotes: Option<HashMap<String, SimplePriceQuote>> = fetch_json(request).await?;
        Ok(quotes.and_then(|q| q.get(id).and_then(|quote| quote.usd)))
    }

    async fn coin_history(&self, id: &str, date: NaiveDate) -> SourceResult<Option<f64>> {
        let date_param = date.format("%d-%m-%Y").to_string();
        let request = self
            .get(&format!("/coins/{}/history", id))
            .query(&[("date", date_param.as_str()), ("localization", "false")]);

        let history: Option<CoinHistory> = fetch_json(request).await?;
        Ok(history
            .and_then(|h| h.market_data)
            .and_then(|m| m.current_price.get("usd").copied()))
    }

    /// 5-minute series for the hour containing `instant`, padded by the
    /// search distance on both sides. Instants in the same hour share one
    /// request.
    async fn five_minute_window(
        &self,
        asset: &AssetReference,
        id: &str,
        instant: DateTime<Utc>,
    ) -> SourceResult<Vec<[f64; 2]>> {
        let hour = instant
            .duration_trunc(ChronoDuration::hours(1))
            .unwrap_or(instant);
        let key = CacheKey::new(CacheOp::CoinRange, asset)
            .at(hour)
            .interval("5m");

        if let Some(points) = get_json::<Vec<[f64; 2]>>(self.cache.as_ref(), &key).await {
            debug!("CoinGecko 5m window cache hit: {}", key);
            return Ok(points);
        }

        let now = Utc::now();
        let from = hour - ChronoDuration::seconds(MAX_INSTANT_DISTANCE_SECS);
        let to = (hour + ChronoDuration::hours(1) + ChronoDuration::seconds(MAX_INSTANT_DISTANCE_SECS))
            .min(now);
        if to <= from {
            return Ok(Vec::new());
        }

        let request = self
            .get(&format!("/coins/{}/market_chart/range", id))
            .query(&[
                ("vs_currency", "usd".to_string()),
                ("from", from.timestamp().to_string()),
                ("to", to.timestamp().to_string()),
            ]);

        let chart: Option<MarketChartRange> = fetch_json(request).await?;
        let points = chart.map(|c| c.prices).unwrap_or_default();

        if points.is_empty() {
            return Ok(points);
        }

        // A window still open may gain points; only settled windows get the long TTL.
        let ttl = if to < now - ChronoDuration::hours(1) {
            self.ttls.historical
        } else {
            self.ttls.current
        };
        set_json(self.cache.as_ref(), &key, &points, ttl).await;

        Ok(points)
    }

    /// Daily floor chart for an NFT collection, lowest floor per day.
    async fn nft_daily_floors(&self, asset: &AssetReference) -> SourceResult<Vec<FloorPoint>> {
        let AssetReference::NftCollection { chain, address } = asset else {
            return Ok(Vec::new());
        };

        let key = CacheKey::new(CacheOp::NftDaily, asset).interval("30d");
        if let Some(points) = get_json::<Vec<FloorPoint>>(self.cache.as_ref(), &key).await {
            return Ok(points);
        }

        let days = NFT_CHART_DAYS.to_string();
        let request = self
            .get(&format!(
                "/nfts/{}/contract/{}/market_chart",
                chain.coingecko_platform(),
                address
            ))
            .query(&[("days", days.as_str())]);

        let chart: Option<NftMarketChart> = fetch_json(request).await?;
        let points = crate::types::normalize_floor_series(
            chart
                .map(|c| c.floor_price_native)
                .unwrap_or_default()
                .into_iter()
                .filter_map(|[ms, floor]| {
                    let date = Utc.timestamp_millis_opt(ms as i64).single()?.date_naive();
                    Some(FloorPoint { date, floor })
                })
                .collect(),
        );

        if !points.is_empty() {
            set_json(self.cache.as_ref(), &key, &points, self.ttls.current).await;
        }
        Ok(points)
    }
}

/// Price of the point nearest `instant`, if one lies within
/// [`MAX_INSTANT_DISTANCE_SECS`].
pub fn nearest_price(points: &[[f64; 2]], instant: DateTime<Utc>) -> Option<f64> {
    let target_ms = instant.timestamp_millis() as f64;
    let max_distance_ms = (MAX_INSTANT_DISTANCE_SECS * 1000) as f64;

    points
        .iter()
        .map(|[ts, price]| ((ts - target_ms).abs(), *price))
        .filter(|(distance, _)| *distance <= max_distance_ms)
        .min_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, price)| price)
}

#[async_trait]
impl PriceAdapter for CoinGeckoClient {
    fn source(&self) -> PriceSource {
        PriceSource::CoinGecko
    }

    async fn current_price(&self, asset: &AssetReference) -> SourceResult<Option<f64>> {
        match asset {
            AssetReference::Coin { provider_id } => {
                self.simple_price(&provider_id.to_ascii_lowercase()).await
            }
            AssetReference::NftCollection { chain, address } => {
                let path = format!("/nfts/{}/contract/{}", chain.coingecko_platform(), address);
                let collection: Option<NftCollection> = fetch_json(self.get(&path)).await?;
                Ok(collection
                    .and_then(|c| c.floor_price)
                    .and_then(|f| f.native_currency))
            }
            AssetReference::Contract { .. } => Ok(None),
        }
    }

    async fn price_at_date(
        &self,
        asset: &AssetReference,
        date: NaiveDate,
    ) -> SourceResult<Option<f64>> {
        match asset {
            AssetReference::Coin { provider_id } => {
                self.coin_history(&provider_id.to_ascii_lowercase(), date)
                    .await
            }
            AssetReference::NftCollection { .. } => {
                let oldest = Utc::now().date_naive() - ChronoDuration::days(NFT_CHART_DAYS);
                if date < oldest {
                    return Ok(None);
                }
                let points = self.nft_daily_floors(asset).await?;
                Ok(points.iter().find(|p| p.date == date).map(|p| p.floor))
            }
            AssetReference::Contract { .. } => Ok(None),
        }
    }

    async fn price_at_instant(
        &self,
        asset: &AssetReference,
        instant: DateTime<Utc>,
    ) -> SourceResult<Option<f64>> {
        let AssetReference::Coin { provider_id } = asset else {
            return Ok(None);
        };

        let id = provider_id.to_ascii_lowercase();
        let points = self.five_minute_window(asset, &id, instant).await?;
        let price = nearest_price(&points, instant);
        debug!(
            "CoinGecko {} at {}: {} points, nearest {:?}",
            id,
            instant,
            points.len(),
            price
        );
        Ok(price)
    }

    async fn floor_series(
        &self,
        asset: &AssetReference,
        from: NaiveDate,
        to: NaiveDate,
    ) -> SourceResult<Vec<FloorPoint>> {
        if !matches!(asset, AssetReference::NftCollection { .. }) {
            return Err(crate::sources::SourceError::Unsupported);
        }
        let points = self.nft_daily_floors(asset).await?;
        Ok(points
            .into_iter()
            .filter(|p| p.date >= from && p.date <= to)
            .collect())
    }
}
