use crate::config::CacheTtls;
use crate::services::cache::{get_json, set_json, CacheHandle};
use crate::sources::{
    fetch_json, http_client, parse_number, start_of_day, PriceAdapter, SourceResult,
};
use crate::types::{is_valid_price, AssetReference, CacheKey, CacheOp, Chain, PriceSource};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Page size for the sales-event query.
const SALES_PAGE_LIMIT: &str = "50";

#[derive(Debug, Deserialize)]
struct ContractResponse {
    collection: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatsResponse {
    total: Option<StatsTotal>,
}

#[derive(Debug, Deserialize)]
struct StatsTotal {
    floor_price: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct EventsResponse {
    #[serde(default)]
    asset_events: Vec<AssetEvent>,
}

#[derive(Debug, Deserialize)]
struct AssetEvent {
    payment: Option<Payment>,
}

/// Every field may be missing on odd events; those sales are skipped.
#[derive(Debug, Deserialize)]
struct Payment {
    /// Integer amount in the token's smallest unit.
    #[serde(default)]
    quantity: serde_json::Value,
    decimals: Option<u32>,
    symbol: Option<String>,
}

/// OpenSea client: current collection floor and, for past dates, the lowest
/// native-currency sale of the day.
#[derive(Clone)]
pub struct OpenSeaClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    cache: CacheHandle,
    ttls: CacheTtls,
}

impl OpenSeaClient {
    /// Create a new OpenSea client.
    pub fn new(
        api_key: Option<String>,
        base_url: impl Into<String>,
        cache: CacheHandle,
        ttls: CacheTtls,
        timeout: Duration,
    ) -> Self {
        Self {
            client: http_client(timeout),
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            cache,
            ttls,
        }
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        let request = self.client.get(format!("{}{}", self.base_url, path));
        match self.api_key {
            Some(ref key) => request.header("x-api-key", key),
            None => request,
        }
    }

    /// Collection slug for a contract. Slugs never change, so they are
    /// cached with the lookup TTL.
    async fn collection_slug(&self, asset: &AssetReference) -> SourceResult<Option<String>> {
        let AssetReference::NftCollection { chain, address } = asset else {
            return Ok(None);
        };

        let key = CacheKey::new(CacheOp::NftSlug, asset);
        if let Some(slug) = get_json::<String>(self.cache.as_ref(), &key).await {
            return Ok(Some(slug));
        }

        let path = format!(
            "/api/v2/chain/{}/contract/{}",
            chain.opensea_slug(),
            address
        );
        let response: Option<ContractResponse> = fetch_json(self.get(&path)).await?;
        let slug = response
            .and_then(|r| r.collection)
            .filter(|s| !s.is_empty());

        if let Some(ref slug) = slug {
            debug!("OpenSea slug for {}: {}", asset, slug);
            set_json(self.cache.as_ref(), &key, slug, self.ttls.lookup).await;
        }
        Ok(slug)
    }
}

/// Symbols counted as the chain's native currency when reading sales.
fn native_symbols(chain: Chain) -> &'static [&'static str] {
    match chain {
        Chain::Polygon => &["POL", "MATIC", "WPOL", "WMATIC"],
        Chain::Bsc => &["BNB", "WBNB"],
        Chain::Avalanche => &["AVAX", "WAVAX"],
        Chain::Solana => &["SOL", "WSOL"],
        _ => &["ETH", "WETH"],
    }
}

/// Lowest native-currency sale price among `events`.
fn min_native_sale(events: &[AssetEvent], chain: Chain) -> Option<f64> {
    let natives = native_symbols(chain);
    events
        .iter()
        .filter_map(|e| e.payment.as_ref())
        .filter_map(|p| {
            let symbol = p.symbol.as_deref()?;
            if !natives.iter().any(|s| symbol.eq_ignore_ascii_case(s)) {
                return None;
            }
            let raw = parse_number(&p.quantity)?;
            Some(raw / 10f64.powi(p.decimals? as i32))
        })
        .filter(|price| is_valid_price(*price))
        .reduce(f64::min)
}

#[async_trait]
impl PriceAdapter for OpenSeaClient {
    fn source(&self) -> PriceSource {
        PriceSource::OpenSea
    }

    async fn current_price(&self, asset: &AssetReference) -> SourceResult<Option<f64>> {
        let Some(slug) = self.collection_slug(asset).await? else {
            return Ok(None);
        };

        let path = format!("/api/v2/collections/{}/stats", slug);
        let stats: Option<StatsResponse> = fetch_json(self.get(&path)).await?;
        Ok(stats
            .and_then(|s| s.total)
            .and_then(|t| t.floor_price)
            .as_ref()
            .and_then(parse_number))
    }

    async fn price_at_date(
        &self,
        asset: &AssetReference,
        date: NaiveDate,
    ) -> SourceResult<Option<f64>> {
        let AssetReference::NftCollection { chain, .. } = asset else {
            return Ok(None);
        };
        let Some(slug) = self.collection_slug(asset).await? else {
            return Ok(None);
        };

        let after = start_of_day(date).timestamp();
        let before = (start_of_day(date) + ChronoDuration::days(1)).timestamp();
        let path = format!("/api/v2/events/collection/{}", slug);
        let request = self.get(&path).query(&[
            ("event_type", "sale".to_string()),
            ("after", after.to_string()),
            ("before", before.to_string()),
            ("limit", SALES_PAGE_LIMIT.to_string()),
        ]);

        let events: Option<EventsResponse> = fetch_json(request).await?;
        let events = events.map(|e| e.asset_events).unwrap_or_default();
        let price = min_native_sale(&events, *chain);
        debug!(
            "OpenSea {} sales on {}: {} events, min {:?}",
            slug,
            date,
            events.len(),
            price
        );
        Ok(price)
    }
}
