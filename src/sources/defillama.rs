use crate::sources::{fetch_json, http_client, start_of_day, PriceAdapter, SourceResult};
use crate::types::{AssetReference, PriceSource};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// How far from the requested time DefiLlama may look for a quote.
const CURRENT_SEARCH_WIDTH: &str = "4h";
const INSTANT_SEARCH_WIDTH: &str = "4h";
const DATE_SEARCH_WIDTH: &str = "12h";

#[derive(Debug, Deserialize)]
struct LlamaPricesResponse {
    #[serde(default)]
    coins: HashMap<String, LlamaCoin>,
}

#[derive(Debug, Deserialize)]
struct LlamaCoin {
    price: Option<f64>,
}

/// DefiLlama coins API client.
///
/// Prices contract tokens on most chains (`{chain}:{address}`) and coin-id
/// assets through the `coingecko:{id}` composite key, both current and at
/// any past unix timestamp.
#[derive(Clone)]
pub struct DefiLlamaClient {
    client: Client,
    base_url: String,
}

impl DefiLlamaClient {
    /// Create a new DefiLlama client.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: http_client(timeout),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// DefiLlama coin key for an asset; NFT collections have none.
    pub fn coin_key(asset: &AssetReference) -> Option<String> {
        match asset {
            AssetReference::Contract { chain, address } => {
                Some(format!("{}:{}", chain.defillama_slug(), address))
            }
            AssetReference::Coin { provider_id } => {
                Some(format!("coingecko:{}", provider_id.to_ascii_lowercase()))
            }
            AssetReference::NftCollection { .. } => None,
        }
    }

    async fn fetch(&self, path: &str, coin: &str, search_width: &str) -> SourceResult<Option<f64>> {
        let url = format!("{}{}/{}", self.base_url, path, coin);
        let request = self
            .client
            .get(&url)
            .query(&[("searchWidth", search_width)]);

        let Some(response) = fetch_json::<LlamaPricesResponse>(request).await? else {
            return Ok(None);
        };

        // Keys come back normalized by DefiLlama, so match case-insensitively.
        let price = response
            .coins
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(coin))
            .and_then(|(_, c)| c.price);

        debug!("DefiLlama {} -> {:?}", coin, price);
        Ok(price)
    }
}

#[async_trait]
impl PriceAdapter for DefiLlamaClient {
    fn source(&self) -> PriceSource {
        PriceSource::DefiLlama
    }

    async fn current_price(&self, asset: &AssetReference) -> SourceResult<Option<f64>> {
        let Some(coin) = Self::coin_key(asset) else {
            return Ok(None);
        };
        self.fetch("/prices/current", &coin, CURRENT_SEARCH_WIDTH)
            .await
    }

    async fn price_at_date(
        &self,
        asset: &AssetReference,
        date: NaiveDate,
    ) -> SourceResult<Option<f64>> {
        let Some(coin) = Self::coin_key(asset) else {
            return Ok(None);
        };
        let path = format!("/prices/historical/{}", start_of_day(date).timestamp());
        self.fetch(&path, &coin, DATE_SEARCH_WIDTH).await
    }

    async fn price_at_instant(
        &self,
        asset: &AssetReference,
        instant: DateTime<Utc>,
    ) -> SourceResult<Option<f64>> {
        let Some(coin) = Self::coin_key(asset) else {
            return Ok(None);
        };
        let path = format!("/prices/historical/{}", instant.timestamp());
        self.fetch(&path, &coin, INSTANT_SEARCH_WIDTH).await
    }
}
