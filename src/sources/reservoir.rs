use crate::sources::{
    fetch_json, http_client, parse_number, start_of_day, PriceAdapter, SourceResult,
};
use crate::types::{is_valid_price, AssetReference, Chain, FloorPoint, PriceSource};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct CollectionsResponse {
    #[serde(default)]
    collections: Vec<Collection>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Collection {
    floor_ask: Option<FloorAsk>,
}

#[derive(Debug, Deserialize)]
struct FloorAsk {
    price: Option<FloorAskPrice>,
}

#[derive(Debug, Deserialize)]
struct FloorAskPrice {
    amount: Option<FloorAskAmount>,
}

#[derive(Debug, Deserialize)]
struct FloorAskAmount {
    native: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct DailyVolumesResponse {
    #[serde(default)]
    collections: Vec<DailyVolume>,
}

#[derive(Debug, Deserialize)]
struct DailyVolume {
    /// Unix seconds at the start of the day.
    timestamp: i64,
    floor_sell_value: Option<serde_json::Value>,
}

/// Reservoir NFT client: current floor ask and daily floor history.
#[derive(Clone)]
pub struct ReservoirClient {
    client: Client,
    api_key: Option<String>,
    /// Replaces the per-chain host when set.
    base_override: Option<String>,
}

impl ReservoirClient {
    /// Create a new Reservoir client.
    pub fn new(api_key: Option<String>, base_override: Option<String>, timeout: Duration) -> Self {
        Self {
            client: http_client(timeout),
            api_key,
            base_override: base_override.map(|b| b.trim_end_matches('/').to_string()),
        }
    }

    fn host(&self, chain: Chain) -> Option<String> {
        match self.base_override {
            Some(ref base) => Some(base.clone()),
            None => chain.reservoir_host().map(str::to_string),
        }
    }

    fn get(&self, host: &str, path: &str) -> reqwest::RequestBuilder {
        let request = self.client.get(format!("{}{}", host, path));
        match self.api_key {
            Some(ref key) => request.header("x-api-key", key),
            None => request,
        }
    }

    /// Daily floors for the days starting in `[from, to]`.
    async fn daily_floors(
        &self,
        chain: Chain,
        address: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> SourceResult<Vec<FloorPoint>> {
        let Some(host) = self.host(chain) else {
            return Ok(Vec::new());
        };

        let start = start_of_day(from).timestamp();
        let end = (start_of_day(to) + ChronoDuration::days(1)).timestamp() - 1;
        let request = self
            .get(&host, "/collections/daily-volumes/v1")
            .query(&[
                ("id", address.to_string()),
                ("startTimestamp", start.to_string()),
                ("endTimestamp", end.to_string()),
            ]);

        let response: Option<DailyVolumesResponse> = fetch_json(request).await?;
        let points: Vec<FloorPoint> = response
            .map(|r| r.collections)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|day| {
                let floor = day.floor_sell_value.as_ref().and_then(parse_number)?;
                let date = Utc.timestamp_opt(day.timestamp, 0).single()?.date_naive();
                Some(FloorPoint { date, floor })
            })
            .collect();

        debug!(
            "Reservoir daily floors for {} on {} ({}..{}): {} days",
            address,
            chain,
            from,
            to,
            points.len()
        );
        Ok(points)
    }
}

#[async_trait]
impl PriceAdapter for ReservoirClient {
    fn source(&self) -> PriceSource {
        PriceSource::Reservoir
    }

    async fn current_price(&self, asset: &AssetReference) -> SourceResult<Option<f64>> {
        let AssetReference::NftCollection { chain, address } = asset else {
            return Ok(None);
        };
        let Some(host) = self.host(*chain) else {
            return Ok(None);
        };

        let request = self
            .get(&host, "/collections/v7")
            .query(&[("id", address.as_str())]);
        let response: Option<CollectionsResponse> = fetch_json(request).await?;

        Ok(response
            .and_then(|r| r.collections.into_iter().next())
            .and_then(|c| c.floor_ask)
            .and_then(|f| f.price)
            .and_then(|p| p.amount)
            .and_then(|a| a.native)
            .as_ref()
            .and_then(parse_number))
    }

    async fn price_at_date(
        &self,
        asset: &AssetReference,
        date: NaiveDate,
    ) -> SourceResult<Option<f64>> {
        let AssetReference::NftCollection { chain, address } = asset else {
            return Ok(None);
        };

        let points = self.daily_floors(*chain, address, date, date).await?;
        Ok(points
            .iter()
            .filter(|p| p.date == date)
            .map(|p| p.floor)
            .filter(|floor| is_valid_price(*floor))
            .reduce(f64::min))
    }

    async fn floor_series(
        &self,
        asset: &AssetReference,
        from: NaiveDate,
        to: NaiveDate,
    ) -> SourceResult<Vec<FloorPoint>> {
        let AssetReference::NftCollection { chain, address } = asset else {
            return Ok(Vec::new());
        };
        self.daily_floors(*chain, address, from, to).await
    }
}
