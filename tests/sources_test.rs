//! Tests for the provider adapters against mock HTTP servers

use calltrack::config::{CacheTtls, Config, ProviderEndpoints};
use calltrack::services::{CacheHandle, MemoryCache, PriceService};
use calltrack::sources::{
    lookup, lookup_series, start_of_day, CoinGeckoClient, DefiLlamaClient, DexScreenerClient,
    OpenSeaClient, PriceAdapter, Query, ReservoirClient, SourceError,
};
use calltrack::types::*;
use chrono::{Duration as ChronoDuration, NaiveDate, TimeZone, Utc};
use httpmock::prelude::*;
use serde_json::json;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(5);

fn cache() -> CacheHandle {
    MemoryCache::new()
}

fn may_17() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, 17).unwrap()
}

#[tokio::test]
async fn test_defillama_current_contract_price() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/prices/current/ethereum:0xAbC")
                .query_param("searchWidth", "4h");
            then.status(200).json_body(json!({
                "coins": {
                    "ethereum:0xabc": {
                        "decimals": 18,
                        "symbol": "TKN",
                        "price": 1.23,
                        "timestamp": 1715904000,
                        "confidence": 0.99
                    }
                }
            }));
        })
        .await;

    let client = DefiLlamaClient::new(server.base_url(), TIMEOUT);
    let asset = AssetReference::contract(Chain::Ethereum, "0xAbC");
    let point = lookup(&client, &asset, Query::Current, TIMEOUT).await.unwrap();

    mock.assert_async().await;
    assert_eq!(point.value(), 1.23);
    assert_eq!(point.source, PriceSource::DefiLlama);
}

#[tokio::test]
async fn test_defillama_coin_price_at_date() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/prices/historical/1715904000/coingecko:bitcoin")
                .query_param("searchWidth", "12h");
            then.status(200).json_body(json!({
                "coins": { "coingecko:bitcoin": { "price": 65000.5 } }
            }));
        })
        .await;

    let client = DefiLlamaClient::new(server.base_url(), TIMEOUT);
    let price = client
        .price_at_date(&AssetReference::coin("bitcoin"), may_17())
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(price, Some(65000.5));
}

#[tokio::test]
async fn test_defillama_unknown_coin_is_absent() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/prices/current/base:0xnew");
            then.status(200).json_body(json!({ "coins": {} }));
        })
        .await;

    let client = DefiLlamaClient::new(server.base_url(), TIMEOUT);
    let asset = AssetReference::contract(Chain::Base, "0xnew");
    assert_eq!(client.current_price(&asset).await.unwrap(), None);
}

#[tokio::test]
async fn test_server_error_is_absence_at_the_boundary() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/prices/current/ethereum:0x1");
            then.status(502).body("bad gateway");
        })
        .await;

    let client = DefiLlamaClient::new(server.base_url(), TIMEOUT);
    let asset = AssetReference::contract(Chain::Ethereum, "0x1");

    assert!(matches!(
        client.current_price(&asset).await,
        Err(SourceError::Status(status)) if status.as_u16() == 502
    ));
    assert!(lookup(&client, &asset, Query::Current, TIMEOUT).await.is_none());
}

#[tokio::test]
async fn test_malformed_payload_is_absence_at_the_boundary() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/prices/current/ethereum:0x1");
            then.status(200).body("<html>rate limited</html>");
        })
        .await;

    let client = DefiLlamaClient::new(server.base_url(), TIMEOUT);
    let asset = AssetReference::contract(Chain::Ethereum, "0x1");

    assert!(matches!(
        client.current_price(&asset).await,
        Err(SourceError::Decode(_))
    ));
    assert!(lookup(&client, &asset, Query::Current, TIMEOUT).await.is_none());
}

#[tokio::test]
async fn test_dexscreener_picks_most_liquid_pair() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/latest/dex/tokens/0xMeme");
            then.status(200).json_body(json!({
                "schemaVersion": "1.0.0",
                "pairs": [
                    {
                        "chainId": "base",
                        "baseToken": { "address": "0xmeme" },
                        "priceUsd": "0.0041",
                        "liquidity": { "usd": 12000.0 }
                    },
                    {
                        "chainId": "base",
                        "baseToken": { "address": "0xMEME" },
                        "priceUsd": "0.0040",
                        "liquidity": { "usd": 250000.0 }
                    },
                    {
                        "chainId": "solana",
                        "baseToken": { "address": "0xmeme" },
                        "priceUsd": "9.0",
                        "liquidity": { "usd": 9000000.0 }
                    }
                ]
            }));
        })
        .await;

    let client = DexScreenerClient::new(server.base_url(), TIMEOUT);
    let asset = AssetReference::contract(Chain::Base, "0xMeme");
    assert_eq!(client.current_price(&asset).await.unwrap(), Some(0.0040));
}

#[tokio::test]
async fn test_dexscreener_without_pairs_is_absent() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/latest/dex/tokens/0xnone");
            then.status(200).json_body(json!({ "pairs": null }));
        })
        .await;

    let client = DexScreenerClient::new(server.base_url(), TIMEOUT);
    let asset = AssetReference::contract(Chain::Ethereum, "0xnone");
    assert_eq!(client.current_price(&asset).await.unwrap(), None);
    // Only contract tokens are priced.
    assert_eq!(
        client.current_price(&AssetReference::coin("bitcoin")).await.unwrap(),
        None
    );
}

#[tokio::test]
async fn test_coingecko_simple_price_and_history() {
    let server = MockServer::start_async().await;
    let simple = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/simple/price")
                .query_param("ids", "bitcoin")
                .query_param("vs_currencies", "usd");
            then.status(200)
                .json_body(json!({ "bitcoin": { "usd": 67000.0 } }));
        })
        .await;
    let history = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/coins/bitcoin/history")
                .query_param("date", "17-05-2024");
            then.status(200).json_body(json!({
                "id": "bitcoin",
                "market_data": { "current_price": { "usd": 65100.0, "eur": 60000.0 } }
            }));
        })
        .await;

    let client = CoinGeckoClient::new(
        None,
        Some(server.base_url()),
        cache(),
        CacheTtls::default(),
        TIMEOUT,
    );
    let asset = AssetReference::coin("Bitcoin");

    assert_eq!(client.current_price(&asset).await.unwrap(), Some(67000.0));
    assert_eq!(
        client.price_at_date(&asset, may_17()).await.unwrap(),
        Some(65100.0)
    );
    simple.assert_async().await;
    history.assert_async().await;
}

#[tokio::test]
async fn test_coingecko_instant_uses_nearest_bucket_and_caches_window() {
    let server = MockServer::start_async().await;
    let at = |h: u32, m: u32| Utc.with_ymd_and_hms(2024, 5, 17, h, m, 0).unwrap();
    let ms = |h: u32, m: u32| at(h, m).timestamp_millis();

    let range = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/coins/ethereum/market_chart/range")
                .query_param("vs_currency", "usd")
                .query_param("from", at(9, 30).timestamp().to_string())
                .query_param("to", at(11, 30).timestamp().to_string());
            then.status(200).json_body(json!({
                "prices": [
                    [ms(10, 15), 3000.0],
                    [ms(10, 20), 3010.0],
                    [ms(10, 45), 3050.0]
                ]
            }));
        })
        .await;

    let client = CoinGeckoClient::new(
        None,
        Some(server.base_url()),
        cache(),
        CacheTtls::default(),
        TIMEOUT,
    );
    let asset = AssetReference::coin("ethereum");

    assert_eq!(
        client.price_at_instant(&asset, at(10, 21)).await.unwrap(),
        Some(3010.0)
    );
    assert_eq!(
        client.price_at_instant(&asset, at(10, 40)).await.unwrap(),
        Some(3050.0)
    );
    range.assert_hits_async(1).await;
}

#[tokio::test]
async fn test_coingecko_instant_without_nearby_point_is_absent() {
    let server = MockServer::start_async().await;
    let instant = Utc.with_ymd_and_hms(2024, 5, 17, 10, 0, 0).unwrap();
    server
        .mock_async(|when, then| {
            when.method(GET).path("/coins/solana/market_chart/range");
            then.status(200).json_body(json!({
                "prices": [[(instant - ChronoDuration::minutes(31)).timestamp_millis(), 150.0]]
            }));
        })
        .await;

    let client = CoinGeckoClient::new(
        None,
        Some(server.base_url()),
        cache(),
        CacheTtls::default(),
        TIMEOUT,
    );
    let asset = AssetReference::coin("solana");
    assert_eq!(client.price_at_instant(&asset, instant).await.unwrap(), None);
}

#[tokio::test]
async fn test_coingecko_empty_series_are_not_cached() {
    let server = MockServer::start_async().await;
    let range = server
        .mock_async(|when, then| {
            when.method(GET).path("/coins/dogecoin/market_chart/range");
            then.status(200).json_body(json!({ "prices": [] }));
        })
        .await;
    let chart = server
        .mock_async(|when, then| {
            when.method(GET).path("/nfts/ethereum/contract/0xempty/market_chart");
            then.status(200).json_body(json!({ "floor_price_native": [] }));
        })
        .await;

    let client = CoinGeckoClient::new(
        None,
        Some(server.base_url()),
        cache(),
        CacheTtls::default(),
        TIMEOUT,
    );
    let coin = AssetReference::coin("dogecoin");
    let collection = AssetReference::nft(Chain::Ethereum, "0xempty");
    let instant = Utc.with_ymd_and_hms(2024, 5, 17, 10, 5, 0).unwrap();
    let today = Utc::now().date_naive();

    for _ in 0..2 {
        assert_eq!(client.price_at_instant(&coin, instant).await.unwrap(), None);
        assert_eq!(client.price_at_date(&collection, today).await.unwrap(), None);
    }
    range.assert_hits_async(2).await;
    chart.assert_hits_async(2).await;
}

#[tokio::test]
async fn test_coingecko_nft_floor_current_date_and_series() {
    let server = MockServer::start_async().await;
    let today = Utc::now().date_naive();
    let day_ms = |d: NaiveDate| start_of_day(d).timestamp_millis();
    let three_days_ago = today - ChronoDuration::days(3);
    let two_days_ago = today - ChronoDuration::days(2);

    server
        .mock_async(|when, then| {
            when.method(GET).path("/nfts/arbitrum-one/contract/0xbeef");
            then.status(200).json_body(json!({
                "id": "some-collection",
                "floor_price": { "native_currency": 0.42, "usd": 1400.0 }
            }));
        })
        .await;
    let chart = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/nfts/arbitrum-one/contract/0xbeef/market_chart")
                .query_param("days", "30");
            then.status(200).json_body(json!({
                "floor_price_usd": [],
                "floor_price_native": [
                    [day_ms(three_days_ago), 0.40],
                    [day_ms(three_days_ago) + 3_600_000, 0.38],
                    [day_ms(two_days_ago), 0.41]
                ]
            }));
        })
        .await;

    let client = CoinGeckoClient::new(
        None,
        Some(server.base_url()),
        cache(),
        CacheTtls::default(),
        TIMEOUT,
    );
    let asset = AssetReference::nft(Chain::Arbitrum, "0xbeef");

    assert_eq!(client.current_price(&asset).await.unwrap(), Some(0.42));
    assert_eq!(
        client.price_at_date(&asset, three_days_ago).await.unwrap(),
        Some(0.38)
    );

    let series = lookup_series(&client, &asset, three_days_ago, today, TIMEOUT).await;
    assert_eq!(
        series,
        vec![
            FloorPoint { date: three_days_ago, floor: 0.38 },
            FloorPoint { date: two_days_ago, floor: 0.41 },
        ]
    );
    // Dates beyond the chart depth are not requested.
    assert_eq!(
        client
            .price_at_date(&asset, today - ChronoDuration::days(90))
            .await
            .unwrap(),
        None
    );
    chart.assert_hits_async(1).await;
}

#[tokio::test]
async fn test_reservoir_floor_ask_and_daily_floors() {
    let server = MockServer::start_async().await;
    let floor = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/collections/v7")
                .query_param("id", "0xbeef")
                .header("x-api-key", "reservoir-key");
            then.status(200).json_body(json!({
                "collections": [{
                    "id": "0xbeef",
                    "floorAsk": { "price": { "amount": { "raw": "3100000000000000000", "native": 3.1 } } }
                }]
            }));
        })
        .await;
    let daily = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/collections/daily-volumes/v1")
                .query_param("id", "0xbeef")
                .query_param("startTimestamp", "1715904000")
                .query_param("endTimestamp", "1715990399");
            then.status(200).json_body(json!({
                "collections": [
                    { "id": "0xbeef", "timestamp": 1715904000, "volume": 12.0, "floor_sell_value": 2.95 }
                ]
            }));
        })
        .await;

    let client = ReservoirClient::new(
        Some("reservoir-key".to_string()),
        Some(server.base_url()),
        TIMEOUT,
    );
    let asset = AssetReference::nft(Chain::Ethereum, "0xbeef");

    assert_eq!(client.current_price(&asset).await.unwrap(), Some(3.1));
    assert_eq!(
        client.price_at_date(&asset, may_17()).await.unwrap(),
        Some(2.95)
    );
    floor.assert_async().await;
    daily.assert_async().await;
}

#[tokio::test]
async fn test_reservoir_series_skips_missing_floors() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/collections/daily-volumes/v1");
            then.status(200).json_body(json!({
                "collections": [
                    { "timestamp": 1715990400, "floor_sell_value": 2.8 },
                    { "timestamp": 1715904000, "floor_sell_value": null },
                    { "timestamp": 1715817600, "floor_sell_value": 3.0 }
                ]
            }));
        })
        .await;

    let client = ReservoirClient::new(None, Some(server.base_url()), TIMEOUT);
    let asset = AssetReference::nft(Chain::Ethereum, "0xbeef");
    let from = may_17() - ChronoDuration::days(1);
    let to = may_17() + ChronoDuration::days(1);

    let series = lookup_series(&client, &asset, from, to, TIMEOUT).await;
    assert_eq!(
        series,
        vec![
            FloorPoint { date: from, floor: 3.0 },
            FloorPoint { date: to, floor: 2.8 },
        ]
    );
}

#[tokio::test]
async fn test_reservoir_without_host_for_chain_is_absent() {
    let client = ReservoirClient::new(None, None, TIMEOUT);
    let asset = AssetReference::nft(Chain::Solana, "collection");
    assert_eq!(client.current_price(&asset).await.unwrap(), None);
}

#[tokio::test]
async fn test_opensea_floor_and_sales_with_cached_slug() {
    let server = MockServer::start_async().await;
    let slug = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/v2/chain/matic/contract/0xbeef")
                .header("x-api-key", "opensea-key");
            then.status(200).json_body(json!({
                "address": "0xbeef",
                "chain": "matic",
                "collection": "cool-critters"
            }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v2/collections/cool-critters/stats");
            then.status(200).json_body(json!({
                "total": { "volume": 120.5, "floor_price": 55.0, "floor_price_symbol": "POL" }
            }));
        })
        .await;
    let sales = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/v2/events/collection/cool-critters")
                .query_param("event_type", "sale")
                .query_param("after", "1715904000")
                .query_param("before", "1715990400");
            then.status(200).json_body(json!({
                "asset_events": [
                    { "event_type": "sale", "payment": { "quantity": "61000000000000000000", "decimals": 18, "symbol": "POL" } },
                    { "event_type": "sale", "payment": { "quantity": "52500000000000000000", "decimals": 18, "symbol": "WPOL" } },
                    { "event_type": "sale", "payment": { "quantity": "20000000", "decimals": 6, "symbol": "USDC" } },
                    // Incomplete payments are skipped without losing the page.
                    { "event_type": "sale", "payment": { "quantity": "1000000000000000000", "symbol": null } }
                ],
                "next": null
            }));
        })
        .await;

    let client = OpenSeaClient::new(
        Some("opensea-key".to_string()),
        server.base_url(),
        cache(),
        CacheTtls::default(),
        TIMEOUT,
    );
    let asset = AssetReference::nft(Chain::Polygon, "0xbeef");

    assert_eq!(client.current_price(&asset).await.unwrap(), Some(55.0));
    let on_day = client.price_at_date(&asset, may_17()).await.unwrap().unwrap();
    assert!((on_day - 52.5).abs() < 1e-9);

    slug.assert_hits_async(1).await;
    sales.assert_async().await;
}

#[tokio::test]
async fn test_opensea_unknown_contract_is_absent() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v2/chain/ethereum/contract/0xnope");
            then.status(404).json_body(json!({ "errors": ["not found"] }));
        })
        .await;

    let client = OpenSeaClient::new(
        None,
        server.base_url(),
        cache(),
        CacheTtls::default(),
        TIMEOUT,
    );
    let asset = AssetReference::nft(Chain::Ethereum, "0xnope");
    assert_eq!(client.current_price(&asset).await.unwrap(), None);
}

fn mocked_config(base_url: String) -> Config {
    Config {
        endpoints: ProviderEndpoints {
            defillama: base_url.clone(),
            coingecko: Some(base_url.clone()),
            dexscreener: base_url.clone(),
            opensea: base_url.clone(),
            reservoir: Some(base_url),
        },
        request_timeout: TIMEOUT,
        ..Config::default()
    }
}

#[tokio::test]
async fn test_service_falls_back_from_defillama_to_dexscreener() {
    let server = MockServer::start_async().await;
    let llama = server
        .mock_async(|when, then| {
            when.method(GET).path("/prices/current/base:0xfresh");
            then.status(200).json_body(json!({ "coins": {} }));
        })
        .await;
    let dex = server
        .mock_async(|when, then| {
            when.method(GET).path("/latest/dex/tokens/0xfresh");
            then.status(200).json_body(json!({
                "pairs": [{
                    "chainId": "base",
                    "baseToken": { "address": "0xfresh" },
                    "priceUsd": "0.00123",
                    "liquidity": { "usd": 5000.0 }
                }]
            }));
        })
        .await;

    let service = PriceService::with_cache(&mocked_config(server.base_url()), cache());
    let asset = AssetReference::contract(Chain::Base, "0xfresh");

    let point = service.current_price(&asset).await.unwrap();
    assert_eq!(point.value(), 0.00123);
    assert_eq!(point.source, PriceSource::DexScreener);

    // Second lookup is served from the cache.
    service.current_price(&asset).await.unwrap();
    llama.assert_hits_async(1).await;
    dex.assert_hits_async(1).await;
}

#[tokio::test]
async fn test_service_coin_date_prefers_coingecko_history() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/coins/bitcoin/history");
            then.status(200).json_body(json!({ "id": "bitcoin" }));
        })
        .await;
    let llama = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/prices/historical/1715904000/coingecko:bitcoin");
            then.status(200).json_body(json!({
                "coins": { "coingecko:bitcoin": { "price": 65500.0 } }
            }));
        })
        .await;

    let service = PriceService::with_cache(&mocked_config(server.base_url()), cache());
    let point = service
        .price_at_date(&AssetReference::coin("bitcoin"), may_17())
        .await
        .unwrap();

    // CoinGecko had no market data for the day, so DefiLlama answered.
    assert_eq!(point.value(), 65500.0);
    assert_eq!(point.source, PriceSource::DefiLlama);
    llama.assert_async().await;
}
