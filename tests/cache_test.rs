//! Tests for the cache stores

use calltrack::services::cache::{get_json, set_json};
use calltrack::services::{CacheStore, DisabledCache, MemoryCache, RedisCache};
use calltrack::types::{AssetReference, CacheKey, CacheOp, Chain, PricePoint, PriceSource};
use chrono::Utc;
use std::time::Duration;

fn key(address: &str) -> CacheKey {
    CacheKey::new(
        CacheOp::CurrentPrice,
        &AssetReference::contract(Chain::Ethereum, address),
    )
}

#[tokio::test]
async fn test_memory_cache_round_trip_and_expiry() {
    let cache = MemoryCache::new();
    let k = key("0x1");

    cache.set(&k, "42.5".to_string(), Duration::from_millis(30)).await;
    assert_eq!(cache.get(&k).await, Some("42.5".to_string()));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(cache.get(&k).await, None);
}

#[tokio::test]
async fn test_memory_cache_never_set_is_miss() {
    let cache = MemoryCache::new();
    assert_eq!(cache.get(&key("0xmissing")).await, None);
}

#[tokio::test]
async fn test_memory_cache_get_many_returns_partial_map() {
    let cache = MemoryCache::new();
    let (a, b, c) = (key("0xa"), key("0xb"), key("0xc"));

    cache
        .set_many(vec![
            (a.clone(), "1".to_string(), Duration::from_secs(60)),
            (b.clone(), "2".to_string(), Duration::from_millis(10)),
        ])
        .await;
    tokio::time::sleep(Duration::from_millis(30)).await;

    let found = cache.get_many(&[a.clone(), b.clone(), c.clone()]).await;
    assert_eq!(found.len(), 1);
    assert_eq!(found.get(&a), Some(&"1".to_string()));
    assert!(!found.contains_key(&b));
    assert!(!found.contains_key(&c));
}

#[tokio::test]
async fn test_memory_cache_last_write_wins() {
    let cache = MemoryCache::new();
    let k = key("0x1");

    cache.set(&k, "1".to_string(), Duration::from_secs(60)).await;
    cache.set(&k, "2".to_string(), Duration::from_secs(60)).await;
    assert_eq!(cache.get(&k).await, Some("2".to_string()));
    assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn test_json_helpers_round_trip_price_points() {
    let cache = MemoryCache::new();
    let k = key("0x1");
    let point = PricePoint::new(1234.5, Utc::now(), PriceSource::DefiLlama).unwrap();

    set_json(cache.as_ref(), &k, &point, Duration::from_secs(60)).await;
    let cached: Option<PricePoint> = get_json(cache.as_ref(), &k).await;
    assert_eq!(cached, Some(point));
}

#[tokio::test]
async fn test_json_helpers_treat_garbage_as_miss() {
    let cache = MemoryCache::new();
    let k = key("0x1");

    cache.set(&k, "not json".to_string(), Duration::from_secs(60)).await;
    let cached: Option<PricePoint> = get_json(cache.as_ref(), &k).await;
    assert!(cached.is_none());
}

#[tokio::test]
async fn test_disabled_cache_is_permanent_miss() {
    let cache = DisabledCache;
    let k = key("0x1");

    cache.set(&k, "1".to_string(), Duration::from_secs(60)).await;
    cache
        .set_many(vec![(k.clone(), "1".to_string(), Duration::from_secs(60))])
        .await;

    assert_eq!(cache.get(&k).await, None);
    assert!(cache.get_many(&[k]).await.is_empty());
}

#[tokio::test]
async fn test_unreachable_redis_degrades_to_miss() {
    // Nothing listens on port 1.
    let cache = RedisCache::connect("redis://127.0.0.1:1").await;
    assert!(!cache.is_connected());

    let k = key("0x1");
    cache.set(&k, "1".to_string(), Duration::from_secs(60)).await;
    assert_eq!(cache.get(&k).await, None);
    assert!(cache.get_many(&[k]).await.is_empty());
}
