//! Per-asset-kind fallback pipelines.
//!
//! Each resolver holds statically ordered adapter lists. A query checks the
//! cache under its own key, then asks adapters one at a time; the first
//! usable answer is written through and returned. Adapters are never raced
//! and never retried within one call.

use crate::config::CacheTtls;
use crate::services::cache::{get_json, set_json, CacheHandle};
use crate::services::throttle::ProviderThrottle;
use crate::sources::{lookup, lookup_series, PriceAdapter, Query};
use crate::types::{
    is_valid_price, AssetReference, CacheKey, CacheOp, FloorPoint, PricePoint, PriceSource,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Ordered list of adapters tried for one kind of query.
pub type AdapterChain = Vec<Arc<dyn PriceAdapter>>;

/// Historical targets younger than this may still be revised upstream.
const SETTLING_WINDOW_SECS: i64 = 3_600;

/// Cache handle, TTL policy and adapter timeout shared by every resolver,
/// plus optional per-provider pacing for bulk work.
#[derive(Clone)]
pub struct ResolverContext {
    cache: CacheHandle,
    ttls: CacheTtls,
    timeout: Duration,
    pacing: Option<Arc<ProviderThrottle>>,
}

impl ResolverContext {
    pub fn new(cache: CacheHandle, ttls: CacheTtls, timeout: Duration) -> Self {
        Self {
            cache,
            ttls,
            timeout,
            pacing: None,
        }
    }

    /// Pace every provider request. Cache hits are never delayed, and the
    /// adapter timeout starts only once a request is allowed to go out.
    pub fn with_pacing(mut self, pacing: Arc<ProviderThrottle>) -> Self {
        self.pacing = Some(pacing);
        self
    }

    async fn paced<F: Future>(&self, source: PriceSource, task: F) -> F::Output {
        match self.pacing {
            Some(ref pacing) => pacing.run(source, task).await,
            None => task.await,
        }
    }

    /// TTL for a resolved value, by how settled its target time is.
    pub fn ttl_for(&self, query: Query, now: DateTime<Utc>) -> Duration {
        let settled = match query {
            Query::Current => false,
            Query::AtDate(date) => date < now.date_naive(),
            Query::AtInstant(instant) => {
                now - instant >= ChronoDuration::seconds(SETTLING_WINDOW_SECS)
            }
        };
        if settled {
            self.ttls.historical
        } else {
            self.ttls.current
        }
    }

    /// TTL for a floor series ending on `to`.
    pub fn series_ttl(&self, to: NaiveDate, now: DateTime<Utc>) -> Duration {
        if to < now.date_naive() {
            self.ttls.historical
        } else {
            self.ttls.current
        }
    }

    async fn cached(&self, key: &CacheKey) -> Option<PricePoint> {
        let point = get_json::<PricePoint>(self.cache.as_ref(), key)
            .await
            .filter(|p| is_valid_price(p.value()))?;
        debug!("Cache hit {} ({})", key, point.source);
        Some(point)
    }

    async fn store(&self, key: &CacheKey, point: &PricePoint, ttl: Duration) {
        set_json(self.cache.as_ref(), key, point, ttl).await;
    }

    /// Resolve `query` through `adapters` in order.
    pub async fn first_of(
        &self,
        key: &CacheKey,
        asset: &AssetReference,
        query: Query,
        adapters: &[Arc<dyn PriceAdapter>],
    ) -> Option<PricePoint> {
        if let Some(hit) = self.cached(key).await {
            return Some(hit);
        }

        for adapter in adapters {
            let found = self
                .paced(
                    adapter.source(),
                    lookup(adapter.as_ref(), asset, query, self.timeout),
                )
                .await;
            if let Some(point) = found {
                debug!("{} resolved by {}", key, point.source);
                self.store(key, &point, self.ttl_for(query, Utc::now()))
                    .await;
                return Some(point);
            }
        }

        debug!("{}: no source had a price", key);
        None
    }

    /// First non-empty floor series among `adapters`.
    pub async fn first_series(
        &self,
        key: &CacheKey,
        asset: &AssetReference,
        from: NaiveDate,
        to: NaiveDate,
        adapters: &[Arc<dyn PriceAdapter>],
    ) -> Vec<FloorPoint> {
        if let Some(points) = get_json::<Vec<FloorPoint>>(self.cache.as_ref(), key).await {
            if !points.is_empty() {
                debug!("Cache hit {} ({} points)", key, points.len());
                return points;
            }
        }

        for adapter in adapters {
            let points = self
                .paced(
                    adapter.source(),
                    lookup_series(adapter.as_ref(), asset, from, to, self.timeout),
                )
                .await;
            if !points.is_empty() {
                debug!(
                    "{} resolved by {} ({} points)",
                    key,
                    adapter.source(),
                    points.len()
                );
                let ttl = self.series_ttl(to, Utc::now());
                set_json(self.cache.as_ref(), key, &points, ttl).await;
                return points;
            }
        }

        debug!("{}: no source had a floor series", key);
        Vec::new()
    }
}

/// Price queries for one asset kind.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn current_price(&self, asset: &AssetReference) -> Option<PricePoint>;

    async fn price_at_date(&self, asset: &AssetReference, date: NaiveDate)
        -> Option<PricePoint>;

    async fn price_at_instant(
        &self,
        asset: &AssetReference,
        instant: DateTime<Utc>,
    ) -> Option<PricePoint>;
}

/// Contract-addressed fungible tokens.
///
/// History comes from one source only: a missing historical price stays
/// missing rather than falling back to the current one.
pub struct ContractResolver {
    ctx: ResolverContext,
    current: AdapterChain,
    historical: AdapterChain,
}

impl ContractResolver {
    pub fn new(ctx: ResolverContext, current: AdapterChain, historical: AdapterChain) -> Self {
        Self {
            ctx,
            current,
            historical,
        }
    }
}

#[async_trait]
impl Resolver for ContractResolver {
    async fn current_price(&self, asset: &AssetReference) -> Option<PricePoint> {
        let key = CacheKey::new(CacheOp::CurrentPrice, asset);
        self.ctx
            .first_of(&key, asset, Query::Current, &self.current)
            .await
    }

    async fn price_at_date(
        &self,
        asset: &AssetReference,
        date: NaiveDate,
    ) -> Option<PricePoint> {
        let key = CacheKey::new(CacheOp::PriceAtDate, asset).on(date);
        self.ctx
            .first_of(&key, asset, Query::AtDate(date), &self.historical)
            .await
    }

    async fn price_at_instant(
        &self,
        asset: &AssetReference,
        instant: DateTime<Utc>,
    ) -> Option<PricePoint> {
        let key = CacheKey::new(CacheOp::PriceAtInstant, asset).at(instant);
        self.ctx
            .first_of(&key, asset, Query::AtInstant(instant), &self.historical)
            .await
    }
}

/// Coin-id tokens (Layer-1 assets without a contract address).
pub struct CoinResolver {
    ctx: ResolverContext,
    current: AdapterChain,
    at_date: AdapterChain,
    at_instant: AdapterChain,
}

impl CoinResolver {
    pub fn new(
        ctx: ResolverContext,
        current: AdapterChain,
        at_date: AdapterChain,
        at_instant: AdapterChain,
    ) -> Self {
        Self {
            ctx,
            current,
            at_date,
            at_instant,
        }
    }
}

#[async_trait]
impl Resolver for CoinResolver {
    async fn current_price(&self, asset: &AssetReference) -> Option<PricePoint> {
        let key = CacheKey::new(CacheOp::CurrentPrice, asset);
        self.ctx
            .first_of(&key, asset, Query::Current, &self.current)
            .await
    }

    async fn price_at_date(
        &self,
        asset: &AssetReference,
        date: NaiveDate,
    ) -> Option<PricePoint> {
        let key = CacheKey::new(CacheOp::PriceAtDate, asset).on(date);
        self.ctx
            .first_of(&key, asset, Query::AtDate(date), &self.at_date)
            .await
    }

    async fn price_at_instant(
        &self,
        asset: &AssetReference,
        instant: DateTime<Utc>,
    ) -> Option<PricePoint> {
        let key = CacheKey::new(CacheOp::PriceAtInstant, asset).at(instant);
        self.ctx
            .first_of(&key, asset, Query::AtInstant(instant), &self.at_instant)
            .await
    }
}

/// NFT collection floors, in native currency units.
///
/// A past date no source knows falls back to today's floor, marked
/// [`PricePoint::degraded`]. Snapshots built from it come out flat, which
/// [`crate::types::PriceSnapshotSet::is_flat`] detects.
pub struct NftResolver {
    ctx: ResolverContext,
    floor: AdapterChain,
    series: AdapterChain,
}

impl NftResolver {
    pub fn new(ctx: ResolverContext, floor: AdapterChain, series: AdapterChain) -> Self {
        Self { ctx, floor, series }
    }

    /// Daily floors between two dates, ascending, one point per date.
    pub async fn floor_series(
        &self,
        asset: &AssetReference,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Vec<FloorPoint> {
        if from > to {
            return Vec::new();
        }
        let key = CacheKey::new(CacheOp::FloorSeries, asset).on(from).on(to);
        self.ctx
            .first_series(&key, asset, from, to, &self.series)
            .await
    }
}

#[async_trait]
impl Resolver for NftResolver {
    async fn current_price(&self, asset: &AssetReference) -> Option<PricePoint> {
        let key = CacheKey::new(CacheOp::FloorCurrent, asset);
        self.ctx
            .first_of(&key, asset, Query::Current, &self.floor)
            .await
    }

    async fn price_at_date(
        &self,
        asset: &AssetReference,
        date: NaiveDate,
    ) -> Option<PricePoint> {
        let key = CacheKey::new(CacheOp::FloorAtDate, asset).on(date);
        if let Some(point) = self
            .ctx
            .first_of(&key, asset, Query::AtDate(date), &self.floor)
            .await
        {
            return Some(point);
        }

        let current = self.current_price(asset).await?;
        warn!(
            "No floor history for {} on {}; substituting current floor {}",
            asset,
            date,
            current.value()
        );
        let point = current.into_degraded();
        // Short TTL so real history replaces the stand-in once a source has it.
        self.ctx.store(&key, &point, self.ctx.ttls.current).await;
        Some(point)
    }

    async fn price_at_instant(
        &self,
        asset: &AssetReference,
        instant: DateTime<Utc>,
    ) -> Option<PricePoint> {
        self.price_at_date(asset, instant.date_naive()).await
    }
}
