use crate::config::Config;
use crate::services::cache::{CacheHandle, DisabledCache, MemoryCache};
use crate::services::redis_store::RedisCache;
use crate::services::throttle::ProviderThrottle;
use crate::services::resolver::{
    AdapterChain, CoinResolver, ContractResolver, NftResolver, Resolver, ResolverContext,
};
use crate::sources::{
    CoinGeckoClient, DefiLlamaClient, DexScreenerClient, OpenSeaClient, PriceAdapter,
    ReservoirClient,
};
use crate::types::{
    AssetKind, AssetReference, FloorPoint, Horizon, PricePoint, PriceSnapshotSet, Signal,
};
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use futures_util::stream::{self, StreamExt};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info};

const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Entry point for every price query.
///
/// Dispatches each asset to the resolver for its kind. Absence is the only
/// failure mode: nothing here returns an error.
pub struct PriceService {
    contract: ContractResolver,
    coin: CoinResolver,
    nft: NftResolver,
    max_concurrency: usize,
}

impl PriceService {
    pub fn new(
        contract: ContractResolver,
        coin: CoinResolver,
        nft: NftResolver,
        max_concurrency: usize,
    ) -> Self {
        Self {
            contract,
            coin,
            nft,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Build the service with the configured cache backend and providers.
    pub async fn from_config(config: &Config) -> Self {
        let cache = open_cache(config).await;
        Self::with_cache(config, cache)
    }

    /// Build the service on top of an existing cache.
    pub fn with_cache(config: &Config, cache: CacheHandle) -> Self {
        Self::build(config, cache, None)
    }

    /// Like [`Self::from_config`], with every provider paced by
    /// `config.throttle`. Meant for bulk backfills.
    pub async fn paced_from_config(config: &Config) -> Self {
        let cache = open_cache(config).await;
        Self::paced(config, cache)
    }

    /// Like [`Self::with_cache`], with every provider paced by
    /// `config.throttle`.
    pub fn paced(config: &Config, cache: CacheHandle) -> Self {
        info!(
            "Pacing providers: {} in flight, {:?} apart",
            config.throttle.max_in_flight, config.throttle.min_spacing
        );
        let pacing = Arc::new(ProviderThrottle::new(config.throttle));
        Self::build(config, cache, Some(pacing))
    }

    fn build(config: &Config, cache: CacheHandle, pacing: Option<Arc<ProviderThrottle>>) -> Self {
        let timeout = config.request_timeout;
        let endpoints = &config.endpoints;

        let defillama: Arc<dyn PriceAdapter> =
            Arc::new(DefiLlamaClient::new(endpoints.defillama.clone(), timeout));
        let dexscreener: Arc<dyn PriceAdapter> =
            Arc::new(DexScreenerClient::new(endpoints.dexscreener.clone(), timeout));
        let coingecko: Arc<dyn PriceAdapter> = Arc::new(CoinGeckoClient::new(
            config.coingecko_api_key.clone(),
            endpoints.coingecko.clone(),
            cache.clone(),
            config.ttls,
            timeout,
        ));
        let reservoir: Arc<dyn PriceAdapter> = Arc::new(ReservoirClient::new(
            config.reservoir_api_key.clone(),
            endpoints.reservoir.clone(),
            timeout,
        ));
        let opensea: Arc<dyn PriceAdapter> = Arc::new(OpenSeaClient::new(
            config.opensea_api_key.clone(),
            endpoints.opensea.clone(),
            cache.clone(),
            config.ttls,
            timeout,
        ));

        let mut ctx = ResolverContext::new(cache, config.ttls, timeout);
        if let Some(pacing) = pacing {
            ctx = ctx.with_pacing(pacing);
        }
        let chain = |adapters: &[&Arc<dyn PriceAdapter>]| -> AdapterChain {
            adapters.iter().map(|a| Arc::clone(*a)).collect()
        };

        let contract = ContractResolver::new(
            ctx.clone(),
            chain(&[&defillama, &dexscreener]),
            chain(&[&defillama]),
        );
        let coin = CoinResolver::new(
            ctx.clone(),
            chain(&[&defillama, &coingecko]),
            chain(&[&coingecko, &defillama]),
            chain(&[&coingecko]),
        );
        let nft = NftResolver::new(
            ctx,
            chain(&[&reservoir, &coingecko, &opensea]),
            chain(&[&reservoir, &coingecko]),
        );

        Self::new(contract, coin, nft, config.max_concurrency)
    }

    fn resolver(&self, asset: &AssetReference) -> &dyn Resolver {
        match asset.kind() {
            AssetKind::Contract => &self.contract,
            AssetKind::Coin => &self.coin,
            AssetKind::NftCollection => &self.nft,
        }
    }

    /// Current price, or current floor for NFT collections.
    pub async fn current_price(&self, asset: &AssetReference) -> Option<PricePoint> {
        self.resolver(asset).current_price(asset).await
    }

    /// Price for a UTC calendar day.
    pub async fn price_at_date(
        &self,
        asset: &AssetReference,
        date: NaiveDate,
    ) -> Option<PricePoint> {
        self.resolver(asset).price_at_date(asset, date).await
    }

    /// Price at an instant. NFT collections resolve at day granularity.
    pub async fn price_at_instant(
        &self,
        asset: &AssetReference,
        instant: DateTime<Utc>,
    ) -> Option<PricePoint> {
        self.resolver(asset).price_at_instant(asset, instant).await
    }

    /// Daily floor series for an NFT collection. Empty for fungible assets.
    pub async fn floor_series(
        &self,
        asset: &AssetReference,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Vec<FloorPoint> {
        if asset.kind() != AssetKind::NftCollection {
            debug!("Floor series requested for fungible asset {}", asset);
            return Vec::new();
        }
        self.nft.floor_series(asset, from, to).await
    }

    /// Prices a signal's performance is computed from.
    ///
    /// Horizons the signal has not reached yet are left empty without a
    /// lookup. The lookups run concurrently.
    pub async fn snapshots(
        &self,
        asset: &AssetReference,
        signal: &Signal,
        now: DateTime<Utc>,
    ) -> PriceSnapshotSet {
        let resolver = self.resolver(asset);
        let call_time = signal.effective_call_time();
        let age = signal.age(now);

        let (call, one_day, seven_days, twenty_eight_days, current) = tokio::join!(
            resolver.price_at_instant(asset, call_time),
            horizon_price(resolver, asset, call_time, age, Horizon::OneDay),
            horizon_price(resolver, asset, call_time, age, Horizon::SevenDays),
            horizon_price(resolver, asset, call_time, age, Horizon::TwentyEightDays),
            resolver.current_price(asset),
        );

        PriceSnapshotSet {
            call_price: call.map(|p| p.value()),
            price_1d: one_day,
            price_7d: seven_days,
            price_28d: twenty_eight_days,
            current_price: current.map(|p| p.value()),
        }
    }

    /// [`Self::snapshots`] for many signals with bounded concurrency.
    /// Results come back in input order.
    pub async fn snapshots_many(
        &self,
        items: &[(AssetReference, Signal)],
        now: DateTime<Utc>,
    ) -> Vec<PriceSnapshotSet> {
        let mut resolved: Vec<(usize, PriceSnapshotSet)> = stream::iter(items.iter().enumerate())
            .map(|(index, (asset, signal))| async move {
                (index, self.snapshots(asset, signal, now).await)
            })
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;

        resolved.sort_by_key(|(index, _)| *index);
        resolved.into_iter().map(|(_, set)| set).collect()
    }
}

async fn horizon_price(
    resolver: &dyn Resolver,
    asset: &AssetReference,
    call_time: DateTime<Utc>,
    age: ChronoDuration,
    horizon: Horizon,
) -> Option<f64> {
    let offset = horizon.offset()?;
    if !horizon.is_reached(age) {
        return None;
    }
    resolver
        .price_at_instant(asset, call_time + offset)
        .await
        .map(|p| p.value())
}

async fn open_cache(config: &Config) -> CacheHandle {
    if !config.cache_enabled {
        info!("Caching disabled");
        return Arc::new(DisabledCache);
    }
    if let Some(ref url) = config.redis_url {
        return RedisCache::connect(url).await;
    }
    info!("Using in-process cache");
    let cache = MemoryCache::new();
    spawn_cleanup(Arc::downgrade(&cache));
    cache
}

/// Sweep expired entries until the cache is dropped.
fn spawn_cleanup(cache: Weak<MemoryCache>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
        loop {
            interval.tick().await;
            let Some(cache) = cache.upgrade() else {
                break;
            };
            cache.cleanup();
            debug!("Cache cleanup: {} entries live", cache.len());
        }
    });
}
