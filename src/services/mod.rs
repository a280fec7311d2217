pub mod backfill;
pub mod cache;
pub mod performance;
pub mod price_service;
pub mod redis_store;
pub mod resolver;
pub mod throttle;

pub use backfill::Backfiller;
pub use cache::{CacheHandle, CacheStore, DisabledCache, MemoryCache};
pub use performance::{aggregate_by_asset, aggregate_performance, compute_performance, return_pct};
pub use price_service::PriceService;
pub use redis_store::RedisCache;
pub use resolver::{
    AdapterChain, CoinResolver, ContractResolver, NftResolver, Resolver, ResolverContext,
};
pub use throttle::{ProviderThrottle, Throttle};
