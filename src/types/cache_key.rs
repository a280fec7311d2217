use crate::types::AssetReference;
use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;

/// Key prefix shared by every cache entry this crate writes.
pub const CACHE_PREFIX: &str = "calltrack:";

/// Operation a cache entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheOp {
    CurrentPrice,
    PriceAtDate,
    PriceAtInstant,
    FloorCurrent,
    FloorAtDate,
    FloorSeries,
    /// Raw 5-minute price series around an instant.
    CoinRange,
    /// Raw daily floor series for an NFT collection.
    NftDaily,
    /// OpenSea collection slug for a contract.
    NftSlug,
}

impl CacheOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheOp::CurrentPrice => "current",
            CacheOp::PriceAtDate => "at_date",
            CacheOp::PriceAtInstant => "at_instant",
            CacheOp::FloorCurrent => "floor_current",
            CacheOp::FloorAtDate => "floor_at_date",
            CacheOp::FloorSeries => "floor_series",
            CacheOp::CoinRange => "coin_range",
            CacheOp::NftDaily => "nft_daily",
            CacheOp::NftSlug => "nft_slug",
        }
    }
}

/// Deterministic cache key.
///
/// Built from the operation, the asset's normalized identity and the
/// optional instant, date and interval qualifiers, always rendered in that
/// order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(op: CacheOp, asset: &AssetReference) -> Self {
        Self(format!("{}{}:{}", CACHE_PREFIX, op.as_str(), asset.cache_id()))
    }

    /// Qualify with an instant (second precision).
    pub fn at(mut self, instant: DateTime<Utc>) -> Self {
        self.0.push_str(&format!(":t{}", instant.timestamp()));
        self
    }

    /// Qualify with a calendar date.
    pub fn on(mut self, date: NaiveDate) -> Self {
        self.0.push_str(&format!(":d{}", date.format("%Y-%m-%d")));
        self
    }

    /// Qualify with an interval label, e.g. `5m` or `30d`.
    pub fn interval(mut self, interval: &str) -> Self {
        self.0.push_str(&format!(":i{}", interval));
        self
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
