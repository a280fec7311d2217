use crate::error::{AppError, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Price source identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceSource {
    // Fungible sources
    DefiLlama,
    CoinGecko,
    DexScreener,
    // NFT floor sources
    Reservoir,
    OpenSea,
}

impl fmt::Display for PriceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriceSource::DefiLlama => write!(f, "defillama"),
            PriceSource::CoinGecko => write!(f, "coingecko"),
            PriceSource::DexScreener => write!(f, "dexscreener"),
            PriceSource::Reservoir => write!(f, "reservoir"),
            PriceSource::OpenSea => write!(f, "opensea"),
        }
    }
}

/// A resolved price.
///
/// Only constructible with a strictly positive, finite value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricePoint {
    value: f64,
    pub as_of: DateTime<Utc>,
    pub source: PriceSource,
    /// Set when the value was substituted from a different query
    /// (an NFT's current floor standing in for missing history).
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub degraded: bool,
}

impl PricePoint {
    pub fn new(value: f64, as_of: DateTime<Utc>, source: PriceSource) -> Option<Self> {
        is_valid_price(value).then_some(Self {
            value,
            as_of,
            source,
            degraded: false,
        })
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// Mark this point as a stand-in for data that could not be resolved.
    pub fn into_degraded(mut self) -> Self {
        self.degraded = true;
        self
    }
}

/// True for values that may be reported as a price.
pub fn is_valid_price(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

/// One day of an NFT collection's floor price (native currency).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FloorPoint {
    pub date: NaiveDate,
    pub floor: f64,
}

/// First and last date of the `days` days ending on `to`, inclusive.
pub fn trailing_window(to: NaiveDate, days: i64) -> Result<(NaiveDate, NaiveDate)> {
    if days <= 0 {
        return Err(AppError::InvalidInput(format!(
            "window must cover at least one day, got {}",
            days
        )));
    }
    let from = Duration::try_days(days - 1)
        .and_then(|span| to.checked_sub_signed(span))
        .ok_or_else(|| {
            AppError::InvalidInput(format!("window of {} days is out of range", days))
        })?;
    Ok((from, to))
}

/// Sort ascending by date, keep one point per date and drop invalid values.
///
/// When a date repeats, the lowest floor is kept.
pub fn normalize_floor_series(mut points: Vec<FloorPoint>) -> Vec<FloorPoint> {
    points.retain(|p| is_valid_price(p.floor));
    points.sort_by(|a, b| a.date.cmp(&b.date).then(a.floor.total_cmp(&b.floor)));
    points.dedup_by_key(|p| p.date);
    points
}
