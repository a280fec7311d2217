use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Declared direction of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Bullish,
    Bearish,
}

impl Sentiment {
    /// Parse from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "bullish" | "bull" | "long" => Some(Self::Bullish),
            "bearish" | "bear" | "short" => Some(Self::Bearish),
            _ => None,
        }
    }

    /// Whether a return agrees with this sentiment. A flat return counts
    /// for bulls and against bears.
    pub fn is_correct(&self, return_pct: f64) -> bool {
        match self {
            Sentiment::Bullish => return_pct >= 0.0,
            Sentiment::Bearish => return_pct < 0.0,
        }
    }
}

/// A public bull/bear call on an asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signal {
    pub sentiment: Sentiment,
    pub called_at: DateTime<Utc>,
    /// Precise post timestamp, when the source recorded one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posted_at: Option<DateTime<Utc>>,
}

impl Signal {
    pub fn new(sentiment: Sentiment, called_at: DateTime<Utc>) -> Self {
        Self {
            sentiment,
            called_at,
            posted_at: None,
        }
    }

    pub fn with_posted_at(mut self, posted_at: DateTime<Utc>) -> Self {
        self.posted_at = Some(posted_at);
        self
    }

    /// Instant the call is measured from.
    pub fn effective_call_time(&self) -> DateTime<Utc> {
        self.posted_at.unwrap_or(self.called_at)
    }

    /// Time elapsed since the call.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.effective_call_time()
    }
}

/// Fixed offset from the call at which a return is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Horizon {
    OneDay,
    SevenDays,
    TwentyEightDays,
    AllTime,
}

impl Horizon {
    pub const ALL: [Horizon; 4] = [
        Horizon::OneDay,
        Horizon::SevenDays,
        Horizon::TwentyEightDays,
        Horizon::AllTime,
    ];

    /// Minimum age a signal needs before this horizon is reported.
    /// All-time waits for the 28 day mark.
    pub fn min_age(&self) -> Duration {
        match self {
            Horizon::OneDay => Duration::days(1),
            Horizon::SevenDays => Duration::days(7),
            Horizon::TwentyEightDays | Horizon::AllTime => Duration::days(28),
        }
    }

    /// Offset from the call the horizon price is taken at. `None` for
    /// all-time, which uses the current price.
    pub fn offset(&self) -> Option<Duration> {
        match self {
            Horizon::AllTime => None,
            other => Some(other.min_age()),
        }
    }

    pub fn is_reached(&self, age: Duration) -> bool {
        age >= self.min_age()
    }

    pub fn label(&self) -> &'static str {
        match self {
            Horizon::OneDay => "1d",
            Horizon::SevenDays => "7d",
            Horizon::TwentyEightDays => "28d",
            Horizon::AllTime => "all_time",
        }
    }
}

/// Resolved prices around a signal. Every value is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceSnapshotSet {
    pub call_price: Option<f64>,
    pub price_1d: Option<f64>,
    pub price_7d: Option<f64>,
    pub price_28d: Option<f64>,
    pub current_price: Option<f64>,
}

impl PriceSnapshotSet {
    /// Price used for a horizon's return.
    pub fn price_for(&self, horizon: Horizon) -> Option<f64> {
        match horizon {
            Horizon::OneDay => self.price_1d,
            Horizon::SevenDays => self.price_7d,
            Horizon::TwentyEightDays => self.price_28d,
            Horizon::AllTime => self.current_price,
        }
    }

    /// True when call, 1d, 7d, 28d and current are all present and equal.
    ///
    /// This is the signature of an NFT collection with no real floor history,
    /// where today's floor was substituted for every past date.
    pub fn is_flat(&self) -> bool {
        let values = [
            self.call_price,
            self.price_1d,
            self.price_7d,
            self.price_28d,
            self.current_price,
        ];
        match values {
            [Some(first), rest @ ..] => rest.iter().all(|v| *v == Some(first)),
            _ => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.call_price.is_none()
            && self.price_1d.is_none()
            && self.price_7d.is_none()
            && self.price_28d.is_none()
            && self.current_price.is_none()
    }
}

/// Outcome of one horizon for one signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HorizonOutcome {
    pub horizon: Horizon,
    pub horizon_reached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_pct: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directionally_correct: Option<bool>,
}

impl HorizonOutcome {
    pub fn unreached(horizon: Horizon) -> Self {
        Self {
            horizon,
            horizon_reached: false,
            return_pct: None,
            directionally_correct: None,
        }
    }
}

/// Performance of a single signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceResult {
    pub one_day: HorizonOutcome,
    pub seven_days: HorizonOutcome,
    pub twenty_eight_days: HorizonOutcome,
    pub all_time: HorizonOutcome,
    /// Mean of the defined 1d and 7d returns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_term: Option<f64>,
    /// Mean of the defined 28d and all-time returns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub long_term: Option<f64>,
    /// See [`PriceSnapshotSet::is_flat`].
    pub flat_history: bool,
}

impl PerformanceResult {
    pub fn outcome(&self, horizon: Horizon) -> &HorizonOutcome {
        match horizon {
            Horizon::OneDay => &self.one_day,
            Horizon::SevenDays => &self.seven_days,
            Horizon::TwentyEightDays => &self.twenty_eight_days,
            Horizon::AllTime => &self.all_time,
        }
    }

    pub fn outcomes(&self) -> [&HorizonOutcome; 4] {
        [
            &self.one_day,
            &self.seven_days,
            &self.twenty_eight_days,
            &self.all_time,
        ]
    }
}

/// Aggregated statistics for one horizon across many signals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HorizonSummary {
    pub horizon: Horizon,
    /// Mean of the defined returns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_return_pct: Option<f64>,
    /// Signals with a defined return for this horizon.
    pub defined: u32,
    /// Signals whose return agreed with their sentiment.
    pub correct: u32,
    /// `correct / defined * 100`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy_pct: Option<f64>,
}

/// Aggregate performance over a collection of signals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatePerformance {
    pub one_day: HorizonSummary,
    pub seven_days: HorizonSummary,
    pub twenty_eight_days: HorizonSummary,
    pub all_time: HorizonSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_term: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub long_term: Option<f64>,
    pub signal_count: u32,
    /// Signals whose snapshots carried the flat-history signature.
    pub flat_history_count: u32,
}

impl AggregatePerformance {
    pub fn summary(&self, horizon: Horizon) -> &HorizonSummary {
        match horizon {
            Horizon::OneDay => &self.one_day,
            Horizon::SevenDays => &self.seven_days,
            Horizon::TwentyEightDays => &self.twenty_eight_days,
            Horizon::AllTime => &self.all_time,
        }
    }
}

/// A signal with the prices resolved for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredSignal {
    pub signal: Signal,
    pub snapshots: PriceSnapshotSet,
}

/// Overall aggregate plus one aggregate per asset key, in key order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceReport {
    pub overall: AggregatePerformance,
    pub by_asset: BTreeMap<String, AggregatePerformance>,
}
