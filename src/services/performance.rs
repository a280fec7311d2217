//! Signal performance scoring.
//!
//! Pure functions over already-resolved prices. A missing price removes that
//! data point from every mean; it never counts as zero.

use crate::types::{
    AggregatePerformance, Horizon, HorizonOutcome, HorizonSummary, PerformanceReport,
    PerformanceResult, PriceSnapshotSet, ScoredSignal, Signal,
};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};

/// Percentage change from `call` to `price`. Absent unless both are present
/// and the call price is positive.
pub fn return_pct(call: Option<f64>, price: Option<f64>) -> Option<f64> {
    let call = call.filter(|c| *c > 0.0 && c.is_finite())?;
    let price = price.filter(|p| p.is_finite())?;
    Some((price - call) / call * 100.0)
}

/// Score one signal against its snapshots.
pub fn compute_performance(
    signal: &Signal,
    snapshots: &PriceSnapshotSet,
    now: DateTime<Utc>,
) -> PerformanceResult {
    let age = signal.age(now);
    let outcome = |horizon: Horizon| {
        if !horizon.is_reached(age) {
            return HorizonOutcome::unreached(horizon);
        }
        let pct = return_pct(snapshots.call_price, snapshots.price_for(horizon));
        HorizonOutcome {
            horizon,
            horizon_reached: true,
            return_pct: pct,
            directionally_correct: pct.map(|r| signal.sentiment.is_correct(r)),
        }
    };

    let one_day = outcome(Horizon::OneDay);
    let seven_days = outcome(Horizon::SevenDays);
    let twenty_eight_days = outcome(Horizon::TwentyEightDays);
    let all_time = outcome(Horizon::AllTime);

    PerformanceResult {
        short_term: mean_of(&[one_day.return_pct, seven_days.return_pct]),
        long_term: mean_of(&[twenty_eight_days.return_pct, all_time.return_pct]),
        one_day,
        seven_days,
        twenty_eight_days,
        all_time,
        flat_history: snapshots.is_flat(),
    }
}

/// Aggregate every signal in `signals`, regardless of asset.
pub fn aggregate_performance(
    signals: &HashMap<String, Vec<ScoredSignal>>,
    now: DateTime<Utc>,
) -> AggregatePerformance {
    aggregate(signals.values().flatten(), now)
}

/// Overall aggregate plus one per asset key.
pub fn aggregate_by_asset(
    signals: &HashMap<String, Vec<ScoredSignal>>,
    now: DateTime<Utc>,
) -> PerformanceReport {
    let by_asset = signals
        .iter()
        .map(|(key, scored)| (key.clone(), aggregate(scored, now)))
        .collect::<BTreeMap<_, _>>();

    PerformanceReport {
        overall: aggregate_performance(signals, now),
        by_asset,
    }
}

#[derive(Default)]
struct Tally {
    returns: Vec<f64>,
    correct: u32,
}

impl Tally {
    fn record(&mut self, outcome: &HorizonOutcome) {
        if let Some(r) = outcome.return_pct {
            self.returns.push(r);
            if outcome.directionally_correct == Some(true) {
                self.correct += 1;
            }
        }
    }

    fn summary(&self, horizon: Horizon) -> HorizonSummary {
        let defined = self.returns.len() as u32;
        HorizonSummary {
            horizon,
            mean_return_pct: mean(&self.returns),
            defined,
            correct: self.correct,
            accuracy_pct: (defined > 0)
                .then(|| self.correct as f64 / defined as f64 * 100.0),
        }
    }
}

fn aggregate<'a>(
    signals: impl IntoIterator<Item = &'a ScoredSignal>,
    now: DateTime<Utc>,
) -> AggregatePerformance {
    let mut tallies: [Tally; 4] = Default::default();
    let mut signal_count = 0u32;
    let mut flat_history_count = 0u32;

    for scored in signals {
        let result = compute_performance(&scored.signal, &scored.snapshots, now);
        for (tally, outcome) in tallies.iter_mut().zip(result.outcomes()) {
            tally.record(outcome);
        }
        signal_count += 1;
        if result.flat_history {
            flat_history_count += 1;
        }
    }

    let [one_day, seven_days, twenty_eight_days, all_time] =
        [0, 1, 2, 3].map(|i| tallies[i].summary(Horizon::ALL[i]));

    AggregatePerformance {
        short_term: mean_of(&[one_day.mean_return_pct, seven_days.mean_return_pct]),
        long_term: mean_of(&[twenty_eight_days.mean_return_pct, all_time.mean_return_pct]),
        one_day,
        seven_days,
        twenty_eight_days,
        all_time,
        signal_count,
        flat_history_count,
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

fn mean_of(values: &[Option<f64>]) -> Option<f64> {
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    mean(&present)
}
