use crate::config::Config;
use crate::services::price_service::PriceService;
use crate::types::{AssetReference, ScoredSignal, Signal};
use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Resolves snapshots for a batch of signals, for importing history.
///
/// Rate limits are the service's concern: build it with
/// [`PriceService::paced`] so each provider is throttled on its own.
pub struct Backfiller {
    service: Arc<PriceService>,
    max_in_flight: usize,
}

impl Backfiller {
    pub fn new(service: Arc<PriceService>, max_in_flight: usize) -> Self {
        Self {
            service,
            max_in_flight: max_in_flight.max(1),
        }
    }

    /// Backfiller over a provider-paced service built from `config`.
    pub async fn from_config(config: &Config) -> Self {
        let service = PriceService::paced_from_config(config).await;
        Self::new(Arc::new(service), config.throttle.max_in_flight)
    }

    /// Score every signal, grouped by normalized asset. Within a group,
    /// signals keep their input order.
    pub async fn backfill(
        &self,
        items: &[(AssetReference, Signal)],
        now: DateTime<Utc>,
    ) -> HashMap<String, Vec<ScoredSignal>> {
        info!("Backfilling snapshots for {} signals", items.len());

        let resolved: Vec<(String, ScoredSignal)> = stream::iter(items)
            .map(|(asset, signal)| async move {
                let snapshots = self.service.snapshots(asset, signal, now).await;
                debug!(
                    "Backfilled {} called {}: {:?}",
                    asset,
                    signal.effective_call_time(),
                    snapshots
                );
                (
                    asset.normalized().to_string(),
                    ScoredSignal {
                        signal: signal.clone(),
                        snapshots,
                    },
                )
            })
            .buffered(self.max_in_flight)
            .collect()
            .await;

        let mut grouped: HashMap<String, Vec<ScoredSignal>> = HashMap::new();
        let mut empty = 0usize;
        for (asset, scored) in resolved {
            if scored.snapshots.is_empty() {
                empty += 1;
            }
            grouped.entry(asset).or_default().push(scored);
        }

        info!(
            "Backfill complete: {} assets, {} signals without any price",
            grouped.len(),
            empty
        );
        grouped
    }
}
