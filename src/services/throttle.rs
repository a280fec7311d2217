use crate::config::ThrottleConfig;
use crate::types::PriceSource;
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;

/// Request pacing for bulk work: at most `max_in_flight` tasks at once, and
/// starts at least `min_spacing` apart.
pub struct Throttle {
    permits: Semaphore,
    min_spacing: Duration,
    next_start: Mutex<Instant>,
}

impl Throttle {
    pub fn new(config: ThrottleConfig) -> Self {
        Self {
            permits: Semaphore::new(config.max_in_flight.max(1)),
            min_spacing: config.min_spacing,
            next_start: Mutex::new(Instant::now()),
        }
    }

    /// Run `task` once a permit and a start slot are available.
    pub async fn run<F: Future>(&self, task: F) -> F::Output {
        // The semaphore is never closed.
        let _permit = self.permits.acquire().await.ok();
        self.wait_turn().await;
        task.await
    }

    async fn wait_turn(&self) {
        let mut next = self.next_start.lock().await;
        tokio::time::sleep_until(*next).await;
        *next = Instant::now() + self.min_spacing;
    }
}

/// One [`Throttle`] per provider, created on first use. Providers are
/// paced independently of each other.
pub struct ProviderThrottle {
    config: ThrottleConfig,
    throttles: DashMap<PriceSource, Arc<Throttle>>,
}

impl ProviderThrottle {
    pub fn new(config: ThrottleConfig) -> Self {
        Self {
            config,
            throttles: DashMap::new(),
        }
    }

    /// Run `task` under the throttle for `source`.
    pub async fn run<F: Future>(&self, source: PriceSource, task: F) -> F::Output {
        let throttle = self
            .throttles
            .entry(source)
            .or_insert_with(|| Arc::new(Throttle::new(self.config)))
            .clone();
        throttle.run(task).await
    }
}
