use chrono::Utc;
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};

use super::shutdown::TaskRegistration;
use crate::collector::Collector;
use crate::metric::{Batch, MetricSpec};

/// A running metric: its spec plus the registration that tracks it
#[derive(Debug)]
pub struct MetricTask {
    spec: MetricSpec,
    registration: TaskRegistration,
}

impl MetricTask {
    pub fn new(spec: MetricSpec, registration: TaskRegistration) -> Self {
        Self { spec, registration }
    }

    pub fn spec(&self) -> &MetricSpec {
        &self.spec
    }

    /// Poll the collector every interval until shutdown begins
    ///
    /// Each tick produces exactly one batch, possibly empty. Handing the batch
    /// off blocks until the dispatcher has room for it and is not raced
    /// against the stop signal, so a batch built before stop is observed is
    /// always delivered. The completion token is released on return.
    pub async fn run(self, collector: Arc<dyn Collector>, handoff: mpsc::Sender<Batch>) {
        let MetricTask {
            spec,
            registration: TaskRegistration { token, mut stop },
        } = self;

        // First collection happens one full interval after start
        let mut ticker = time::interval_at(Instant::now() + spec.interval, spec.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "Launching collector for: {} (every {}s)",
            spec.name,
            spec.interval.as_secs()
        );

        loop {
            tokio::select! {
                _ = stop.stopped() => {
                    debug!("{} received stop", spec.name);
                    break;
                }
                _ = ticker.tick() => {
                    let values = collector.collect(&spec.query).await;
                    let batch = Batch::from_values(&spec, values, Utc::now());
                    debug!("{} collected {} samples", spec.name, batch.len());

                    if handoff.send(batch).await.is_err() {
                        warn!("Dispatcher is gone, stopping {}", spec.name);
                        break;
                    }
                }
            }
        }

        info!("Stopped collector for: {}", token.name());
    }
}
