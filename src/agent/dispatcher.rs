use log::{debug, error, info, warn};
use tokio::sync::mpsc;

use super::shutdown::{AllStopped, ShutdownCoordinator, ShutdownState};
use super::signal::TerminationSignal;
use crate::metric::Batch;
use crate::publisher::Publisher;

/// Counters reported when the dispatcher exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Batches taken off the hand-off channel
    pub received: usize,
    /// Batches the publisher accepted
    pub published: usize,
    /// Empty batches not forwarded
    pub skipped: usize,
    /// Batches the publisher rejected
    pub failed: usize,
}

/// Sole consumer of the hand-off channel and sole caller of the publisher
pub struct Dispatcher<P: Publisher> {
    publisher: P,
    handoff: mpsc::Receiver<Batch>,
    publish_empty_batches: bool,
    stats: DispatchStats,
}

impl<P: Publisher> Dispatcher<P> {
    pub fn new(publisher: P, handoff: mpsc::Receiver<Batch>, publish_empty_batches: bool) -> Self {
        Self {
            publisher,
            handoff,
            publish_empty_batches,
            stats: DispatchStats::default(),
        }
    }

    /// Publish batches until every task has stopped after a termination signal
    ///
    /// Batch receipt, signal receipt and the all-stopped notification are
    /// raced in one `select!`, so draining continues while tasks wind down.
    /// Once all tasks have stopped, batches still buffered in the channel are
    /// published before returning.
    pub async fn run(
        mut self,
        mut coordinator: ShutdownCoordinator,
        mut all_stopped: AllStopped,
        mut signals: mpsc::Receiver<TerminationSignal>,
    ) -> DispatchStats {
        let mut signals_open = true;
        let mut handoff_open = true;

        loop {
            let draining = coordinator.state() == ShutdownState::Draining;

            tokio::select! {
                batch = self.handoff.recv(), if handoff_open => match batch {
                    Some(batch) => self.dispatch(batch).await,
                    None => {
                        debug!("Hand-off channel closed");
                        handoff_open = false;
                    }
                },
                signal = signals.recv(), if signals_open => match signal {
                    Some(signal) => {
                        if coordinator.begin_drain() {
                            info!("Received {}, draining", signal);
                        } else {
                            info!("Received {} while already draining, ignoring", signal);
                        }
                    }
                    None => {
                        warn!("Termination signal source closed");
                        signals_open = false;
                    }
                },
                _ = &mut all_stopped, if draining => break,
                // No tasks and no signal source: nothing can arrive any more
                else => {
                    coordinator.begin_drain();
                }
            }
        }

        // Every sender is gone now; flush whatever is still buffered
        self.handoff.close();
        while let Some(batch) = self.handoff.recv().await {
            self.dispatch(batch).await;
        }

        coordinator.mark_terminated();
        info!(
            "Done: {} batches received, {} published, {} skipped, {} failed",
            self.stats.received, self.stats.published, self.stats.skipped, self.stats.failed
        );

        self.stats
    }

    async fn dispatch(&mut self, batch: Batch) {
        self.stats.received += 1;

        if batch.is_empty() && !self.publish_empty_batches {
            debug!("Skipping empty batch for namespace {}", batch.namespace);
            self.stats.skipped += 1;
            return;
        }

        let namespace = batch.namespace.clone();
        let count = batch.len();

        match self.publisher.publish(batch).await {
            Ok(()) => {
                debug!("{} accepted {} samples for {}", self.publisher.name(), count, namespace);
                self.stats.published += 1;
            }
            Err(e) => {
                error!("Failed to publish {} samples for {}: {}", count, namespace, e);
                self.stats.failed += 1;
            }
        }
    }
}
