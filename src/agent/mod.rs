//! Scheduling of metric tasks and graceful shutdown
//!
//! One task per metric polls the collector on its own interval and hands
//! batches to a single dispatcher over a bounded channel. A slow publisher
//! therefore throttles every metric task rather than letting batches pile up.
mod dispatcher;
mod shutdown;
mod signal;
mod task;

pub use dispatcher::{DispatchStats, Dispatcher};
pub use shutdown::{
    AllStopped, CompletionToken, ShutdownCoordinator, ShutdownState, StopSignal, TaskRegistration,
};
pub use signal::{TerminationSignal, listen};
pub use task::MetricTask;

use log::info;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::collector::Collector;
use crate::config::Configuration;
use crate::error::Result;
use crate::metric::MetricSpec;
use crate::publisher::Publisher;

/// Runtime options taken from the configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentOptions {
    /// Forward batches with no samples to the publisher
    pub publish_empty_batches: bool,
    /// Capacity of the hand-off channel
    pub handoff_capacity: usize,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            publish_empty_batches: true,
            handoff_capacity: 1,
        }
    }
}

impl From<&Configuration> for AgentOptions {
    fn from(config: &Configuration) -> Self {
        Self {
            publish_empty_batches: config.publish_empty_batches,
            handoff_capacity: config.handoff_capacity,
        }
    }
}

/// A configured set of metrics bound to a collector and a publisher
pub struct Agent<P: Publisher> {
    specs: Vec<MetricSpec>,
    collector: Arc<dyn Collector>,
    publisher: P,
    options: AgentOptions,
}

impl<P: Publisher> Agent<P> {
    pub fn new(
        specs: Vec<MetricSpec>,
        collector: Arc<dyn Collector>,
        publisher: P,
        options: AgentOptions,
    ) -> Self {
        Self {
            specs,
            collector,
            publisher,
            options,
        }
    }

    /// Spawn every metric task and dispatch until shutdown completes
    ///
    /// Returns once a termination signal has been received, every task has
    /// stopped and every batch they handed off has been dispatched.
    pub async fn run(self, signals: mpsc::Receiver<TerminationSignal>) -> Result<DispatchStats> {
        let Agent {
            mut specs,
            collector,
            publisher,
            options,
        } = self;

        let (mut coordinator, all_stopped) = ShutdownCoordinator::new();
        let (handoff_tx, handoff_rx) = mpsc::channel(options.handoff_capacity.max(1));

        specs.sort_by(|a, b| a.name.cmp(&b.name));
        for spec in specs {
            let registration = coordinator.register(spec.name.clone())?;
            let task = MetricTask::new(spec, registration);
            tokio::spawn(task.run(Arc::clone(&collector), handoff_tx.clone()));
        }
        // Only the tasks may keep the hand-off open
        drop(handoff_tx);

        info!(
            "Started {} metric tasks, publishing with {}",
            coordinator.registered(),
            publisher.name()
        );

        let dispatcher = Dispatcher::new(publisher, handoff_rx, options.publish_empty_batches);
        Ok(dispatcher.run(coordinator, all_stopped, signals).await)
    }
}
