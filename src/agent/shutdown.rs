//! Shutdown coordination between metric tasks and the dispatcher
//!
//! Every metric task holds a [`CompletionToken`] and a [`StopSignal`]. The
//! first call to [`ShutdownCoordinator::begin_drain`] flips the shared state
//! to `Draining`, which every stop signal observes at once, and starts a
//! watcher that fires the all-stopped notification after the last token has
//! been dropped.
use log::{debug, info};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{mpsc, oneshot, watch};

use crate::error::{AgentError, Result};

/// Process-wide shutdown lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    Draining,
    Terminated,
}

/// Resolves once every registered task has released its token
pub type AllStopped = oneshot::Receiver<()>;

/// Per-task registration; dropping it marks the task as stopped
#[derive(Debug)]
pub struct CompletionToken {
    name: String,
    released: Arc<AtomicUsize>,
    _guard: mpsc::Sender<()>,
}

impl CompletionToken {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for CompletionToken {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
        debug!("Task {} released its completion token", self.name);
    }
}

/// Receiving side of the stop broadcast
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<ShutdownState>,
}

impl StopSignal {
    /// Wait until shutdown has begun
    pub async fn stopped(&mut self) {
        // A dropped coordinator also means stop
        let _ = self.rx.wait_for(|state| *state != ShutdownState::Running).await;
    }

    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow() != ShutdownState::Running
    }
}

/// What a metric task receives at spawn time
#[derive(Debug)]
pub struct TaskRegistration {
    pub token: CompletionToken,
    pub stop: StopSignal,
}

/// Tracks live tasks and drives the `Running -> Draining -> Terminated` lifecycle
pub struct ShutdownCoordinator {
    state: watch::Sender<ShutdownState>,
    // Template for completion tokens; taken when draining starts
    tokens: Option<mpsc::Sender<()>>,
    drained: Option<mpsc::Receiver<()>>,
    all_stopped: Option<oneshot::Sender<()>>,
    registered: usize,
    released: Arc<AtomicUsize>,
}

impl ShutdownCoordinator {
    /// Create a coordinator in the `Running` state
    pub fn new() -> (Self, AllStopped) {
        let (state, _) = watch::channel(ShutdownState::Running);
        let (tokens, drained) = mpsc::channel(1);
        let (all_stopped_tx, all_stopped_rx) = oneshot::channel();

        let coordinator = Self {
            state,
            tokens: Some(tokens),
            drained: Some(drained),
            all_stopped: Some(all_stopped_tx),
            registered: 0,
            released: Arc::new(AtomicUsize::new(0)),
        };

        (coordinator, all_stopped_rx)
    }

    /// Register a task, handing out its completion token and stop signal
    pub fn register(&mut self, name: impl Into<String>) -> Result<TaskRegistration> {
        let guard = self
            .tokens
            .as_ref()
            .ok_or_else(|| AgentError::Shutdown("Cannot register a task after shutdown began".to_string()))?
            .clone();

        self.registered += 1;

        Ok(TaskRegistration {
            token: CompletionToken {
                name: name.into(),
                released: Arc::clone(&self.released),
                _guard: guard,
            },
            stop: StopSignal {
                rx: self.state.subscribe(),
            },
        })
    }

    /// Move from `Running` to `Draining`
    ///
    /// Broadcasts stop to every task and starts waiting for their tokens.
    /// Returns `false` without doing anything if shutdown already began.
    pub fn begin_drain(&mut self) -> bool {
        let started = self.state.send_if_modified(|state| {
            if *state == ShutdownState::Running {
                *state = ShutdownState::Draining;
                true
            } else {
                false
            }
        });

        if !started {
            debug!("Shutdown already in progress, ignoring");
            return false;
        }

        info!(
            "Shutting down: waiting for {} of {} tasks",
            self.live(),
            self.registered
        );

        // Our own sender must go, or the watcher never sees the channel close
        self.tokens.take();

        if let (Some(mut drained), Some(all_stopped)) = (self.drained.take(), self.all_stopped.take()) {
            tokio::spawn(async move {
                // Nothing is ever sent; recv returns None once every token is dropped
                while drained.recv().await.is_some() {}
                let _ = all_stopped.send(());
            });
        }

        true
    }

    /// Move from `Draining` to `Terminated`
    pub fn mark_terminated(&mut self) {
        self.state.send_replace(ShutdownState::Terminated);
        info!("All {} tasks stopped", self.released());
    }

    pub fn state(&self) -> ShutdownState {
        *self.state.borrow()
    }

    /// Number of tasks registered so far
    pub fn registered(&self) -> usize {
        self.registered
    }

    /// Number of completion tokens released so far
    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// Tasks that still hold their token
    pub fn live(&self) -> usize {
        self.registered.saturating_sub(self.released())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_n_tasks_release_exactly_n_tokens() {
        for n in [0usize, 1, 7, 64] {
            let (mut coordinator, all_stopped) = ShutdownCoordinator::new();

            for i in 0..n {
                let TaskRegistration { token, mut stop } =
                    coordinator.register(format!("task-{}", i)).unwrap();
                tokio::spawn(async move {
                    stop.stopped().await;
                    drop(token);
                });
            }

            assert_eq!(coordinator.registered(), n);
            assert_eq!(coordinator.released(), 0);

            assert!(coordinator.begin_drain());
            timeout(Duration::from_secs(5), all_stopped)
                .await
                .expect("all-stopped never fired")
                .expect("all-stopped sender dropped");

            assert_eq!(coordinator.released(), n);
            assert_eq!(coordinator.live(), 0);
            coordinator.mark_terminated();
            assert_eq!(coordinator.state(), ShutdownState::Terminated);
        }
    }

    #[tokio::test]
    async fn test_second_drain_is_noop() {
        let (mut coordinator, mut all_stopped) = ShutdownCoordinator::new();
        let registration = coordinator.register("only").unwrap();

        assert!(coordinator.begin_drain());
        assert!(!coordinator.begin_drain());
        assert_eq!(coordinator.state(), ShutdownState::Draining);
        assert!(registration.stop.is_stopped());

        // Still waiting on the live token
        assert!(all_stopped.try_recv().is_err());

        drop(registration);
        timeout(Duration::from_secs(5), all_stopped)
            .await
            .unwrap()
            .unwrap();

        coordinator.mark_terminated();
        assert!(!coordinator.begin_drain());
        assert_eq!(coordinator.state(), ShutdownState::Terminated);
    }

    #[tokio::test]
    async fn test_register_after_drain_fails() {
        let (mut coordinator, _all_stopped) = ShutdownCoordinator::new();
        coordinator.begin_drain();

        assert!(matches!(coordinator.register("late"), Err(AgentError::Shutdown(_))));
    }

    #[tokio::test]
    async fn test_stop_signal_waits_for_drain() {
        let (mut coordinator, _all_stopped) = ShutdownCoordinator::new();
        let TaskRegistration { token: _token, mut stop } = coordinator.register("waiter").unwrap();

        assert!(!stop.is_stopped());
        assert!(timeout(Duration::from_millis(20), stop.stopped()).await.is_err());

        coordinator.begin_drain();
        timeout(Duration::from_secs(5), stop.stopped()).await.unwrap();
    }

    #[tokio::test]
    async fn test_dropped_coordinator_stops_tasks() {
        let (mut coordinator, _all_stopped) = ShutdownCoordinator::new();
        let TaskRegistration { token: _token, mut stop } = coordinator.register("orphan").unwrap();

        drop(coordinator);
        timeout(Duration::from_secs(5), stop.stopped()).await.unwrap();
    }
}
