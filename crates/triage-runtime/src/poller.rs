//! Periodic classification of pending messages.
//!
//! Every tick takes a bounded slice of unlabelled messages from the store,
//! runs it through the orchestrator and saves each message back. The
//! poller shares the orchestrator's limiter and breaker with every other
//! caller.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::PollerConfig;
use crate::orchestrator::Orchestrator;
use crate::store::{MessageStore, StoreError};

/// Errors from a poll tick.
#[derive(Error, Debug)]
pub enum PollerError {
    #[error("Failed to read pending messages: {0}")]
    Store(#[from] StoreError),
}

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub classified: usize,
    pub saved: usize,
    pub fallbacks: usize,
}

/// Timer-driven caller of [`Orchestrator::classify_batch`].
pub struct Poller {
    orchestrator: Arc<Orchestrator>,
    store: Arc<dyn MessageStore>,
    config: PollerConfig,
}

impl Poller {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        store: Arc<dyn MessageStore>,
        config: PollerConfig,
    ) -> Self {
        Self {
            orchestrator,
            store,
            config,
        }
    }

    /// Run one poll cycle.
    ///
    /// A failed save is logged and does not stop the remaining saves.
    pub async fn tick(&self) -> Result<TickReport, PollerError> {
        let pending = self.store.pending(self.config.max_per_tick).await?;
        if pending.is_empty() {
            tracing::debug!("No pending messages");
            return Ok(TickReport::default());
        }

        let classified = self.orchestrator.classify_batch(pending).await;
        let mut report = TickReport {
            classified: classified.len(),
            ..Default::default()
        };

        for item in &classified {
            if item.result.source.is_fallback() {
                report.fallbacks += 1;
            }
            match self.store.save(&item.message).await {
                Ok(()) => report.saved += 1,
                Err(e) => tracing::error!(
                    message_id = item.message.id,
                    error = %e,
                    "Failed to save classified message"
                ),
            }
        }

        Ok(report)
    }

    /// Tick every `interval` until `shutdown` turns true or its sender is dropped.
    ///
    /// The first tick runs immediately.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            interval = %humantime::format_duration(self.config.interval),
            max_per_tick = self.config.max_per_tick,
            "Poller started"
        );

        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                _ = interval.tick() => {}
            }

            match self.tick().await {
                Ok(report) if report.classified > 0 => tracing::info!(
                    classified = report.classified,
                    saved = report.saved,
                    fallbacks = report.fallbacks,
                    "Poll cycle complete"
                ),
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Poll cycle failed"),
            }
        }

        tracing::info!("Poller stopped");
    }

    /// Run the poller on its own task.
    pub fn spawn(self) -> PollerHandle {
        let (tx, rx) = watch::channel(false);
        let join = tokio::spawn(async move { self.run(rx).await });
        PollerHandle { shutdown: tx, join }
    }
}

/// Handle to a spawned poller.
pub struct PollerHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl PollerHandle {
    /// Stop after the cycle in progress, if any, and wait for the task.
    pub async fn shutdown(self) -> Result<(), tokio::task::JoinError> {
        let _ = self.shutdown.send(true);
        self.join.await
    }
}
