//! Outcome notification sinks.
//!
//! The orchestrator hands every batch of outcomes to a [`NotificationSink`]
//! once the batch is done. Delivery is fire-and-forget: a sink never
//! fails the classification that produced its events.

use std::collections::BTreeMap;
use tokio::sync::broadcast;
use triage_core::{ClassificationEvent, Tier};

/// Receiver of classification outcomes.
pub trait NotificationSink: Send + Sync {
    /// Called once per batch with every event of the batch.
    fn notify_batch(&self, events: &[ClassificationEvent]);

    /// Called for single-message classification.
    fn notify_one(&self, event: &ClassificationEvent);
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl NotificationSink for NullSink {
    fn notify_batch(&self, _events: &[ClassificationEvent]) {}

    fn notify_one(&self, _event: &ClassificationEvent) {}
}

/// Sink that writes outcomes as structured log lines.
///
/// A batch produces one summary line with per-tier counts, one line per
/// event, and an alert line when any message is `VERY_IMPORTANT`.
#[derive(Debug, Clone)]
pub struct TracingSink {
    enabled: bool,
}

impl TracingSink {
    pub fn new() -> Self {
        Self { enabled: true }
    }

    /// Create a sink that stays silent.
    pub fn disabled() -> Self {
        Self { enabled: false }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl Default for TracingSink {
    fn default() -> Self {
        Self::new()
    }
}

/// Count events per tier, most urgent first.
pub fn tier_counts(events: &[ClassificationEvent]) -> BTreeMap<Tier, usize> {
    let mut counts = BTreeMap::new();
    for event in events {
        *counts.entry(event.tier).or_insert(0) += 1;
    }
    counts
}

impl NotificationSink for TracingSink {
    fn notify_batch(&self, events: &[ClassificationEvent]) {
        if !self.enabled || events.is_empty() {
            return;
        }

        let counts = tier_counts(events);
        let count = |tier: Tier| counts.get(&tier).copied().unwrap_or(0);
        tracing::info!(
            total = events.len(),
            very_important = count(Tier::VeryImportant),
            important = count(Tier::Important),
            informative = count(Tier::Informative),
            recurrent = count(Tier::Recurrent),
            "Classified notification batch"
        );

        for event in events {
            self.notify_one(event);
        }

        let critical = count(Tier::VeryImportant);
        if critical > 0 {
            tracing::warn!(critical, "Critical tax notifications need attention");
        }
    }

    fn notify_one(&self, event: &ClassificationEvent) {
        if !self.enabled {
            return;
        }

        tracing::info!(
            tier = %event.tier,
            tag_code = %event.tag_code,
            tag_name = %event.tag_name,
            sender = %event.sender,
            subject = %event.subject,
            reason = %event.reason,
            "Notification classified"
        );
    }
}

/// Sink that republishes outcomes on a tokio broadcast channel.
///
/// Send errors (no live receivers) are ignored.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    sender: broadcast::Sender<ClassificationEvent>,
}

impl BroadcastSink {
    /// Create a sink and its channel with room for `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClassificationEvent> {
        self.sender.subscribe()
    }
}

impl NotificationSink for BroadcastSink {
    fn notify_batch(&self, events: &[ClassificationEvent]) {
        for event in events {
            let _ = self.sender.send(event.clone());
        }
    }

    fn notify_one(&self, event: &ClassificationEvent) {
        let _ = self.sender.send(event.clone());
    }
}
