//! Message storage interface.
//!
//! The orchestrator never persists anything; callers such as the
//! [`Poller`](crate::poller::Poller) read pending messages from a store
//! and save them back after classification.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use thiserror::Error;
use triage_core::Message;

/// Errors from a message store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Message {0} not found")]
    NotFound(i64),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Source and sink for messages awaiting classification.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Up to `limit` messages still carrying the unlabelled tag.
    async fn pending(&self, limit: usize) -> Result<Vec<Message>, StoreError>;

    /// Persist a message's current state.
    async fn save(&self, message: &Message) -> Result<(), StoreError>;
}

/// In-memory store ordered by message id.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    messages: RwLock<BTreeMap<i64, Message>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_messages(messages: impl IntoIterator<Item = Message>) -> Self {
        Self {
            messages: RwLock::new(messages.into_iter().map(|m| (m.id, m)).collect()),
        }
    }

    pub fn get(&self, id: i64) -> Option<Message> {
        self.messages.read().get(&id).cloned()
    }

    /// Every stored message, by id.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.messages.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.read().is_empty()
    }
}

#[async_trait]
impl MessageStore for InMemoryStore {
    /// Never-classified messages come first, then ones a fallback left
    /// unlabelled, each group by id.
    async fn pending(&self, limit: usize) -> Result<Vec<Message>, StoreError> {
        let messages = self.messages.read();
        let mut pending: Vec<&Message> = messages.values().filter(|m| m.is_unlabeled()).collect();
        pending.sort_by_key(|m| (m.tier.is_some(), m.id));
        Ok(pending.into_iter().take(limit).cloned().collect())
    }

    async fn save(&self, message: &Message) -> Result<(), StoreError> {
        let mut messages = self.messages.write();
        match messages.get_mut(&message.id) {
            Some(slot) => {
                *slot = message.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(message.id)),
        }
    }
}
