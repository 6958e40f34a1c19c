//! Processed-event ledger used to deduplicate provider webhooks.

use crate::error::EsignError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

/// One provider event that has been applied (or deliberately discarded).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedEvent {
    pub provider_event_id: String,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    Inserted,
    AlreadyProcessed,
}

/// Append-only set of processed provider event ids.
///
/// `try_mark_processed` is the single atomic dedup point: exactly one caller observes
/// `Inserted` for a given id.
#[async_trait]
pub trait ProcessedEventStore: Send + Sync {
    async fn try_mark_processed(
        &self,
        provider_event_id: &str,
        received_at: DateTime<Utc>,
    ) -> Result<MarkOutcome, EsignError>;

    async fn contains(&self, provider_event_id: &str) -> Result<bool, EsignError>;
}

#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    events: Mutex<HashMap<String, ProcessedEvent>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|events| events.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ProcessedEventStore for InMemoryEventStore {
    async fn try_mark_processed(
        &self,
        provider_event_id: &str,
        received_at: DateTime<Utc>,
    ) -> Result<MarkOutcome, EsignError> {
        let mut events = self
            .events
            .lock()
            .map_err(|_| EsignError::Storage("event ledger lock poisoned".to_string()))?;

        if events.contains_key(provider_event_id) {
            return Ok(MarkOutcome::AlreadyProcessed);
        }

        events.insert(
            provider_event_id.to_string(),
            ProcessedEvent {
                provider_event_id: provider_event_id.to_string(),
                received_at,
            },
        );
        Ok(MarkOutcome::Inserted)
    }

    async fn contains(&self, provider_event_id: &str) -> Result<bool, EsignError> {
        let events = self
            .events
            .lock()
            .map_err(|_| EsignError::Storage("event ledger lock poisoned".to_string()))?;
        Ok(events.contains_key(provider_event_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn marks_each_event_once() {
        let store = InMemoryEventStore::new();
        let now = Utc::now();

        assert_eq!(
            store.try_mark_processed("evt-1", now).await.unwrap(),
            MarkOutcome::Inserted
        );
        assert_eq!(
            store.try_mark_processed("evt-1", now).await.unwrap(),
            MarkOutcome::AlreadyProcessed
        );
        assert!(store.contains("evt-1").await.unwrap());
        assert!(!store.contains("evt-2").await.unwrap());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_marks_have_one_winner() {
        let store = Arc::new(InMemoryEventStore::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.try_mark_processed("evt-race", Utc::now()).await.unwrap()
            }));
        }

        let mut inserted = 0;
        for handle in handles {
            if handle.await.unwrap() == MarkOutcome::Inserted {
                inserted += 1;
            }
        }
        assert_eq!(inserted, 1);
    }
}
