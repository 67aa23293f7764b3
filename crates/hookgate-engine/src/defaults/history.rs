//! In-memory history sink for tests and lightweight usage.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use crate::errors::HistoryError;
use crate::history::{HistoryEntry, HistoryUpdate};
use crate::traits::HistorySink;

/// Accumulates audit entries in memory, retrievable for assertions and
/// for feeding `replay`.
#[derive(Default)]
pub struct InMemoryHistorySink {
    entries: RwLock<Vec<HistoryEntry>>,
}

impl InMemoryHistorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All entries, in creation order.
    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.read().clone()
    }

    pub fn get(&self, id: &str) -> Option<HistoryEntry> {
        self.entries.read().iter().find(|e| e.id == id).cloned()
    }
}

#[async_trait]
impl HistorySink for InMemoryHistorySink {
    async fn record(&self, update: HistoryUpdate) -> Result<String, HistoryError> {
        let mut entries = self.entries.write();
        let now = Utc::now();

        let id = match update.history_id.as_deref().filter(|id| !id.is_empty()) {
            Some(id) => id.to_string(),
            None => uuid::Uuid::new_v4().to_string(),
        };

        if let Some(entry) = entries.iter_mut().find(|e| e.id == id) {
            entry.step = update.step;
            if update.event.is_some() {
                entry.event = update.event;
            }
            if update.url.is_some() {
                entry.url = update.url;
            }
            if update.data.is_some() {
                entry.data = update.data;
            }
            entry.error |= update.error;
            entry.finished |= update.finished;
            entry.updated_at = now;
        } else {
            entries.push(HistoryEntry {
                id: id.clone(),
                integration_id: update.integration_id,
                step: update.step,
                event: update.event,
                url: update.url,
                data: update.data,
                error: update.error,
                finished: update.finished,
                created_at: now,
                updated_at: now,
            });
        }

        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::HistoryStep;

    fn update(step: HistoryStep) -> HistoryUpdate {
        HistoryUpdate {
            history_id: None,
            integration_id: "i1".into(),
            step,
            event: None,
            url: None,
            trigger_word: None,
            data: None,
            http_call_data: None,
            http_result: None,
            http_error: None,
            sent_message: None,
            retry: None,
            error: false,
            finished: false,
        }
    }

    #[tokio::test]
    async fn empty_id_allocates_an_entry() {
        let sink = InMemoryHistorySink::new();
        let id = sink
            .record(update(HistoryStep::StartExecuteTriggerUrl))
            .await
            .expect("record");
        assert!(!id.is_empty());
        assert_eq!(sink.entries().len(), 1);
    }

    #[tokio::test]
    async fn subsequent_updates_accumulate() {
        let sink = InMemoryHistorySink::new();
        let id = sink
            .record(update(HistoryStep::StartExecuteTriggerUrl))
            .await
            .expect("record");

        let mut second = update(HistoryStep::TooManyRetries);
        second.history_id = Some(id.clone());
        second.error = true;
        let same = sink.record(second).await.expect("record");

        assert_eq!(same, id);
        assert_eq!(sink.entries().len(), 1);
        let entry = sink.get(&id).expect("entry");
        assert_eq!(entry.step, HistoryStep::TooManyRetries);
        assert!(entry.error);
    }
}
