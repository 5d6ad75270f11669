use std::sync::Arc;

use anyhow::Context;
use chrono::{Local, Utc};
use log::{info, warn};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::db::KeyValueStore;

use super::{
    export::entries_to_csv,
    models::{parse_mark, validate_student_id, Entry, ValidationError},
};

/// Storage key holding the JSON array of entries.
pub const ENTRIES_KEY: &str = "autoEntries";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Error)]
pub enum RecordError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("failed to persist entries: {0:#}")]
    Storage(#[source] anyhow::Error),
}

/// Newest-first list of saved entries, written through to key-value storage
/// on every mutation.
#[derive(Clone)]
pub struct RecordStore {
    storage: Arc<dyn KeyValueStore>,
    entries: Arc<RwLock<Vec<Entry>>>,
}

impl RecordStore {
    /// Load entries from storage. Missing or unreadable data yields an empty store.
    pub async fn load(storage: Arc<dyn KeyValueStore>) -> Self {
        let entries = match storage.get(ENTRIES_KEY).await {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<Entry>>(&raw) {
                Ok(entries) => entries,
                Err(err) => {
                    warn!("Stored entries are malformed, starting empty: {err}");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(err) => {
                warn!("Failed to read stored entries, starting empty: {err:#}");
                Vec::new()
            }
        };

        info!("Loaded {} saved entries", entries.len());

        Self {
            storage,
            entries: Arc::new(RwLock::new(entries)),
        }
    }

    /// Validate and prepend a new entry, then persist the whole list.
    pub async fn append(&self, student_id: &str, mark: &str) -> Result<Entry, RecordError> {
        let student_id = validate_student_id(student_id)?;
        let mark = parse_mark(mark)?;

        let mut entries = self.entries.write().await;

        let now_ms = Utc::now().timestamp_millis();
        let id = match entries.first() {
            Some(latest) if latest.id >= now_ms => latest.id + 1,
            _ => now_ms,
        };

        let entry = Entry {
            id,
            student_id: student_id.to_string(),
            mark,
            timestamp: Local::now().format(TIMESTAMP_FORMAT).to_string(),
        };

        entries.insert(0, entry.clone());

        if let Err(err) = self.persist(&entries).await {
            entries.remove(0);
            return Err(RecordError::Storage(err));
        }

        info!(
            "Saved entry {} for student {} (mark {})",
            entry.id, entry.student_id, entry.mark
        );

        Ok(entry)
    }

    pub async fn entries(&self) -> Vec<Entry> {
        self.entries.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Header row plus one unquoted row per entry, in store order.
    pub async fn to_csv(&self) -> anyhow::Result<String> {
        let entries = self.entries.read().await;
        entries_to_csv(&entries)
    }

    async fn persist(&self, entries: &[Entry]) -> anyhow::Result<()> {
        let serialized = serde_json::to_string(entries).context("failed to serialize entries")?;
        self.storage.set(ENTRIES_KEY, serialized).await
    }
}
