//! In-memory registry of download records.
//!
//! The registry is the only state shared between download tasks, query
//! handlers, the notifier and the retention purge. Each record has exactly
//! one writer (its download task), so the map-level locking of `DashMap` is
//! all the synchronization needed.

use std::collections::BTreeMap;

use dashmap::DashMap;
use tracing::debug;

use super::record::DownloadRecord;

/// Concurrency-safe map from download id to [`DownloadRecord`].
///
/// Designed to be wrapped in `Arc` and shared across Tokio tasks.
#[derive(Debug, Default)]
pub struct DownloadRegistry {
    records: DashMap<String, DownloadRecord>,
}

impl DownloadRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a record, replacing any record with the same id.
    pub fn insert(&self, record: DownloadRecord) {
        debug!(download_id = %record.id, "registering download record");
        self.records.insert(record.id.clone(), record);
    }

    /// Returns a snapshot of one record.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<DownloadRecord> {
        self.records.get(id).map(|entry| entry.value().clone())
    }

    /// Returns true if a record with this id exists.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    /// Applies `mutate` to a non-terminal record.
    ///
    /// Returns `false` when the record is missing or already terminal; terminal
    /// records are frozen until purged.
    pub fn update<F>(&self, id: &str, mutate: F) -> bool
    where
        F: FnOnce(&mut DownloadRecord),
    {
        let Some(mut entry) = self.records.get_mut(id) else {
            return false;
        };
        if entry.status.is_terminal() {
            debug!(download_id = %id, status = %entry.status, "ignoring update to terminal record");
            return false;
        }
        mutate(entry.value_mut());
        true
    }

    /// Removes a record only if it has reached a terminal state.
    pub fn remove_terminal(&self, id: &str) -> bool {
        self.records
            .remove_if(id, |_, record| record.status.is_terminal())
            .is_some()
    }

    /// Returns a snapshot of every record, ordered by id.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, DownloadRecord> {
        self.records
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
