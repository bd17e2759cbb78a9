//! In-memory state store (tests and development).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{LifecycleRecord, SubjectId};
use crate::ports::{StateStore, StoreError};

/// In-memory StateStore implementation.
///
/// Design:
/// - One tokio Mutex guards the whole map; version check and swap happen
///   under the same lock acquisition, so the CAS is atomic.
/// - The lock is never held across an await into caller code.
#[derive(Default)]
pub struct InMemoryStateStore {
    records: Arc<Mutex<HashMap<SubjectId, LifecycleRecord>>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn get(&self, subject_id: &SubjectId) -> Result<LifecycleRecord, StoreError> {
        let records = self.records.lock().await;
        records
            .get(subject_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(subject_id.clone()))
    }

    async fn compare_and_swap(
        &self,
        expected_version: u64,
        record: LifecycleRecord,
    ) -> Result<(), StoreError> {
        let mut records = self.records.lock().await;
        let current_version = records.get(&record.subject_id).map_or(0, |r| r.version);
        if current_version != expected_version {
            return Err(StoreError::VersionConflict(record.subject_id.clone()));
        }
        records.insert(record.subject_id.clone(), record);
        Ok(())
    }

    async fn put(&self, record: LifecycleRecord) -> Result<(), StoreError> {
        let mut records = self.records.lock().await;
        records.insert(record.subject_id.clone(), record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(subject: &str) -> LifecycleRecord {
        LifecycleRecord::new(SubjectId::new(subject), 3)
    }

    #[tokio::test]
    async fn get_unknown_subject_is_not_found() {
        let store = InMemoryStateStore::new();
        let err = store.get(&SubjectId::new("nobody")).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn cas_with_version_zero_creates_exactly_once() {
        let store = InMemoryStateStore::new();
        // the guard always writes expected_version + 1
        let first_write = LifecycleRecord {
            version: 1,
            ..record("s")
        };

        store.compare_and_swap(0, first_write.clone()).await.unwrap();
        assert_eq!(
            store.get(&first_write.subject_id).await.unwrap(),
            first_write
        );

        // a concurrent creator that also read "absent" loses
        let err = store.compare_and_swap(0, first_write).await.unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict(_)));
    }

    #[tokio::test]
    async fn cas_detects_stale_version() {
        let store = InMemoryStateStore::new();
        let fresh = record("s");
        store.put(fresh.clone()).await.unwrap();

        let next = LifecycleRecord {
            version: 1,
            ..fresh.clone()
        };
        store.compare_and_swap(0, next).await.unwrap();

        // stale writer still expects version 0
        let stale = LifecycleRecord {
            version: 1,
            ..fresh
        };
        let err = store.compare_and_swap(0, stale).await.unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict(_)));
    }

    #[tokio::test]
    async fn put_is_last_writer_wins() {
        let store = InMemoryStateStore::new();
        let fresh = record("s");
        let advanced = LifecycleRecord {
            version: 5,
            ..fresh.clone()
        };
        store.put(advanced).await.unwrap();

        // administrative overwrite back to a fresh record, no version check
        store.put(fresh.clone()).await.unwrap();
        assert_eq!(store.get(&fresh.subject_id).await.unwrap().version, 0);
    }
}
