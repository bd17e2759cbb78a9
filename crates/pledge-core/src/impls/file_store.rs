//! JsonFileStateStore - 永続化する状態ストア
//!
//! # 実装詳細
//! - 全レコードを 1 つの JSON スナップショットファイルに保持する
//!   （BTreeMap なので出力は常に同じ並び）。
//! - 書き込みは temp ファイルに書いて fsync してから rename。途中で落ちても
//!   直前のスナップショットが残る。
//! - ファイル I/O はブロッキングなので `spawn_blocking` に逃がす
//!   （async コンテキストで std Mutex を使うため）。
//! - メモリ上の map が読み取りの正本。起動時にスナップショットから復元する。

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::domain::{LifecycleRecord, SubjectId};
use crate::ports::{StateStore, StoreError};

pub struct JsonFileStateStore {
    path: PathBuf,
    records: Arc<Mutex<BTreeMap<SubjectId, LifecycleRecord>>>,
}

impl JsonFileStateStore {
    /// Open (or create) the snapshot at `path` and load every record.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| StoreError::Unavailable(format!("create state dir: {e}")))?;
        }

        let records = if path.exists() {
            let bytes = fs::read(&path)
                .map_err(|e| StoreError::Unavailable(format!("read snapshot: {e}")))?;
            serde_json::from_slice(&bytes)
                .map_err(|e| StoreError::Unavailable(format!("decode snapshot: {e}")))?
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path,
            records: Arc::new(Mutex::new(records)),
        })
    }

    /// Serialize the map and atomically replace the snapshot file.
    fn persist(
        path: &PathBuf,
        records: &BTreeMap<SubjectId, LifecycleRecord>,
    ) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(records)
            .map_err(|e| StoreError::Unavailable(format!("encode snapshot: {e}")))?;

        let tmp = path.with_extension("json.tmp");
        let mut file = fs::File::create(&tmp)
            .map_err(|e| StoreError::Unavailable(format!("create temp snapshot: {e}")))?;
        file.write_all(&bytes)
            .and_then(|_| file.sync_all())
            .map_err(|e| StoreError::Unavailable(format!("write snapshot: {e}")))?;
        fs::rename(&tmp, path)
            .map_err(|e| StoreError::Unavailable(format!("replace snapshot: {e}")))
    }
}

#[async_trait]
impl StateStore for JsonFileStateStore {
    async fn get(&self, subject_id: &SubjectId) -> Result<LifecycleRecord, StoreError> {
        let records = self.records.lock().expect("state map poisoned");
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
        let path = self.path.clone();
        let records = Arc::clone(&self.records);

        tokio::task::spawn_blocking(move || {
            let mut records = records.lock().expect("state map poisoned");
            let current_version = records.get(&record.subject_id).map_or(0, |r| r.version);
            if current_version != expected_version {
                return Err(StoreError::VersionConflict(record.subject_id.clone()));
            }

            // version check and durable write happen under the same lock,
            // so no other writer can slip in between
            records.insert(record.subject_id.clone(), record);
            Self::persist(&path, &records)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("storage task failed: {e}")))?
    }

    async fn put(&self, record: LifecycleRecord) -> Result<(), StoreError> {
        let path = self.path.clone();
        let records = Arc::clone(&self.records);

        tokio::task::spawn_blocking(move || {
            let mut records = records.lock().expect("state map poisoned");
            records.insert(record.subject_id.clone(), record);
            Self::persist(&path, &records)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("storage task failed: {e}")))?
    }
}
