//! StateStore port - ライフサイクルレコードの正本（source of truth）
//!
//! StateStore は subject ごとに 1 件の LifecycleRecord を、バージョン付きで
//! 永続化します。
//!
//! # 設計原則
//! - 書き込みは LifecycleEngine（TransitionGuard 経由）だけが行う。
//!   他のコンポーネントは読み取り専用の観測者。
//! - 楽観的並行制御: `compare_and_swap` がバージョン一致を検証する。
//!   store 側はロックを外に出さない。
//! - 再起動後の `get` は書き込んだレコードと field-for-field で一致する
//!   （countdown_deadline は絶対時刻のまま、再計算しない）。

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{LifecycleRecord, SubjectId};

/// Storage-layer failure. Never surfaced to external collaborators as-is;
/// the engine maps it into the operation taxonomy.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no record for subject {0}")]
    NotFound(SubjectId),

    #[error("version mismatch for subject {0}")]
    VersionConflict(SubjectId),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// StateStore は subject ごとのレコードを管理
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Fetch the current record for a subject.
    async fn get(&self, subject_id: &SubjectId) -> Result<LifecycleRecord, StoreError>;

    /// Write `record` iff the stored version still equals `expected_version`.
    ///
    /// Convention: an absent record has version 0, so a CAS with
    /// `expected_version == 0` creates the record if (and only if) no
    /// concurrent writer got there first. This is what makes the first
    /// transition of a fresh subject exactly-once.
    async fn compare_and_swap(
        &self,
        expected_version: u64,
        record: LifecycleRecord,
    ) -> Result<(), StoreError>;

    /// Unconditional write (last-writer-wins). Administrative use only
    /// (`reset`); every lifecycle transition goes through `compare_and_swap`.
    async fn put(&self, record: LifecycleRecord) -> Result<(), StoreError>;
}
