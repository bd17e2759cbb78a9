//! TransitionGuard - 遷移の exactly-once 適用
//!
//! # 流れ
//! 1. StateStore からレコードを読む（このときのバージョンが CAS の期待値）
//! 2. transition クロージャが前提条件を検証し、外部副作用を実行し、
//!    次のレコードとイベントを返す
//! 3. 手順 1 のバージョンで CAS する
//!
//! # 設計原則
//! - CAS に負けても再試行しない。クロージャ内の副作用（決済キャプチャ等）は
//!   冪等とは限らず、盲目的な再実行は副作用を重複させるため。
//! - 副作用が完了した後で CAS に負けた場合、それは握り潰してよい競合ではなく
//!   Indeterminate（照合が必要）。遷移側が SideEffect で自己申告する。
//! - CAS が成功した書き込みごとに、イベントをちょうど一度発行する。

use std::future::Future;
use std::sync::Arc;

use crate::domain::{EngineError, EventEnvelope, LifecycleEvent, LifecycleRecord, SubjectId};
use crate::ports::{Clock, EventSink, StateStore, StoreError};

/// What kind of external side effect the transition closure performed.
///
/// Decides how a lost CAS is reported:
/// - `None` / `Repeatable` -> `Conflict` (nothing was lost, or the provider
///   call is keyed by subject and harmless to lose)
/// - `Committed` -> `Indeterminate` (a non-idempotent capture happened; the
///   caller must reconcile, not retry)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffect {
    None,
    Repeatable,
    Committed,
}

/// Outcome of a transition closure.
pub enum Step<T> {
    /// Persist `record`, emit `event`, answer the caller with `value`.
    Commit {
        record: LifecycleRecord,
        event: LifecycleEvent,
        effect: SideEffect,
        value: T,
    },

    /// Nothing to persist (idempotent no-op). No write, no event.
    Skip { value: T },
}

/// Applies transitions with optimistic concurrency.
#[derive(Clone)]
pub struct TransitionGuard {
    store: Arc<dyn StateStore>,
    sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
}

impl TransitionGuard {
    pub fn new(store: Arc<dyn StateStore>, sink: Arc<dyn EventSink>, clock: Arc<dyn Clock>) -> Self {
        Self { store, sink, clock }
    }

    /// Apply a transition to an existing record. Unknown subject -> NotFound.
    pub async fn attempt<T, F, Fut>(
        &self,
        subject_id: &SubjectId,
        transition: F,
    ) -> Result<T, EngineError>
    where
        F: FnOnce(LifecycleRecord) -> Fut,
        Fut: Future<Output = Result<Step<T>, EngineError>> + Send,
    {
        let current = match self.store.get(subject_id).await {
            Ok(record) => record,
            Err(StoreError::NotFound(id)) => return Err(EngineError::NotFound(id)),
            Err(_) => return Err(read_unavailable()),
        };
        self.run(current, transition).await
    }

    /// Like `attempt`, but an unknown subject starts from `init()`: the
    /// implicit Pending/version-0 record of a first interaction. The CAS
    /// then expects version 0, i.e. create-if-absent.
    pub async fn attempt_or_init<T, F, Fut>(
        &self,
        subject_id: &SubjectId,
        init: impl FnOnce() -> LifecycleRecord,
        transition: F,
    ) -> Result<T, EngineError>
    where
        F: FnOnce(LifecycleRecord) -> Fut,
        Fut: Future<Output = Result<Step<T>, EngineError>> + Send,
    {
        let current = match self.store.get(subject_id).await {
            Ok(record) => record,
            Err(StoreError::NotFound(_)) => init(),
            Err(_) => return Err(read_unavailable()),
        };
        self.run(current, transition).await
    }

    async fn run<T, F, Fut>(&self, current: LifecycleRecord, transition: F) -> Result<T, EngineError>
    where
        F: FnOnce(LifecycleRecord) -> Fut,
        Fut: Future<Output = Result<Step<T>, EngineError>> + Send,
    {
        // the version captured here, before any side effect, is the CAS token
        let expected_version = current.version;
        let subject_id = current.subject_id.clone();

        match transition(current).await? {
            Step::Skip { value } => Ok(value),
            Step::Commit {
                record,
                event,
                effect,
                value,
            } => {
                debug_assert_eq!(record.version, expected_version + 1);
                match self.store.compare_and_swap(expected_version, record).await {
                    Ok(()) => {
                        self.publish(event).await;
                        Ok(value)
                    }
                    Err(StoreError::VersionConflict(_)) => {
                        tracing::debug!(subject = %subject_id, "transition lost the version race");
                        Err(lost_write(effect, "a concurrent update raced a committed side effect"))
                    }
                    Err(_) => Err(lost_write(
                        effect,
                        "the durable write failed after a committed side effect",
                    )),
                }
            }
        }
    }

    /// Emit one event. Delivery failure must not fail a transition whose
    /// write already committed, so it is only logged.
    pub async fn publish(&self, event: LifecycleEvent) {
        let envelope = EventEnvelope::new(self.clock.now(), event);
        if let Err(error) = self.sink.emit(envelope).await {
            tracing::warn!(%error, "event delivery failed");
        }
    }
}

fn read_unavailable() -> EngineError {
    // storage details stay internal; callers only learn the call is retryable
    EngineError::Provider("state is temporarily unavailable".to_string())
}

fn lost_write(effect: SideEffect, committed_reason: &str) -> EngineError {
    match effect {
        SideEffect::Committed => {
            EngineError::Indeterminate(format!("{committed_reason}; reconcile before retrying"))
        }
        SideEffect::None | SideEffect::Repeatable => EngineError::Conflict,
    }
}
