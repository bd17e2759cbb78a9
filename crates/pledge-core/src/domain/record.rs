//! Lifecycle record: the single source of truth for one subject.
//!
//! Design:
//! - One record per subject; all state transitions happen via methods here.
//! - The consuming `into_*` methods validate their precondition, apply the
//!   mutation, and bump `version` by exactly one. Callers persist the
//!   returned record through the transition guard; nothing mutates in place.
//! - Timestamps are absolute (`DateTime<Utc>`) so a restart replays nothing:
//!   the persisted countdown deadline is never recomputed from "now".

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::countdown;
use super::errors::{EngineError, Precondition};
use super::ids::{SubjectId, TaskId};
use super::state::LifecycleState;

/// Snapshot of challenge-task progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskProgress {
    pub completed: u32,
    pub total: u32,
}

impl TaskProgress {
    pub fn is_complete(self) -> bool {
        self.completed >= self.total
    }
}

/// Result of folding a task-completion report into the record.
#[derive(Debug, Clone)]
pub enum TaskReport {
    /// New task id; the returned record carries it (version bumped).
    Recorded(LifecycleRecord),

    /// The task id was already present. Silent no-op, no version bump.
    Duplicate,

    /// The completion set is already at `task_total`. Silent no-op.
    AtCapacity,
}

/// LifecycleRecord は subject 一件のライフサイクル正本
///
/// # Invariants
/// - 状態遷移は単調（Pending→AwaitingPayment→Active）。reset だけが例外で、
///   新しい初期レコードとして扱う。
/// - `countdown_deadline` は一度設定したら不変。
/// - `completed_task_ids` は重複なし・`task_total` 以下。
/// - `version` は変異が成功するたびに +1。衝突検出はこれだけで行う。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleRecord {
    pub subject_id: SubjectId,
    pub state: LifecycleState,
    pub activated_at: Option<DateTime<Utc>>,
    pub countdown_deadline: Option<DateTime<Utc>>,

    /// Minor currency units (e.g. cents). Exact integer arithmetic.
    pub payment_amount: Option<u64>,
    pub transaction_ref: Option<String>,

    /// BTreeSet keeps the persisted snapshot sorted and byte-stable.
    pub completed_task_ids: BTreeSet<TaskId>,
    pub task_total: u32,

    pub challenge_completed_at: Option<DateTime<Utc>>,

    /// CAS token. An absent record counts as version 0.
    pub version: u64,
}

impl LifecycleRecord {
    /// Fresh record: Pending, nothing derived, version 0.
    pub fn new(subject_id: SubjectId, task_total: u32) -> Self {
        Self {
            subject_id,
            state: LifecycleState::Pending,
            activated_at: None,
            countdown_deadline: None,
            payment_amount: None,
            transaction_ref: None,
            completed_task_ids: BTreeSet::new(),
            task_total,
            challenge_completed_at: None,
            version: 0,
        }
    }

    /// ガード用: 期待する状態でなければ PreconditionFailed
    pub fn require_state(&self, expected: LifecycleState) -> Result<(), EngineError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(EngineError::wrong_state(expected, self.state))
        }
    }

    pub fn progress(&self) -> TaskProgress {
        TaskProgress {
            completed: self.completed_task_ids.len() as u32,
            total: self.task_total,
        }
    }

    /// Pending -> AwaitingPayment. Sets activation time and the countdown
    /// deadline (immutable from here on).
    pub fn into_awaiting_payment(
        self,
        activated_at: DateTime<Utc>,
        countdown_deadline: DateTime<Utc>,
    ) -> Result<Self, EngineError> {
        self.require_state(LifecycleState::Pending)?;
        Ok(Self {
            state: LifecycleState::AwaitingPayment,
            activated_at: Some(activated_at),
            countdown_deadline: Some(countdown_deadline),
            version: self.version + 1,
            ..self
        })
    }

    /// AwaitingPayment -> Active. Records the captured amount and the
    /// processor's transaction reference.
    pub fn into_active(
        self,
        payment_amount: u64,
        transaction_ref: String,
    ) -> Result<Self, EngineError> {
        self.require_state(LifecycleState::AwaitingPayment)?;
        Ok(Self {
            state: LifecycleState::Active,
            payment_amount: Some(payment_amount),
            transaction_ref: Some(transaction_ref),
            version: self.version + 1,
            ..self
        })
    }

    /// Fold one task-completion report in. Duplicates and reports past
    /// `task_total` are no-ops, not errors.
    pub fn with_task_completed(mut self, task_id: TaskId) -> TaskReport {
        if self.completed_task_ids.contains(&task_id) {
            return TaskReport::Duplicate;
        }
        if self.completed_task_ids.len() as u32 >= self.task_total {
            return TaskReport::AtCapacity;
        }
        self.completed_task_ids.insert(task_id);
        self.version += 1;
        TaskReport::Recorded(self)
    }

    /// Record the terminal challenge milestone. The state stays Active;
    /// only the flag is set, exactly once.
    pub fn into_challenge_completed(self, now: DateTime<Utc>) -> Result<Self, EngineError> {
        self.require_state(LifecycleState::Active)?;
        if self.challenge_completed_at.is_some() {
            return Err(EngineError::AlreadyCompleted);
        }
        if !countdown::is_expired(&self, now) {
            return Err(EngineError::PreconditionFailed(
                Precondition::CountdownNotExpired,
            ));
        }
        let progress = self.progress();
        if !progress.is_complete() {
            return Err(EngineError::PreconditionFailed(
                Precondition::TasksIncomplete {
                    completed: progress.completed,
                    total: progress.total,
                },
            ));
        }
        Ok(Self {
            challenge_completed_at: Some(now),
            version: self.version + 1,
            ..self
        })
    }
}
