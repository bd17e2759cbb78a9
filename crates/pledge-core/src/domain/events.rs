//! Domain events emitted after successful lifecycle mutations.
//!
//! # 設計
//! - イベントは「確定した事実」のみ。CAS が成功した書き込みごとに一度だけ
//!   発行されます（配送は at-least-once、購読者側で冪等に扱う）。
//! - EventId は ULID ベース（時刻でソート可能、分散生成可能）。
//!   Clock の時刻 + rand のエントロピーから生成します。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

use super::ids::{SubjectId, TaskId};

/// イベント識別子（ULID）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Ulid);

impl EventId {
    /// Generate an id whose timestamp half comes from the given clock time,
    /// so ids sort by emission time even under a test clock.
    pub fn generate(now: DateTime<Utc>) -> Self {
        let timestamp_ms = now.timestamp_millis().max(0) as u64;
        Self(Ulid::from_parts(timestamp_ms, rand::random()))
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "evt-{}", self.0)
    }
}

/// A fact about a subject's lifecycle.
///
/// Serialized with an explicit `kind` tag so listeners can route without
/// deserializing the whole payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LifecycleEvent {
    Activated {
        subject_id: SubjectId,
        activated_at: DateTime<Utc>,
        countdown_deadline: DateTime<Utc>,
    },

    PaymentCompleted {
        subject_id: SubjectId,
        amount: u64,
        transaction_ref: String,
    },

    TaskCompleted {
        subject_id: SubjectId,
        task_id: TaskId,
        completed: u32,
        total: u32,
    },

    ChallengeCompleted {
        subject_id: SubjectId,
        completed_at: DateTime<Utc>,
    },

    Reset {
        subject_id: SubjectId,
    },
}

impl LifecycleEvent {
    pub fn subject_id(&self) -> &SubjectId {
        match self {
            LifecycleEvent::Activated { subject_id, .. }
            | LifecycleEvent::PaymentCompleted { subject_id, .. }
            | LifecycleEvent::TaskCompleted { subject_id, .. }
            | LifecycleEvent::ChallengeCompleted { subject_id, .. }
            | LifecycleEvent::Reset { subject_id } => subject_id,
        }
    }
}

/// 配送用の封筒: イベント本体 + 識別子 + 記録時刻
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: EventId,
    pub recorded_at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: LifecycleEvent,
}

impl EventEnvelope {
    pub fn new(now: DateTime<Utc>, event: LifecycleEvent) -> Self {
        Self {
            event_id: EventId::generate(now),
            recorded_at: now,
            event,
        }
    }
}
