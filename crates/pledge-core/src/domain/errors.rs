//! Error taxonomy for lifecycle operations.
//!
//! # 分類
//! - PreconditionFailed: 状態・期限・タスク進捗のガード不成立（再試行無意味）
//! - Conflict: 楽観的並行制御の負け（再試行はしない方針）
//! - Provider: 外部呼び出しの失敗（副作用前なら再試行可）
//! - Declined: ビジネス上の拒否（決済拒否など）
//! - Indeterminate: 結果不明（タイムアウト等）。照合してから一度だけ確定する
//! - NotFound: 未知の subject
//! - AlreadyCompleted: マイルストーン重複呼び出し
//!
//! 外部へはこの分類と人間向けの理由だけを出します。内部のバージョン番号や
//! ストレージ層のエラーをメッセージに含めてはいけません。

use thiserror::Error;

use super::ids::SubjectId;
use super::state::LifecycleState;

/// Which guard condition was not met.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Precondition {
    #[error("wrong state: expected {expected:?}, found {actual:?}")]
    WrongState {
        expected: LifecycleState,
        actual: LifecycleState,
    },

    #[error("countdown has not expired yet")]
    CountdownNotExpired,

    #[error("tasks incomplete: {completed}/{total}")]
    TasksIncomplete { completed: u32, total: u32 },
}

/// EngineError はライフサイクル操作のエラー分類
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("precondition failed: {0}")]
    PreconditionFailed(Precondition),

    #[error("a concurrent update was applied first")]
    Conflict,

    #[error("provider call failed: {0}")]
    Provider(String),

    #[error("declined: {0}")]
    Declined(String),

    /// The outcome of an external side effect is unknown. The caller must
    /// reconcile against the provider's authoritative status before
    /// finalizing; a blind retry could duplicate the side effect.
    #[error("outcome unknown: {0}")]
    Indeterminate(String),

    #[error("unknown subject: {0}")]
    NotFound(SubjectId),

    #[error("challenge already completed")]
    AlreadyCompleted,
}

impl EngineError {
    /// ガード不成立を簡潔に作るためのヘルパ
    pub fn wrong_state(expected: LifecycleState, actual: LifecycleState) -> Self {
        EngineError::PreconditionFailed(Precondition::WrongState { expected, actual })
    }
}

/// RewardError は報酬ゲート（canGrab/grab）のエラー分類
#[derive(Debug, Error)]
pub enum RewardError {
    #[error("not eligible: {0}")]
    NotEligible(String),

    #[error("reward pool is depleted")]
    PoolDepleted,

    #[error("provider call failed: {0}")]
    Provider(String),

    /// Reward was drawn but the ledger credit did not complete; the amount
    /// must be reconciled by an operator, not re-drawn.
    #[error("outcome unknown: {0}")]
    Indeterminate(String),

    #[error("unknown subject: {0}")]
    NotFound(SubjectId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_the_taxonomy_label_and_reason() {
        let err = EngineError::wrong_state(LifecycleState::Pending, LifecycleState::Active);
        assert_eq!(
            err.to_string(),
            "precondition failed: wrong state: expected Pending, found Active"
        );

        let err = EngineError::Indeterminate("payment capture timed out".to_string());
        assert!(err.to_string().starts_with("outcome unknown:"));
    }

    #[test]
    fn messages_do_not_leak_versions() {
        // Conflict は事実だけを言う。バージョン番号は出さない。
        let msg = EngineError::Conflict.to_string();
        assert!(!msg.contains("version"));
    }
}
