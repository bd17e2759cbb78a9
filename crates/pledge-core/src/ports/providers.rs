//! External collaborator ports: activation, payment, reward pool, ledger.
//!
//! # 設計原則
//! - 応答は ad-hoc なオブジェクトではなく、タグ付きの結果型で返す。
//!   成功・ビジネス拒否・障害をコンパイル時に区別できるようにする。
//! - タイムアウトは呼び出し側（engine/gate）が課す。ここの trait は
//!   タイムアウトを知らない。

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::SubjectId;

/// 一般的な外部呼び出し失敗（ビジネス拒否ではない）
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ProviderFailure(pub String);

/// Result of provisioning a subject's activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationReceipt {
    /// Provider-side reference for the provisioned activation.
    pub provider_ref: String,
}

/// ActivationProvider は subject の有効化を外部でプロビジョニングする
///
/// Provisioning is keyed by subject: calling it again for the same subject
/// (or losing one of two concurrent calls) is harmless on the provider side.
#[async_trait]
pub trait ActivationProvider: Send + Sync {
    async fn provision(&self, subject_id: &SubjectId)
    -> Result<ActivationReceipt, ProviderFailure>;
}

/// Result of a captured payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentReceipt {
    pub transaction_ref: String,
    /// Minor currency units, as captured.
    pub amount: u64,
}

/// Payment failure: business rejection vs infrastructure failure.
#[derive(Debug, Error)]
pub enum PaymentFailure {
    #[error("declined: {0}")]
    Declined(String),

    #[error("{0}")]
    Failed(String),
}

/// PaymentProcessor は決済のキャプチャと、その正式な照合結果を提供する
///
/// `capture` is NOT idempotent: a repeat call may charge twice. After an
/// indeterminate outcome, callers must consult `lookup` (the processor's
/// authoritative record) instead of retrying `capture`.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn capture(
        &self,
        subject_id: &SubjectId,
        amount: u64,
    ) -> Result<PaymentReceipt, PaymentFailure>;

    /// Authoritative status: the receipt if a capture for this subject
    /// exists, `None` if no capture ever committed.
    async fn lookup(&self, subject_id: &SubjectId)
    -> Result<Option<PaymentReceipt>, ProviderFailure>;
}

/// 報酬プールの状態（外部シグナル）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolStatus {
    Active,
    Inactive,
}

#[async_trait]
pub trait PoolStatusSource: Send + Sync {
    async fn pool_status(&self) -> PoolStatus;
}

/// A reward drawn from the distribution pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewardDraw {
    /// Minor currency units.
    pub amount: u64,
}

#[derive(Debug, Error)]
pub enum DrawFailure {
    #[error("pool depleted")]
    PoolDepleted,

    #[error("{0}")]
    Failed(String),
}

/// RewardDistributor はプールから報酬額を払い出す
#[async_trait]
pub trait RewardDistributor: Send + Sync {
    async fn draw(&self, subject_id: &SubjectId) -> Result<RewardDraw, DrawFailure>;
}

/// BalanceLedger は subject の残高に入金する
#[async_trait]
pub trait BalanceLedger: Send + Sync {
    async fn credit(&self, subject_id: &SubjectId, amount: u64) -> Result<(), ProviderFailure>;
}
