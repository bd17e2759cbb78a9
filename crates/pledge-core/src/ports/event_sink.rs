//! EventSink port - イベント配送の抽象化
//!
//! # 設計原則
//! - 配送は at-least-once。永続化はしない。再起動後に状態が必要な購読者は
//!   イベントの再生ではなく StateStore から再導出する。
//! - 同一 subject のイベントは発行順を保つ。subject を跨いだ順序は保証しない。
//! - 配送失敗で書き込み済みの遷移を失敗させてはいけない（呼び出し側は
//!   warn ログに留める）。

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::EventEnvelope;

/// 配送に失敗したことを示す
#[derive(Debug, Error)]
#[error("event delivery failed: {0}")]
pub struct EventSinkError(pub String);

/// EventSink はドメインイベントを購読者へ届ける
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, envelope: EventEnvelope) -> Result<(), EventSinkError>;
}
