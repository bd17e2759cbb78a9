//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部システム（永続化、外部プロバイダ、イベント購読者など）への
//! インターフェースを提供し、実装の詳細を隠蔽します。
//!
//! # 設計原則
//! - StateStore が source of truth（正本）
//! - 外部プロバイダ呼び出しと永続 I/O だけが suspend する。
//!   ドメイン計算（countdown, ガード判定）は同期・非ブロッキング。

pub mod clock;
pub mod event_sink;
pub mod providers;
pub mod state_store;

// 主要な trait を再エクスポート
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::event_sink::{EventSink, EventSinkError};
pub use self::providers::{
    ActivationProvider, ActivationReceipt, BalanceLedger, DrawFailure, PaymentFailure,
    PaymentProcessor, PaymentReceipt, PoolStatus, PoolStatusSource, ProviderFailure, RewardDraw,
    RewardDistributor,
};
pub use self::state_store::{StateStore, StoreError};
