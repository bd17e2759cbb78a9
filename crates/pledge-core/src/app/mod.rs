//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてライフサイクルのオーケストレーションを
//! 実装します。
//!
//! # 主要コンポーネント
//! - **TransitionGuard**: 遷移の exactly-once 適用（読む→検証→副作用→CAS→イベント）
//! - **LifecycleEngine**: activate / complete_payment / complete_challenge / reset
//! - **TaskProgressTracker**: 冪等・上限付きのタスク完了カウンタ
//! - **RewardEligibilityGate**: 報酬取得の適格性判定と払い出し
//! - **AppBuilder**: ワイヤリングと起動時検証

pub mod builder;
pub mod engine;
pub mod guard;
pub mod progress;
pub mod reward;

// 主要な型を再エクスポート
pub use self::builder::{App, AppBuilder, BuildError};
pub use self::engine::{EngineConfig, LifecycleEngine, PaymentReconciliation};
pub use self::guard::{SideEffect, Step, TransitionGuard};
pub use self::progress::{CompletionOutcome, TaskProgressTracker};
pub use self::reward::{RewardEligibilityGate, RewardGrant};
