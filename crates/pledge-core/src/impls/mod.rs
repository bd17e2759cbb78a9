//! Impls - 実装(開発用・テスト用)
//!
//! このモジュールには ports の実装を含めます。
//!
//! # 含まれる実装
//! - **InMemoryStateStore**: テスト・開発用の正本
//! - **JsonFileStateStore**: スナップショットファイルで永続化する正本
//! - **InMemoryEventBus / NoopEventSink**: イベント配送
//! - **Stub providers**: 外部コラボレータのスタブ
//!
//! 本番用のプロバイダ実装(実際の決済プロセッサ等)は別クレートに配置します。

pub mod event_bus;
pub mod file_store;
pub mod memory_store;
pub mod providers;

pub use self::event_bus::{InMemoryEventBus, NoopEventSink};
pub use self::file_store::JsonFileStateStore;
pub use self::memory_store::InMemoryStateStore;
pub use self::providers::{
    RecordingLedger, StaticPoolStatus, StubActivationProvider, StubPaymentProcessor,
    StubRewardDistributor,
};
