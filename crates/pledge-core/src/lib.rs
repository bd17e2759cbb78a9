//! pledge-core
//!
//! Core building blocks for the pledge lifecycle engine: a per-subject
//! Pending → AwaitingPayment → Active lifecycle with a fixed countdown,
//! a bounded task-completion count, a terminal challenge milestone and a
//! reward-eligibility gate.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, state, record, countdown, events, errors）
//! - **ports**: 抽象化レイヤー（Clock, StateStore, EventSink, 外部プロバイダ）
//! - **impls**: 実装（InMemoryStateStore, JsonFileStateStore, InMemoryEventBus,
//!   スタブプロバイダなど開発・テスト用）
//! - **app**: アプリケーションロジック（TransitionGuard, LifecycleEngine,
//!   TaskProgressTracker, RewardEligibilityGate, AppBuilder）
//!
//! # 並行性の要点
//! 遷移ごとに StateStore のバージョンで CAS する楽観的並行制御。同一 subject の
//! 遷移履歴は線形化され、同時に同じ遷移を試みた呼び出しのうち成功するのは
//! 高々 1 つ。CAS に負けた試行は再試行されない（クロージャ内の副作用は冪等とは
//! 限らないため）。

pub mod app;
pub mod domain;
pub mod impls;
pub mod ports;
