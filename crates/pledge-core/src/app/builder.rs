//! AppBuilder - アプリケーションの構築とワイヤリング
//!
//! # Fail-fast 設計
//! - 必要な port が全て与えられているか、設定値が妥当かを build() 時に検証
//! - 不足・不正があれば BuildError を返す（動き出してから気付かない）

use std::sync::Arc;

use crate::ports::{
    ActivationProvider, BalanceLedger, Clock, EventSink, PaymentProcessor, PoolStatusSource,
    RewardDistributor, StateStore, SystemClock,
};

use super::engine::{EngineConfig, LifecycleEngine};
use super::guard::TransitionGuard;
use super::progress::TaskProgressTracker;
use super::reward::RewardEligibilityGate;

/// BuildError はアプリケーション構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing component: {0}")]
    MissingComponent(&'static str),

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

/// The assembled application: engine + tracker + reward gate sharing one
/// store, one sink and one clock.
pub struct App {
    pub engine: LifecycleEngine,
    pub tasks: TaskProgressTracker,
    pub rewards: RewardEligibilityGate,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App").finish_non_exhaustive()
    }
}

/// AppBuilder はアプリケーションを構築
///
/// # 使用例
/// ```ignore
/// let app = AppBuilder::new()
///     .store(store)
///     .events(bus)
///     .activation(provider)
///     .payments(processor)
///     .pool_status(pool)
///     .distributor(distributor)
///     .ledger(ledger)
///     .build()?;
/// ```
pub struct AppBuilder {
    store: Option<Arc<dyn StateStore>>,
    sink: Option<Arc<dyn EventSink>>,
    activation: Option<Arc<dyn ActivationProvider>>,
    payments: Option<Arc<dyn PaymentProcessor>>,
    pool: Option<Arc<dyn PoolStatusSource>>,
    distributor: Option<Arc<dyn RewardDistributor>>,
    ledger: Option<Arc<dyn BalanceLedger>>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl AppBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            sink: None,
            activation: None,
            payments: None,
            pool: None,
            distributor: None,
            ledger: None,
            clock: Arc::new(SystemClock),
            config: EngineConfig::default(),
        }
    }

    pub fn store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn events(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn activation(mut self, provider: Arc<dyn ActivationProvider>) -> Self {
        self.activation = Some(provider);
        self
    }

    pub fn payments(mut self, processor: Arc<dyn PaymentProcessor>) -> Self {
        self.payments = Some(processor);
        self
    }

    pub fn pool_status(mut self, pool: Arc<dyn PoolStatusSource>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn distributor(mut self, distributor: Arc<dyn RewardDistributor>) -> Self {
        self.distributor = Some(distributor);
        self
    }

    pub fn ledger(mut self, ledger: Arc<dyn BalanceLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Override the clock (tests use FixedClock).
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate wiring and config, then assemble the App.
    pub fn build(self) -> Result<App, BuildError> {
        if self.config.task_total == 0 {
            return Err(BuildError::InvalidConfig(
                "task_total must be at least 1".to_string(),
            ));
        }
        if self.config.countdown_window <= chrono::Duration::zero() {
            return Err(BuildError::InvalidConfig(
                "countdown_window must be positive".to_string(),
            ));
        }
        if self.config.provider_timeout.is_zero() {
            return Err(BuildError::InvalidConfig(
                "provider_timeout must be positive".to_string(),
            ));
        }

        let store = self.store.ok_or(BuildError::MissingComponent("store"))?;
        let sink = self.sink.ok_or(BuildError::MissingComponent("events"))?;
        let activation = self
            .activation
            .ok_or(BuildError::MissingComponent("activation"))?;
        let payments = self
            .payments
            .ok_or(BuildError::MissingComponent("payments"))?;
        let pool = self.pool.ok_or(BuildError::MissingComponent("pool_status"))?;
        let distributor = self
            .distributor
            .ok_or(BuildError::MissingComponent("distributor"))?;
        let ledger = self.ledger.ok_or(BuildError::MissingComponent("ledger"))?;

        let guard = TransitionGuard::new(store.clone(), sink, self.clock.clone());
        let engine = LifecycleEngine::new(
            store.clone(),
            guard.clone(),
            activation,
            payments,
            self.clock,
            self.config.clone(),
        );
        let tasks = TaskProgressTracker::new(guard);
        let rewards = RewardEligibilityGate::new(
            store,
            pool,
            distributor,
            ledger,
            self.config.provider_timeout,
        );

        Ok(App {
            engine,
            tasks,
            rewards,
        })
    }
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}
