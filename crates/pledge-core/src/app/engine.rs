//! LifecycleEngine - ライフサイクル遷移のオーケストレーション
//!
//! 各操作は「読む → 前提条件 → 外部副作用 → CAS → イベント」の順で
//! TransitionGuard を通して実行されます。外部プロバイダ呼び出しには必ず
//! タイムアウトを課し、時間切れは Failure ではなく Indeterminate（結果不明、
//! 照合してから確定する）として返します。

use std::sync::Arc;
use std::time::Duration;

use crate::domain::{
    EngineError, LifecycleEvent, LifecycleRecord, LifecycleState, SubjectId, countdown,
};
use crate::ports::{ActivationProvider, Clock, PaymentFailure, PaymentProcessor, StateStore};

use super::guard::{SideEffect, Step, TransitionGuard};

/// Tunables for the engine. Programmatic only; validated by the builder.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Challenge window applied once at activation.
    pub countdown_window: chrono::Duration,

    /// Number of distinct task completions required.
    pub task_total: u32,

    /// Upper bound for every external provider call.
    pub provider_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            countdown_window: countdown::default_window(),
            task_total: 3,
            provider_timeout: Duration::from_secs(10),
        }
    }
}

/// Outcome of a payment reconciliation (the explicit follow-up to an
/// `Indeterminate` payment).
#[derive(Debug)]
pub enum PaymentReconciliation {
    /// The processor had a capture on record; the record is now Active.
    Finalized(LifecycleRecord),

    /// The record was already Active; nothing to do.
    AlreadyFinal(LifecycleRecord),

    /// The processor has no capture for this subject: the original attempt
    /// never committed, so the normal `complete_payment` path may be retried.
    NothingCaptured,
}

/// Orchestrates lifecycle transitions for one deployment.
///
/// The engine is the only writer of the StateStore; everything else observes.
pub struct LifecycleEngine {
    store: Arc<dyn StateStore>,
    guard: TransitionGuard,
    activation: Arc<dyn ActivationProvider>,
    payments: Arc<dyn PaymentProcessor>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl LifecycleEngine {
    pub fn new(
        store: Arc<dyn StateStore>,
        guard: TransitionGuard,
        activation: Arc<dyn ActivationProvider>,
        payments: Arc<dyn PaymentProcessor>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            guard,
            activation,
            payments,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Pending -> AwaitingPayment. Creates the record on first interaction.
    ///
    /// Provisioning is keyed by subject, so a lost race after the provider
    /// call surfaces as plain `Conflict`: exactly one of N concurrent calls
    /// reaches AwaitingPayment.
    pub async fn activate(&self, subject_id: &SubjectId) -> Result<LifecycleRecord, EngineError> {
        let now = self.clock.now();
        let deadline = countdown::deadline_for(now, self.config.countdown_window);
        let activation = Arc::clone(&self.activation);
        let timeout = self.config.provider_timeout;
        let task_total = self.config.task_total;
        let init_subject = subject_id.clone();
        let sid = subject_id.clone();

        let record = self
            .guard
            .attempt_or_init(
                subject_id,
                move || LifecycleRecord::new(init_subject, task_total),
                move |record| async move {
                    record.require_state(LifecycleState::Pending)?;

                    let receipt = bounded(timeout, "activation provisioning", async {
                        activation.provision(&sid).await
                    })
                    .await?
                    .map_err(|e| EngineError::Provider(e.to_string()))?;
                    tracing::debug!(subject = %sid, provider_ref = %receipt.provider_ref, "activation provisioned");

                    let next = record.into_awaiting_payment(now, deadline)?;
                    let event = LifecycleEvent::Activated {
                        subject_id: next.subject_id.clone(),
                        activated_at: now,
                        countdown_deadline: deadline,
                    };
                    Ok(Step::Commit {
                        value: next.clone(),
                        record: next,
                        event,
                        effect: SideEffect::Repeatable,
                    })
                },
            )
            .await?;

        tracing::info!(subject = %subject_id, deadline = %deadline, "subject activated");
        Ok(record)
    }

    /// AwaitingPayment -> Active.
    ///
    /// The capture is not idempotent: a lost write after a successful capture
    /// is `Indeterminate` and must go through `reconcile_payment`, never a
    /// blind retry.
    pub async fn complete_payment(
        &self,
        subject_id: &SubjectId,
        amount: u64,
    ) -> Result<LifecycleRecord, EngineError> {
        let payments = Arc::clone(&self.payments);
        let timeout = self.config.provider_timeout;
        let sid = subject_id.clone();

        let record = self
            .guard
            .attempt(subject_id, move |record| async move {
                record.require_state(LifecycleState::AwaitingPayment)?;

                let receipt = bounded(timeout, "payment capture", async {
                    payments.capture(&sid, amount).await
                })
                .await?
                .map_err(|e| match e {
                    PaymentFailure::Declined(reason) => EngineError::Declined(reason),
                    PaymentFailure::Failed(reason) => EngineError::Provider(reason),
                })?;

                let transaction_ref = receipt.transaction_ref.clone();
                let next = record.into_active(receipt.amount, receipt.transaction_ref)?;
                let event = LifecycleEvent::PaymentCompleted {
                    subject_id: next.subject_id.clone(),
                    amount: receipt.amount,
                    transaction_ref,
                };
                Ok(Step::Commit {
                    value: next.clone(),
                    record: next,
                    event,
                    effect: SideEffect::Committed,
                })
            })
            .await?;

        tracing::info!(subject = %subject_id, amount, "payment completed");
        Ok(record)
    }

    /// Record the terminal challenge milestone. No external side effect;
    /// the state stays Active.
    pub async fn complete_challenge(
        &self,
        subject_id: &SubjectId,
    ) -> Result<LifecycleRecord, EngineError> {
        let now = self.clock.now();

        let record = self
            .guard
            .attempt(subject_id, move |record| async move {
                let next = record.into_challenge_completed(now)?;
                let event = LifecycleEvent::ChallengeCompleted {
                    subject_id: next.subject_id.clone(),
                    completed_at: now,
                };
                Ok(Step::Commit {
                    value: next.clone(),
                    record: next,
                    event,
                    effect: SideEffect::None,
                })
            })
            .await?;

        tracing::info!(subject = %subject_id, "challenge completed");
        Ok(record)
    }

    /// Administrative override: restore the initial Pending record.
    /// Last-writer-wins on purpose; no CAS, cannot fail on a race.
    pub async fn reset(&self, subject_id: &SubjectId) -> Result<LifecycleRecord, EngineError> {
        let fresh = LifecycleRecord::new(subject_id.clone(), self.config.task_total);
        self.store
            .put(fresh.clone())
            .await
            .map_err(|_| EngineError::Provider("state is temporarily unavailable".to_string()))?;

        self.guard
            .publish(LifecycleEvent::Reset {
                subject_id: subject_id.clone(),
            })
            .await;

        tracing::info!(subject = %subject_id, "subject reset to pending");
        Ok(fresh)
    }

    /// Resolve an `Indeterminate` payment: ask the processor for its
    /// authoritative status, then finalize at most once.
    pub async fn reconcile_payment(
        &self,
        subject_id: &SubjectId,
    ) -> Result<PaymentReconciliation, EngineError> {
        let payments = Arc::clone(&self.payments);
        let timeout = self.config.provider_timeout;
        let sid = subject_id.clone();

        let outcome = self
            .guard
            .attempt(subject_id, move |record| async move {
                if record.state == LifecycleState::Active {
                    return Ok(Step::Skip {
                        value: PaymentReconciliation::AlreadyFinal(record),
                    });
                }
                record.require_state(LifecycleState::AwaitingPayment)?;

                // the lookup is read-only: a timeout here is retryable, not
                // indeterminate
                let looked_up = tokio::time::timeout(timeout, payments.lookup(&sid))
                    .await
                    .map_err(|_| {
                        EngineError::Provider("payment status lookup timed out".to_string())
                    })?
                    .map_err(|e| EngineError::Provider(e.to_string()))?;

                let Some(receipt) = looked_up else {
                    return Ok(Step::Skip {
                        value: PaymentReconciliation::NothingCaptured,
                    });
                };

                let transaction_ref = receipt.transaction_ref.clone();
                let next = record.into_active(receipt.amount, receipt.transaction_ref)?;
                let event = LifecycleEvent::PaymentCompleted {
                    subject_id: next.subject_id.clone(),
                    amount: receipt.amount,
                    transaction_ref,
                };
                Ok(Step::Commit {
                    value: PaymentReconciliation::Finalized(next.clone()),
                    record: next,
                    event,
                    effect: SideEffect::Repeatable,
                })
            })
            .await?;

        if matches!(outcome, PaymentReconciliation::Finalized(_)) {
            tracing::info!(subject = %subject_id, "indeterminate payment reconciled");
        }
        Ok(outcome)
    }
}

/// Wrap a provider call in the caller-supplied timeout. Elapsed time means
/// the outcome is unknown, which is `Indeterminate`, never plain failure.
async fn bounded<T>(
    timeout: Duration,
    what: &str,
    call: impl std::future::Future<Output = T>,
) -> Result<T, EngineError> {
    tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| EngineError::Indeterminate(format!("{what} timed out; outcome unknown")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::progress::TaskProgressTracker;
    use crate::domain::{Precondition, TaskId};
    use crate::impls::{
        InMemoryEventBus, InMemoryStateStore, StubActivationProvider, StubPaymentProcessor,
    };
    use crate::ports::{FixedClock, StoreError};
    use chrono::{DateTime, TimeZone, Utc};

    struct Harness {
        engine: LifecycleEngine,
        tasks: TaskProgressTracker,
        clock: FixedClock,
        store: Arc<InMemoryStateStore>,
        bus: Arc<InMemoryEventBus>,
        activation: Arc<StubActivationProvider>,
        payments: Arc<StubPaymentProcessor>,
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn harness_with(
        activation: StubActivationProvider,
        payments: StubPaymentProcessor,
        config: EngineConfig,
    ) -> Harness {
        let store = Arc::new(InMemoryStateStore::new());
        let bus = Arc::new(InMemoryEventBus::new());
        let clock = FixedClock::new(t0());
        let activation = Arc::new(activation);
        let payments = Arc::new(payments);
        let guard = TransitionGuard::new(store.clone(), bus.clone(), Arc::new(clock.clone()));
        let engine = LifecycleEngine::new(
            store.clone(),
            guard.clone(),
            activation.clone(),
            payments.clone(),
            Arc::new(clock.clone()),
            config,
        );
        Harness {
            engine,
            tasks: TaskProgressTracker::new(guard),
            clock,
            store,
            bus,
            activation,
            payments,
        }
    }

    fn harness() -> Harness {
        harness_with(
            StubActivationProvider::new(),
            StubPaymentProcessor::new(),
            EngineConfig::default(),
        )
    }

    #[tokio::test]
    async fn activation_creates_the_record_and_starts_the_countdown() {
        let h = harness();
        let mut events = h.bus.subscribe();
        let subject = SubjectId::new("alice");

        let record = h.engine.activate(&subject).await.unwrap();

        assert_eq!(record.state, LifecycleState::AwaitingPayment);
        assert_eq!(record.activated_at, Some(t0()));
        assert_eq!(
            record.countdown_deadline,
            Some(t0() + chrono::Duration::hours(168))
        );
        assert_eq!(record.version, 1);

        let envelope = events.recv().await.unwrap();
        assert!(matches!(envelope.event, LifecycleEvent::Activated { .. }));
    }

    #[tokio::test]
    async fn repeat_activation_fails_the_precondition() {
        let h = harness();
        let subject = SubjectId::new("alice");
        h.engine.activate(&subject).await.unwrap();

        let err = h.engine.activate(&subject).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::PreconditionFailed(Precondition::WrongState {
                expected: LifecycleState::Pending,
                actual: LifecycleState::AwaitingPayment,
            })
        ));
        // the provider was not called a second time: the guard checked first
        assert_eq!(h.activation.call_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_activation_succeeds_exactly_once() {
        let h = harness_with(
            StubActivationProvider::new().with_latency(Duration::from_millis(50)),
            StubPaymentProcessor::new(),
            EngineConfig::default(),
        );
        let subject = SubjectId::new("s2");

        let (first, second) = tokio::join!(
            h.engine.activate(&subject),
            h.engine.activate(&subject)
        );

        let (winner, loser) = match (first, second) {
            (Ok(record), Err(err)) | (Err(err), Ok(record)) => (record, err),
            other => panic!("expected exactly one winner, got {other:?}"),
        };
        assert_eq!(winner.state, LifecycleState::AwaitingPayment);
        assert!(matches!(
            loser,
            EngineError::Conflict | EngineError::PreconditionFailed(_)
        ));

        let stored = h.store.get(&subject).await.unwrap();
        assert_eq!(stored.state, LifecycleState::AwaitingPayment);
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn provider_failure_before_any_side_effect_is_retryable() {
        let h = harness();
        h.activation.fail_next(1);
        let subject = SubjectId::new("alice");

        let err = h.engine.activate(&subject).await.unwrap_err();
        assert!(matches!(err, EngineError::Provider(_)));
        // nothing was written: the subject still has no record
        assert!(matches!(
            h.store.get(&subject).await.unwrap_err(),
            StoreError::NotFound(_)
        ));

        // a whole-operation retry now goes through
        assert!(h.engine.activate(&subject).await.is_ok());
    }

    #[tokio::test]
    async fn declined_payment_leaves_the_record_awaiting() {
        let h = harness();
        let subject = SubjectId::new("alice");
        h.engine.activate(&subject).await.unwrap();
        h.payments.decline_next(1);

        let err = h.engine.complete_payment(&subject, 100).await.unwrap_err();
        assert!(matches!(err, EngineError::Declined(_)));
        assert_eq!(
            h.store.get(&subject).await.unwrap().state,
            LifecycleState::AwaitingPayment
        );

        let record = h.engine.complete_payment(&subject, 100).await.unwrap();
        assert_eq!(record.state, LifecycleState::Active);
        assert_eq!(record.payment_amount, Some(100));
        assert!(record.transaction_ref.is_some());
    }

    #[tokio::test]
    async fn timed_out_capture_is_indeterminate_and_reconcilable() {
        let h = harness_with(
            StubActivationProvider::new(),
            StubPaymentProcessor::new().with_latency(Duration::from_millis(200)),
            EngineConfig {
                provider_timeout: Duration::from_millis(50),
                ..EngineConfig::default()
            },
        );
        let subject = SubjectId::new("alice");
        h.engine.activate(&subject).await.unwrap();

        let err = h.engine.complete_payment(&subject, 100).await.unwrap_err();
        assert!(matches!(err, EngineError::Indeterminate(_)));

        // the capture landed processor-side even though we never saw it
        assert_eq!(h.payments.captures().len(), 1);
        assert_eq!(
            h.store.get(&subject).await.unwrap().state,
            LifecycleState::AwaitingPayment
        );

        // reconciliation consults the processor and finalizes exactly once
        let outcome = h.engine.reconcile_payment(&subject).await.unwrap();
        let PaymentReconciliation::Finalized(record) = outcome else {
            panic!("expected finalized");
        };
        assert_eq!(record.state, LifecycleState::Active);
        assert_eq!(record.payment_amount, Some(100));

        // a second reconciliation is a no-op
        assert!(matches!(
            h.engine.reconcile_payment(&subject).await.unwrap(),
            PaymentReconciliation::AlreadyFinal(_)
        ));
        // and no second capture ever happened
        assert_eq!(h.payments.captures().len(), 1);
    }

    #[tokio::test]
    async fn reconcile_reports_when_nothing_was_captured() {
        let h = harness();
        let subject = SubjectId::new("alice");
        h.engine.activate(&subject).await.unwrap();
        h.payments.fail_next(1);

        let err = h.engine.complete_payment(&subject, 100).await.unwrap_err();
        assert!(matches!(err, EngineError::Provider(_)));

        assert!(matches!(
            h.engine.reconcile_payment(&subject).await.unwrap(),
            PaymentReconciliation::NothingCaptured
        ));
    }

    #[tokio::test]
    async fn challenge_gate_and_milestone() {
        let h = harness();
        let subject = SubjectId::new("alice");
        h.engine.activate(&subject).await.unwrap();
        h.engine.complete_payment(&subject, 100).await.unwrap();
        for id in ["a", "b", "c"] {
            h.tasks
                .record_completion(&subject, TaskId::new(id))
                .await
                .unwrap();
        }

        // all tasks done, countdown still running
        let err = h.engine.complete_challenge(&subject).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::PreconditionFailed(Precondition::CountdownNotExpired)
        ));

        h.clock.advance(chrono::Duration::hours(169));
        let record = h.engine.complete_challenge(&subject).await.unwrap();
        assert_eq!(record.state, LifecycleState::Active);
        assert_eq!(
            record.challenge_completed_at,
            Some(t0() + chrono::Duration::hours(169))
        );

        let err = h.engine.complete_challenge(&subject).await.unwrap_err();
        assert!(matches!(err, EngineError::AlreadyCompleted));
    }

    #[tokio::test]
    async fn challenge_needs_the_tasks_even_after_expiry() {
        let h = harness();
        let subject = SubjectId::new("alice");
        h.engine.activate(&subject).await.unwrap();
        h.engine.complete_payment(&subject, 100).await.unwrap();

        h.clock.advance(chrono::Duration::hours(169));
        let err = h.engine.complete_challenge(&subject).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::PreconditionFailed(Precondition::TasksIncomplete { completed: 0, total: 3 })
        ));
    }

    #[tokio::test]
    async fn reset_restores_a_fresh_pending_record() {
        let h = harness();
        let mut events = h.bus.subscribe();
        let subject = SubjectId::new("alice");
        h.engine.activate(&subject).await.unwrap();
        h.engine.complete_payment(&subject, 100).await.unwrap();

        let record = h.engine.reset(&subject).await.unwrap();
        assert_eq!(record.state, LifecycleState::Pending);
        assert_eq!(record.version, 0);
        assert!(record.countdown_deadline.is_none());

        // the lifecycle can start over
        let record = h.engine.activate(&subject).await.unwrap();
        assert_eq!(record.version, 1);

        let kinds: Vec<_> = std::iter::from_fn(|| events.try_recv().ok())
            .map(|e| match e.event {
                LifecycleEvent::Activated { .. } => "activated",
                LifecycleEvent::PaymentCompleted { .. } => "payment",
                LifecycleEvent::Reset { .. } => "reset",
                _ => "other",
            })
            .collect();
        assert_eq!(kinds, vec!["activated", "payment", "reset", "activated"]);
    }
}
