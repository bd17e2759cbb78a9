//! Stub providers - 開発・テスト用の外部コラボレータ実装
//!
//! # 使い方
//! - 既定では常に成功する。`fail_next` / `decline_next` で意図的な失敗を
//!   仕込み、`with_latency` で応答を遅らせて競合やタイムアウトを再現する。
//! - 呼び出しは全て記録されるので、テストは副作用の回数を検証できる。

use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::SubjectId;
use crate::ports::{
    ActivationProvider, ActivationReceipt, BalanceLedger, DrawFailure, PaymentFailure,
    PaymentProcessor, PaymentReceipt, PoolStatus, PoolStatusSource, ProviderFailure, RewardDraw,
    RewardDistributor,
};

/// Always provisions successfully (after optional latency / seeded failures).
#[derive(Default)]
pub struct StubActivationProvider {
    latency: Option<Duration>,
    remaining_failures: AtomicU32,
    calls: AtomicU32,
}

impl StubActivationProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call; widens race windows in concurrency tests.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fail the next `n` calls with a provider error.
    pub fn fail_next(&self, n: u32) {
        self.remaining_failures.store(n, Ordering::Relaxed);
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ActivationProvider for StubActivationProvider {
    async fn provision(
        &self,
        subject_id: &SubjectId,
    ) -> Result<ActivationReceipt, ProviderFailure> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let left = self.remaining_failures.load(Ordering::Relaxed);
        if left > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(ProviderFailure(format!(
                "intentional provisioning failure (left={left})"
            )));
        }
        Ok(ActivationReceipt {
            provider_ref: format!("prov-{subject_id}"),
        })
    }
}

/// Records every capture; supports declines, failures and latency.
#[derive(Default)]
pub struct StubPaymentProcessor {
    latency: Option<Duration>,
    remaining_declines: AtomicU32,
    remaining_failures: AtomicU32,
    sequence: AtomicU64,
    captures: Mutex<Vec<PaymentCapture>>,
}

#[derive(Debug, Clone)]
pub struct PaymentCapture {
    pub subject_id: SubjectId,
    pub receipt: PaymentReceipt,
}

impl StubPaymentProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn decline_next(&self, n: u32) {
        self.remaining_declines.store(n, Ordering::Relaxed);
    }

    pub fn fail_next(&self, n: u32) {
        self.remaining_failures.store(n, Ordering::Relaxed);
    }

    pub fn captures(&self) -> Vec<PaymentCapture> {
        self.captures.lock().expect("capture log poisoned").clone()
    }
}

#[async_trait]
impl PaymentProcessor for StubPaymentProcessor {
    async fn capture(
        &self,
        subject_id: &SubjectId,
        amount: u64,
    ) -> Result<PaymentReceipt, PaymentFailure> {
        let declines = self.remaining_declines.load(Ordering::Relaxed);
        if declines > 0 {
            self.remaining_declines.fetch_sub(1, Ordering::Relaxed);
            return Err(PaymentFailure::Declined("card declined".to_string()));
        }
        let failures = self.remaining_failures.load(Ordering::Relaxed);
        if failures > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(PaymentFailure::Failed("processor unreachable".to_string()));
        }

        let seq = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let receipt = PaymentReceipt {
            transaction_ref: format!("tx-{subject_id}-{seq}"),
            amount,
        };
        // the capture commits processor-side before the response travels
        // back; latency (and a caller timeout) only delays the receipt,
        // which is exactly the indeterminate case lookup() resolves
        self.captures
            .lock()
            .expect("capture log poisoned")
            .push(PaymentCapture {
                subject_id: subject_id.clone(),
                receipt: receipt.clone(),
            });
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        Ok(receipt)
    }

    async fn lookup(
        &self,
        subject_id: &SubjectId,
    ) -> Result<Option<PaymentReceipt>, ProviderFailure> {
        let captures = self.captures.lock().expect("capture log poisoned");
        Ok(captures
            .iter()
            .rev()
            .find(|c| &c.subject_id == subject_id)
            .map(|c| c.receipt.clone()))
    }
}

/// Settable pool status signal.
pub struct StaticPoolStatus {
    status: Mutex<PoolStatus>,
}

impl StaticPoolStatus {
    pub fn new(status: PoolStatus) -> Self {
        Self {
            status: Mutex::new(status),
        }
    }

    pub fn set(&self, status: PoolStatus) {
        *self.status.lock().expect("pool status poisoned") = status;
    }
}

#[async_trait]
impl PoolStatusSource for StaticPoolStatus {
    async fn pool_status(&self) -> PoolStatus {
        *self.status.lock().expect("pool status poisoned")
    }
}

/// Draws a fixed amount until marked depleted.
pub struct StubRewardDistributor {
    amount: u64,
    depleted: Mutex<bool>,
    draws: AtomicU32,
}

impl StubRewardDistributor {
    pub fn new(amount: u64) -> Self {
        Self {
            amount,
            depleted: Mutex::new(false),
            draws: AtomicU32::new(0),
        }
    }

    pub fn deplete(&self) {
        *self.depleted.lock().expect("pool flag poisoned") = true;
    }

    pub fn draw_count(&self) -> u32 {
        self.draws.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl RewardDistributor for StubRewardDistributor {
    async fn draw(&self, _subject_id: &SubjectId) -> Result<RewardDraw, DrawFailure> {
        if *self.depleted.lock().expect("pool flag poisoned") {
            return Err(DrawFailure::PoolDepleted);
        }
        self.draws.fetch_add(1, Ordering::Relaxed);
        Ok(RewardDraw {
            amount: self.amount,
        })
    }
}

/// Remembers every credit so tests can assert on ledger effects.
#[derive(Default)]
pub struct RecordingLedger {
    credits: Mutex<Vec<(SubjectId, u64)>>,
    failing: Mutex<bool>,
}

impl RecordingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_all(&self) {
        *self.failing.lock().expect("ledger flag poisoned") = true;
    }

    pub fn credits(&self) -> Vec<(SubjectId, u64)> {
        self.credits.lock().expect("credit log poisoned").clone()
    }
}

#[async_trait]
impl BalanceLedger for RecordingLedger {
    async fn credit(&self, subject_id: &SubjectId, amount: u64) -> Result<(), ProviderFailure> {
        if *self.failing.lock().expect("ledger flag poisoned") {
            return Err(ProviderFailure("ledger write failed".to_string()));
        }
        self.credits
            .lock()
            .expect("credit log poisoned")
            .push((subject_id.clone(), amount));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn payment_lookup_reflects_captures() {
        let processor = StubPaymentProcessor::new();
        let subject = SubjectId::new("s");

        assert_eq!(processor.lookup(&subject).await.unwrap(), None);

        let receipt = processor.capture(&subject, 100).await.unwrap();
        assert_eq!(processor.lookup(&subject).await.unwrap(), Some(receipt));
        assert_eq!(processor.captures().len(), 1);
    }

    #[tokio::test]
    async fn seeded_declines_run_out() {
        let processor = StubPaymentProcessor::new();
        processor.decline_next(1);
        let subject = SubjectId::new("s");

        let err = processor.capture(&subject, 100).await.unwrap_err();
        assert!(matches!(err, PaymentFailure::Declined(_)));

        assert!(processor.capture(&subject, 100).await.is_ok());
    }

    #[tokio::test]
    async fn depleted_pool_stops_drawing() {
        let distributor = StubRewardDistributor::new(500);
        let subject = SubjectId::new("s");

        assert_eq!(
            distributor.draw(&subject).await.unwrap(),
            RewardDraw { amount: 500 }
        );
        distributor.deplete();
        assert!(matches!(
            distributor.draw(&subject).await.unwrap_err(),
            DrawFailure::PoolDepleted
        ));
        assert_eq!(distributor.draw_count(), 1);
    }
}
