//! Demo: drive one subject through the whole lifecycle.
//!
//! 実行すると activate → 決済 → タスク3件 → チャレンジ完了 → 報酬取得 を
//! FixedClock で時間を進めながら一通り流し、バスに流れたイベントを印字します。

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use tokio::time::sleep;

use pledge_core::app::AppBuilder;
use pledge_core::domain::{EngineError, SubjectId, TaskId};
use pledge_core::impls::{
    InMemoryEventBus, InMemoryStateStore, RecordingLedger, StaticPoolStatus,
    StubActivationProvider, StubPaymentProcessor, StubRewardDistributor,
};
use pledge_core::ports::{FixedClock, PoolStatus};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    // (A) ports を用意（全部スタブ、時刻は FixedClock）
    let t0 = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
    let clock = Arc::new(FixedClock::new(t0));
    let bus = Arc::new(InMemoryEventBus::new());

    // (B) App を構築（build() が配線と設定を検証する）
    let app = AppBuilder::new()
        .store(Arc::new(InMemoryStateStore::new()))
        .events(bus.clone())
        .activation(Arc::new(StubActivationProvider::new()))
        .payments(Arc::new(StubPaymentProcessor::new()))
        .pool_status(Arc::new(StaticPoolStatus::new(PoolStatus::Active)))
        .distributor(Arc::new(StubRewardDistributor::new(500)))
        .ledger(Arc::new(RecordingLedger::new()))
        .clock(clock.clone())
        .build()
        .expect("valid wiring");

    // (C) バスを購読してイベントを印字（購読者はエンジンと疎結合）
    let mut events = bus.subscribe();
    let printer = tokio::spawn(async move {
        while let Some(envelope) = events.recv().await {
            let json = serde_json::to_string(&envelope).expect("event serializes");
            println!("event: {json}");
        }
    });

    // (D) シナリオ実行
    let subject = SubjectId::new("alice");

    let record = app.engine.activate(&subject).await.expect("activation");
    println!(
        "activated: state={:?} deadline={:?}",
        record.state, record.countdown_deadline
    );

    clock.advance(chrono::Duration::hours(1));
    let record = app
        .engine
        .complete_payment(&subject, 100)
        .await
        .expect("payment");
    println!(
        "paid: state={:?} amount={:?} tx={:?}",
        record.state, record.payment_amount, record.transaction_ref
    );

    for id in ["a", "b", "a", "c"] {
        // "a" を二度報告しても 1 回しか数えない
        let outcome = app
            .tasks
            .record_completion(&subject, TaskId::new(id))
            .await
            .expect("task report");
        println!(
            "task {id}: {}/{} (newly_recorded={})",
            outcome.progress.completed, outcome.progress.total, outcome.newly_recorded
        );
    }

    // 期限前のチャレンジ完了はガードに弾かれる
    match app.engine.complete_challenge(&subject).await {
        Err(EngineError::PreconditionFailed(reason)) => {
            println!("challenge rejected (as expected): {reason}");
        }
        other => println!("unexpected: {other:?}"),
    }

    clock.set(t0 + chrono::Duration::hours(169));
    let record = app.engine.complete_challenge(&subject).await.expect("challenge");
    println!("challenge completed at {:?}", record.challenge_completed_at);

    if app.rewards.can_grab(&subject).await.expect("eligibility") {
        let grant = app.rewards.grab(&subject).await.expect("grab");
        println!("reward granted: {} minor units", grant.amount);
    }

    // (E) サンプルなのでイベントが流れ切るのを少し待って印字タスクを止める
    sleep(Duration::from_millis(100)).await;
    printer.abort();
}
