//! InMemoryEventBus - 開発用のイベント配送
//!
//! # 実装詳細
//! - 購読者ごとに unbounded channel を持ち、emit は 1 つのロックの下で
//!   全購読者へ送る。ロックが発行順を直列化するので、同一 subject の
//!   イベントは購読者から見て発行順に届く。
//! - 閉じた購読者（Receiver drop 済み）は emit 時に刈り取る。
//! - 永続化はしない。再起動後の状態は StateStore から再導出する。

use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::EventEnvelope;
use crate::ports::{EventSink, EventSinkError};

/// In-memory fan-out bus for lifecycle events.
#[derive(Default)]
pub struct InMemoryEventBus {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<EventEnvelope>>>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Every event published from now on is delivered
    /// at least once, in publish order.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<EventEnvelope> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().expect("subscriber list poisoned").push(tx);
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().expect("subscriber list poisoned").len()
    }
}

#[async_trait]
impl EventSink for InMemoryEventBus {
    async fn emit(&self, envelope: EventEnvelope) -> Result<(), EventSinkError> {
        let mut subscribers = self.subscribers.lock().expect("subscriber list poisoned");
        // 送れなかった sender は閉じているので捨てる
        subscribers.retain(|tx| tx.send(envelope.clone()).is_ok());
        Ok(())
    }
}

/// NoopEventSink は何もしない（購読者が不要な構成・テスト用）
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

#[async_trait]
impl EventSink for NoopEventSink {
    async fn emit(&self, _envelope: EventEnvelope) -> Result<(), EventSinkError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LifecycleEvent, SubjectId};
    use chrono::{TimeZone, Utc};

    fn envelope(subject: &str, seq: i64) -> EventEnvelope {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap() + chrono::Duration::seconds(seq);
        EventEnvelope::new(
            now,
            LifecycleEvent::Reset {
                subject_id: SubjectId::new(subject),
            },
        )
    }

    #[tokio::test]
    async fn every_subscriber_sees_every_event() {
        let bus = InMemoryEventBus::new();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        let sent = envelope("s", 0);
        bus.emit(sent.clone()).await.unwrap();

        assert_eq!(first.recv().await.unwrap(), sent);
        assert_eq!(second.recv().await.unwrap(), sent);
    }

    #[tokio::test]
    async fn publish_order_is_preserved() {
        let bus = InMemoryEventBus::new();
        let mut rx = bus.subscribe();

        for seq in 0..5 {
            bus.emit(envelope("s", seq)).await.unwrap();
        }

        let mut last = None;
        for _ in 0..5 {
            let received = rx.recv().await.unwrap();
            if let Some(previous) = last.replace(received.event_id) {
                assert!(previous < received.event_id);
            }
        }
    }

    #[tokio::test]
    async fn dropped_subscribers_are_pruned() {
        let bus = InMemoryEventBus::new();
        let rx = bus.subscribe();
        let mut kept = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        drop(rx);
        bus.emit(envelope("s", 0)).await.unwrap();

        assert_eq!(bus.subscriber_count(), 1);
        assert!(kept.recv().await.is_some());
    }
}
