//! Notification seam
//!
//! Fire-and-forget from the core's perspective: the orchestrator emits
//! one event per final outcome and logs (never propagates) emission
//! failures; the financial transaction has already committed by the
//! time an event goes out.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::order::{OrderId, OrderStatus, OrderType};

/// What happened to an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    OrderCompleted,
    OrderFailed,
    OrderRejected,
}

/// Outcome summary handed to external delivery (chat messages, webhooks)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub kind: EventKind,
    pub order_id: OrderId,
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub user_id: i64,
    pub amount: Decimal,
    pub actor_id: String,
    pub at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn emit(&self, event: NotificationEvent) -> anyhow::Result<()>;
}

/// Notifier that only writes the event to the log stream
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn emit(&self, event: NotificationEvent) -> anyhow::Result<()> {
        tracing::info!(
            order_id = %event.order_id,
            kind = ?event.kind,
            status = %event.status,
            amount = %event.amount,
            actor = %event.actor_id,
            "order outcome"
        );
        Ok(())
    }
}

/// Notifier that records events in memory (tests)
#[derive(Default)]
pub struct RecordingNotifier {
    events: std::sync::Mutex<Vec<NotificationEvent>>,
    fail: std::sync::atomic::AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every emit fail, to verify failures never propagate
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn emit(&self, event: NotificationEvent) -> anyhow::Result<()> {
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            anyhow::bail!("notification channel down");
        }
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}
