//! Order Store - in-process implementation
//!
//! Single-process stand-in for the PostgreSQL store, used by the test
//! suite and local development. The one mutex plays the role of the
//! row-level serialization the database gives the real store: CAS
//! evaluation and the audit append happen under the same guard.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::clock::{Clock, SystemClock};

use super::error::OrderError;
use super::state::OrderStatus;
use super::store::{AuditEntry, OrderStore, StatusChange};
use super::types::{ActorType, NewOrder, OrderId, OrderRecord};

#[derive(Default)]
struct Inner {
    orders: HashMap<OrderId, OrderRecord>,
    by_key: HashMap<String, OrderId>,
    audit: Vec<AuditEntry>,
}

/// In-process order store
pub struct MemoryOrderStore {
    inner: Mutex<Inner>,
    clock: Arc<dyn Clock>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            clock,
        }
    }

    /// Number of stored orders (test helper)
    pub async fn len(&self) -> usize {
        self.inner.lock().await.orders.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Overwrite a stored status with a raw string as legacy writers did.
    /// Unrecognized values surface as `CorruptRecord` on the next read.
    pub async fn poke_raw_status(&self, order_id: &OrderId, raw: &str) -> Result<(), OrderError> {
        let mut inner = self.inner.lock().await;
        let record = inner
            .orders
            .get_mut(order_id)
            .ok_or_else(|| OrderError::OrderNotFound(order_id.to_string()))?;
        record.status = OrderStatus::normalize(raw)
            .ok_or_else(|| OrderError::CorruptRecord(format!("bad status: {raw}")))?;
        Ok(())
    }
}

impl Default for MemoryOrderStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn create(&self, new: NewOrder) -> Result<OrderRecord, OrderError> {
        new.validate()?;

        let mut inner = self.inner.lock().await;

        if let Some(key) = &new.idempotency_key
            && let Some(existing_id) = inner.by_key.get(key)
        {
            let existing = inner.orders[existing_id].clone();
            tracing::info!(
                order_id = %existing.order_id,
                key = %key,
                "order with idempotency key already exists - returning existing record"
            );
            return Ok(existing);
        }

        let now = self.clock.now();
        let order_id = OrderId::new();
        let initial = new.order_type.initial_status();

        let record = OrderRecord {
            order_id,
            order_type: new.order_type,
            status: initial,
            user_id: new.user_id,
            amount: new.amount,
            bonus_amount: new.bonus_amount,
            total_amount: new.amount + new.bonus_amount,
            amount_adjusted: false,
            idempotency_key: new.idempotency_key.clone(),
            rejection_reason: None,
            metadata: new.metadata,
            created_at: now,
            updated_at: now,
        };

        if let Some(key) = &new.idempotency_key {
            inner.by_key.insert(key.clone(), order_id);
        }
        inner.orders.insert(order_id, record.clone());
        inner.audit.push(AuditEntry {
            order_id,
            from_status: None,
            to_status: initial,
            actor_id: new.user_id.to_string(),
            actor_type: ActorType::EndUser,
            reason: Some("order created".to_string()),
            correlation_id: uuid::Uuid::new_v4(),
            created_at: now,
        });

        Ok(record)
    }

    async fn get(&self, order_id: &OrderId) -> Result<Option<OrderRecord>, OrderError> {
        let inner = self.inner.lock().await;
        Ok(inner.orders.get(order_id).cloned())
    }

    async fn apply_transition(
        &self,
        order_id: &OrderId,
        from: OrderStatus,
        change: StatusChange,
    ) -> Result<Option<OrderRecord>, OrderError> {
        let mut inner = self.inner.lock().await;
        let now = self.clock.now();

        let Some(record) = inner.orders.get_mut(order_id) else {
            return Ok(None);
        };
        if record.status != from {
            // Concurrent writer got there first
            return Ok(None);
        }

        record.status = change.to;
        for (k, v) in &change.metadata_patch {
            record.metadata.insert(k.clone(), v.clone());
        }
        if let Some(amount) = change.new_amount {
            record.amount = amount;
            record.total_amount = amount + record.bonus_amount;
            record.amount_adjusted = true;
        }
        record.updated_at = now;
        let updated = record.clone();

        inner.audit.push(AuditEntry {
            order_id: *order_id,
            from_status: Some(from),
            to_status: change.to,
            actor_id: change.actor_id,
            actor_type: change.actor_type,
            reason: change.reason,
            correlation_id: change.correlation_id,
            created_at: now,
        });

        Ok(Some(updated))
    }

    async fn set_rejection_reason(
        &self,
        order_id: &OrderId,
        reason: &str,
    ) -> Result<(), OrderError> {
        let mut inner = self.inner.lock().await;
        let now = self.clock.now();
        let record = inner
            .orders
            .get_mut(order_id)
            .ok_or_else(|| OrderError::OrderNotFound(order_id.to_string()))?;
        record.rejection_reason = Some(reason.to_string());
        record.updated_at = now;
        Ok(())
    }

    async fn audit_trail(&self, order_id: &OrderId) -> Result<Vec<AuditEntry>, OrderError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .audit
            .iter()
            .filter(|e| e.order_id == *order_id)
            .cloned()
            .collect())
    }

    async fn find_stale_pending(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<OrderRecord>, OrderError> {
        let inner = self.inner.lock().await;
        let mut stale: Vec<OrderRecord> = inner
            .orders
            .values()
            .filter(|o| o.status == OrderStatus::PendingApproval && o.created_at < cutoff)
            .cloned()
            .collect();
        stale.sort_by_key(|o| o.created_at);
        stale.truncate(limit);
        Ok(stale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::types::OrderType;
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn test_create_and_get() {
        let store = MemoryOrderStore::new();
        let created = store
            .create(NewOrder::new(OrderType::TopUpWallet, 1001, Decimal::from(50)))
            .await
            .unwrap();

        assert_eq!(created.status, OrderStatus::PendingApproval);
        assert_eq!(created.total_amount, Decimal::from(50));

        let fetched = store.get(&created.order_id).await.unwrap().unwrap();
        assert_eq!(fetched.order_id, created.order_id);

        let trail = store.audit_trail(&created.order_id).await.unwrap();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].from_status, None);
        assert_eq!(trail[0].to_status, OrderStatus::PendingApproval);
    }

    #[tokio::test]
    async fn test_idempotent_create() {
        let store = MemoryOrderStore::new();
        let new = |key: &str| {
            NewOrder::new(OrderType::TopUpWallet, 1001, Decimal::from(50))
                .with_idempotency_key(key)
        };

        let first = store.create(new("k-1")).await.unwrap();
        let second = store.create(new("k-1")).await.unwrap();
        assert_eq!(first.order_id, second.order_id);
        assert_eq!(store.len().await, 1);

        let third = store.create(new("k-2")).await.unwrap();
        assert_ne!(first.order_id, third.order_id);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_cas_miss_returns_none() {
        let store = MemoryOrderStore::new();
        let created = store
            .create(NewOrder::new(OrderType::TopUpWallet, 1001, Decimal::from(50)))
            .await
            .unwrap();

        let change = StatusChange {
            to: OrderStatus::Approved,
            metadata_patch: Default::default(),
            new_amount: None,
            actor_id: "bot1".into(),
            actor_type: ActorType::ApprovalBot,
            reason: None,
            correlation_id: uuid::Uuid::new_v4(),
        };

        // Wrong expected status: CAS declines
        let miss = store
            .apply_transition(&created.order_id, OrderStatus::Approved, change.clone())
            .await
            .unwrap();
        assert!(miss.is_none());

        let hit = store
            .apply_transition(&created.order_id, OrderStatus::PendingApproval, change)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.status, OrderStatus::Approved);
    }
}
