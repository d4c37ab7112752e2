//! Order Store seam
//!
//! Persistence contract for order rows and their audit trail. All status
//! writes go through `apply_transition`, an atomic compare-and-swap that
//! also merges the metadata patch and appends the audit entry in the same
//! transaction. Nothing else in the crate writes `status`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::error::OrderError;
use super::state::OrderStatus;
use super::types::{ActorType, Metadata, NewOrder, OrderId, OrderRecord};

/// One audit row per creation or transition event. Append-only; the
/// canonical history independent of the order's metadata snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub order_id: OrderId,
    /// None for the creation event
    pub from_status: Option<OrderStatus>,
    pub to_status: OrderStatus,
    pub actor_id: String,
    pub actor_type: ActorType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub correlation_id: uuid::Uuid,
    pub created_at: DateTime<Utc>,
}

/// Everything `apply_transition` writes under the row's CAS guard
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub to: OrderStatus,
    /// Keys merged into the existing metadata bag, never replacing it
    pub metadata_patch: Metadata,
    /// One-shot amount adjustment recorded at approval time
    pub new_amount: Option<Decimal>,
    pub actor_id: String,
    pub actor_type: ActorType,
    pub reason: Option<String>,
    pub correlation_id: uuid::Uuid,
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert a new order in its type's initial status and append the
    /// creation audit entry.
    ///
    /// Idempotent: when `idempotency_key` is present and a row with that
    /// key already exists (including one that wins an insert race), the
    /// existing order is returned instead of a duplicate.
    async fn create(&self, new: NewOrder) -> Result<OrderRecord, OrderError>;

    /// Fetch one order; statuses are normalized before being returned
    async fn get(&self, order_id: &OrderId) -> Result<Option<OrderRecord>, OrderError>;

    /// Atomic CAS: apply `change` only if the row's current status still
    /// normalizes to `from`. Returns the updated record, or `None` when a
    /// concurrent writer got there first (caller re-reads and re-evaluates).
    ///
    /// The status write, metadata merge, optional amount adjustment and
    /// audit insert commit together or not at all.
    async fn apply_transition(
        &self,
        order_id: &OrderId,
        from: OrderStatus,
        change: StatusChange,
    ) -> Result<Option<OrderRecord>, OrderError>;

    /// Update the free-form rejection reason. Allowed in any state; this
    /// is the one annotation field outside the state machine.
    async fn set_rejection_reason(
        &self,
        order_id: &OrderId,
        reason: &str,
    ) -> Result<(), OrderError>;

    /// Full audit trail for one order, oldest first
    async fn audit_trail(&self, order_id: &OrderId) -> Result<Vec<AuditEntry>, OrderError>;

    /// Orders still pending approval that were created before `cutoff`,
    /// oldest first. Used by the expiry sweeper.
    async fn find_stale_pending(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<OrderRecord>, OrderError>;
}
