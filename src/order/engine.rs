//! Transition Engine
//!
//! The single choke point for order status writes. Validates a requested
//! change against the adjacency map, stamps the last-transition
//! breadcrumb, and hands the store one atomic CAS carrying the status
//! write, the metadata merge and the audit entry.
//!
//! Concurrency control is CAS-plus-re-evaluate: a lost race re-reads the
//! now-current status and resolves the request against it, typically to
//! an idempotent no-op or an `InvalidTransition`. All transitions for one
//! order are totally ordered by the store's serialization; orders never
//! block each other.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::clock::Clock;

use super::error::OrderError;
use super::state::OrderStatus;
use super::store::{OrderStore, StatusChange};
use super::types::{Actor, ActorType, LastTransition, Metadata, OrderId, OrderRecord};

/// Lost-race retries before giving up with `ConcurrentModification`.
/// Each retry re-reads and re-validates, so contention resolves in one
/// or two passes in practice.
const MAX_CAS_ATTEMPTS: usize = 3;

/// Result of a transition request
#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub order: OrderRecord,
    /// True when the order was already in the target state. Callers must
    /// treat this as success; it is what makes retries safe.
    pub is_noop: bool,
}

/// Everything a caller supplies alongside the target status
#[derive(Debug, Default)]
pub struct TransitionCtx<'a> {
    pub reason: Option<&'a str>,
    pub metadata_patch: Metadata,
    /// Optimistic-lock style conflict detection for callers that raced
    pub expected_from: Option<OrderStatus>,
    /// One-shot amount adjustment, set only by `approve`
    pub new_amount: Option<Decimal>,
}

/// Order FSM transition engine
pub struct TransitionEngine {
    store: Arc<dyn OrderStore>,
    clock: Arc<dyn Clock>,
}

impl TransitionEngine {
    pub fn new(store: Arc<dyn OrderStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn store(&self) -> &Arc<dyn OrderStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Drive one order to `to`, enforcing the adjacency map
    pub async fn transition(
        &self,
        order_id: &OrderId,
        to: OrderStatus,
        actor: &Actor,
        ctx: TransitionCtx<'_>,
    ) -> Result<TransitionOutcome, OrderError> {
        for attempt in 0..MAX_CAS_ATTEMPTS {
            let record = self
                .store
                .get(order_id)
                .await?
                .ok_or_else(|| OrderError::OrderNotFound(order_id.to_string()))?;
            let current = record.status;

            if current == to {
                return Ok(TransitionOutcome {
                    order: record,
                    is_noop: true,
                });
            }

            if let Some(expected) = ctx.expected_from
                && current != expected
            {
                return Err(OrderError::ConcurrentModification {
                    expected,
                    actual: current,
                });
            }

            if current.is_terminal() {
                return Err(OrderError::AlreadyProcessed(current));
            }

            if !current.can_transition_to(to) {
                return Err(OrderError::InvalidTransition {
                    from: current,
                    to,
                    allowed: legal_next(current),
                });
            }

            let change = self.build_change(current, to, actor, &ctx);
            if let Some(updated) = self
                .store
                .apply_transition(order_id, current, change)
                .await?
            {
                info!(
                    order_id = %order_id,
                    from = %current,
                    to = %to,
                    actor = %actor,
                    "order transitioned"
                );
                return Ok(TransitionOutcome {
                    order: updated,
                    is_noop: false,
                });
            }

            warn!(
                order_id = %order_id,
                from = %current,
                to = %to,
                attempt = attempt + 1,
                "lost transition race - re-evaluating"
            );
        }

        // The row kept moving under us; report the conflict rather than spin
        let actual = self
            .store
            .get(order_id)
            .await?
            .map(|r| r.status)
            .ok_or_else(|| OrderError::OrderNotFound(order_id.to_string()))?;
        Err(OrderError::ConcurrentModification {
            expected: ctx.expected_from.unwrap_or(to),
            actual,
        })
    }

    /// Explicit administrative retry of a failed order back to `approved`.
    ///
    /// `failed -> approved` is deliberately NOT an edge of the state
    /// machine; this is a separately audited manual action restricted to
    /// admins and requiring a reason.
    pub async fn manual_retry(
        &self,
        order_id: &OrderId,
        actor: &Actor,
        reason: &str,
    ) -> Result<TransitionOutcome, OrderError> {
        if actor.kind != ActorType::Admin {
            return Err(OrderError::Unauthorized);
        }
        if reason.trim().is_empty() {
            return Err(OrderError::RetryReasonRequired);
        }

        let record = self
            .store
            .get(order_id)
            .await?
            .ok_or_else(|| OrderError::OrderNotFound(order_id.to_string()))?;

        match record.status {
            OrderStatus::Approved => {
                return Ok(TransitionOutcome {
                    order: record,
                    is_noop: true,
                });
            }
            OrderStatus::Failed => {}
            s if s.is_terminal() => return Err(OrderError::AlreadyProcessed(s)),
            s => {
                return Err(OrderError::InvalidTransition {
                    from: s,
                    to: OrderStatus::Approved,
                    allowed: legal_next(s),
                });
            }
        }

        let mut ctx = TransitionCtx {
            reason: Some(reason),
            ..Default::default()
        };
        ctx.metadata_patch
            .insert("manual_retry".to_string(), serde_json::Value::Bool(true));
        ctx.metadata_patch.insert(
            "manual_retry_by".to_string(),
            serde_json::Value::String(actor.id.clone()),
        );

        let change = self.build_change(OrderStatus::Failed, OrderStatus::Approved, actor, &ctx);
        match self
            .store
            .apply_transition(order_id, OrderStatus::Failed, change)
            .await?
        {
            Some(updated) => {
                info!(
                    order_id = %order_id,
                    actor = %actor,
                    reason = %reason,
                    "failed order manually re-approved"
                );
                Ok(TransitionOutcome {
                    order: updated,
                    is_noop: false,
                })
            }
            None => {
                let actual = self
                    .store
                    .get(order_id)
                    .await?
                    .map(|r| r.status)
                    .ok_or_else(|| OrderError::OrderNotFound(order_id.to_string()))?;
                Err(OrderError::ConcurrentModification {
                    expected: OrderStatus::Failed,
                    actual,
                })
            }
        }
    }

    fn build_change(
        &self,
        from: OrderStatus,
        to: OrderStatus,
        actor: &Actor,
        ctx: &TransitionCtx<'_>,
    ) -> StatusChange {
        let correlation_id = uuid::Uuid::new_v4();
        let breadcrumb = LastTransition {
            from,
            to,
            actor_id: actor.id.clone(),
            actor_type: actor.kind,
            reason: ctx.reason.map(str::to_string),
            at: self.clock.now(),
            correlation_id,
        };

        let mut patch = ctx.metadata_patch.clone();
        patch.insert(
            "last_transition".to_string(),
            serde_json::to_value(&breadcrumb).unwrap_or(serde_json::Value::Null),
        );

        StatusChange {
            to,
            metadata_patch: patch,
            new_amount: ctx.new_amount,
            actor_id: actor.id.clone(),
            actor_type: actor.kind,
            reason: ctx.reason.map(str::to_string),
            correlation_id,
        }
    }
}

fn legal_next(from: OrderStatus) -> String {
    from.allowed_next()
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
