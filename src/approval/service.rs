//! Approval Orchestrator
//!
//! Actor-facing entry point: takes an approve/reject decision, drives
//! the order through the state machine, executes the balance side effect
//! inside one account transaction, and lands the order on an honest
//! terminal status: `completed` only if the money actually moved.
//!
//! Ordering is what prevents "completed but not paid": the transition to
//! `processing` commits before the balance mutation is attempted, and
//! `complete`/`fail` is written only after the account transaction has
//! resolved. The window where the order reads `processing` with funds
//! not yet moved is bounded and always resolves to a terminal state.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde_json::json;
use tracing::{info, warn};

use crate::account::AccountStore;
use crate::notify::{EventKind, NotificationEvent, Notifier};
use crate::order::{
    Actor, ActorType, Lifecycle, OrderError, OrderId, OrderRecord, OrderStatus, OrderStore,
    OrderType,
};

use super::gate::{ActorDirectory, Capability};
use super::guards::{ApprovalAction, ApprovalGuards};

/// Outcome returned to handler layers
#[derive(Debug, Clone)]
pub struct ApprovalResult {
    pub success: bool,
    pub message: String,
    pub data: serde_json::Value,
}

impl ApprovalResult {
    fn ok(message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
        }
    }

    fn refused(message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            success: false,
            message: message.into(),
            data,
        }
    }
}

/// Approval orchestrator
pub struct ApprovalService {
    lifecycle: Arc<Lifecycle>,
    accounts: Arc<dyn AccountStore>,
    notifier: Arc<dyn Notifier>,
    directory: Arc<dyn ActorDirectory>,
    guards: Arc<ApprovalGuards>,
}

impl ApprovalService {
    pub fn new(
        lifecycle: Arc<Lifecycle>,
        accounts: Arc<dyn AccountStore>,
        notifier: Arc<dyn Notifier>,
        directory: Arc<dyn ActorDirectory>,
        guards: Arc<ApprovalGuards>,
    ) -> Self {
        Self {
            lifecycle,
            accounts,
            notifier,
            directory,
            guards,
        }
    }

    /// Read-only order lookup for detail views
    pub async fn get(&self, order_id: &OrderId) -> Result<OrderRecord, OrderError> {
        self.lifecycle
            .engine()
            .store()
            .get(order_id)
            .await?
            .ok_or_else(|| OrderError::OrderNotFound(order_id.to_string()))
    }

    /// Take an approve/reject decision on one order.
    ///
    /// Idempotent from the caller's perspective: a second press of the
    /// same control, or a second racing bot, gets an already-actioned
    /// refusal or a no-op result. One financial effect, ever.
    pub async fn decide(
        &self,
        order_id: &OrderId,
        action: ApprovalAction,
        actor: &Actor,
        final_amount: Option<Decimal>,
        rejection_reason: Option<&str>,
    ) -> Result<ApprovalResult, OrderError> {
        let order = self.get(order_id).await?;

        if !order.order_type.requires_approval() {
            return Err(OrderError::NotApprovable(
                order.order_type.as_str().to_string(),
            ));
        }

        self.authorize(actor, order.order_type).await?;

        if self.guards.is_expired(order.created_at) {
            return Err(OrderError::ApprovalExpired);
        }

        // UI-level replay guard, independent of the state machine
        if !self.guards.try_consume(order_id, action) {
            info!(order_id = %order_id, action = %action, actor = %actor, "approval control already actioned");
            return Ok(ApprovalResult::refused(
                format!("{action} already actioned for this order"),
                json!({ "order_id": order_id.to_string(), "already_actioned": true }),
            ));
        }

        match action {
            ApprovalAction::Approve => self.run_approve(order_id, actor, final_amount).await,
            ApprovalAction::Reject => {
                self.run_reject(order_id, actor, rejection_reason.unwrap_or("rejected"))
                    .await
            }
        }
    }

    /// Execute a direct-execution order (created straight in `processing`).
    ///
    /// These never enter the approval path; the same single-use token
    /// still protects against double execution.
    pub async fn execute_direct(
        &self,
        order_id: &OrderId,
        actor: &Actor,
    ) -> Result<ApprovalResult, OrderError> {
        let order = self.get(order_id).await?;

        if order.order_type.requires_approval() {
            return Err(OrderError::NotApprovable(
                order.order_type.as_str().to_string(),
            ));
        }

        self.authorize(actor, order.order_type).await?;

        if !self.guards.try_consume(order_id, ApprovalAction::Approve) {
            return Ok(ApprovalResult::refused(
                "execution already actioned for this order",
                json!({ "order_id": order_id.to_string(), "already_actioned": true }),
            ));
        }

        if order.status != OrderStatus::Processing {
            return Ok(ApprovalResult::refused(
                format!("order already processed (status: {})", order.status),
                json!({ "order_id": order_id.to_string(), "status": order.status }),
            ));
        }

        self.execute_and_finish(&order, actor).await
    }

    async fn run_approve(
        &self,
        order_id: &OrderId,
        actor: &Actor,
        final_amount: Option<Decimal>,
    ) -> Result<ApprovalResult, OrderError> {
        // Approval; a no-op (already approved) means a previous attempt
        // got this far and died - continue, the path is idempotent
        let approved = match self.lifecycle.approve(order_id, actor, final_amount).await {
            Ok(outcome) => outcome,
            Err(OrderError::AlreadyProcessed(status)) => {
                return Ok(ApprovalResult::refused(
                    format!("order already processed (status: {status})"),
                    json!({ "order_id": order_id.to_string(), "status": status }),
                ));
            }
            Err(e) => return Err(e),
        };
        if approved.is_noop {
            info!(order_id = %order_id, "order was already approved - resuming");
        }

        let processing = match self.lifecycle.start_processing(order_id, actor).await {
            Ok(outcome) => outcome,
            Err(OrderError::AlreadyProcessed(status)) => {
                return Ok(ApprovalResult::refused(
                    format!("order already processed (status: {status})"),
                    json!({ "order_id": order_id.to_string(), "status": status }),
                ));
            }
            Err(e) => return Err(e),
        };

        self.execute_and_finish(&processing.order, actor).await
    }

    /// Side-effect execution plus terminal transition and notification.
    /// The order must already be in `processing`.
    async fn execute_and_finish(
        &self,
        order: &OrderRecord,
        actor: &Actor,
    ) -> Result<ApprovalResult, OrderError> {
        let order_id = order.order_id;

        match self.execute_side_effect(order).await {
            Ok(result_text) => {
                let done = self
                    .lifecycle
                    .complete(&order_id, actor, &result_text)
                    .await?;

                self.emit(NotificationEvent {
                    kind: EventKind::OrderCompleted,
                    order_id,
                    order_type: order.order_type,
                    status: done.order.status,
                    user_id: order.user_id,
                    amount: order.total_amount,
                    actor_id: actor.id.clone(),
                    at: self.lifecycle.engine().clock().now(),
                    detail: Some(result_text.clone()),
                })
                .await;

                Ok(ApprovalResult::ok(
                    result_text,
                    json!({
                        "order_id": order_id.to_string(),
                        "status": done.order.status,
                        "amount": order.total_amount,
                    }),
                ))
            }
            Err(e) => {
                // The side effect did not commit; land on an honest
                // terminal status instead of leaving `processing` stuck
                let error_text = e.to_string();
                if let Err(fail_err) = self.lifecycle.fail(&order_id, actor, &error_text).await {
                    warn!(order_id = %order_id, error = %fail_err, "could not record execution failure");
                }

                self.emit(NotificationEvent {
                    kind: EventKind::OrderFailed,
                    order_id,
                    order_type: order.order_type,
                    status: OrderStatus::Failed,
                    user_id: order.user_id,
                    amount: order.total_amount,
                    actor_id: actor.id.clone(),
                    at: self.lifecycle.engine().clock().now(),
                    detail: Some(error_text.clone()),
                })
                .await;

                Ok(ApprovalResult::refused(
                    format!("execution failed: {error_text}"),
                    json!({
                        "order_id": order_id.to_string(),
                        "status": OrderStatus::Failed,
                        "error": error_text,
                    }),
                ))
            }
        }
    }

    /// The balance mutation, one account transaction per order type
    async fn execute_side_effect(&self, order: &OrderRecord) -> Result<String, OrderError> {
        if order.order_type.is_credit() {
            let entry = self
                .accounts
                .credit(
                    order.user_id,
                    order.amount,
                    order.bonus_amount,
                    &order.order_id,
                )
                .await?;
            Ok(format!(
                "credited {} (balance {} -> {})",
                entry.amount, entry.balance_before, entry.balance_after
            ))
        } else {
            let entry = self
                .accounts
                .debit(order.user_id, order.amount, &order.order_id)
                .await?;
            Ok(format!(
                "debited {} (balance {} -> {})",
                entry.amount, entry.balance_before, entry.balance_after
            ))
        }
    }

    async fn run_reject(
        &self,
        order_id: &OrderId,
        actor: &Actor,
        reason: &str,
    ) -> Result<ApprovalResult, OrderError> {
        let rejected = match self.lifecycle.reject(order_id, actor, reason).await {
            Ok(outcome) => outcome,
            Err(OrderError::AlreadyProcessed(status)) => {
                return Ok(ApprovalResult::refused(
                    format!("order already processed (status: {status})"),
                    json!({ "order_id": order_id.to_string(), "status": status }),
                ));
            }
            Err(e) => return Err(e),
        };

        self.lifecycle
            .engine()
            .store()
            .set_rejection_reason(order_id, reason)
            .await?;

        self.emit(NotificationEvent {
            kind: EventKind::OrderRejected,
            order_id: *order_id,
            order_type: rejected.order.order_type,
            status: rejected.order.status,
            user_id: rejected.order.user_id,
            amount: rejected.order.total_amount,
            actor_id: actor.id.clone(),
            at: self.lifecycle.engine().clock().now(),
            detail: Some(reason.to_string()),
        })
        .await;

        Ok(ApprovalResult::ok(
            format!("order rejected: {reason}"),
            json!({
                "order_id": order_id.to_string(),
                "status": rejected.order.status,
                "is_noop": rejected.is_noop,
            }),
        ))
    }

    /// Audited administrative retry of a failed order.
    ///
    /// Re-approves through the engine's manual-retry path (admin-only,
    /// reason mandatory) and releases the approval control so a fresh
    /// `decide(approve)` can drive execution again.
    pub async fn retry_failed(
        &self,
        order_id: &OrderId,
        actor: &Actor,
        reason: &str,
    ) -> Result<ApprovalResult, OrderError> {
        let outcome = self.lifecycle.retry_failed(order_id, actor, reason).await?;
        self.guards.release(order_id, ApprovalAction::Approve);

        Ok(ApprovalResult::ok(
            format!("order re-approved for retry: {reason}"),
            json!({
                "order_id": order_id.to_string(),
                "status": outcome.order.status,
                "is_noop": outcome.is_noop,
            }),
        ))
    }

    /// Defense-in-depth: handlers gate before calling in, and the
    /// orchestrator re-checks so internal callers cannot bypass it
    async fn authorize(&self, actor: &Actor, order_type: OrderType) -> Result<(), OrderError> {
        match actor.kind {
            ActorType::Admin | ActorType::System => Ok(()),
            ActorType::EndUser => Err(OrderError::Unauthorized),
            ActorType::ApprovalBot => {
                let capability = Capability::for_order_type(order_type);
                if self.directory.is_authorized(&actor.id, capability).await {
                    Ok(())
                } else {
                    Err(OrderError::Unauthorized)
                }
            }
        }
    }

    /// Notification emission never fails the decision path
    async fn emit(&self, event: NotificationEvent) {
        if let Err(e) = self.notifier.emit(event).await {
            warn!(error = %e, "notification emission failed (ignored)");
        }
    }
}
