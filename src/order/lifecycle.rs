//! Lifecycle Helpers
//!
//! Named operations over the transition engine. Each fixes the target
//! status and the metadata shape for one semantic action; none of them
//! touch balances, that is the approval orchestrator's job.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde_json::Value;

use super::engine::{TransitionCtx, TransitionEngine, TransitionOutcome};
use super::error::OrderError;
use super::state::OrderStatus;
use super::store::OrderStore;
use super::types::{Actor, Metadata, OrderId};

/// Named lifecycle operations
pub struct Lifecycle {
    engine: Arc<TransitionEngine>,
}

impl Lifecycle {
    pub fn new(engine: Arc<TransitionEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<TransitionEngine> {
        &self.engine
    }

    /// Record an explicit approval, optionally adjusting the amount.
    ///
    /// The amount may be adjusted exactly once; the original value is
    /// preserved in metadata. Direct-execution order types are not
    /// approvable and yield `NotApprovable`.
    pub async fn approve(
        &self,
        order_id: &OrderId,
        actor: &Actor,
        final_amount: Option<Decimal>,
    ) -> Result<TransitionOutcome, OrderError> {
        let record = self
            .engine
            .store()
            .get(order_id)
            .await?
            .ok_or_else(|| OrderError::OrderNotFound(order_id.to_string()))?;

        if !record.order_type.requires_approval() {
            return Err(OrderError::NotApprovable(
                record.order_type.as_str().to_string(),
            ));
        }

        let mut patch = Metadata::new();
        patch.insert(
            "approved_by".to_string(),
            Value::String(actor.id.clone()),
        );

        let mut new_amount = None;
        if let Some(amount) = final_amount {
            if amount <= Decimal::ZERO {
                return Err(OrderError::InvalidAmount);
            }
            if amount != record.amount && !record.amount_adjusted {
                patch.insert("amount_adjusted".to_string(), Value::Bool(true));
                patch.insert(
                    "original_amount".to_string(),
                    Value::String(record.amount.to_string()),
                );
                patch.insert(
                    "adjusted_amount".to_string(),
                    Value::String(amount.to_string()),
                );
                patch.insert("adjusted_by".to_string(), Value::String(actor.id.clone()));
                new_amount = Some(amount);
            }
        }

        self.engine
            .transition(
                order_id,
                OrderStatus::Approved,
                actor,
                TransitionCtx {
                    reason: Some("approved"),
                    metadata_patch: patch,
                    new_amount,
                    ..Default::default()
                },
            )
            .await
    }

    /// Decline the order with a reason
    pub async fn reject(
        &self,
        order_id: &OrderId,
        actor: &Actor,
        reason: &str,
    ) -> Result<TransitionOutcome, OrderError> {
        let now = self.engine.clock().now();
        let mut patch = Metadata::new();
        patch.insert("rejected_by".to_string(), Value::String(actor.id.clone()));
        patch.insert(
            "rejected_at".to_string(),
            Value::String(now.to_rfc3339()),
        );
        patch.insert(
            "rejection_reason".to_string(),
            Value::String(reason.to_string()),
        );

        self.engine
            .transition(
                order_id,
                OrderStatus::Rejected,
                actor,
                TransitionCtx {
                    reason: Some(reason),
                    metadata_patch: patch,
                    ..Default::default()
                },
            )
            .await
    }

    /// Mark side-effect execution as underway
    pub async fn start_processing(
        &self,
        order_id: &OrderId,
        actor: &Actor,
    ) -> Result<TransitionOutcome, OrderError> {
        self.engine
            .transition(
                order_id,
                OrderStatus::Processing,
                actor,
                Default::default(),
            )
            .await
    }

    /// Terminal success; only called after the balance mutation committed
    pub async fn complete(
        &self,
        order_id: &OrderId,
        actor: &Actor,
        result_text: &str,
    ) -> Result<TransitionOutcome, OrderError> {
        let now = self.engine.clock().now();
        let mut patch = Metadata::new();
        patch.insert(
            "completed_at".to_string(),
            Value::String(now.to_rfc3339()),
        );
        patch.insert(
            "execution_result".to_string(),
            Value::String(result_text.to_string()),
        );

        self.engine
            .transition(
                order_id,
                OrderStatus::Completed,
                actor,
                TransitionCtx {
                    reason: Some("side effect committed"),
                    metadata_patch: patch,
                    ..Default::default()
                },
            )
            .await
    }

    /// Terminal failure of side-effect execution
    pub async fn fail(
        &self,
        order_id: &OrderId,
        actor: &Actor,
        error_text: &str,
    ) -> Result<TransitionOutcome, OrderError> {
        let now = self.engine.clock().now();
        let mut patch = Metadata::new();
        patch.insert("failed_at".to_string(), Value::String(now.to_rfc3339()));
        patch.insert(
            "error_message".to_string(),
            Value::String(error_text.to_string()),
        );

        self.engine
            .transition(
                order_id,
                OrderStatus::Failed,
                actor,
                TransitionCtx {
                    reason: Some(error_text),
                    metadata_patch: patch,
                    ..Default::default()
                },
            )
            .await
    }

    /// Withdraw a pending order before a decision
    pub async fn cancel(
        &self,
        order_id: &OrderId,
        actor: &Actor,
        reason: &str,
    ) -> Result<TransitionOutcome, OrderError> {
        let mut patch = Metadata::new();
        patch.insert("cancelled_by".to_string(), Value::String(actor.id.clone()));

        self.engine
            .transition(
                order_id,
                OrderStatus::Cancelled,
                actor,
                TransitionCtx {
                    reason: Some(reason),
                    metadata_patch: patch,
                    ..Default::default()
                },
            )
            .await
    }

    /// Audited administrative retry of a failed order (see engine docs)
    pub async fn retry_failed(
        &self,
        order_id: &OrderId,
        actor: &Actor,
        reason: &str,
    ) -> Result<TransitionOutcome, OrderError> {
        self.engine.manual_retry(order_id, actor, reason).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::order::memory::MemoryOrderStore;
    use crate::order::types::{NewOrder, OrderType};

    fn lifecycle() -> (Arc<MemoryOrderStore>, Lifecycle) {
        let store = Arc::new(MemoryOrderStore::new());
        let engine = Arc::new(TransitionEngine::new(
            store.clone(),
            Arc::new(SystemClock),
        ));
        (store, Lifecycle::new(engine))
    }

    #[tokio::test]
    async fn test_approve_records_actor() {
        let (store, lc) = lifecycle();
        let order = store
            .create(NewOrder::new(OrderType::TopUpWallet, 1001, Decimal::from(50)))
            .await
            .unwrap();

        let outcome = lc
            .approve(&order.order_id, &Actor::bot("bot1"), None)
            .await
            .unwrap();
        assert_eq!(outcome.order.status, OrderStatus::Approved);
        assert_eq!(
            outcome.order.metadata.get("approved_by"),
            Some(&Value::String("bot1".to_string()))
        );
        assert!(!outcome.order.amount_adjusted);
    }

    #[tokio::test]
    async fn test_approve_adjusts_amount_once() {
        let (store, lc) = lifecycle();
        let order = store
            .create(NewOrder::new(OrderType::TopUpWallet, 1001, Decimal::from(50)))
            .await
            .unwrap();

        let outcome = lc
            .approve(
                &order.order_id,
                &Actor::admin("ops-1"),
                Some(Decimal::from(30)),
            )
            .await
            .unwrap();

        let order = outcome.order;
        assert_eq!(order.amount, Decimal::from(30));
        assert_eq!(order.total_amount, Decimal::from(30));
        assert!(order.amount_adjusted);
        assert_eq!(
            order.metadata.get("original_amount"),
            Some(&Value::String("50".to_string()))
        );
        assert_eq!(
            order.metadata.get("adjusted_by"),
            Some(&Value::String("ops-1".to_string()))
        );
    }

    #[tokio::test]
    async fn test_approve_rejects_direct_execution_type() {
        let (store, lc) = lifecycle();
        let order = store
            .create(NewOrder::new(OrderType::GameLoad, 1001, Decimal::from(20)))
            .await
            .unwrap();

        let err = lc
            .approve(&order.order_id, &Actor::bot("bot1"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::NotApprovable(_)));
    }

    #[tokio::test]
    async fn test_approve_rejects_nonpositive_adjustment() {
        let (store, lc) = lifecycle();
        let order = store
            .create(NewOrder::new(OrderType::TopUpWallet, 1001, Decimal::from(50)))
            .await
            .unwrap();

        let err = lc
            .approve(&order.order_id, &Actor::bot("bot1"), Some(Decimal::ZERO))
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::InvalidAmount));
    }

    #[tokio::test]
    async fn test_reject_stores_reason_keys() {
        let (store, lc) = lifecycle();
        let order = store
            .create(NewOrder::new(
                OrderType::WithdrawWallet,
                1001,
                Decimal::from(50),
            ))
            .await
            .unwrap();

        let outcome = lc
            .reject(&order.order_id, &Actor::admin("ops-1"), "kyc incomplete")
            .await
            .unwrap();
        let md = &outcome.order.metadata;
        assert_eq!(
            md.get("rejection_reason"),
            Some(&Value::String("kyc incomplete".to_string()))
        );
        assert_eq!(md.get("rejected_by"), Some(&Value::String("ops-1".into())));
        assert!(md.contains_key("rejected_at"));
    }

    #[tokio::test]
    async fn test_full_happy_path() {
        let (store, lc) = lifecycle();
        let order = store
            .create(NewOrder::new(OrderType::TopUpWallet, 1001, Decimal::from(50)))
            .await
            .unwrap();
        let bot = Actor::bot("bot1");

        lc.approve(&order.order_id, &bot, None).await.unwrap();
        lc.start_processing(&order.order_id, &bot).await.unwrap();
        let done = lc
            .complete(&order.order_id, &bot, "credited 50")
            .await
            .unwrap();

        assert_eq!(done.order.status, OrderStatus::Completed);
        assert!(done.order.metadata.contains_key("completed_at"));
        assert_eq!(
            done.order.metadata.get("execution_result"),
            Some(&Value::String("credited 50".to_string()))
        );
        // Full audit chain: created -> approved -> processing -> completed
        let trail = store.audit_trail(&order.order_id).await.unwrap();
        let statuses: Vec<_> = trail.iter().map(|e| e.to_status).collect();
        assert_eq!(
            statuses,
            vec![
                OrderStatus::PendingApproval,
                OrderStatus::Approved,
                OrderStatus::Processing,
                OrderStatus::Completed,
            ]
        );
    }
}
