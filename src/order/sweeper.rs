//! Expiry Sweeper
//!
//! Background worker that cancels approval prompts left undecided past
//! the approval window. Cancellations go through the engine like any
//! other transition, stamped with the system actor, so the audit trail
//! records why the order died.

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use tracing::{debug, error, info};

use super::error::OrderError;
use super::lifecycle::Lifecycle;
use super::store::OrderStore;
use super::types::Actor;

/// Configuration for the expiry sweeper
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// How often to scan for stale pending approvals
    pub scan_interval: Duration,
    /// Age past which a pending approval is cancelled
    pub approval_window: ChronoDuration,
    /// Maximum orders cancelled per scan
    pub batch_size: usize,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(300),
            approval_window: ChronoDuration::minutes(60),
            batch_size: 100,
        }
    }
}

/// Stale-approval sweeper
pub struct ExpirySweeper {
    lifecycle: Arc<Lifecycle>,
    config: SweeperConfig,
}

impl ExpirySweeper {
    pub fn new(lifecycle: Arc<Lifecycle>, config: SweeperConfig) -> Self {
        Self { lifecycle, config }
    }

    pub fn with_defaults(lifecycle: Arc<Lifecycle>) -> Self {
        Self::new(lifecycle, SweeperConfig::default())
    }

    /// Run the sweep loop forever
    pub async fn run(&self) -> ! {
        info!(
            scan_interval_secs = self.config.scan_interval.as_secs(),
            approval_window_mins = self.config.approval_window.num_minutes(),
            "starting expiry sweeper"
        );

        loop {
            if let Err(e) = self.scan_and_cancel().await {
                error!(error = %e, "expiry sweep failed");
            }

            tokio::time::sleep(self.config.scan_interval).await;
        }
    }

    /// Run a single sweep cycle; returns how many orders were cancelled
    pub async fn scan_and_cancel(&self) -> Result<usize, OrderError> {
        let engine = self.lifecycle.engine();
        let cutoff = engine.clock().now() - self.config.approval_window;

        let stale = engine
            .store()
            .find_stale_pending(cutoff, self.config.batch_size)
            .await?;

        if stale.is_empty() {
            debug!("no stale pending approvals");
            return Ok(0);
        }

        info!(count = stale.len(), "cancelling stale pending approvals");
        let system = Actor::system();
        let mut cancelled = 0;

        for order in stale {
            match self
                .lifecycle
                .cancel(&order.order_id, &system, "approval window expired")
                .await
            {
                Ok(outcome) if !outcome.is_noop => {
                    cancelled += 1;
                }
                Ok(_) => {}
                // A decision can land between the scan and the cancel;
                // that race losing here is the correct outcome.
                Err(OrderError::AlreadyProcessed(_))
                | Err(OrderError::ConcurrentModification { .. })
                | Err(OrderError::InvalidTransition { .. }) => {}
                Err(e) => {
                    error!(order_id = %order.order_id, error = %e, "failed to cancel stale order");
                }
            }
        }

        if cancelled > 0 {
            info!(count = cancelled, "stale approvals cancelled this sweep");
        }

        Ok(cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, SystemClock};
    use crate::order::engine::TransitionEngine;
    use crate::order::memory::MemoryOrderStore;
    use crate::order::state::OrderStatus;
    use crate::order::store::OrderStore;
    use crate::order::types::{ActorType, NewOrder, OrderType};
    use rust_decimal::Decimal;

    #[test]
    fn test_sweeper_config_default() {
        let config = SweeperConfig::default();
        assert_eq!(config.scan_interval, Duration::from_secs(300));
        assert_eq!(config.approval_window, ChronoDuration::minutes(60));
        assert_eq!(config.batch_size, 100);
    }

    #[tokio::test]
    async fn test_sweep_cancels_only_stale_pending() {
        let clock = Arc::new(ManualClock::new(chrono::Utc::now()));
        let store = Arc::new(MemoryOrderStore::with_clock(clock.clone()));
        let engine = Arc::new(TransitionEngine::new(store.clone(), clock.clone()));
        let lifecycle = Arc::new(Lifecycle::new(engine));
        let sweeper = ExpirySweeper::with_defaults(lifecycle.clone());

        let old = store
            .create(NewOrder::new(OrderType::TopUpWallet, 1001, Decimal::from(50)))
            .await
            .unwrap();
        let old_decided = store
            .create(NewOrder::new(OrderType::TopUpWallet, 1001, Decimal::from(10)))
            .await
            .unwrap();
        lifecycle
            .approve(&old_decided.order_id, &Actor::bot("bot1"), None)
            .await
            .unwrap();

        clock.advance(ChronoDuration::minutes(61));

        let fresh = store
            .create(NewOrder::new(OrderType::TopUpWallet, 1001, Decimal::from(20)))
            .await
            .unwrap();

        let cancelled = sweeper.scan_and_cancel().await.unwrap();
        assert_eq!(cancelled, 1);

        let old = store.get(&old.order_id).await.unwrap().unwrap();
        assert_eq!(old.status, OrderStatus::Cancelled);

        let fresh = store.get(&fresh.order_id).await.unwrap().unwrap();
        assert_eq!(fresh.status, OrderStatus::PendingApproval);

        let decided = store.get(&old_decided.order_id).await.unwrap().unwrap();
        assert_eq!(decided.status, OrderStatus::Approved);

        // Cancellation is audited with the system actor
        let trail = store.audit_trail(&old.order_id).await.unwrap();
        let last = trail.last().unwrap();
        assert_eq!(last.to_status, OrderStatus::Cancelled);
        assert_eq!(last.actor_type, ActorType::System);
        assert_eq!(last.reason.as_deref(), Some("approval window expired"));
    }

    #[tokio::test]
    async fn test_sweep_noop_when_nothing_stale() {
        let store = Arc::new(MemoryOrderStore::new());
        let engine = Arc::new(TransitionEngine::new(store.clone(), Arc::new(SystemClock)));
        let sweeper = ExpirySweeper::with_defaults(Arc::new(Lifecycle::new(engine)));

        store
            .create(NewOrder::new(OrderType::TopUpWallet, 1001, Decimal::from(50)))
            .await
            .unwrap();

        assert_eq!(sweeper.scan_and_cancel().await.unwrap(), 0);
    }
}
