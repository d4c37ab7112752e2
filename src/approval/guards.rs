//! Idempotency & replay guards
//!
//! Two protections that sit in front of the state machine:
//!
//! - a single-use token per `(order, action)`: the first caller to
//!   consume it wins; a second press of the same approval control is
//!   turned away without touching order state;
//! - a logical expiry: approval prompts older than the configured
//!   window are refused outright, bounding how stale a decision can be.
//!
//! The token cache is a bounded map guarded by a plain mutex, evicting
//! oldest-first at capacity. It is an injected component, not a hidden
//! module-level singleton, so a shared cache can replace it if the
//! service ever runs as more than one process.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

use crate::clock::Clock;
use crate::order::OrderId;

/// The two decisions an approval control can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApprovalAction {
    Approve,
    Reject,
}

impl ApprovalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalAction::Approve => "approve",
            ApprovalAction::Reject => "reject",
        }
    }
}

impl fmt::Display for ApprovalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Guard configuration
#[derive(Debug, Clone)]
pub struct GuardConfig {
    /// Maximum age of an approval prompt before it is refused
    pub approval_window: Duration,
    /// Token cache capacity; oldest entries are evicted beyond this
    pub token_capacity: usize,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            approval_window: Duration::minutes(60),
            token_capacity: 4096,
        }
    }
}

#[derive(Default)]
struct TokenCache {
    used: HashMap<(OrderId, ApprovalAction), DateTime<Utc>>,
    order: VecDeque<(OrderId, ApprovalAction)>,
}

/// Single-use tokens + expiry window
pub struct ApprovalGuards {
    config: GuardConfig,
    clock: Arc<dyn Clock>,
    tokens: Mutex<TokenCache>,
}

impl ApprovalGuards {
    pub fn new(config: GuardConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            tokens: Mutex::new(TokenCache::default()),
        }
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Consume the single-use token for `(order, action)`.
    ///
    /// Returns true for the first caller; false for everyone after, who
    /// must be told the control was already actioned without the state
    /// machine being re-entered.
    pub fn try_consume(&self, order_id: &OrderId, action: ApprovalAction) -> bool {
        let mut cache = self.tokens.lock().unwrap();
        let key = (*order_id, action);

        if cache.used.contains_key(&key) {
            return false;
        }

        while cache.order.len() >= self.config.token_capacity {
            if let Some(evicted) = cache.order.pop_front() {
                cache.used.remove(&evicted);
            }
        }

        cache.used.insert(key, self.clock.now());
        cache.order.push_back(key);
        true
    }

    /// Release a consumed token so the control can be actioned again.
    /// Only the audited manual-retry path does this.
    pub fn release(&self, order_id: &OrderId, action: ApprovalAction) {
        let mut cache = self.tokens.lock().unwrap();
        let key = (*order_id, action);
        cache.used.remove(&key);
        cache.order.retain(|k| *k != key);
    }

    /// Whether a prompt created at `created_at` is past the window
    pub fn is_expired(&self, created_at: DateTime<Utc>) -> bool {
        self.clock.now() - created_at > self.config.approval_window
    }

    /// Number of tokens currently held (test helper)
    pub fn token_count(&self) -> usize {
        self.tokens.lock().unwrap().used.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, SystemClock};

    fn guards(config: GuardConfig) -> ApprovalGuards {
        ApprovalGuards::new(config, Arc::new(SystemClock))
    }

    #[test]
    fn test_token_single_use() {
        let guards = guards(GuardConfig::default());
        let id = OrderId::new();

        assert!(guards.try_consume(&id, ApprovalAction::Approve));
        assert!(!guards.try_consume(&id, ApprovalAction::Approve));
        // Different action on the same order is a different token
        assert!(guards.try_consume(&id, ApprovalAction::Reject));
        assert!(!guards.try_consume(&id, ApprovalAction::Reject));
        // Different order is unaffected
        assert!(guards.try_consume(&OrderId::new(), ApprovalAction::Approve));
    }

    #[test]
    fn test_token_cache_eviction_bound() {
        let guards = guards(GuardConfig {
            token_capacity: 2,
            ..Default::default()
        });

        let a = OrderId::new();
        let b = OrderId::new();
        let c = OrderId::new();

        assert!(guards.try_consume(&a, ApprovalAction::Approve));
        assert!(guards.try_consume(&b, ApprovalAction::Approve));
        assert_eq!(guards.token_count(), 2);

        // Third token evicts the oldest
        assert!(guards.try_consume(&c, ApprovalAction::Approve));
        assert_eq!(guards.token_count(), 2);
        assert!(guards.try_consume(&a, ApprovalAction::Approve));
    }

    #[test]
    fn test_expiry_window() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let guards = ApprovalGuards::new(GuardConfig::default(), clock.clone());
        let created_at = clock.now();

        assert!(!guards.is_expired(created_at));
        clock.advance(Duration::minutes(59));
        assert!(!guards.is_expired(created_at));
        clock.advance(Duration::minutes(2));
        assert!(guards.is_expired(created_at));
    }
}
