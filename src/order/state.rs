//! Order FSM State Definitions
//!
//! Canonical status values plus normalization of legacy spellings that
//! older intake paths wrote into the store. Normalization happens at the
//! data-access boundary only; the transition engine never sees a raw
//! legacy string.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Order lifecycle states
///
/// Terminal states: COMPLETED, FAILED, REJECTED, CANCELLED.
/// `pending_approval` has no edge to `processing`: a side effect must
/// never execute without a recorded approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Initial state for approval-required order types
    PendingApproval,

    /// An actor recorded an explicit approval
    Approved,

    /// Side-effect execution in progress (initial for direct-execution types)
    Processing,

    /// Terminal: side effect committed, funds moved
    Completed,

    /// Terminal: side-effect execution failed, no further automatic retry
    Failed,

    /// Terminal: an actor declined the order
    Rejected,

    /// Terminal: withdrawn before a decision (user or expiry sweep)
    Cancelled,
}

impl OrderStatus {
    /// Check if this is a terminal state (no more transitions possible)
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Completed
                | OrderStatus::Failed
                | OrderStatus::Rejected
                | OrderStatus::Cancelled
        )
    }

    /// States reachable from this state
    pub fn allowed_next(&self) -> &'static [OrderStatus] {
        match self {
            OrderStatus::PendingApproval => &[
                OrderStatus::Approved,
                OrderStatus::Rejected,
                OrderStatus::Cancelled,
            ],
            OrderStatus::Approved => &[OrderStatus::Processing],
            OrderStatus::Processing => &[OrderStatus::Completed, OrderStatus::Failed],
            OrderStatus::Completed
            | OrderStatus::Failed
            | OrderStatus::Rejected
            | OrderStatus::Cancelled => &[],
        }
    }

    /// Check if transitioning to `next` is allowed by the adjacency map
    #[inline]
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        self.allowed_next().contains(&next)
    }

    /// Canonical storage spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::PendingApproval => "pending_approval",
            OrderStatus::Approved => "approved",
            OrderStatus::Processing => "processing",
            OrderStatus::Completed => "completed",
            OrderStatus::Failed => "failed",
            OrderStatus::Rejected => "rejected",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// All spellings that resolve to this status: the canonical one first,
    /// then legacy values produced by older code paths. CAS predicates in
    /// the Postgres store match against the full alias list so that rows
    /// written by legacy intakes still serialize through the engine.
    pub fn db_aliases(&self) -> &'static [&'static str] {
        match self {
            OrderStatus::PendingApproval => &["pending_approval", "pending", "waiting", "new"],
            OrderStatus::Approved => &["approved", "accepted"],
            OrderStatus::Processing => &["processing", "in_progress", "executing"],
            OrderStatus::Completed => &["completed", "success", "done", "paid"],
            OrderStatus::Failed => &["failed", "error"],
            OrderStatus::Rejected => &["rejected", "declined", "denied"],
            OrderStatus::Cancelled => &["cancelled", "canceled", "void"],
        }
    }

    /// Normalize a stored status string (canonical or legacy) to a
    /// canonical status. Returns `None` for unrecognized values.
    pub fn normalize(raw: &str) -> Option<Self> {
        let raw = raw.trim().to_ascii_lowercase();
        const ALL: [OrderStatus; 7] = [
            OrderStatus::PendingApproval,
            OrderStatus::Approved,
            OrderStatus::Processing,
            OrderStatus::Completed,
            OrderStatus::Failed,
            OrderStatus::Rejected,
            OrderStatus::Cancelled,
        ];
        ALL.into_iter()
            .find(|s| s.db_aliases().contains(&raw.as_str()))
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(OrderStatus::Completed.is_terminal());
        assert!(OrderStatus::Failed.is_terminal());
        assert!(OrderStatus::Rejected.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());

        assert!(!OrderStatus::PendingApproval.is_terminal());
        assert!(!OrderStatus::Approved.is_terminal());
        assert!(!OrderStatus::Processing.is_terminal());
    }

    #[test]
    fn test_no_approval_bypass_edge() {
        // pending_approval must never reach processing directly
        assert!(!OrderStatus::PendingApproval.can_transition_to(OrderStatus::Processing));
        assert!(OrderStatus::PendingApproval.can_transition_to(OrderStatus::Approved));
        assert!(OrderStatus::Approved.can_transition_to(OrderStatus::Processing));
    }

    #[test]
    fn test_terminal_states_have_no_edges() {
        for s in [
            OrderStatus::Completed,
            OrderStatus::Failed,
            OrderStatus::Rejected,
            OrderStatus::Cancelled,
        ] {
            assert!(s.allowed_next().is_empty(), "{s} must have no edges");
        }
    }

    #[test]
    fn test_normalize_canonical() {
        for s in [
            OrderStatus::PendingApproval,
            OrderStatus::Approved,
            OrderStatus::Processing,
            OrderStatus::Completed,
            OrderStatus::Failed,
            OrderStatus::Rejected,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(OrderStatus::normalize(s.as_str()), Some(s));
        }
    }

    #[test]
    fn test_normalize_legacy_spellings() {
        assert_eq!(
            OrderStatus::normalize("waiting"),
            Some(OrderStatus::PendingApproval)
        );
        assert_eq!(
            OrderStatus::normalize("pending"),
            Some(OrderStatus::PendingApproval)
        );
        assert_eq!(OrderStatus::normalize("success"), Some(OrderStatus::Completed));
        assert_eq!(OrderStatus::normalize("error"), Some(OrderStatus::Failed));
        assert_eq!(OrderStatus::normalize("canceled"), Some(OrderStatus::Cancelled));
        assert_eq!(OrderStatus::normalize("declined"), Some(OrderStatus::Rejected));
        assert_eq!(
            OrderStatus::normalize("  IN_PROGRESS "),
            Some(OrderStatus::Processing)
        );
    }

    #[test]
    fn test_normalize_unknown() {
        assert_eq!(OrderStatus::normalize("garbage"), None);
        assert_eq!(OrderStatus::normalize(""), None);
    }

    #[test]
    fn test_aliases_start_with_canonical() {
        for s in [
            OrderStatus::PendingApproval,
            OrderStatus::Approved,
            OrderStatus::Processing,
            OrderStatus::Completed,
            OrderStatus::Failed,
            OrderStatus::Rejected,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(s.db_aliases()[0], s.as_str());
        }
    }
}
