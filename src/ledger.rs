//! Ledger - balance-change audit log
//!
//! One immutable entry per balance mutation, carrying the balance
//! immediately before and after. Entries are only ever appended; the
//! live account balance is a cache this log makes auditable and
//! recoverable.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::order::OrderId;

/// Direction of a balance change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Credit,
    Debit,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Credit => "credit",
            EntryKind::Debit => "debit",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s {
            "credit" => Some(EntryKind::Credit),
            "debit" => Some(EntryKind::Debit),
            _ => None,
        }
    }

    /// Sign applied to the amount when replaying the ledger
    pub fn signum(&self) -> Decimal {
        match self {
            EntryKind::Credit => Decimal::ONE,
            EntryKind::Debit => Decimal::NEGATIVE_ONE,
        }
    }
}

/// One balance-affecting event
///
/// Invariant: `balance_after = balance_before + signum(kind) * amount`,
/// where balances are the account total (cash + bonus).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub entry_id: i64,
    pub user_id: i64,
    /// Originating order
    pub order_id: OrderId,
    pub kind: EntryKind,
    pub amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Check the before/after invariant
    pub fn is_balanced(&self) -> bool {
        self.balance_after == self.balance_before + self.kind.signum() * self.amount
    }
}

/// Running balance reconstructed from a slice of entries, oldest first
pub fn replay(entries: &[LedgerEntry]) -> Decimal {
    entries
        .iter()
        .fold(Decimal::ZERO, |acc, e| acc + e.kind.signum() * e.amount)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(kind: EntryKind, amount: i64, before: i64, after: i64) -> LedgerEntry {
        LedgerEntry {
            entry_id: 0,
            user_id: 1001,
            order_id: OrderId::new(),
            kind,
            amount: Decimal::from(amount),
            balance_before: Decimal::from(before),
            balance_after: Decimal::from(after),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_entry_invariant() {
        assert!(entry(EntryKind::Credit, 50, 0, 50).is_balanced());
        assert!(entry(EntryKind::Debit, 30, 50, 20).is_balanced());
        assert!(!entry(EntryKind::Credit, 50, 0, 49).is_balanced());
    }

    #[test]
    fn test_replay_running_sum() {
        let entries = vec![
            entry(EntryKind::Credit, 50, 0, 50),
            entry(EntryKind::Debit, 20, 50, 30),
            entry(EntryKind::Credit, 5, 30, 35),
        ];
        assert_eq!(replay(&entries), Decimal::from(35));
    }

    #[test]
    fn test_kind_roundtrip() {
        assert_eq!(EntryKind::from_str_loose("credit"), Some(EntryKind::Credit));
        assert_eq!(EntryKind::from_str_loose("debit"), Some(EntryKind::Debit));
        assert_eq!(EntryKind::from_str_loose("other"), None);
    }
}
