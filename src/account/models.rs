//! Wallet account model
//!
//! Live balance fields are a cache over the ledger; they are mutated
//! only through the store's transactional credit/debit paths, each of
//! which appends exactly one ledger entry in the same transaction.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// User wallet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub user_id: i64,
    /// Withdrawable funds
    pub cash_balance: Decimal,
    /// Promotional funds; credited alongside cash, never withdrawable
    pub bonus_balance: Decimal,
    /// Bumped on every mutation
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn empty(user_id: i64, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            cash_balance: Decimal::ZERO,
            bonus_balance: Decimal::ZERO,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Total balance as the ledger sees it
    pub fn total(&self) -> Decimal {
        self.cash_balance + self.bonus_balance
    }

    /// Whether a cash debit of `amount` is covered
    pub fn can_debit(&self, amount: Decimal) -> bool {
        self.cash_balance >= amount
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_account() {
        let acct = Account::empty(1001, Utc::now());
        assert_eq!(acct.total(), Decimal::ZERO);
        assert_eq!(acct.version, 0);
        assert!(acct.can_debit(Decimal::ZERO));
        assert!(!acct.can_debit(Decimal::ONE));
    }

    #[test]
    fn test_total_and_can_debit() {
        let mut acct = Account::empty(1001, Utc::now());
        acct.cash_balance = Decimal::from(40);
        acct.bonus_balance = Decimal::from(5);

        assert_eq!(acct.total(), Decimal::from(45));
        assert!(acct.can_debit(Decimal::from(40)));
        // Bonus funds do not cover debits
        assert!(!acct.can_debit(Decimal::from(41)));
    }
}
