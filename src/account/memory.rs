//! Account Store - in-process implementation
//!
//! The mutex stands in for the per-row lock of the PostgreSQL store:
//! balance check, mutation and ledger append happen under one guard.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use crate::clock::{Clock, SystemClock};
use crate::ledger::{EntryKind, LedgerEntry};
use crate::order::{OrderError, OrderId};

use super::models::Account;
use super::store::AccountStore;

#[derive(Default)]
struct Inner {
    accounts: HashMap<i64, Account>,
    ledger: Vec<LedgerEntry>,
    next_entry_id: i64,
}

/// In-process account store
pub struct MemoryAccountStore {
    inner: Mutex<Inner>,
    clock: Arc<dyn Clock>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            clock,
        }
    }

    /// Seed an account with a starting cash balance (test helper)
    pub async fn seed(&self, user_id: i64, cash: Decimal) {
        let now = self.clock.now();
        let mut inner = self.inner.lock().await;
        let account = inner
            .accounts
            .entry(user_id)
            .or_insert_with(|| Account::empty(user_id, now));
        account.cash_balance = cash;
    }
}

impl Default for MemoryAccountStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn get(&self, user_id: i64) -> Result<Option<Account>, OrderError> {
        let inner = self.inner.lock().await;
        Ok(inner.accounts.get(&user_id).cloned())
    }

    async fn open(&self, user_id: i64) -> Result<Account, OrderError> {
        let now = self.clock.now();
        let mut inner = self.inner.lock().await;
        Ok(inner
            .accounts
            .entry(user_id)
            .or_insert_with(|| Account::empty(user_id, now))
            .clone())
    }

    async fn credit(
        &self,
        user_id: i64,
        cash: Decimal,
        bonus: Decimal,
        order_id: &OrderId,
    ) -> Result<LedgerEntry, OrderError> {
        let now = self.clock.now();
        let mut inner = self.inner.lock().await;

        let account = inner
            .accounts
            .entry(user_id)
            .or_insert_with(|| Account::empty(user_id, now));

        let before = account.total();
        account.cash_balance += cash;
        account.bonus_balance += bonus;
        account.version += 1;
        account.updated_at = now;
        let after = account.total();

        inner.next_entry_id += 1;
        let entry = LedgerEntry {
            entry_id: inner.next_entry_id,
            user_id,
            order_id: *order_id,
            kind: EntryKind::Credit,
            amount: cash + bonus,
            balance_before: before,
            balance_after: after,
            created_at: now,
        };
        inner.ledger.push(entry.clone());

        Ok(entry)
    }

    async fn debit(
        &self,
        user_id: i64,
        amount: Decimal,
        order_id: &OrderId,
    ) -> Result<LedgerEntry, OrderError> {
        let now = self.clock.now();
        let mut inner = self.inner.lock().await;

        let account = inner
            .accounts
            .get_mut(&user_id)
            .ok_or(OrderError::AccountNotFound(user_id))?;

        if !account.can_debit(amount) {
            return Err(OrderError::InsufficientBalance);
        }

        let before = account.total();
        account.cash_balance -= amount;
        account.version += 1;
        account.updated_at = now;
        let after = account.total();

        inner.next_entry_id += 1;
        let entry = LedgerEntry {
            entry_id: inner.next_entry_id,
            user_id,
            order_id: *order_id,
            kind: EntryKind::Debit,
            amount,
            balance_before: before,
            balance_after: after,
            created_at: now,
        };
        inner.ledger.push(entry.clone());

        Ok(entry)
    }

    async fn ledger(&self, user_id: i64) -> Result<Vec<LedgerEntry>, OrderError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .ledger
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_credit_creates_account_and_entry() {
        let store = MemoryAccountStore::new();
        let order_id = OrderId::new();

        let entry = store
            .credit(1001, Decimal::from(50), Decimal::ZERO, &order_id)
            .await
            .unwrap();

        assert_eq!(entry.kind, EntryKind::Credit);
        assert_eq!(entry.amount, Decimal::from(50));
        assert_eq!(entry.balance_before, Decimal::ZERO);
        assert_eq!(entry.balance_after, Decimal::from(50));
        assert!(entry.is_balanced());

        let account = store.get(1001).await.unwrap().unwrap();
        assert_eq!(account.cash_balance, Decimal::from(50));
        assert_eq!(account.version, 1);
    }

    #[tokio::test]
    async fn test_debit_insufficient_leaves_no_trace() {
        let store = MemoryAccountStore::new();
        store.seed(1001, Decimal::from(40)).await;

        let err = store
            .debit(1001, Decimal::from(100), &OrderId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::InsufficientBalance));

        let account = store.get(1001).await.unwrap().unwrap();
        assert_eq!(account.cash_balance, Decimal::from(40));
        assert!(store.ledger(1001).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_debit_unknown_account() {
        let store = MemoryAccountStore::new();
        let err = store
            .debit(9999, Decimal::ONE, &OrderId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::AccountNotFound(9999)));
    }

    #[tokio::test]
    async fn test_ledger_chain_balances() {
        let store = MemoryAccountStore::new();
        store
            .credit(1001, Decimal::from(50), Decimal::from(5), &OrderId::new())
            .await
            .unwrap();
        store
            .debit(1001, Decimal::from(20), &OrderId::new())
            .await
            .unwrap();

        let ledger = store.ledger(1001).await.unwrap();
        assert_eq!(ledger.len(), 2);
        assert!(ledger.iter().all(|e| e.is_balanced()));
        assert_eq!(ledger[1].balance_before, ledger[0].balance_after);
        assert_eq!(crate::ledger::replay(&ledger), Decimal::from(35));
    }
}
