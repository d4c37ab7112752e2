//! Account Store seam
//!
//! Balance reads and the two transactional mutation paths. Each
//! mutation commits the balance write together with its ledger entry;
//! the authoritative sufficient-balance check for debits happens inside
//! that transaction, under the account row lock.

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::ledger::LedgerEntry;
use crate::order::{OrderError, OrderId};

use super::models::Account;

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Fetch one account
    async fn get(&self, user_id: i64) -> Result<Option<Account>, OrderError>;

    /// Fetch or create with zero balances (registration-time path)
    async fn open(&self, user_id: i64) -> Result<Account, OrderError>;

    /// Increase cash (and bonus) and append one credit ledger entry, in
    /// one transaction. Creates the account if it does not exist yet.
    async fn credit(
        &self,
        user_id: i64,
        cash: Decimal,
        bonus: Decimal,
        order_id: &OrderId,
    ) -> Result<LedgerEntry, OrderError>;

    /// Re-check `cash_balance >= amount` under the row lock, decrease
    /// cash and append one debit ledger entry, in one transaction.
    /// `InsufficientBalance` aborts with no partial debit.
    async fn debit(
        &self,
        user_id: i64,
        amount: Decimal,
        order_id: &OrderId,
    ) -> Result<LedgerEntry, OrderError>;

    /// Ledger entries for one account, oldest first
    async fn ledger(&self, user_id: i64) -> Result<Vec<LedgerEntry>, OrderError>;
}
