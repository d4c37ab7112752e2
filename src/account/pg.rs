//! Account Store - PostgreSQL implementation
//!
//! Credit and debit each run as one transaction: `SELECT ... FOR UPDATE`
//! on the account row, balance update with a version bump, ledger insert,
//! commit. The row lock serializes concurrent mutations per account;
//! different accounts never block each other.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};

use crate::ledger::{EntryKind, LedgerEntry};
use crate::order::{OrderError, OrderId};

use super::models::Account;
use super::store::AccountStore;

const ACCOUNT_COLUMNS: &str =
    "user_id, cash_balance, bonus_balance, version, created_at, updated_at";

/// PostgreSQL-backed account store
pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn get(&self, user_id: i64) -> Result<Option<Account>, OrderError> {
        let row = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts_tb WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| row_to_account(&r)))
    }

    async fn open(&self, user_id: i64) -> Result<Account, OrderError> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO accounts_tb (user_id, cash_balance, bonus_balance, version, created_at, updated_at)
            VALUES ($1, 0, 0, 0, NOW(), NOW())
            ON CONFLICT (user_id) DO UPDATE SET user_id = EXCLUDED.user_id
            RETURNING {ACCOUNT_COLUMNS}
            "#
        ))
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row_to_account(&row))
    }

    async fn credit(
        &self,
        user_id: i64,
        cash: Decimal,
        bonus: Decimal,
        order_id: &OrderId,
    ) -> Result<LedgerEntry, OrderError> {
        let mut tx = self.pool.begin().await?;

        // Lock (or create) the account row
        let row = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts_tb WHERE user_id = $1 FOR UPDATE"
        ))
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let before = match row {
            Some(row) => row_to_account(&row).total(),
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO accounts_tb (user_id, cash_balance, bonus_balance, version, created_at, updated_at)
                    VALUES ($1, 0, 0, 0, NOW(), NOW())
                    "#,
                )
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
                Decimal::ZERO
            }
        };

        sqlx::query(
            r#"
            UPDATE accounts_tb
            SET cash_balance = cash_balance + $1,
                bonus_balance = bonus_balance + $2,
                version = version + 1,
                updated_at = NOW()
            WHERE user_id = $3
            "#,
        )
        .bind(cash)
        .bind(bonus)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        let amount = cash + bonus;
        let entry_row = sqlx::query(
            r#"
            INSERT INTO ledger_tb (user_id, order_id, kind, amount, balance_before, balance_after, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            RETURNING entry_id, created_at
            "#,
        )
        .bind(user_id)
        .bind(order_id.to_string())
        .bind(EntryKind::Credit.as_str())
        .bind(amount)
        .bind(before)
        .bind(before + amount)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(LedgerEntry {
            entry_id: entry_row.get("entry_id"),
            user_id,
            order_id: *order_id,
            kind: EntryKind::Credit,
            amount,
            balance_before: before,
            balance_after: before + amount,
            created_at: entry_row.get("created_at"),
        })
    }

    async fn debit(
        &self,
        user_id: i64,
        amount: Decimal,
        order_id: &OrderId,
    ) -> Result<LedgerEntry, OrderError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts_tb WHERE user_id = $1 FOR UPDATE"
        ))
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(OrderError::AccountNotFound(user_id))?;

        let account = row_to_account(&row);
        // Authoritative check, under the row lock; the earlier
        // validation-time check was advisory only
        if !account.can_debit(amount) {
            tx.rollback().await?;
            return Err(OrderError::InsufficientBalance);
        }

        sqlx::query(
            r#"
            UPDATE accounts_tb
            SET cash_balance = cash_balance - $1,
                version = version + 1,
                updated_at = NOW()
            WHERE user_id = $2
            "#,
        )
        .bind(amount)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        let before = account.total();
        let entry_row = sqlx::query(
            r#"
            INSERT INTO ledger_tb (user_id, order_id, kind, amount, balance_before, balance_after, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            RETURNING entry_id, created_at
            "#,
        )
        .bind(user_id)
        .bind(order_id.to_string())
        .bind(EntryKind::Debit.as_str())
        .bind(amount)
        .bind(before)
        .bind(before - amount)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(LedgerEntry {
            entry_id: entry_row.get("entry_id"),
            user_id,
            order_id: *order_id,
            kind: EntryKind::Debit,
            amount,
            balance_before: before,
            balance_after: before - amount,
            created_at: entry_row.get("created_at"),
        })
    }

    async fn ledger(&self, user_id: i64) -> Result<Vec<LedgerEntry>, OrderError> {
        let rows = sqlx::query(
            r#"
            SELECT entry_id, user_id, order_id, kind, amount, balance_before, balance_after, created_at
            FROM ledger_tb
            WHERE user_id = $1
            ORDER BY entry_id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_entry).collect()
    }
}

fn row_to_account(row: &sqlx::postgres::PgRow) -> Account {
    Account {
        user_id: row.get("user_id"),
        cash_balance: row.get("cash_balance"),
        bonus_balance: row.get("bonus_balance"),
        version: row.get("version"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_entry(row: &sqlx::postgres::PgRow) -> Result<LedgerEntry, OrderError> {
    let order_id_str: String = row.get("order_id");
    let order_id: OrderId = order_id_str
        .parse()
        .map_err(|_| OrderError::CorruptRecord(format!("bad order_id: {order_id_str}")))?;

    let kind_raw: String = row.get("kind");
    let kind = EntryKind::from_str_loose(&kind_raw)
        .ok_or_else(|| OrderError::CorruptRecord(format!("bad ledger kind: {kind_raw}")))?;

    let created_at: DateTime<Utc> = row.get("created_at");

    Ok(LedgerEntry {
        entry_id: row.get("entry_id"),
        user_id: row.get("user_id"),
        order_id,
        kind,
        amount: row.get("amount"),
        balance_before: row.get("balance_before"),
        balance_after: row.get("balance_after"),
        created_at,
    })
}
