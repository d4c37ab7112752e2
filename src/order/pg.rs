//! Order Store - PostgreSQL implementation
//!
//! Status writes use an atomic CAS (`UPDATE ... WHERE status = ANY(...)`)
//! committed together with the audit insert. The alias list in the CAS
//! predicate is how legacy status spellings are normalized at the
//! data-access boundary: rows written by old intakes still serialize
//! through the engine without the engine ever seeing a raw string.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};

use super::error::OrderError;
use super::state::OrderStatus;
use super::store::{AuditEntry, OrderStore, StatusChange};
use super::types::{ActorType, Metadata, NewOrder, OrderId, OrderRecord, OrderType};
use async_trait::async_trait;

const ORDER_COLUMNS: &str = "order_id, order_type, status, user_id, amount, bonus_amount, \
     total_amount, amount_adjusted, idempotency_key, rejection_reason, metadata, \
     created_at, updated_at";

/// PostgreSQL-backed order store
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_by_key(&self, key: &str) -> Result<Option<OrderRecord>, OrderError> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders_tb WHERE idempotency_key = $1"
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_to_record(&r)).transpose()
    }

    async fn insert_audit(
        tx: &mut Transaction<'_, Postgres>,
        order_id: &OrderId,
        from: Option<OrderStatus>,
        change: &StatusChange,
    ) -> Result<(), OrderError> {
        sqlx::query(
            r#"
            INSERT INTO order_audit_tb
                (order_id, from_status, to_status, actor_id, actor_type, reason, correlation_id, created_at)
            VALUES
                ($1, $2, $3, $4, $5, $6, $7, NOW())
            "#,
        )
        .bind(order_id.to_string())
        .bind(from.map(|s| s.as_str()))
        .bind(change.to.as_str())
        .bind(&change.actor_id)
        .bind(change.actor_type.as_str())
        .bind(&change.reason)
        .bind(change.correlation_id)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn create(&self, new: NewOrder) -> Result<OrderRecord, OrderError> {
        new.validate()?;

        if let Some(key) = &new.idempotency_key
            && let Some(existing) = self.fetch_by_key(key).await?
        {
            tracing::info!(
                order_id = %existing.order_id,
                key = %key,
                "order with idempotency key already exists - returning existing record"
            );
            return Ok(existing);
        }

        let order_id = OrderId::new();
        let initial = new.order_type.initial_status();
        let total = new.amount + new.bonus_amount;

        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(&format!(
            r#"
            INSERT INTO orders_tb
                (order_id, order_type, status, user_id, amount, bonus_amount, total_amount,
                 amount_adjusted, idempotency_key, metadata, created_at, updated_at)
            VALUES
                ($1, $2, $3, $4, $5, $6, $7, FALSE, $8, $9, NOW(), NOW())
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(order_id.to_string())
        .bind(new.order_type.id())
        .bind(initial.as_str())
        .bind(new.user_id)
        .bind(new.amount)
        .bind(new.bonus_amount)
        .bind(total)
        .bind(&new.idempotency_key)
        .bind(serde_json::Value::Object(new.metadata.clone()))
        .fetch_one(&mut *tx)
        .await;

        let row = match inserted {
            Ok(row) => row,
            Err(e) => {
                // Duplicate-insert race on the idempotency key: resolve to
                // the row that won instead of erroring.
                if is_unique_violation(&e)
                    && let Some(key) = &new.idempotency_key
                {
                    drop(tx);
                    if let Some(existing) = self.fetch_by_key(key).await? {
                        tracing::info!(
                            order_id = %existing.order_id,
                            key = %key,
                            "lost creation race on idempotency key - returning winner"
                        );
                        return Ok(existing);
                    }
                }
                return Err(e.into());
            }
        };

        sqlx::query(
            r#"
            INSERT INTO order_audit_tb
                (order_id, from_status, to_status, actor_id, actor_type, reason, correlation_id, created_at)
            VALUES
                ($1, NULL, $2, $3, $4, $5, $6, NOW())
            "#,
        )
        .bind(order_id.to_string())
        .bind(initial.as_str())
        .bind(new.user_id.to_string())
        .bind(ActorType::EndUser.as_str())
        .bind("order created")
        .bind(uuid::Uuid::new_v4())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        row_to_record(&row)
    }

    async fn get(&self, order_id: &OrderId) -> Result<Option<OrderRecord>, OrderError> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders_tb WHERE order_id = $1"
        ))
        .bind(order_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_to_record(&r)).transpose()
    }

    async fn apply_transition(
        &self,
        order_id: &OrderId,
        from: OrderStatus,
        change: StatusChange,
    ) -> Result<Option<OrderRecord>, OrderError> {
        let mut tx = self.pool.begin().await?;

        let aliases: Vec<String> = from.db_aliases().iter().map(|s| s.to_string()).collect();
        let patch = serde_json::Value::Object(change.metadata_patch.clone());

        let row = sqlx::query(&format!(
            r#"
            UPDATE orders_tb
            SET status = $1,
                metadata = metadata || $2,
                amount = COALESCE($3, amount),
                total_amount = COALESCE($3, amount) + bonus_amount,
                amount_adjusted = amount_adjusted OR $3 IS NOT NULL,
                updated_at = NOW()
            WHERE order_id = $4 AND status = ANY($5)
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(change.to.as_str())
        .bind(patch)
        .bind(change.new_amount)
        .bind(order_id.to_string())
        .bind(&aliases)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };

        Self::insert_audit(&mut tx, order_id, Some(from), &change).await?;
        tx.commit().await?;

        row_to_record(&row).map(Some)
    }

    async fn set_rejection_reason(
        &self,
        order_id: &OrderId,
        reason: &str,
    ) -> Result<(), OrderError> {
        let result = sqlx::query(
            "UPDATE orders_tb SET rejection_reason = $1, updated_at = NOW() WHERE order_id = $2",
        )
        .bind(reason)
        .bind(order_id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(OrderError::OrderNotFound(order_id.to_string()));
        }
        Ok(())
    }

    async fn audit_trail(&self, order_id: &OrderId) -> Result<Vec<AuditEntry>, OrderError> {
        let rows = sqlx::query(
            r#"
            SELECT order_id, from_status, to_status, actor_id, actor_type, reason,
                   correlation_id, created_at
            FROM order_audit_tb
            WHERE order_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(order_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_audit).collect()
    }

    async fn find_stale_pending(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<OrderRecord>, OrderError> {
        let aliases: Vec<String> = OrderStatus::PendingApproval
            .db_aliases()
            .iter()
            .map(|s| s.to_string())
            .collect();

        let rows = sqlx::query(&format!(
            r#"
            SELECT {ORDER_COLUMNS}
            FROM orders_tb
            WHERE status = ANY($1) AND created_at < $2
            ORDER BY created_at ASC
            LIMIT $3
            "#
        ))
        .bind(&aliases)
        .bind(cutoff)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_record).collect()
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

fn row_to_record(row: &sqlx::postgres::PgRow) -> Result<OrderRecord, OrderError> {
    let order_id_str: String = row.get("order_id");
    let order_id: OrderId = order_id_str
        .parse()
        .map_err(|_| OrderError::CorruptRecord(format!("bad order_id: {order_id_str}")))?;

    let type_id: i16 = row.get("order_type");
    let order_type = OrderType::from_id(type_id)
        .ok_or_else(|| OrderError::CorruptRecord(format!("bad order_type: {type_id}")))?;

    let status_raw: String = row.get("status");
    let status = OrderStatus::normalize(&status_raw)
        .ok_or_else(|| OrderError::CorruptRecord(format!("bad status: {status_raw}")))?;

    let metadata: serde_json::Value = row.get("metadata");
    let metadata: Metadata = metadata.as_object().cloned().unwrap_or_default();

    Ok(OrderRecord {
        order_id,
        order_type,
        status,
        user_id: row.get("user_id"),
        amount: row.get("amount"),
        bonus_amount: row.get("bonus_amount"),
        total_amount: row.get("total_amount"),
        amount_adjusted: row.get("amount_adjusted"),
        idempotency_key: row.get("idempotency_key"),
        rejection_reason: row.get("rejection_reason"),
        metadata,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn row_to_audit(row: &sqlx::postgres::PgRow) -> Result<AuditEntry, OrderError> {
    let order_id_str: String = row.get("order_id");
    let order_id: OrderId = order_id_str
        .parse()
        .map_err(|_| OrderError::CorruptRecord(format!("bad order_id: {order_id_str}")))?;

    let from_status: Option<String> = row.get("from_status");
    let from_status = from_status
        .map(|s| {
            OrderStatus::normalize(&s)
                .ok_or_else(|| OrderError::CorruptRecord(format!("bad from_status: {s}")))
        })
        .transpose()?;

    let to_raw: String = row.get("to_status");
    let to_status = OrderStatus::normalize(&to_raw)
        .ok_or_else(|| OrderError::CorruptRecord(format!("bad to_status: {to_raw}")))?;

    let actor_raw: String = row.get("actor_type");
    let actor_type = ActorType::from_str_loose(&actor_raw)
        .ok_or_else(|| OrderError::CorruptRecord(format!("bad actor_type: {actor_raw}")))?;

    Ok(AuditEntry {
        order_id,
        from_status,
        to_status,
        actor_id: row.get("actor_id"),
        actor_type,
        reason: row.get("reason"),
        correlation_id: row.get("correlation_id"),
        created_at: row.get("created_at"),
    })
}
