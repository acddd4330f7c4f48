use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use lessor_core::models::{BillingCycle, CycleStatus, DepositTransaction, DepositTxnKind};
use lessor_core::repository::{BillingRepository, DepositRepository, StoreError, StoreResult};

pub struct PgBillingRepository {
    pool: PgPool,
}

impl PgBillingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const CYCLE_COLUMNS: &str = "id, order_id, cycle_month, due_date, amount_due, amount_paid, status, paid_at, \
     payment_method, payment_proof, created_at, updated_at";

fn cycle_from_row(row: &PgRow) -> Result<BillingCycle, StoreError> {
    let status: String = row.try_get("status")?;
    Ok(BillingCycle {
        id: row.try_get("id")?,
        order_id: row.try_get("order_id")?,
        cycle_month: row.try_get("cycle_month")?,
        due_date: row.try_get("due_date")?,
        amount_due: row.try_get("amount_due")?,
        amount_paid: row.try_get("amount_paid")?,
        status: CycleStatus::parse(&status).ok_or_else(|| format!("unknown cycle status: {status}"))?,
        paid_at: row.try_get("paid_at")?,
        payment_method: row.try_get("payment_method")?,
        payment_proof: row.try_get("payment_proof")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl BillingRepository for PgBillingRepository {
    async fn insert_cycle_if_absent(&self, cycle: &BillingCycle) -> StoreResult<bool> {
        let result = sqlx::query(
            "INSERT INTO billing_cycles (id, order_id, cycle_month, due_date, amount_due, amount_paid, status, \
             paid_at, payment_method, payment_proof, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             ON CONFLICT (order_id, cycle_month) DO NOTHING",
        )
        .bind(cycle.id)
        .bind(cycle.order_id)
        .bind(&cycle.cycle_month)
        .bind(cycle.due_date)
        .bind(cycle.amount_due)
        .bind(cycle.amount_paid)
        .bind(cycle.status.as_str())
        .bind(cycle.paid_at)
        .bind(cycle.payment_method.as_deref())
        .bind(cycle.payment_proof.as_deref())
        .bind(cycle.created_at)
        .bind(cycle.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn get_cycle(&self, order_id: Uuid, cycle_month: &str) -> StoreResult<Option<BillingCycle>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM billing_cycles WHERE order_id = $1 AND cycle_month = $2",
            CYCLE_COLUMNS
        ))
        .bind(order_id)
        .bind(cycle_month)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| cycle_from_row(&r)).transpose()
    }

    async fn update_cycle(&self, cycle: &BillingCycle) -> StoreResult<()> {
        sqlx::query(
            "UPDATE billing_cycles \
             SET amount_paid = $2, status = $3, paid_at = $4, payment_method = $5, payment_proof = $6, \
                 updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(cycle.id)
        .bind(cycle.amount_paid)
        .bind(cycle.status.as_str())
        .bind(cycle.paid_at)
        .bind(cycle.payment_method.as_deref())
        .bind(cycle.payment_proof.as_deref())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_by_order(&self, order_id: Uuid) -> StoreResult<Vec<BillingCycle>> {
        let rows =
            sqlx::query(&format!("SELECT {} FROM billing_cycles WHERE order_id = $1 ORDER BY cycle_month", CYCLE_COLUMNS))
                .bind(order_id)
                .fetch_all(&self.pool)
                .await?;
        rows.iter().map(cycle_from_row).collect()
    }

    async fn list_unpaid_due_before(
        &self,
        date: NaiveDate,
        provider_id: Option<Uuid>,
        limit: usize,
    ) -> StoreResult<Vec<BillingCycle>> {
        let rows = sqlx::query(&format!(
            "SELECT c.{} FROM billing_cycles c \
             JOIN rental_orders o ON o.id = c.order_id \
             WHERE c.status IN ('pending', 'partial') AND c.due_date < $1 \
               AND ($2::uuid IS NULL OR o.provider_id = $2) \
             ORDER BY c.due_date \
             LIMIT $3",
            CYCLE_COLUMNS.replace(", ", ", c.")
        ))
        .bind(date)
        .bind(provider_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(cycle_from_row).collect()
    }

    async fn mark_overdue(&self, cycle_ids: &[Uuid]) -> StoreResult<u64> {
        // The status predicate makes retries no-ops: rows already overdue
        // (or paid in the meantime) are excluded.
        let result = sqlx::query(
            "UPDATE billing_cycles SET status = 'overdue', updated_at = NOW() \
             WHERE id = ANY($1) AND status IN ('pending', 'partial')",
        )
        .bind(cycle_ids.to_vec())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn list_for_provider(&self, provider_id: Uuid, from: NaiveDate, to: NaiveDate) -> StoreResult<Vec<BillingCycle>> {
        let rows = sqlx::query(&format!(
            "SELECT c.{} FROM billing_cycles c \
             JOIN rental_orders o ON o.id = c.order_id \
             WHERE o.provider_id = $1 AND c.due_date >= $2 AND c.due_date <= $3 \
             ORDER BY c.due_date",
            CYCLE_COLUMNS.replace(", ", ", c.")
        ))
        .bind(provider_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(cycle_from_row).collect()
    }
}

pub struct PgDepositRepository {
    pool: PgPool,
}

impl PgDepositRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn deposit_from_row(row: &PgRow) -> Result<DepositTransaction, StoreError> {
    let kind: String = row.try_get("kind")?;
    Ok(DepositTransaction {
        id: row.try_get("id")?,
        order_id: row.try_get("order_id")?,
        kind: DepositTxnKind::parse(&kind).ok_or_else(|| format!("unknown deposit txn kind: {kind}"))?,
        amount: row.try_get("amount")?,
        reason: row.try_get("reason")?,
        proof: row.try_get("proof")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl DepositRepository for PgDepositRepository {
    async fn insert(&self, txn: &DepositTransaction) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO deposit_transactions (id, order_id, kind, amount, reason, proof, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(txn.id)
        .bind(txn.order_id)
        .bind(txn.kind.as_str())
        .bind(txn.amount)
        .bind(txn.reason.as_deref())
        .bind(txn.proof.as_deref())
        .bind(txn.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_by_order(&self, order_id: Uuid) -> StoreResult<Vec<DepositTransaction>> {
        let rows = sqlx::query(
            "SELECT id, order_id, kind, amount, reason, proof, created_at \
             FROM deposit_transactions WHERE order_id = $1 ORDER BY created_at",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(deposit_from_row).collect()
    }
}
