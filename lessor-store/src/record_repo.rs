use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use lessor_core::models::{RecordStatus, RentalRecord, ReturnCondition};
use lessor_core::repository::{RecordRepository, StoreError, StoreResult};

pub struct PgRecordRepository {
    pool: PgPool,
}

impl PgRecordRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn record_from_row(row: &PgRow) -> Result<RentalRecord, StoreError> {
    let status: String = row.try_get("status")?;
    let condition: Option<String> = row.try_get("return_condition")?;
    Ok(RentalRecord {
        id: row.try_get("id")?,
        order_id: row.try_get("order_id")?,
        device_id: row.try_get("device_id")?,
        status: RecordStatus::parse(&status).ok_or_else(|| format!("unknown record status: {status}"))?,
        return_condition: match condition {
            Some(c) => Some(ReturnCondition::parse(&c).ok_or_else(|| format!("unknown return condition: {c}"))?),
            None => None,
        },
        damage_fee: row.try_get("damage_fee")?,
        actual_start: row.try_get("actual_start")?,
        actual_end: row.try_get("actual_end")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl RecordRepository for PgRecordRepository {
    async fn upsert(&self, record: &RentalRecord) -> StoreResult<()> {
        // One row per (order, device); the conflict arm keeps the original
        // row id so references stay stable across competing upserts.
        sqlx::query(
            "INSERT INTO rental_records (id, order_id, device_id, status, return_condition, damage_fee, \
             actual_start, actual_end, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW()) \
             ON CONFLICT (order_id, device_id) DO UPDATE SET \
                 status = EXCLUDED.status, \
                 return_condition = EXCLUDED.return_condition, \
                 damage_fee = EXCLUDED.damage_fee, \
                 actual_start = EXCLUDED.actual_start, \
                 actual_end = EXCLUDED.actual_end, \
                 updated_at = NOW()",
        )
        .bind(record.id)
        .bind(record.order_id)
        .bind(record.device_id)
        .bind(record.status.as_str())
        .bind(record.return_condition.map(|c| c.as_str()))
        .bind(record.damage_fee)
        .bind(record.actual_start)
        .bind(record.actual_end)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_by_order_device(&self, order_id: Uuid, device_id: Uuid) -> StoreResult<Option<RentalRecord>> {
        let row = sqlx::query(
            "SELECT id, order_id, device_id, status, return_condition, damage_fee, actual_start, actual_end, \
             updated_at FROM rental_records WHERE order_id = $1 AND device_id = $2",
        )
        .bind(order_id)
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| record_from_row(&r)).transpose()
    }

    async fn list_by_order(&self, order_id: Uuid) -> StoreResult<Vec<RentalRecord>> {
        let rows = sqlx::query(
            "SELECT id, order_id, device_id, status, return_condition, damage_fee, actual_start, actual_end, \
             updated_at FROM rental_records WHERE order_id = $1 ORDER BY device_id",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(record_from_row).collect()
    }
}
