use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use lessor_core::models::{OrderPatch, OrderStatus, PaymentStatus, RentalOrder};
use lessor_core::repository::{OrderRepository, StoreError, StoreResult};

pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const ORDER_COLUMNS: &str = "id, provider_id, restaurant_id, device_id, batch_id, status, payment_status, \
     deposit_amount, monthly_price, start_date, end_date, worker_id, agreement_id, is_signed, setup_photos, \
     customer_confirmed_at, delivered_at, created_at, updated_at";

fn order_from_row(row: &PgRow) -> Result<RentalOrder, StoreError> {
    let status: String = row.try_get("status")?;
    let payment_status: String = row.try_get("payment_status")?;
    let photos: serde_json::Value = row.try_get("setup_photos")?;

    Ok(RentalOrder {
        id: row.try_get("id")?,
        provider_id: row.try_get("provider_id")?,
        restaurant_id: row.try_get("restaurant_id")?,
        device_id: row.try_get("device_id")?,
        batch_id: row.try_get("batch_id")?,
        status: OrderStatus::parse(&status).ok_or_else(|| format!("unknown order status: {status}"))?,
        payment_status: PaymentStatus::parse(&payment_status)
            .ok_or_else(|| format!("unknown payment status: {payment_status}"))?,
        deposit_amount: row.try_get("deposit_amount")?,
        monthly_price: row.try_get("monthly_price")?,
        start_date: row.try_get("start_date")?,
        end_date: row.try_get("end_date")?,
        worker_id: row.try_get("worker_id")?,
        agreement_id: row.try_get("agreement_id")?,
        is_signed: row.try_get("is_signed")?,
        setup_photos: serde_json::from_value(photos)?,
        customer_confirmed_at: row.try_get("customer_confirmed_at")?,
        delivered_at: row.try_get("delivered_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn insert(&self, order: &RentalOrder) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO rental_orders (id, provider_id, restaurant_id, device_id, batch_id, status, payment_status, \
             deposit_amount, monthly_price, start_date, end_date, worker_id, agreement_id, is_signed, setup_photos, \
             customer_confirmed_at, delivered_at, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)",
        )
        .bind(order.id)
        .bind(order.provider_id)
        .bind(order.restaurant_id)
        .bind(order.device_id)
        .bind(order.batch_id)
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(order.deposit_amount)
        .bind(order.monthly_price)
        .bind(order.start_date)
        .bind(order.end_date)
        .bind(order.worker_id)
        .bind(order.agreement_id.as_deref())
        .bind(order.is_signed)
        .bind(serde_json::to_value(&order.setup_photos)?)
        .bind(order.customer_confirmed_at)
        .bind(order.delivered_at)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<RentalOrder>> {
        let row = sqlx::query(&format!("SELECT {} FROM rental_orders WHERE id = $1", ORDER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| order_from_row(&r)).transpose()
    }

    async fn list_by_batch(&self, batch_id: Uuid) -> StoreResult<Vec<RentalOrder>> {
        let rows =
            sqlx::query(&format!("SELECT {} FROM rental_orders WHERE batch_id = $1 ORDER BY created_at", ORDER_COLUMNS))
                .bind(batch_id)
                .fetch_all(&self.pool)
                .await?;
        rows.iter().map(order_from_row).collect()
    }

    async fn list_by_provider(&self, provider_id: Uuid) -> StoreResult<Vec<RentalOrder>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM rental_orders WHERE provider_id = $1 ORDER BY created_at",
            ORDER_COLUMNS
        ))
        .bind(provider_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(order_from_row).collect()
    }

    async fn list_active_ended_before(&self, date: NaiveDate, provider_id: Option<Uuid>) -> StoreResult<Vec<RentalOrder>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM rental_orders \
             WHERE status = 'active' AND end_date < $1 AND ($2::uuid IS NULL OR provider_id = $2) \
             ORDER BY end_date",
            ORDER_COLUMNS
        ))
        .bind(date)
        .bind(provider_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(order_from_row).collect()
    }

    async fn confirm_if_pending(
        &self,
        id: Uuid,
        confirmed_at: DateTime<Utc>,
        agreement_id: Option<&str>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE rental_orders \
             SET status = 'active', customer_confirmed_at = $2, agreement_id = COALESCE($3, agreement_id), \
                 updated_at = NOW() \
             WHERE id = $1 AND status = 'pending_confirmation'",
        )
        .bind(id)
        .bind(confirmed_at)
        .bind(agreement_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_delivered(
        &self,
        id: Uuid,
        worker_id: Uuid,
        setup_photos: &[String],
        delivered_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            "UPDATE rental_orders \
             SET worker_id = $2, \
                 setup_photos = CASE WHEN $3::jsonb = '[]'::jsonb THEN setup_photos ELSE $3::jsonb END, \
                 delivered_at = $4, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(worker_id)
        .bind(serde_json::to_value(setup_photos)?)
        .bind(delivered_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn apply_patch(&self, id: Uuid, patch: &OrderPatch) -> StoreResult<()> {
        let photos = patch.setup_photos.as_ref().map(serde_json::to_value).transpose()?;
        sqlx::query(
            "UPDATE rental_orders \
             SET status = COALESCE($2, status), \
                 payment_status = COALESCE($3, payment_status), \
                 is_signed = COALESCE($4, is_signed), \
                 setup_photos = COALESCE($5, setup_photos), \
                 worker_id = COALESCE($6, worker_id), \
                 agreement_id = COALESCE($7, agreement_id), \
                 updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(patch.order_status.map(|s| s.as_str()))
        .bind(patch.payment_status.map(|s| s.as_str()))
        .bind(patch.is_signed)
        .bind(photos)
        .bind(patch.worker_id)
        .bind(patch.agreement_id.as_deref())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_refunded_if_pending(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE rental_orders SET payment_status = 'refunded', updated_at = NOW() \
             WHERE id = $1 AND payment_status <> 'refunded'",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
