use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use lessor_core::models::{Device, DeviceStatus};
use lessor_core::repository::{DeviceRepository, StoreError, StoreResult};

pub struct PgDeviceRepository {
    pool: PgPool,
}

impl PgDeviceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn device_from_row(row: &PgRow) -> Result<Device, StoreError> {
    let status: String = row.try_get("rental_status")?;
    Ok(Device {
        id: row.try_get("id")?,
        rental_status: DeviceStatus::parse(&status).ok_or_else(|| format!("unknown device status: {status}"))?,
        current_rental_order_id: row.try_get("current_rental_order_id")?,
    })
}

#[async_trait]
impl DeviceRepository for PgDeviceRepository {
    async fn insert(&self, device: &Device) -> StoreResult<()> {
        sqlx::query("INSERT INTO devices (id, rental_status, current_rental_order_id) VALUES ($1, $2, $3)")
            .bind(device.id)
            .bind(device.rental_status.as_str())
            .bind(device.current_rental_order_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Device>> {
        let row = sqlx::query("SELECT id, rental_status, current_rental_order_id FROM devices WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| device_from_row(&r)).transpose()
    }

    async fn assign_if_available(&self, device_id: Uuid, order_id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE devices SET current_rental_order_id = $2 \
             WHERE id = $1 AND rental_status = 'available' AND current_rental_order_id IS NULL",
        )
        .bind(device_id)
        .bind(order_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn occupy_if_held_by(&self, device_id: Uuid, order_id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE devices SET rental_status = 'in_use' \
             WHERE id = $1 AND current_rental_order_id = $2",
        )
        .bind(device_id)
        .bind(order_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn release_if_held_by(&self, device_id: Uuid, order_id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE devices SET rental_status = 'available', current_rental_order_id = NULL \
             WHERE id = $1 AND current_rental_order_id = $2",
        )
        .bind(device_id)
        .bind(order_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
