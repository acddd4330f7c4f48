use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use lessor_core::repository::{EventRepository, StoreError, StoreResult};
use lessor_shared::events::Event;

pub struct PgEventRepository {
    pool: PgPool,
}

impl PgEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn event_from_row(row: &PgRow) -> Result<Event, StoreError> {
    Ok(Event {
        id: row.try_get("id")?,
        order_id: row.try_get("order_id")?,
        event_type: row.try_get("event_type")?,
        occurred_at: row.try_get("occurred_at")?,
        operator_id: row.try_get("operator_id")?,
        metadata: row.try_get("metadata")?,
    })
}

#[async_trait]
impl EventRepository for PgEventRepository {
    async fn append(&self, event: &Event) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO events (id, order_id, event_type, occurred_at, operator_id, metadata) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(event.id)
        .bind(event.order_id)
        .bind(&event.event_type)
        .bind(event.occurred_at)
        .bind(event.operator_id)
        .bind(&event.metadata)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_by_order(&self, order_id: Uuid) -> StoreResult<Vec<Event>> {
        let rows = sqlx::query(
            "SELECT id, order_id, event_type, occurred_at, operator_id, metadata \
             FROM events WHERE order_id = $1 ORDER BY occurred_at",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(event_from_row).collect()
    }
}
