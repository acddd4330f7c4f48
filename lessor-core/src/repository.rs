//! Repository traits over the shared transactional record store.
//!
//! Handlers hold no locks; every cross-request invariant is enforced by the
//! conditional mutations below ("update iff the row still satisfies the
//! predicate"). A losing concurrent writer sees `false` and reports a domain
//! rejection instead of corrupting state.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use lessor_shared::events::Event;
use uuid::Uuid;

use crate::models::{BillingCycle, DepositTransaction, Device, OrderPatch, RentalOrder, RentalRecord};

pub type StoreError = Box<dyn std::error::Error + Send + Sync>;
pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn insert(&self, order: &RentalOrder) -> StoreResult<()>;

    async fn get(&self, id: Uuid) -> StoreResult<Option<RentalOrder>>;

    async fn list_by_batch(&self, batch_id: Uuid) -> StoreResult<Vec<RentalOrder>>;

    async fn list_by_provider(&self, provider_id: Uuid) -> StoreResult<Vec<RentalOrder>>;

    /// Active orders whose rental period ended before `date`, oldest first.
    /// `provider_id` restricts to one tenant when set.
    async fn list_active_ended_before(&self, date: NaiveDate, provider_id: Option<Uuid>) -> StoreResult<Vec<RentalOrder>>;

    /// Conditional confirm: `pending_confirmation -> active`. Returns false
    /// when the order was in any other state (already confirmed, cancelled,
    /// or a concurrent confirm won).
    async fn confirm_if_pending(
        &self,
        id: Uuid,
        confirmed_at: DateTime<Utc>,
        agreement_id: Option<&str>,
    ) -> StoreResult<bool>;

    async fn mark_delivered(
        &self,
        id: Uuid,
        worker_id: Uuid,
        setup_photos: &[String],
        delivered_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Apply a partial-field patch. Status transitions carried by the patch
    /// are validated by the caller; this is a plain write.
    async fn apply_patch(&self, id: Uuid, patch: &OrderPatch) -> StoreResult<()>;

    /// Conditional one-way latch: `payment_status -> refunded` iff it is not
    /// already refunded. Enforces at-most-one refund per order.
    async fn mark_refunded_if_pending(&self, id: Uuid) -> StoreResult<bool>;
}

#[async_trait]
pub trait DeviceRepository: Send + Sync {
    async fn insert(&self, device: &Device) -> StoreResult<()>;

    async fn get(&self, id: Uuid) -> StoreResult<Option<Device>>;

    /// Claim at booking: set the occupant pointer iff the device is
    /// available with no current occupant. Occupancy exclusivity lives here.
    async fn assign_if_available(&self, device_id: Uuid, order_id: Uuid) -> StoreResult<bool>;

    /// Delivery: flip to `in_use` iff the device still points at this order.
    /// A stale worker client for a terminated order finds false.
    async fn occupy_if_held_by(&self, device_id: Uuid, order_id: Uuid) -> StoreResult<bool>;

    /// Termination: reset to `available` and clear the pointer iff this
    /// order still holds the claim, so a double-release cannot evict an
    /// occupant that claimed the device in between.
    async fn release_if_held_by(&self, device_id: Uuid, order_id: Uuid) -> StoreResult<bool>;
}

#[async_trait]
pub trait RecordRepository: Send + Sync {
    /// Insert-or-update keyed by (order_id, device_id); at most one row per
    /// occupancy ever exists.
    async fn upsert(&self, record: &RentalRecord) -> StoreResult<()>;

    async fn get_by_order_device(&self, order_id: Uuid, device_id: Uuid) -> StoreResult<Option<RentalRecord>>;

    async fn list_by_order(&self, order_id: Uuid) -> StoreResult<Vec<RentalRecord>>;
}

#[async_trait]
pub trait BillingRepository: Send + Sync {
    /// Idempotent cycle creation keyed by (order_id, cycle_month). Returns
    /// false when the cycle already existed.
    async fn insert_cycle_if_absent(&self, cycle: &BillingCycle) -> StoreResult<bool>;

    async fn get_cycle(&self, order_id: Uuid, cycle_month: &str) -> StoreResult<Option<BillingCycle>>;

    async fn update_cycle(&self, cycle: &BillingCycle) -> StoreResult<()>;

    async fn list_by_order(&self, order_id: Uuid) -> StoreResult<Vec<BillingCycle>>;

    /// Unpaid (pending/partial) cycles due strictly before `date`, capped at
    /// `limit`, optionally restricted to one provider's orders.
    async fn list_unpaid_due_before(
        &self,
        date: NaiveDate,
        provider_id: Option<Uuid>,
        limit: usize,
    ) -> StoreResult<Vec<BillingCycle>>;

    /// Bulk conditional transition to `overdue`; rows no longer in
    /// pending/partial are skipped by the predicate, which is what makes the
    /// sweep retry-safe. Returns rows actually transitioned.
    async fn mark_overdue(&self, cycle_ids: &[Uuid]) -> StoreResult<u64>;

    /// All cycles of one provider's orders with due dates inside the
    /// inclusive range. Pure read used by statistics.
    async fn list_for_provider(&self, provider_id: Uuid, from: NaiveDate, to: NaiveDate) -> StoreResult<Vec<BillingCycle>>;
}

#[async_trait]
pub trait DepositRepository: Send + Sync {
    async fn insert(&self, txn: &DepositTransaction) -> StoreResult<()>;

    async fn list_by_order(&self, order_id: Uuid) -> StoreResult<Vec<DepositTransaction>>;
}

#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Append-only; entries are never updated or deleted.
    async fn append(&self, event: &Event) -> StoreResult<()>;

    /// Events for one order, oldest first.
    async fn list_by_order(&self, order_id: Uuid) -> StoreResult<Vec<Event>>;
}

/// Best-effort audit append. The trail is supplementary evidence, not the
/// system of record: a failed append is logged and reported as a warning,
/// never allowed to fail or roll back the primary mutation.
pub async fn append_best_effort(events: &dyn EventRepository, event: Event, warnings: &mut Vec<String>) {
    let event_type = event.event_type.clone();
    if let Err(e) = events.append(&event).await {
        tracing::warn!(order_id = %event.order_id, event_type = %event_type, error = %e, "audit event append failed");
        warnings.push(format!("event_log_write_failed:{event_type}"));
    }
}
