//! In-memory store used by tests and local wiring.
//!
//! Implements every repository trait over a single locked state so the
//! conditional-update semantics match the Postgres implementation exactly:
//! a predicate that does not hold leaves the row untouched and returns
//! false, never an error.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use lessor_core::models::{
    BillingCycle, CycleStatus, DepositTransaction, Device, DeviceStatus, OrderPatch, OrderStatus, PaymentStatus,
    RentalOrder, RentalRecord,
};
use lessor_core::repository::{
    BillingRepository, DepositRepository, DeviceRepository, EventRepository, OrderRepository, RecordRepository,
    StoreResult,
};
use lessor_shared::events::Event;

#[derive(Default)]
struct MemInner {
    orders: HashMap<Uuid, RentalOrder>,
    devices: HashMap<Uuid, Device>,
    /// Keyed by (order_id, device_id) - the upsert key.
    records: HashMap<(Uuid, Uuid), RentalRecord>,
    cycles: Vec<BillingCycle>,
    deposits: Vec<DepositTransaction>,
    events: Vec<Event>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, MemInner>> {
        self.inner.lock().map_err(|_| "memory store lock poisoned".into())
    }
}

#[async_trait]
impl OrderRepository for MemoryStore {
    async fn insert(&self, order: &RentalOrder) -> StoreResult<()> {
        let mut state = self.lock()?;
        state.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<RentalOrder>> {
        Ok(self.lock()?.orders.get(&id).cloned())
    }

    async fn list_by_batch(&self, batch_id: Uuid) -> StoreResult<Vec<RentalOrder>> {
        let state = self.lock()?;
        let mut orders: Vec<RentalOrder> =
            state.orders.values().filter(|o| o.batch_id == Some(batch_id)).cloned().collect();
        orders.sort_by_key(|o| o.created_at);
        Ok(orders)
    }

    async fn list_by_provider(&self, provider_id: Uuid) -> StoreResult<Vec<RentalOrder>> {
        let state = self.lock()?;
        let mut orders: Vec<RentalOrder> =
            state.orders.values().filter(|o| o.provider_id == provider_id).cloned().collect();
        orders.sort_by_key(|o| o.created_at);
        Ok(orders)
    }

    async fn list_active_ended_before(&self, date: NaiveDate, provider_id: Option<Uuid>) -> StoreResult<Vec<RentalOrder>> {
        let state = self.lock()?;
        let mut orders: Vec<RentalOrder> = state
            .orders
            .values()
            .filter(|o| o.status == OrderStatus::Active && o.end_date < date)
            .filter(|o| provider_id.map_or(true, |p| o.provider_id == p))
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.end_date);
        Ok(orders)
    }

    async fn confirm_if_pending(
        &self,
        id: Uuid,
        confirmed_at: DateTime<Utc>,
        agreement_id: Option<&str>,
    ) -> StoreResult<bool> {
        let mut state = self.lock()?;
        match state.orders.get_mut(&id) {
            Some(order) if order.status == OrderStatus::PendingConfirmation => {
                order.status = OrderStatus::Active;
                order.customer_confirmed_at = Some(confirmed_at);
                if let Some(agreement) = agreement_id {
                    order.agreement_id = Some(agreement.to_string());
                }
                order.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_delivered(
        &self,
        id: Uuid,
        worker_id: Uuid,
        setup_photos: &[String],
        delivered_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut state = self.lock()?;
        if let Some(order) = state.orders.get_mut(&id) {
            order.worker_id = Some(worker_id);
            if !setup_photos.is_empty() {
                order.setup_photos = setup_photos.to_vec();
            }
            order.delivered_at = Some(delivered_at);
            order.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn apply_patch(&self, id: Uuid, patch: &OrderPatch) -> StoreResult<()> {
        let mut state = self.lock()?;
        if let Some(order) = state.orders.get_mut(&id) {
            if let Some(status) = patch.order_status {
                order.status = status;
            }
            if let Some(payment_status) = patch.payment_status {
                order.payment_status = payment_status;
            }
            if let Some(is_signed) = patch.is_signed {
                order.is_signed = is_signed;
            }
            if let Some(ref photos) = patch.setup_photos {
                order.setup_photos = photos.clone();
            }
            if let Some(worker_id) = patch.worker_id {
                order.worker_id = Some(worker_id);
            }
            if let Some(ref agreement_id) = patch.agreement_id {
                order.agreement_id = Some(agreement_id.clone());
            }
            order.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn mark_refunded_if_pending(&self, id: Uuid) -> StoreResult<bool> {
        let mut state = self.lock()?;
        match state.orders.get_mut(&id) {
            Some(order) if order.payment_status != PaymentStatus::Refunded => {
                order.payment_status = PaymentStatus::Refunded;
                order.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl DeviceRepository for MemoryStore {
    async fn insert(&self, device: &Device) -> StoreResult<()> {
        let mut state = self.lock()?;
        state.devices.insert(device.id, device.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Device>> {
        Ok(self.lock()?.devices.get(&id).cloned())
    }

    async fn assign_if_available(&self, device_id: Uuid, order_id: Uuid) -> StoreResult<bool> {
        let mut state = self.lock()?;
        match state.devices.get_mut(&device_id) {
            Some(device)
                if device.rental_status == DeviceStatus::Available && device.current_rental_order_id.is_none() =>
            {
                device.current_rental_order_id = Some(order_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn occupy_if_held_by(&self, device_id: Uuid, order_id: Uuid) -> StoreResult<bool> {
        let mut state = self.lock()?;
        match state.devices.get_mut(&device_id) {
            Some(device) if device.current_rental_order_id == Some(order_id) => {
                device.rental_status = DeviceStatus::InUse;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_if_held_by(&self, device_id: Uuid, order_id: Uuid) -> StoreResult<bool> {
        let mut state = self.lock()?;
        match state.devices.get_mut(&device_id) {
            Some(device) if device.current_rental_order_id == Some(order_id) => {
                device.rental_status = DeviceStatus::Available;
                device.current_rental_order_id = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl RecordRepository for MemoryStore {
    async fn upsert(&self, record: &RentalRecord) -> StoreResult<()> {
        let mut state = self.lock()?;
        let key = (record.order_id, record.device_id);
        // Preserve the original row id on conflict; everything else is
        // replaced by the caller's view.
        let id = state.records.get(&key).map(|existing| existing.id).unwrap_or(record.id);
        let mut row = record.clone();
        row.id = id;
        row.updated_at = Utc::now();
        state.records.insert(key, row);
        Ok(())
    }

    async fn get_by_order_device(&self, order_id: Uuid, device_id: Uuid) -> StoreResult<Option<RentalRecord>> {
        Ok(self.lock()?.records.get(&(order_id, device_id)).cloned())
    }

    async fn list_by_order(&self, order_id: Uuid) -> StoreResult<Vec<RentalRecord>> {
        let state = self.lock()?;
        let mut records: Vec<RentalRecord> =
            state.records.values().filter(|r| r.order_id == order_id).cloned().collect();
        records.sort_by_key(|r| r.device_id);
        Ok(records)
    }
}

#[async_trait]
impl BillingRepository for MemoryStore {
    async fn insert_cycle_if_absent(&self, cycle: &BillingCycle) -> StoreResult<bool> {
        let mut state = self.lock()?;
        if state.cycles.iter().any(|c| c.order_id == cycle.order_id && c.cycle_month == cycle.cycle_month) {
            return Ok(false);
        }
        state.cycles.push(cycle.clone());
        Ok(true)
    }

    async fn get_cycle(&self, order_id: Uuid, cycle_month: &str) -> StoreResult<Option<BillingCycle>> {
        let state = self.lock()?;
        Ok(state.cycles.iter().find(|c| c.order_id == order_id && c.cycle_month == cycle_month).cloned())
    }

    async fn update_cycle(&self, cycle: &BillingCycle) -> StoreResult<()> {
        let mut state = self.lock()?;
        if let Some(row) = state.cycles.iter_mut().find(|c| c.id == cycle.id) {
            *row = cycle.clone();
            row.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn list_by_order(&self, order_id: Uuid) -> StoreResult<Vec<BillingCycle>> {
        let state = self.lock()?;
        let mut cycles: Vec<BillingCycle> = state.cycles.iter().filter(|c| c.order_id == order_id).cloned().collect();
        cycles.sort_by(|a, b| a.cycle_month.cmp(&b.cycle_month));
        Ok(cycles)
    }

    async fn list_unpaid_due_before(
        &self,
        date: NaiveDate,
        provider_id: Option<Uuid>,
        limit: usize,
    ) -> StoreResult<Vec<BillingCycle>> {
        let state = self.lock()?;
        let mut cycles: Vec<BillingCycle> = state
            .cycles
            .iter()
            .filter(|c| c.status.sweepable() && c.due_date < date)
            .filter(|c| match provider_id {
                Some(p) => state.orders.get(&c.order_id).map_or(false, |o| o.provider_id == p),
                None => true,
            })
            .cloned()
            .collect();
        cycles.sort_by_key(|c| c.due_date);
        cycles.truncate(limit);
        Ok(cycles)
    }

    async fn mark_overdue(&self, cycle_ids: &[Uuid]) -> StoreResult<u64> {
        let mut state = self.lock()?;
        let mut transitioned = 0;
        for cycle in state.cycles.iter_mut() {
            if cycle_ids.contains(&cycle.id) && cycle.status.sweepable() {
                cycle.status = CycleStatus::Overdue;
                cycle.updated_at = Utc::now();
                transitioned += 1;
            }
        }
        Ok(transitioned)
    }

    async fn list_for_provider(&self, provider_id: Uuid, from: NaiveDate, to: NaiveDate) -> StoreResult<Vec<BillingCycle>> {
        let state = self.lock()?;
        let mut cycles: Vec<BillingCycle> = state
            .cycles
            .iter()
            .filter(|c| c.due_date >= from && c.due_date <= to)
            .filter(|c| state.orders.get(&c.order_id).map_or(false, |o| o.provider_id == provider_id))
            .cloned()
            .collect();
        cycles.sort_by_key(|c| c.due_date);
        Ok(cycles)
    }
}

#[async_trait]
impl DepositRepository for MemoryStore {
    async fn insert(&self, txn: &DepositTransaction) -> StoreResult<()> {
        let mut state = self.lock()?;
        state.deposits.push(txn.clone());
        Ok(())
    }

    async fn list_by_order(&self, order_id: Uuid) -> StoreResult<Vec<DepositTransaction>> {
        let state = self.lock()?;
        Ok(state.deposits.iter().filter(|t| t.order_id == order_id).cloned().collect())
    }
}

#[async_trait]
impl EventRepository for MemoryStore {
    async fn append(&self, event: &Event) -> StoreResult<()> {
        let mut state = self.lock()?;
        state.events.push(event.clone());
        Ok(())
    }

    async fn list_by_order(&self, order_id: Uuid) -> StoreResult<Vec<Event>> {
        let state = self.lock()?;
        let mut events: Vec<Event> = state.events.iter().filter(|e| e.order_id == order_id).cloned().collect();
        events.sort_by_key(|e| e.occurred_at);
        Ok(events)
    }
}
