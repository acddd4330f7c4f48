//! Order state machine and device registry transitions.
//!
//! Lifecycle: `pending_confirmation -> active -> {completed, cancelled}`.
//! No cross-request locks: every transition is a conditional write, so a
//! losing concurrent writer gets a precondition rejection instead of
//! corrupting the order or the device it holds.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use lessor_core::error::{DomainError, DomainResult, Outcome};
use lessor_core::identity::CallerContext;
use lessor_core::models::{BillingCycle, OrderPatch, OrderStatus, RentalOrder};
use lessor_core::repository::{
    append_best_effort, BillingRepository, DeviceRepository, EventRepository, OrderRepository,
};
use lessor_shared::events::{Event, EventType};
use lessor_shared::util::{month_key, months_in_range};

/// Booking input for a new lease.
#[derive(Debug, Clone, Deserialize)]
pub struct NewRental {
    pub provider_id: Uuid,
    pub restaurant_id: Uuid,
    pub device_id: Uuid,
    pub deposit_amount: i64,
    pub monthly_price: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub batch_id: Option<Uuid>,
}

/// Confirm one order, or every order booked under a batch id.
#[derive(Debug, Clone, Copy)]
pub enum ConfirmTarget {
    Single(Uuid),
    Batch(Uuid),
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfirmOutcome {
    pub confirmed: Vec<Uuid>,
    /// Orders in the batch that were no longer pending (already confirmed or
    /// cancelled); reported, not failed.
    pub skipped: Vec<Uuid>,
    pub cycles_created: u32,
}

/// Delivery confirmation reported by the worker's client.
#[derive(Debug, Clone, Deserialize)]
pub struct Delivery {
    pub order_id: Uuid,
    pub worker_id: Uuid,
    pub setup_photos: Vec<String>,
    pub customer_confirmed: bool,
}

pub struct RentalService {
    orders: Arc<dyn OrderRepository>,
    devices: Arc<dyn DeviceRepository>,
    billing: Arc<dyn BillingRepository>,
    events: Arc<dyn EventRepository>,
}

impl RentalService {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        devices: Arc<dyn DeviceRepository>,
        billing: Arc<dyn BillingRepository>,
        events: Arc<dyn EventRepository>,
    ) -> Self {
        Self {
            orders,
            devices,
            billing,
            events,
        }
    }

    /// Book a new lease. Claims the device pointer first; the order row is
    /// only written once the claim is won, so two concurrent bookings of the
    /// same device cannot both hold it.
    pub async fn book(&self, ctx: &CallerContext, input: NewRental) -> DomainResult<RentalOrder> {
        if !ctx.can_access_tenant(input.provider_id) {
            return Err(DomainError::unauthorized("caller may not book orders for this provider"));
        }
        if input.end_date < input.start_date {
            return Err(DomainError::precondition("invalid_rental_period"));
        }
        if input.monthly_price <= 0 || input.deposit_amount < 0 {
            return Err(DomainError::precondition("invalid_amounts"));
        }

        if self.devices.get(input.device_id).await?.is_none() {
            return Err(DomainError::not_found("device", input.device_id));
        }

        let mut order = RentalOrder::new(
            input.provider_id,
            input.restaurant_id,
            input.device_id,
            input.deposit_amount,
            input.monthly_price,
            input.start_date,
            input.end_date,
        );
        if let Some(batch_id) = input.batch_id {
            order = order.with_batch(batch_id);
        }

        if !self.devices.assign_if_available(input.device_id, order.id).await? {
            return Err(DomainError::precondition("device_unavailable"));
        }

        if let Err(e) = self.orders.insert(&order).await {
            // Undo the claim so the device is not orphaned behind a missing order.
            let _ = self.devices.release_if_held_by(input.device_id, order.id).await;
            return Err(e.into());
        }

        tracing::info!(order_id = %order.id, device_id = %input.device_id, "rental order booked");
        Ok(order)
    }

    /// Customer confirmation: `pending_confirmation -> active`, stamps
    /// `customer_confirmed_at`, and generates the order's billing cycles.
    pub async fn confirm(
        &self,
        ctx: &CallerContext,
        target: ConfirmTarget,
        agreement_id: Option<String>,
    ) -> DomainResult<Outcome<ConfirmOutcome>> {
        let orders = match target {
            ConfirmTarget::Single(id) => {
                let order = self.orders.get(id).await?.ok_or_else(|| DomainError::not_found("order", id))?;
                vec![order]
            }
            ConfirmTarget::Batch(batch_id) => {
                let orders = self.orders.list_by_batch(batch_id).await?;
                if orders.is_empty() {
                    return Err(DomainError::not_found("rental_batch", batch_id));
                }
                orders
            }
        };

        for order in &orders {
            authorize_party(ctx, order)?;
        }

        let mut outcome = ConfirmOutcome {
            confirmed: Vec::new(),
            skipped: Vec::new(),
            cycles_created: 0,
        };
        let mut warnings = Vec::new();
        let confirmed_at = Utc::now();

        for order in &orders {
            let won = self
                .orders
                .confirm_if_pending(order.id, confirmed_at, agreement_id.as_deref())
                .await?;
            if !won {
                outcome.skipped.push(order.id);
                continue;
            }

            outcome.cycles_created += self.generate_cycles(order).await?;
            append_best_effort(
                self.events.as_ref(),
                Event::new(
                    order.id,
                    EventType::OrderConfirmed,
                    ctx.operator_id(),
                    serde_json::json!({ "agreement_id": agreement_id.as_deref() }),
                ),
                &mut warnings,
            )
            .await;
            outcome.confirmed.push(order.id);
        }

        if outcome.confirmed.is_empty() {
            // Single-target callers see the classic AlreadyConfirmed rejection;
            // a batch where nothing was pending reads the same way.
            return Err(DomainError::precondition("order_not_pending_confirmation"));
        }

        Ok(Outcome::with_warnings(outcome, warnings))
    }

    /// One pending cycle per calendar month of the rental period, due on the
    /// first of the month. Keyed inserts make re-confirmation retries no-ops.
    async fn generate_cycles(&self, order: &RentalOrder) -> DomainResult<u32> {
        let mut created = 0;
        for month_start in months_in_range(order.start_date, order.end_date) {
            let cycle = BillingCycle::new(order.id, month_key(month_start), month_start, order.monthly_price);
            if self.billing.insert_cycle_if_absent(&cycle).await? {
                created += 1;
            }
        }
        Ok(created)
    }

    /// Worker-side delivery: flips the device to `in_use` only if it still
    /// points at this order, so a stale client cannot revive a terminated
    /// order's claim. Writes `rental_started`.
    pub async fn deliver(&self, ctx: &CallerContext, delivery: Delivery) -> DomainResult<Outcome<RentalOrder>> {
        let order = self
            .orders
            .get(delivery.order_id)
            .await?
            .ok_or_else(|| DomainError::not_found("order", delivery.order_id))?;
        ensure_provider_scope(ctx, &order)?;

        if !delivery.customer_confirmed {
            return Err(DomainError::precondition("delivery_not_confirmed_by_customer"));
        }
        if order.status != OrderStatus::Active {
            return Err(DomainError::precondition("order_not_active"));
        }
        if !self.devices.occupy_if_held_by(order.device_id, order.id).await? {
            return Err(DomainError::precondition("device_not_held_by_order"));
        }

        self.orders
            .mark_delivered(order.id, delivery.worker_id, &delivery.setup_photos, Utc::now())
            .await?;

        let mut warnings = Vec::new();
        append_best_effort(
            self.events.as_ref(),
            Event::new(
                order.id,
                EventType::RentalStarted,
                ctx.operator_id(),
                serde_json::json!({
                    "worker_id": delivery.worker_id,
                    "setup_photo_count": delivery.setup_photos.len(),
                }),
            ),
            &mut warnings,
        )
        .await;

        let updated = self
            .orders
            .get(order.id)
            .await?
            .ok_or_else(|| DomainError::not_found("order", order.id))?;
        Ok(Outcome::with_warnings(updated, warnings))
    }

    /// Generic partial update, gated by tenant ownership. A transition into a
    /// terminal state releases the device and writes the closing audit event
    /// exactly once; re-sending the same terminal status is a no-op on both.
    pub async fn update(&self, ctx: &CallerContext, order_id: Uuid, patch: OrderPatch) -> DomainResult<Outcome<RentalOrder>> {
        if patch.is_empty() {
            return Err(DomainError::precondition("empty_update"));
        }

        let order = self
            .orders
            .get(order_id)
            .await?
            .ok_or_else(|| DomainError::not_found("order", order_id))?;
        ensure_provider_scope(ctx, &order)?;

        let previous = order.status;
        if let Some(next) = patch.order_status {
            if previous.is_terminal() && next != previous {
                return Err(DomainError::precondition("order_in_terminal_state"));
            }
        }

        self.orders.apply_patch(order_id, &patch).await?;

        let mut warnings = Vec::new();
        if let Some(next) = patch.order_status {
            if next.is_terminal() && !previous.is_terminal() {
                let released = self.devices.release_if_held_by(order.device_id, order.id).await?;
                if !released {
                    tracing::warn!(order_id = %order.id, device_id = %order.device_id, "device release found a stale claim");
                    warnings.push("device_release_skipped:claim_not_held".to_string());
                }

                let event_type = if previous == OrderStatus::PendingConfirmation && next == OrderStatus::Cancelled {
                    EventType::OrderCancelled
                } else {
                    EventType::RentalEnded
                };
                append_best_effort(
                    self.events.as_ref(),
                    Event::new(
                        order.id,
                        event_type,
                        ctx.operator_id(),
                        serde_json::json!({
                            "previous_status": previous.as_str(),
                            "new_status": next.as_str(),
                        }),
                    ),
                    &mut warnings,
                )
                .await;
            }
        }

        let updated = self
            .orders
            .get(order_id)
            .await?
            .ok_or_else(|| DomainError::not_found("order", order_id))?;
        Ok(Outcome::with_warnings(updated, warnings))
    }

    /// Tenant-scoped read.
    pub async fn get_order(&self, ctx: &CallerContext, order_id: Uuid) -> DomainResult<RentalOrder> {
        let order = self
            .orders
            .get(order_id)
            .await?
            .ok_or_else(|| DomainError::not_found("order", order_id))?;
        authorize_party(ctx, &order)?;
        Ok(order)
    }

    pub async fn list_orders(&self, ctx: &CallerContext, provider_id: Uuid) -> DomainResult<Vec<RentalOrder>> {
        if !ctx.can_access_tenant(provider_id) {
            return Err(DomainError::unauthorized("caller may not list this provider's orders"));
        }
        Ok(self.orders.list_by_provider(provider_id).await?)
    }
}

/// Mutations are provider-owned: the caller's tenant must own the order's
/// provider id, or hold elevated scope.
fn ensure_provider_scope(ctx: &CallerContext, order: &RentalOrder) -> DomainResult<()> {
    if ctx.can_access_tenant(order.provider_id) {
        Ok(())
    } else {
        Err(DomainError::unauthorized("caller's tenant does not own this order"))
    }
}

/// Reads and customer actions are open to either party of the lease.
fn authorize_party(ctx: &CallerContext, order: &RentalOrder) -> DomainResult<()> {
    if ctx.is_party_to(order.provider_id, order.restaurant_id) {
        Ok(())
    } else {
        Err(DomainError::unauthorized("caller is not a party to this order"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lessor_core::identity::Role;
    use lessor_core::models::{Device, DeviceStatus, PaymentStatus};
    use lessor_store::MemoryStore;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        service: RentalService,
        provider: Uuid,
        restaurant: Uuid,
        device: Uuid,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let service = RentalService::new(store.clone(), store.clone(), store.clone(), store.clone());
        let device = Uuid::new_v4();
        DeviceRepository::insert(store.as_ref(), &Device::new(device)).await.unwrap();
        Fixture {
            store,
            service,
            provider: Uuid::new_v4(),
            restaurant: Uuid::new_v4(),
            device,
        }
    }

    fn admin() -> CallerContext {
        CallerContext::new(Uuid::new_v4(), None, Role::SuperAdmin)
    }

    fn new_rental(f: &Fixture) -> NewRental {
        NewRental {
            provider_id: f.provider,
            restaurant_id: f.restaurant,
            device_id: f.device,
            deposit_amount: 500,
            monthly_price: 100,
            start_date: d(2025, 1, 10),
            end_date: d(2025, 3, 20),
            batch_id: None,
        }
    }

    #[tokio::test]
    async fn test_confirm_activates_and_generates_cycles() {
        let f = fixture().await;
        let ctx = admin();
        let order = f.service.book(&ctx, new_rental(&f)).await.unwrap();
        assert_eq!(order.status, OrderStatus::PendingConfirmation);

        let outcome = f
            .service
            .confirm(&ctx, ConfirmTarget::Single(order.id), Some("AG-7".into()))
            .await
            .unwrap();
        assert_eq!(outcome.value.confirmed, vec![order.id]);
        assert_eq!(outcome.value.cycles_created, 3); // Jan, Feb, Mar

        let confirmed = f.service.get_order(&ctx, order.id).await.unwrap();
        assert_eq!(confirmed.status, OrderStatus::Active);
        assert!(confirmed.customer_confirmed_at.is_some());
        assert_eq!(confirmed.agreement_id.as_deref(), Some("AG-7"));

        let events = EventRepository::list_by_order(f.store.as_ref(), order.id).await.unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].is_type(EventType::OrderConfirmed));
    }

    #[tokio::test]
    async fn test_confirm_twice_is_rejected() {
        let f = fixture().await;
        let ctx = admin();
        let order = f.service.book(&ctx, new_rental(&f)).await.unwrap();
        f.service.confirm(&ctx, ConfirmTarget::Single(order.id), None).await.unwrap();

        let err = f.service.confirm(&ctx, ConfirmTarget::Single(order.id), None).await.unwrap_err();
        assert_eq!(err.code(), "precondition:order_not_pending_confirmation");
    }

    #[tokio::test]
    async fn test_confirm_retry_does_not_duplicate_cycles() {
        let f = fixture().await;
        let ctx = admin();
        let order = f.service.book(&ctx, new_rental(&f)).await.unwrap();
        f.service.confirm(&ctx, ConfirmTarget::Single(order.id), None).await.unwrap();

        let cycles = BillingRepository::list_by_order(f.store.as_ref(), order.id).await.unwrap();
        assert_eq!(cycles.len(), 3);
        assert_eq!(cycles[0].cycle_month, "2025-01");
        assert_eq!(cycles[0].amount_due, 100);
    }

    #[tokio::test]
    async fn test_batch_confirm_reports_skipped() {
        let f = fixture().await;
        let ctx = admin();
        let batch = Uuid::new_v4();

        let device_b = Uuid::new_v4();
        DeviceRepository::insert(f.store.as_ref(), &Device::new(device_b)).await.unwrap();

        let mut first = new_rental(&f);
        first.batch_id = Some(batch);
        let first = f.service.book(&ctx, first).await.unwrap();

        let mut second = new_rental(&f);
        second.device_id = device_b;
        second.batch_id = Some(batch);
        let second = f.service.book(&ctx, second).await.unwrap();

        // First order is confirmed ahead of the batch call.
        f.service.confirm(&ctx, ConfirmTarget::Single(first.id), None).await.unwrap();

        let outcome = f.service.confirm(&ctx, ConfirmTarget::Batch(batch), None).await.unwrap();
        assert_eq!(outcome.value.confirmed, vec![second.id]);
        assert_eq!(outcome.value.skipped, vec![first.id]);
    }

    #[tokio::test]
    async fn test_device_occupancy_is_exclusive() {
        let f = fixture().await;
        let ctx = admin();
        f.service.book(&ctx, new_rental(&f)).await.unwrap();

        let err = f.service.book(&ctx, new_rental(&f)).await.unwrap_err();
        assert_eq!(err.code(), "precondition:device_unavailable");
    }

    #[tokio::test]
    async fn test_deliver_requires_customer_confirmation() {
        let f = fixture().await;
        let ctx = admin();
        let order = f.service.book(&ctx, new_rental(&f)).await.unwrap();
        f.service.confirm(&ctx, ConfirmTarget::Single(order.id), None).await.unwrap();

        let err = f
            .service
            .deliver(
                &ctx,
                Delivery {
                    order_id: order.id,
                    worker_id: Uuid::new_v4(),
                    setup_photos: vec![],
                    customer_confirmed: false,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "precondition:delivery_not_confirmed_by_customer");
    }

    #[tokio::test]
    async fn test_deliver_marks_device_in_use_and_logs_start() {
        let f = fixture().await;
        let ctx = admin();
        let order = f.service.book(&ctx, new_rental(&f)).await.unwrap();
        f.service.confirm(&ctx, ConfirmTarget::Single(order.id), None).await.unwrap();

        let worker = Uuid::new_v4();
        let outcome = f
            .service
            .deliver(
                &ctx,
                Delivery {
                    order_id: order.id,
                    worker_id: worker,
                    setup_photos: vec!["https://proof/1.jpg".into()],
                    customer_confirmed: true,
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome.value.worker_id, Some(worker));
        assert!(outcome.value.delivered_at.is_some());

        let device = DeviceRepository::get(f.store.as_ref(), f.device).await.unwrap().unwrap();
        assert_eq!(device.rental_status, DeviceStatus::InUse);
        assert_eq!(device.current_rental_order_id, Some(order.id));

        let events = EventRepository::list_by_order(f.store.as_ref(), order.id).await.unwrap();
        let starts: Vec<_> = events.iter().filter(|e| e.is_type(EventType::RentalStarted)).collect();
        assert_eq!(starts.len(), 1);
    }

    #[tokio::test]
    async fn test_terminal_transition_is_idempotent_on_device_and_event() {
        let f = fixture().await;
        let ctx = admin();
        let order = f.service.book(&ctx, new_rental(&f)).await.unwrap();
        f.service.confirm(&ctx, ConfirmTarget::Single(order.id), None).await.unwrap();
        f.service
            .deliver(
                &ctx,
                Delivery {
                    order_id: order.id,
                    worker_id: Uuid::new_v4(),
                    setup_photos: vec![],
                    customer_confirmed: true,
                },
            )
            .await
            .unwrap();

        let patch = OrderPatch {
            order_status: Some(OrderStatus::Completed),
            ..Default::default()
        };
        f.service.update(&ctx, order.id, patch.clone()).await.unwrap();

        let device = DeviceRepository::get(f.store.as_ref(), f.device).await.unwrap().unwrap();
        assert_eq!(device.rental_status, DeviceStatus::Available);
        assert!(device.current_rental_order_id.is_none());

        // Second order claims the device; re-sending completed must not evict it.
        let mut second_rental = new_rental(&f);
        second_rental.restaurant_id = Uuid::new_v4();
        let second = f.service.book(&ctx, second_rental).await.unwrap();

        f.service.update(&ctx, order.id, patch).await.unwrap();

        let device = DeviceRepository::get(f.store.as_ref(), f.device).await.unwrap().unwrap();
        assert_eq!(device.current_rental_order_id, Some(second.id));

        let events = EventRepository::list_by_order(f.store.as_ref(), order.id).await.unwrap();
        let ends: Vec<_> = events.iter().filter(|e| e.is_type(EventType::RentalEnded)).collect();
        assert_eq!(ends.len(), 1);
    }

    #[tokio::test]
    async fn test_stale_deliver_cannot_revive_terminated_order() {
        let f = fixture().await;
        let ctx = admin();
        let order = f.service.book(&ctx, new_rental(&f)).await.unwrap();
        f.service.confirm(&ctx, ConfirmTarget::Single(order.id), None).await.unwrap();

        // Order is cancelled before the worker's delivery confirmation lands;
        // force the status back so only the device claim decides.
        f.service
            .update(
                &ctx,
                order.id,
                OrderPatch {
                    order_status: Some(OrderStatus::Cancelled),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        OrderRepository::apply_patch(
            f.store.as_ref(),
            order.id,
            &OrderPatch {
                order_status: Some(OrderStatus::Active),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let err = f
            .service
            .deliver(
                &ctx,
                Delivery {
                    order_id: order.id,
                    worker_id: Uuid::new_v4(),
                    setup_photos: vec![],
                    customer_confirmed: true,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "precondition:device_not_held_by_order");
    }

    #[tokio::test]
    async fn test_update_rejects_foreign_tenant() {
        let f = fixture().await;
        let ctx = admin();
        let order = f.service.book(&ctx, new_rental(&f)).await.unwrap();

        let outsider = CallerContext::new(Uuid::new_v4(), Some(Uuid::new_v4()), Role::Provider);
        let err = f
            .service
            .update(
                &outsider,
                order.id,
                OrderPatch {
                    is_signed: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "unauthorized");
        let unchanged = f.service.get_order(&ctx, order.id).await.unwrap();
        assert!(!unchanged.is_signed);
        assert_eq!(unchanged.payment_status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn test_cancel_pending_order_releases_claim_and_logs_cancellation() {
        let f = fixture().await;
        let ctx = admin();
        let order = f.service.book(&ctx, new_rental(&f)).await.unwrap();

        f.service
            .update(
                &ctx,
                order.id,
                OrderPatch {
                    order_status: Some(OrderStatus::Cancelled),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let device = DeviceRepository::get(f.store.as_ref(), f.device).await.unwrap().unwrap();
        assert!(device.current_rental_order_id.is_none());

        let events = EventRepository::list_by_order(f.store.as_ref(), order.id).await.unwrap();
        assert!(events.iter().any(|e| e.is_type(EventType::OrderCancelled)));
        assert!(!events.iter().any(|e| e.is_type(EventType::RentalEnded)));
    }
}
