//! End-to-end lifecycle through the handler surface over the in-memory
//! store: book -> confirm -> deliver -> pay -> complete -> refund, plus the
//! cron sweeps and the governance read.

use chrono::NaiveDate;
use uuid::Uuid;

use lessor_api::state::AppState;
use lessor_api::{billing, cron, facts, rentals, settlement};
use lessor_core::identity::{CallerContext, Role};
use lessor_core::models::{CycleStatus, Device, DeviceStatus, OrderStatus, PaymentStatus};
use lessor_core::repository::DeviceRepository;
use lessor_settlement::EscalationAction;

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn admin() -> CallerContext {
    CallerContext::new(Uuid::new_v4(), None, Role::SuperAdmin)
}

async fn state_with_device() -> (AppState, Uuid) {
    let state = AppState::in_memory();
    let device = Device::new(Uuid::new_v4());
    state.repos.devices.insert(&device).await.unwrap();
    (state, device.id)
}

fn create_request(device_id: Uuid) -> rentals::CreateRentalRequest {
    rentals::CreateRentalRequest {
        provider_id: Uuid::new_v4(),
        restaurant_id: Uuid::new_v4(),
        device_id,
        deposit_amount: 500,
        monthly_price: 1000,
        start_date: d(2025, 1, 1),
        end_date: d(2025, 2, 28),
        batch_id: None,
    }
}

#[tokio::test]
async fn test_full_rental_lifecycle() {
    let (state, device_id) = state_with_device().await;
    let ctx = admin();

    // Book
    let resp = rentals::create_rental(&state, &ctx, create_request(device_id)).await;
    assert!(resp.success, "create failed: {:?}", resp.error);
    let order = resp.data.unwrap();
    assert_eq!(order.status, OrderStatus::PendingConfirmation);

    // Confirm -> active, cycles generated
    let resp = rentals::confirm_rental(
        &state,
        &ctx,
        rentals::ConfirmRentalRequest {
            rental_id: Some(order.id),
            rental_batch_id: None,
            agreement_id: Some("AGR-2025-001".into()),
        },
    )
    .await;
    assert!(resp.success);
    assert_eq!(resp.data.unwrap().cycles_created, 2); // Jan + Feb

    // Deliver with customer confirmation -> device in_use
    let resp = rentals::deliver_rental(
        &state,
        &ctx,
        rentals::DeliverRequest {
            order_id: order.id,
            worker_id: Uuid::new_v4(),
            setup_photo: vec!["https://cdn.example/setup.jpg".into()],
            delivery_verification: rentals::DeliveryVerification {
                customer_confirmed: true,
                notes: None,
            },
        },
    )
    .await;
    assert!(resp.success);
    let device = state.repos.devices.get(device_id).await.unwrap().unwrap();
    assert_eq!(device.rental_status, DeviceStatus::InUse);

    // Pay January in two installments
    let resp = billing::monthly_payment(
        &state,
        &ctx,
        billing::MonthlyPaymentRequest {
            order_id: order.id,
            payment_month: "2025-01".into(),
            payment_amount: 600,
            payment_method: "bank_transfer".into(),
            payment_proof: None,
        },
    )
    .await;
    assert!(resp.success);
    assert_eq!(resp.data.unwrap().cycle.unwrap().status, CycleStatus::Partial);

    let resp = billing::monthly_payment(
        &state,
        &ctx,
        billing::MonthlyPaymentRequest {
            order_id: order.id,
            payment_month: "2025-01".into(),
            payment_amount: 400,
            payment_method: "bank_transfer".into(),
            payment_proof: Some("https://cdn.example/receipt.pdf".into()),
        },
    )
    .await;
    assert!(resp.success);
    let cycle = resp.data.unwrap().cycle.unwrap();
    assert_eq!(cycle.status, CycleStatus::Paid);
    assert_eq!(cycle.amount_paid, 1000);

    // Return check, then complete -> device released
    let resp = settlement::check_return(
        &state,
        &ctx,
        settlement::ReturnCheckRequest {
            order_id: order.id,
            return_condition: lessor_core::models::ReturnCondition::NormalWear,
            damage_fee: None,
            notes: None,
        },
    )
    .await;
    assert!(resp.success);

    let resp = rentals::update_rental(
        &state,
        &ctx,
        rentals::UpdateRentalRequest {
            id: order.id,
            order_status: Some(OrderStatus::Completed),
            payment_status: None,
            is_signed: None,
            setup_photos: None,
            worker_id: None,
            agreement_id: None,
        },
    )
    .await;
    assert!(resp.success);
    let device = state.repos.devices.get(device_id).await.unwrap().unwrap();
    assert_eq!(device.rental_status, DeviceStatus::Available);
    assert!(device.current_rental_order_id.is_none());

    // Refund deposit; defaults to the full amount, second call rejected
    let resp = settlement::refund_deposit(
        &state,
        &ctx,
        settlement::RefundDepositRequest {
            rental_order_id: order.id,
            refund_amount: None,
            refund_reason: Some("lease ended".into()),
            proof: None,
            auto_trigger: false,
        },
    )
    .await;
    assert!(resp.success);
    assert_eq!(resp.data.unwrap().amount, 500);

    let resp = settlement::refund_deposit(
        &state,
        &ctx,
        settlement::RefundDepositRequest {
            rental_order_id: order.id,
            refund_amount: None,
            refund_reason: None,
            proof: None,
            auto_trigger: false,
        },
    )
    .await;
    assert!(!resp.success);
    assert_eq!(resp.error.as_deref(), Some("precondition:deposit_already_refunded"));

    // Governance read: event-sourced timestamps, consistent history
    let resp = facts::get_order_facts(&state, &ctx, order.id).await;
    assert!(resp.success);
    let bundle = resp.data.unwrap();
    assert_eq!(bundle.order.status, "completed");
    assert_eq!(bundle.order.payment_status, "refunded");
    assert!(bundle.order.confirmed_at.is_some());
    assert!(bundle.order.started_at.is_some());
    assert!(bundle.order.ended_at.is_some());
    assert!(bundle.order.deposit_refunded_at.is_some());
    assert_eq!(bundle.order.timeline.previous_state.as_deref(), Some("active"));
    assert!(bundle.order.timeline.next_expected.is_empty());
    assert_eq!(bundle.assets[0].record_status.as_deref(), Some("returned"));
    assert!(bundle.fact_warnings.is_empty(), "unexpected warnings: {:?}", bundle.fact_warnings);
    // order_confirmed, rental_started, 2x monthly_payment,
    // equipment_return_checked, rental_ended, deposit_refunded
    assert_eq!(bundle.traces.len(), 7);
}

#[tokio::test]
async fn test_confirm_requires_exactly_one_target() {
    let (state, _device) = state_with_device().await;
    let resp = rentals::confirm_rental(
        &state,
        &admin(),
        rentals::ConfirmRentalRequest {
            rental_id: None,
            rental_batch_id: None,
            agreement_id: None,
        },
    )
    .await;
    assert!(!resp.success);
    assert_eq!(resp.error.as_deref(), Some("validation_error"));
}

#[tokio::test]
async fn test_unknown_order_is_reported_as_not_found() {
    let (state, _device) = state_with_device().await;
    let resp = facts::get_order_facts(&state, &admin(), Uuid::new_v4()).await;
    assert!(!resp.success);
    assert_eq!(resp.error.as_deref(), Some("not_found:order"));
}

#[tokio::test]
async fn test_payment_without_cycle_succeeds_with_warning() {
    let (state, device_id) = state_with_device().await;
    let ctx = admin();

    let order = rentals::create_rental(&state, &ctx, create_request(device_id)).await.data.unwrap();
    // Not confirmed: no cycles exist yet. A legacy-style payment still lands.
    let resp = billing::monthly_payment(
        &state,
        &ctx,
        billing::MonthlyPaymentRequest {
            order_id: order.id,
            payment_month: "2024-12".into(),
            payment_amount: 250,
            payment_method: "cash".into(),
            payment_proof: None,
        },
    )
    .await;
    assert!(resp.success);
    assert!(resp.data.unwrap().cycle.is_none());
    assert!(resp.warnings.iter().any(|w| w.starts_with("billing_cycle_not_found")));
}

#[tokio::test]
async fn test_cron_overdue_billing_dry_run_then_commit() {
    let (state, device_id) = state_with_device().await;
    let ctx = admin();

    let order = rentals::create_rental(&state, &ctx, create_request(device_id)).await.data.unwrap();
    rentals::confirm_rental(
        &state,
        &ctx,
        rentals::ConfirmRentalRequest {
            rental_id: Some(order.id),
            rental_batch_id: None,
            agreement_id: None,
        },
    )
    .await;

    // Cycles are due in 2025; "today" is past both due dates.
    let preview = cron::check_overdue_billing_preview(&state, &ctx).await;
    assert!(preview.success);
    let preview = preview.data.unwrap();
    assert!(preview.dry_run);
    assert_eq!(preview.matched, 2);
    assert_eq!(preview.applied, 0);

    let commit = cron::check_overdue_billing(&state, &ctx, cron::CronSweepRequest::default()).await;
    assert!(commit.success);
    let commit = commit.data.unwrap();
    assert_eq!(commit.applied, 2);

    // Convergence: a second commit run is a no-op.
    let again = cron::check_overdue_billing(&state, &ctx, cron::CronSweepRequest::default()).await;
    assert_eq!(again.data.unwrap().applied, 0);
}

#[tokio::test]
async fn test_cron_overdue_rentals_auto_mark() {
    let (state, device_id) = state_with_device().await;
    let ctx = admin();

    let mut req = create_request(device_id);
    req.end_date = d(2025, 2, 28); // long past
    let order = rentals::create_rental(&state, &ctx, req).await.data.unwrap();
    rentals::confirm_rental(
        &state,
        &ctx,
        rentals::ConfirmRentalRequest {
            rental_id: Some(order.id),
            rental_batch_id: None,
            agreement_id: None,
        },
    )
    .await;

    let resp = cron::check_overdue_rentals(
        &state,
        &ctx,
        cron::CronSweepRequest {
            auto_mark: Some(true),
            ..Default::default()
        },
    )
    .await;
    assert!(resp.success);
    let report = resp.data.unwrap();
    assert_eq!(report.matched, 1);
    assert_eq!(report.applied, 1);

    // The record is lost now; escalating a reminder is still possible.
    let resp = settlement::mark_unreturned(
        &state,
        &ctx,
        settlement::MarkUnreturnedRequest {
            order_id: order.id,
            action: EscalationAction::SendReminder,
            message: None,
        },
    )
    .await;
    assert!(resp.success);
}

#[tokio::test]
async fn test_scoped_provider_cannot_touch_foreign_order() {
    let (state, device_id) = state_with_device().await;
    let ctx = admin();
    let order = rentals::create_rental(&state, &ctx, create_request(device_id)).await.data.unwrap();

    let outsider = CallerContext::new(Uuid::new_v4(), Some(Uuid::new_v4()), Role::Provider);
    let resp = rentals::update_rental(
        &state,
        &outsider,
        rentals::UpdateRentalRequest {
            id: order.id,
            order_status: Some(OrderStatus::Cancelled),
            payment_status: None,
            is_signed: None,
            setup_photos: None,
            worker_id: None,
            agreement_id: None,
        },
    )
    .await;
    assert!(!resp.success);
    assert_eq!(resp.error.as_deref(), Some("unauthorized"));

    let untouched = rentals::get_rental(&state, &ctx, order.id).await.data.unwrap();
    assert_eq!(untouched.status, OrderStatus::PendingConfirmation);
    assert_eq!(untouched.payment_status, PaymentStatus::Pending);
}
