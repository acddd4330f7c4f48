use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use lessor_core::error::DomainError;
use lessor_core::identity::CallerContext;
use lessor_core::models::{Device, DeviceStatus, OrderPatch, OrderStatus, PaymentStatus, RentalOrder};
use lessor_core::repository::DeviceRepository;
use lessor_rental::{ConfirmOutcome, ConfirmTarget, Delivery, NewRental};
use lessor_shared::ApiResponse;

use crate::error::ApiError;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateRentalRequest {
    pub provider_id: Uuid,
    pub restaurant_id: Uuid,
    pub device_id: Uuid,
    pub deposit_amount: i64,
    pub monthly_price: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub batch_id: Option<Uuid>,
}

impl CreateRentalRequest {
    fn validate(&self) -> Result<(), ApiError> {
        if self.end_date < self.start_date {
            return Err(ApiError::validation("end_date must not precede start_date"));
        }
        if self.monthly_price <= 0 {
            return Err(ApiError::validation("monthly_price must be positive"));
        }
        if self.deposit_amount < 0 {
            return Err(ApiError::validation("deposit_amount must not be negative"));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRentalRequest {
    pub rental_id: Option<Uuid>,
    pub rental_batch_id: Option<Uuid>,
    pub agreement_id: Option<String>,
}

impl ConfirmRentalRequest {
    fn target(&self) -> Result<ConfirmTarget, ApiError> {
        match (self.rental_id, self.rental_batch_id) {
            (Some(id), None) => Ok(ConfirmTarget::Single(id)),
            (None, Some(batch)) => Ok(ConfirmTarget::Batch(batch)),
            _ => Err(ApiError::validation("exactly one of rental_id or rental_batch_id is required")),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateRentalRequest {
    pub id: Uuid,
    pub order_status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub is_signed: Option<bool>,
    pub setup_photos: Option<Vec<String>>,
    pub worker_id: Option<Uuid>,
    pub agreement_id: Option<String>,
}

impl UpdateRentalRequest {
    fn patch(&self) -> Result<OrderPatch, ApiError> {
        let patch = OrderPatch {
            order_status: self.order_status,
            payment_status: self.payment_status,
            is_signed: self.is_signed,
            setup_photos: self.setup_photos.clone(),
            worker_id: self.worker_id,
            agreement_id: self.agreement_id.clone(),
        };
        if patch.is_empty() {
            return Err(ApiError::validation("at least one field to update is required"));
        }
        Ok(patch)
    }
}

#[derive(Debug, Deserialize)]
pub struct DeliveryVerification {
    pub customer_confirmed: bool,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeliverRequest {
    pub order_id: Uuid,
    pub worker_id: Uuid,
    #[serde(default)]
    pub setup_photo: Vec<String>,
    pub delivery_verification: DeliveryVerification,
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub restaurant_id: Uuid,
    pub device_id: Uuid,
    pub batch_id: Option<Uuid>,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub deposit_amount: i64,
    pub monthly_price: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub worker_id: Option<Uuid>,
    pub agreement_id: Option<String>,
    pub is_signed: bool,
    pub setup_photos: Vec<String>,
    pub customer_confirmed_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<RentalOrder> for OrderResponse {
    fn from(order: RentalOrder) -> Self {
        Self {
            id: order.id,
            provider_id: order.provider_id,
            restaurant_id: order.restaurant_id,
            device_id: order.device_id,
            batch_id: order.batch_id,
            status: order.status,
            payment_status: order.payment_status,
            deposit_amount: order.deposit_amount,
            monthly_price: order.monthly_price,
            start_date: order.start_date,
            end_date: order.end_date,
            worker_id: order.worker_id,
            agreement_id: order.agreement_id,
            is_signed: order.is_signed,
            setup_photos: order.setup_photos,
            customer_confirmed_at: order.customer_confirmed_at,
            delivered_at: order.delivered_at,
            created_at: order.created_at,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST rentals - book a new lease (claims the device).
pub async fn create_rental(state: &AppState, ctx: &CallerContext, req: CreateRentalRequest) -> ApiResponse<OrderResponse> {
    if let Err(e) = req.validate() {
        return e.into_response();
    }
    let input = NewRental {
        provider_id: req.provider_id,
        restaurant_id: req.restaurant_id,
        device_id: req.device_id,
        deposit_amount: req.deposit_amount,
        monthly_price: req.monthly_price,
        start_date: req.start_date,
        end_date: req.end_date,
        batch_id: req.batch_id,
    };
    match state.rentals.book(ctx, input).await {
        Ok(order) => ApiResponse::ok(order.into()).with_message("rental order created"),
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// POST confirm - activate order(s) on customer confirmation.
pub async fn confirm_rental(state: &AppState, ctx: &CallerContext, req: ConfirmRentalRequest) -> ApiResponse<ConfirmOutcome> {
    let target = match req.target() {
        Ok(target) => target,
        Err(e) => return e.into_response(),
    };
    match state.rentals.confirm(ctx, target, req.agreement_id).await {
        Ok(outcome) => {
            ApiResponse::ok_with_warnings(outcome.value, outcome.warnings).with_message("rental order confirmed")
        }
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// PATCH update - partial update; terminal transitions release the device.
pub async fn update_rental(state: &AppState, ctx: &CallerContext, req: UpdateRentalRequest) -> ApiResponse<OrderResponse> {
    let patch = match req.patch() {
        Ok(patch) => patch,
        Err(e) => return e.into_response(),
    };
    match state.rentals.update(ctx, req.id, patch).await {
        Ok(outcome) => {
            ApiResponse::ok_with_warnings(outcome.value.into(), outcome.warnings).with_message("rental order updated")
        }
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// POST deliver - device goes in_use once the customer confirms delivery.
pub async fn deliver_rental(state: &AppState, ctx: &CallerContext, req: DeliverRequest) -> ApiResponse<OrderResponse> {
    let delivery = Delivery {
        order_id: req.order_id,
        worker_id: req.worker_id,
        setup_photos: req.setup_photo,
        customer_confirmed: req.delivery_verification.customer_confirmed,
    };
    match state.rentals.deliver(ctx, delivery).await {
        Ok(outcome) => {
            ApiResponse::ok_with_warnings(outcome.value.into(), outcome.warnings).with_message("delivery recorded")
        }
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// GET rentals/{id}
pub async fn get_rental(state: &AppState, ctx: &CallerContext, order_id: Uuid) -> ApiResponse<OrderResponse> {
    match state.rentals.get_order(ctx, order_id).await {
        Ok(order) => ApiResponse::ok(order.into()),
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// GET rentals?provider_id=
pub async fn list_rentals(state: &AppState, ctx: &CallerContext, provider_id: Uuid) -> ApiResponse<Vec<OrderResponse>> {
    match state.rentals.list_orders(ctx, provider_id).await {
        Ok(orders) => ApiResponse::ok(orders.into_iter().map(OrderResponse::from).collect()),
        Err(e) => ApiError::from(e).into_response(),
    }
}

#[derive(Debug, Serialize)]
pub struct DeviceResponse {
    pub id: Uuid,
    pub rental_status: DeviceStatus,
    pub current_rental_order_id: Option<Uuid>,
}

impl From<Device> for DeviceResponse {
    fn from(device: Device) -> Self {
        Self {
            id: device.id,
            rental_status: device.rental_status,
            current_rental_order_id: device.current_rental_order_id,
        }
    }
}

/// POST devices - register a physical asset (operators only).
pub async fn register_device(state: &AppState, ctx: &CallerContext, device_id: Uuid) -> ApiResponse<DeviceResponse> {
    if !ctx.is_unscoped() {
        return ApiError::from(DomainError::unauthorized("device registration is operator-only")).into_response();
    }
    let device = Device::new(device_id);
    match state.repos.devices.insert(&device).await {
        Ok(()) => ApiResponse::ok(device.into()).with_message("device registered"),
        Err(e) => ApiError::from(DomainError::from(e)).into_response(),
    }
}

/// GET devices/{id} - registry read (operators only).
pub async fn get_device(state: &AppState, ctx: &CallerContext, device_id: Uuid) -> ApiResponse<DeviceResponse> {
    if !ctx.is_unscoped() {
        return ApiError::from(DomainError::unauthorized("device registry reads are operator-only")).into_response();
    }
    match state.repos.devices.get(device_id).await {
        Ok(Some(device)) => ApiResponse::ok(device.into()),
        Ok(None) => ApiError::from(DomainError::not_found("device", device_id)).into_response(),
        Err(e) => ApiError::from(DomainError::from(e)).into_response(),
    }
}
