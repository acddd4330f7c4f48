use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use lessor_billing::{BillingStats, MonthlyPayment};
use lessor_core::identity::CallerContext;
use lessor_core::models::{BillingCycle, CycleStatus};
use lessor_shared::util::parse_month_key;
use lessor_shared::ApiResponse;

use crate::error::ApiError;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct MonthlyPaymentRequest {
    pub order_id: Uuid,
    pub payment_month: String,
    pub payment_amount: i64,
    pub payment_method: String,
    pub payment_proof: Option<String>,
}

impl MonthlyPaymentRequest {
    fn validate(&self) -> Result<(), ApiError> {
        if self.payment_amount <= 0 {
            return Err(ApiError::validation("payment_amount must be positive"));
        }
        if parse_month_key(&self.payment_month).is_none() {
            return Err(ApiError::validation("payment_month must be formatted YYYY-MM"));
        }
        if self.payment_method.trim().is_empty() {
            return Err(ApiError::validation("payment_method is required"));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct BillingStatsRequest {
    pub provider_id: Uuid,
    pub from: NaiveDate,
    pub to: NaiveDate,
}

#[derive(Debug, Serialize)]
pub struct CycleResponse {
    pub id: Uuid,
    pub order_id: Uuid,
    pub cycle_month: String,
    pub due_date: NaiveDate,
    pub amount_due: i64,
    pub amount_paid: i64,
    pub status: CycleStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub payment_method: Option<String>,
}

impl From<BillingCycle> for CycleResponse {
    fn from(cycle: BillingCycle) -> Self {
        Self {
            id: cycle.id,
            order_id: cycle.order_id,
            cycle_month: cycle.cycle_month,
            due_date: cycle.due_date,
            amount_due: cycle.amount_due,
            amount_paid: cycle.amount_paid,
            status: cycle.status,
            paid_at: cycle.paid_at,
            payment_method: cycle.payment_method,
        }
    }
}

/// Payment application result. `cycle` is None when the payment matched no
/// cycle (tolerated anomaly - see the response warnings).
#[derive(Debug, Serialize)]
pub struct PaymentApplied {
    pub cycle: Option<CycleResponse>,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST payment/monthly - apply a payment to the matching cycle.
pub async fn monthly_payment(state: &AppState, ctx: &CallerContext, req: MonthlyPaymentRequest) -> ApiResponse<PaymentApplied> {
    if let Err(e) = req.validate() {
        return e.into_response();
    }
    let payment = MonthlyPayment {
        order_id: req.order_id,
        payment_month: req.payment_month,
        payment_amount: req.payment_amount,
        payment_method: req.payment_method,
        payment_proof: req.payment_proof,
    };
    match state.billing.apply_payment(ctx, payment).await {
        Ok(outcome) => ApiResponse::ok_with_warnings(
            PaymentApplied {
                cycle: outcome.value.map(CycleResponse::from),
            },
            outcome.warnings,
        )
        .with_message("payment recorded"),
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// GET billing/stats - per-tenant aggregation, pure read.
pub async fn billing_stats(state: &AppState, ctx: &CallerContext, req: BillingStatsRequest) -> ApiResponse<BillingStats> {
    if req.to < req.from {
        return ApiError::validation("to must not precede from").into_response();
    }
    match state.billing.stats(ctx, req.provider_id, req.from, req.to).await {
        Ok(stats) => ApiResponse::ok(stats),
        Err(e) => ApiError::from(e).into_response(),
    }
}
