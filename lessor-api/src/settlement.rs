use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use lessor_core::identity::CallerContext;
use lessor_core::models::{DamageType, DepositTransaction, RecordStatus, RentalRecord, ReturnCondition};
use lessor_settlement::{DamageReport, EscalationAction, NonReturnEscalation, RefundRequest, ReturnCheck};
use lessor_shared::ApiResponse;

use crate::error::ApiError;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RefundDepositRequest {
    pub rental_order_id: Uuid,
    pub refund_amount: Option<i64>,
    pub refund_reason: Option<String>,
    pub proof: Option<String>,
    #[serde(default)]
    pub auto_trigger: bool,
}

#[derive(Debug, Deserialize)]
pub struct DamageReportRequest {
    pub order_id: Uuid,
    pub device_id: Uuid,
    pub damage_type: DamageType,
    pub damage_fee: Option<i64>,
    pub description: Option<String>,
    #[serde(default)]
    pub proof_photos: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReturnCheckRequest {
    pub order_id: Uuid,
    pub return_condition: ReturnCondition,
    pub damage_fee: Option<i64>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MarkUnreturnedRequest {
    pub order_id: Uuid,
    pub action: EscalationAction,
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DepositTxnResponse {
    pub id: Uuid,
    pub order_id: Uuid,
    pub kind: String,
    pub amount: i64,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<DepositTransaction> for DepositTxnResponse {
    fn from(txn: DepositTransaction) -> Self {
        Self {
            id: txn.id,
            order_id: txn.order_id,
            kind: txn.kind.as_str().to_string(),
            amount: txn.amount,
            reason: txn.reason,
            created_at: txn.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RecordResponse {
    pub id: Uuid,
    pub order_id: Uuid,
    pub device_id: Uuid,
    pub status: RecordStatus,
    pub return_condition: Option<ReturnCondition>,
    pub damage_fee: Option<i64>,
    pub actual_end: Option<NaiveDate>,
}

impl From<RentalRecord> for RecordResponse {
    fn from(record: RentalRecord) -> Self {
        Self {
            id: record.id,
            order_id: record.order_id,
            device_id: record.device_id,
            status: record.status,
            return_condition: record.return_condition,
            damage_fee: record.damage_fee,
            actual_end: record.actual_end,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST deposit/refund
pub async fn refund_deposit(state: &AppState, ctx: &CallerContext, req: RefundDepositRequest) -> ApiResponse<DepositTxnResponse> {
    if req.refund_amount.is_some_and(|a| a <= 0) {
        return ApiError::validation("refund_amount must be positive when supplied").into_response();
    }
    let request = RefundRequest {
        order_id: req.rental_order_id,
        refund_amount: req.refund_amount,
        refund_reason: req.refund_reason,
        proof: req.proof,
        auto_trigger: req.auto_trigger,
    };
    match state.settlement.refund_deposit(ctx, request).await {
        Ok(outcome) => {
            ApiResponse::ok_with_warnings(outcome.value.into(), outcome.warnings).with_message("deposit refunded")
        }
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// POST damage/report
pub async fn report_damage(state: &AppState, ctx: &CallerContext, req: DamageReportRequest) -> ApiResponse<RecordResponse> {
    if req.damage_fee.is_some_and(|f| f < 0) {
        return ApiError::validation("damage_fee must not be negative").into_response();
    }
    let report = DamageReport {
        order_id: req.order_id,
        device_id: req.device_id,
        damage_type: req.damage_type,
        damage_fee: req.damage_fee,
        description: req.description,
        proof_photos: req.proof_photos,
    };
    match state.settlement.report_damage(ctx, report).await {
        Ok(outcome) => {
            ApiResponse::ok_with_warnings(outcome.value.into(), outcome.warnings).with_message("damage recorded")
        }
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// POST return/check
pub async fn check_return(state: &AppState, ctx: &CallerContext, req: ReturnCheckRequest) -> ApiResponse<RecordResponse> {
    if req.damage_fee.is_some_and(|f| f < 0) {
        return ApiError::validation("damage_fee must not be negative").into_response();
    }
    let check = ReturnCheck {
        order_id: req.order_id,
        return_condition: req.return_condition,
        damage_fee: req.damage_fee,
        notes: req.notes,
    };
    match state.settlement.check_return(ctx, check).await {
        Ok(outcome) => {
            ApiResponse::ok_with_warnings(outcome.value.into(), outcome.warnings).with_message("return checked")
        }
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// POST mark-unreturned
pub async fn mark_unreturned(state: &AppState, ctx: &CallerContext, req: MarkUnreturnedRequest) -> ApiResponse<Option<RecordResponse>> {
    let escalation = NonReturnEscalation {
        order_id: req.order_id,
        action: req.action,
        message: req.message,
    };
    match state.settlement.escalate_non_return(ctx, escalation).await {
        Ok(outcome) => ApiResponse::ok_with_warnings(outcome.value.map(RecordResponse::from), outcome.warnings)
            .with_message("escalation recorded"),
        Err(e) => ApiError::from(e).into_response(),
    }
}
