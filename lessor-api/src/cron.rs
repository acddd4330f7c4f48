use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use lessor_core::identity::CallerContext;
use lessor_jobs::{SweepOptions, SweepReport};
use lessor_shared::ApiResponse;

use crate::error::ApiError;
use crate::state::AppState;

/// Sweep controls; absent fields fall back to the configured job defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CronSweepRequest {
    pub dry_run: Option<bool>,
    pub auto_mark: Option<bool>,
    pub min_overdue_days: Option<i64>,
    pub batch_size: Option<usize>,
    pub provider_id: Option<Uuid>,
}

impl CronSweepRequest {
    fn options(&self, state: &AppState) -> Result<SweepOptions, ApiError> {
        if self.batch_size == Some(0) {
            return Err(ApiError::validation("batch_size must be positive"));
        }
        let defaults = &state.job_defaults;
        Ok(SweepOptions {
            dry_run: self.dry_run.unwrap_or(defaults.dry_run),
            batch_size: self.batch_size.unwrap_or(defaults.batch_size),
            min_overdue_days: self.min_overdue_days.unwrap_or(defaults.min_overdue_days),
            auto_mark: self.auto_mark.unwrap_or(defaults.auto_mark_lost),
            provider_id: self.provider_id,
        })
    }
}

/// POST cron/check-overdue-billing
pub async fn check_overdue_billing(state: &AppState, ctx: &CallerContext, req: CronSweepRequest) -> ApiResponse<SweepReport> {
    let opts = match req.options(state) {
        Ok(opts) => opts,
        Err(e) => return e.into_response(),
    };
    match state.billing_sweep.run(ctx, Utc::now().date_naive(), &opts).await {
        Ok(report) => ApiResponse::ok(report),
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// GET cron/check-overdue-billing - dry-run convenience.
pub async fn check_overdue_billing_preview(state: &AppState, ctx: &CallerContext) -> ApiResponse<SweepReport> {
    let req = CronSweepRequest {
        dry_run: Some(true),
        ..Default::default()
    };
    check_overdue_billing(state, ctx, req).await
}

/// POST cron/check-overdue-rentals
pub async fn check_overdue_rentals(state: &AppState, ctx: &CallerContext, req: CronSweepRequest) -> ApiResponse<SweepReport> {
    let opts = match req.options(state) {
        Ok(opts) => opts,
        Err(e) => return e.into_response(),
    };
    match state.non_return_sweep.run(ctx, Utc::now().date_naive(), &opts).await {
        Ok(report) => ApiResponse::ok(report),
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// GET cron/check-overdue-rentals - dry-run convenience.
pub async fn check_overdue_rentals_preview(state: &AppState, ctx: &CallerContext) -> ApiResponse<SweepReport> {
    let req = CronSweepRequest {
        dry_run: Some(true),
        ..Default::default()
    };
    check_overdue_rentals(state, ctx, req).await
}
