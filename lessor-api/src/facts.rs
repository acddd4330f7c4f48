use uuid::Uuid;

use lessor_core::identity::CallerContext;
use lessor_facts::OrderFactsBundle;
use lessor_shared::ApiResponse;

use crate::error::ApiError;
use crate::state::AppState;

/// GET facts/orders/{id} - governance read: `{order, assets, traces,
/// fact_warnings}` derived strictly from the audit trail plus current rows.
pub async fn get_order_facts(state: &AppState, ctx: &CallerContext, order_id: Uuid) -> ApiResponse<OrderFactsBundle> {
    match state.facts.order_facts(ctx, order_id).await {
        Ok(bundle) => ApiResponse::ok(bundle),
        Err(e) => ApiError::from(e).into_response(),
    }
}
