//! Billing cycle engine: payment application and overdue selection.
//!
//! Cycle status only moves forward. A cycle that reached `paid` never
//! returns to an unpaid state, and the overdue transition set is computed by
//! a pure function shared by the dry-run preview and the committing sweep so
//! the two cannot drift.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use lessor_core::error::{DomainError, DomainResult, Outcome};
use lessor_core::identity::CallerContext;
use lessor_core::models::{BillingCycle, CycleStatus};
use lessor_core::repository::{append_best_effort, BillingRepository, EventRepository, OrderRepository};
use lessor_shared::events::{Event, EventType};
use lessor_shared::util::parse_month_key;

/// Payment reported against one cycle of an order.
#[derive(Debug, Clone, Deserialize)]
pub struct MonthlyPayment {
    pub order_id: Uuid,
    /// `"YYYY-MM"` cycle key.
    pub payment_month: String,
    pub payment_amount: i64,
    pub payment_method: String,
    pub payment_proof: Option<String>,
}

/// Per-tenant aggregation over a due-date window. Pure read.
#[derive(Debug, Clone, Serialize)]
pub struct BillingStats {
    pub provider_id: Uuid,
    pub cycle_count: u32,
    pub paid_count: u32,
    pub overdue_count: u32,
    pub open_count: u32,
    pub amount_due_total: i64,
    pub amount_paid_total: i64,
    /// amount_paid_total / amount_due_total, 0.0 when nothing was due.
    pub collection_rate: f64,
}

/// The overdue transition set: unpaid cycles whose due date has passed,
/// oldest first, capped at `batch_size`. Both the dry-run preview and the
/// committing sweep run exactly this.
pub fn select_overdue(cycles: &[BillingCycle], today: NaiveDate, batch_size: usize) -> Vec<Uuid> {
    let mut candidates: Vec<&BillingCycle> =
        cycles.iter().filter(|c| c.status.sweepable() && c.due_date < today).collect();
    candidates.sort_by_key(|c| c.due_date);
    candidates.into_iter().take(batch_size).map(|c| c.id).collect()
}

pub struct BillingEngine {
    orders: Arc<dyn OrderRepository>,
    billing: Arc<dyn BillingRepository>,
    events: Arc<dyn EventRepository>,
}

impl BillingEngine {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        billing: Arc<dyn BillingRepository>,
        events: Arc<dyn EventRepository>,
    ) -> Self {
        Self { orders, billing, events }
    }

    /// Apply a payment to the matching cycle.
    ///
    /// A missing cycle is a tolerated anomaly, not an error: legacy orders
    /// may predate cycle generation. The money fact is still recorded on the
    /// audit trail with `matched_cycle: false` and the caller gets a warning.
    /// The event append itself is best-effort either way; a failed append
    /// never rolls back an applied payment.
    pub async fn apply_payment(&self, ctx: &CallerContext, payment: MonthlyPayment) -> DomainResult<Outcome<Option<BillingCycle>>> {
        let order = self
            .orders
            .get(payment.order_id)
            .await?
            .ok_or_else(|| DomainError::not_found("order", payment.order_id))?;
        if !ctx.is_party_to(order.provider_id, order.restaurant_id) {
            return Err(DomainError::unauthorized("caller is not a party to this order"));
        }

        if payment.payment_amount <= 0 {
            return Err(DomainError::precondition("non_positive_payment_amount"));
        }
        if parse_month_key(&payment.payment_month).is_none() {
            return Err(DomainError::precondition("invalid_payment_month"));
        }

        let mut warnings = Vec::new();
        let cycle = self.billing.get_cycle(payment.order_id, &payment.payment_month).await?;

        let Some(mut cycle) = cycle else {
            tracing::warn!(
                order_id = %payment.order_id,
                payment_month = %payment.payment_month,
                "payment applied but no matching billing cycle found"
            );
            warnings.push(format!("billing_cycle_not_found:{}", payment.payment_month));
            append_best_effort(
                self.events.as_ref(),
                Event::new(
                    payment.order_id,
                    EventType::MonthlyPayment,
                    ctx.operator_id(),
                    serde_json::json!({
                        "matched_cycle": false,
                        "payment_month": payment.payment_month,
                        "amount": payment.payment_amount,
                        "method": payment.payment_method,
                    }),
                ),
                &mut warnings,
            )
            .await;
            return Ok(Outcome::with_warnings(None, warnings));
        };

        if !cycle.status.accepts_payment() {
            return Err(DomainError::precondition("cycle_not_payable"));
        }

        cycle.amount_paid += payment.payment_amount;
        cycle.status = if cycle.is_settled() { CycleStatus::Paid } else { CycleStatus::Partial };
        if cycle.status == CycleStatus::Paid {
            cycle.paid_at = Some(Utc::now());
        }
        cycle.payment_method = Some(payment.payment_method.clone());
        if payment.payment_proof.is_some() {
            cycle.payment_proof = payment.payment_proof.clone();
        }

        self.billing.update_cycle(&cycle).await?;

        append_best_effort(
            self.events.as_ref(),
            Event::new(
                payment.order_id,
                EventType::MonthlyPayment,
                ctx.operator_id(),
                serde_json::json!({
                    "matched_cycle": true,
                    "payment_month": payment.payment_month,
                    "amount": payment.payment_amount,
                    "method": payment.payment_method,
                    "cycle_status": cycle.status.as_str(),
                }),
            ),
            &mut warnings,
        )
        .await;

        Ok(Outcome::with_warnings(Some(cycle), warnings))
    }

    /// Aggregate one provider's cycles across a due-date window.
    pub async fn stats(&self, ctx: &CallerContext, provider_id: Uuid, from: NaiveDate, to: NaiveDate) -> DomainResult<BillingStats> {
        if !ctx.can_access_tenant(provider_id) {
            return Err(DomainError::unauthorized("caller may not read this provider's billing"));
        }

        let cycles = self.billing.list_for_provider(provider_id, from, to).await?;
        let mut stats = BillingStats {
            provider_id,
            cycle_count: cycles.len() as u32,
            paid_count: 0,
            overdue_count: 0,
            open_count: 0,
            amount_due_total: 0,
            amount_paid_total: 0,
            collection_rate: 0.0,
        };
        for cycle in &cycles {
            stats.amount_due_total += cycle.amount_due;
            stats.amount_paid_total += cycle.amount_paid;
            match cycle.status {
                CycleStatus::Paid => stats.paid_count += 1,
                CycleStatus::Overdue => stats.overdue_count += 1,
                _ => stats.open_count += 1,
            }
        }
        if stats.amount_due_total > 0 {
            stats.collection_rate = stats.amount_paid_total as f64 / stats.amount_due_total as f64;
        }
        Ok(stats)
    }
}
