//! Scheduled reconciliation sweeps.
//!
//! Both sweeps are idempotent and safe to re-run: the transition set is
//! computed by a pure selection shared with the dry-run preview, and every
//! commit is a conditional write whose predicate excludes rows already
//! transitioned. A failure mid-batch leaves the applied rows applied; the
//! report says how far the sweep got.

use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use lessor_billing::select_overdue;
use lessor_core::error::{DomainError, DomainResult};
use lessor_core::identity::CallerContext;
use lessor_core::models::{RecordStatus, RentalRecord};
use lessor_core::repository::{
    append_best_effort, BillingRepository, EventRepository, OrderRepository, RecordRepository,
};
use lessor_shared::events::{Event, EventType, NotificationIntent};

/// Blast-radius controls for a sweep run.
#[derive(Debug, Clone, Copy)]
pub struct SweepOptions {
    pub dry_run: bool,
    pub batch_size: usize,
    /// Non-return sweep: only orders at least this many days past end_date.
    pub min_overdue_days: i64,
    /// Non-return sweep: transition matched rental records to `lost`.
    pub auto_mark: bool,
    /// Interactive tenant filter; ignored (forced) for scoped callers.
    pub provider_id: Option<Uuid>,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            batch_size: 500,
            min_overdue_days: 0,
            auto_mark: false,
            provider_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepItem {
    pub order_id: Uuid,
    /// Billing sweep: the cycle id. Non-return sweep: the device id.
    pub subject_id: Uuid,
    pub note: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub job: &'static str,
    pub dry_run: bool,
    pub scanned: usize,
    pub matched: usize,
    /// Rows actually transitioned (0 on dry runs).
    pub applied: u64,
    pub preview: Vec<SweepItem>,
    pub failures: Vec<String>,
    pub warnings: Vec<String>,
}

impl SweepReport {
    fn new(job: &'static str, dry_run: bool) -> Self {
        Self {
            job,
            dry_run,
            scanned: 0,
            matched: 0,
            applied: 0,
            preview: Vec::new(),
            failures: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

/// Scheduler context sweeps the whole fleet; interactive callers are pinned
/// to their own tenant regardless of the filter they asked for.
fn effective_scope(ctx: &CallerContext, requested: Option<Uuid>) -> DomainResult<Option<Uuid>> {
    if ctx.is_unscoped() {
        return Ok(requested);
    }
    match ctx.tenant_id {
        Some(own) => {
            if requested.is_some_and(|r| r != own) {
                Err(DomainError::unauthorized("caller may not sweep another tenant"))
            } else {
                Ok(Some(own))
            }
        }
        None => Err(DomainError::unauthorized("caller has no tenant scope")),
    }
}

/// Billing overdue sweep: unpaid cycles past their due date become `overdue`.
pub struct OverdueBillingSweep {
    billing: Arc<dyn BillingRepository>,
    events: Arc<dyn EventRepository>,
}

impl OverdueBillingSweep {
    pub fn new(billing: Arc<dyn BillingRepository>, events: Arc<dyn EventRepository>) -> Self {
        Self { billing, events }
    }

    pub async fn run(&self, ctx: &CallerContext, today: NaiveDate, opts: &SweepOptions) -> DomainResult<SweepReport> {
        let scope = effective_scope(ctx, opts.provider_id)?;
        let mut report = SweepReport::new("check-overdue-billing", opts.dry_run);

        let candidates = self.billing.list_unpaid_due_before(today, scope, opts.batch_size).await?;
        report.scanned = candidates.len();

        let selected = select_overdue(&candidates, today, opts.batch_size);
        report.matched = selected.len();
        for cycle in candidates.iter().filter(|c| selected.contains(&c.id)) {
            report.preview.push(SweepItem {
                order_id: cycle.order_id,
                subject_id: cycle.id,
                note: format!("{} outstanding {} due {}", cycle.cycle_month, cycle.amount_due - cycle.amount_paid, cycle.due_date),
            });
        }

        if opts.dry_run || selected.is_empty() {
            return Ok(report);
        }

        report.applied = self.billing.mark_overdue(&selected).await?;
        tracing::info!(matched = report.matched, applied = report.applied, "billing overdue sweep committed");

        // Collection notification intents, one per transitioned cycle.
        for cycle in candidates.iter().filter(|c| selected.contains(&c.id)) {
            let intent = NotificationIntent {
                channel: "sms".to_string(),
                recipient_hint: cycle.order_id.to_string(),
                rendered_message: format!(
                    "Billing cycle {} is overdue: {} outstanding. Please settle the amount due.",
                    cycle.cycle_month,
                    cycle.amount_due - cycle.amount_paid
                ),
            };
            append_best_effort(
                self.events.as_ref(),
                Event::system(cycle.order_id, EventType::CollectionNotificationSent, intent.into_metadata()),
                &mut report.warnings,
            )
            .await;
        }

        Ok(report)
    }
}

/// Device non-return sweep: active orders past their end date. With
/// `auto_mark` the rental record is transitioned to `lost`; otherwise the
/// sweep only reports.
pub struct NonReturnSweep {
    orders: Arc<dyn OrderRepository>,
    records: Arc<dyn RecordRepository>,
    events: Arc<dyn EventRepository>,
}

impl NonReturnSweep {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        records: Arc<dyn RecordRepository>,
        events: Arc<dyn EventRepository>,
    ) -> Self {
        Self { orders, records, events }
    }

    pub async fn run(&self, ctx: &CallerContext, today: NaiveDate, opts: &SweepOptions) -> DomainResult<SweepReport> {
        let scope = effective_scope(ctx, opts.provider_id)?;
        let mut report = SweepReport::new("check-overdue-rentals", opts.dry_run);

        let candidates = self.orders.list_active_ended_before(today, scope).await?;
        report.scanned = candidates.len();

        // Intended transition set: past the threshold and not already marked
        // lost. Shared by preview and commit so the two cannot drift.
        let mut matched = Vec::new();
        for order in candidates {
            let overdue_days = (today - order.end_date).num_days();
            if overdue_days < opts.min_overdue_days {
                continue;
            }
            let record = self.records.get_by_order_device(order.id, order.device_id).await?;
            if record.as_ref().is_some_and(|r| r.status == RecordStatus::Lost) {
                continue;
            }
            matched.push((order, record, overdue_days));
            if matched.len() >= opts.batch_size {
                break;
            }
        }
        report.matched = matched.len();
        for (order, _, overdue_days) in &matched {
            report.preview.push(SweepItem {
                order_id: order.id,
                subject_id: order.device_id,
                note: format!("unreturned, {overdue_days} days past end date"),
            });
        }

        if opts.dry_run || !opts.auto_mark {
            return Ok(report);
        }

        for (order, record, overdue_days) in matched {
            let mut record = record.unwrap_or_else(|| RentalRecord::new(order.id, order.device_id));
            record.status = RecordStatus::Lost;

            // Row-level isolation: one bad row must not stop the batch.
            if let Err(e) = self.records.upsert(&record).await {
                tracing::error!(order_id = %order.id, error = %e, "non-return sweep failed to mark record lost");
                report.failures.push(format!("{}: {e}", order.id));
                continue;
            }
            report.applied += 1;

            append_best_effort(
                self.events.as_ref(),
                Event::system(
                    order.id,
                    EventType::EquipmentMarkedUnreturned,
                    serde_json::json!({
                        "device_id": order.device_id,
                        "overdue_days": overdue_days,
                        "source": "scheduled_sweep",
                    }),
                ),
                &mut report.warnings,
            )
            .await;
        }

        tracing::info!(matched = report.matched, applied = report.applied, "non-return sweep committed");
        Ok(report)
    }
}
