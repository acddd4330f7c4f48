//! Settlement flows: deposit refund, damage assessment, return check, and
//! non-return escalation. Each flow validates its preconditions against
//! current state, performs the primary mutation, then appends audit events
//! best-effort.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use lessor_core::error::{DomainError, DomainResult, Outcome};
use lessor_core::identity::CallerContext;
use lessor_core::models::{DamageType, DepositTransaction, OrderStatus, RecordStatus, RentalRecord, ReturnCondition};
use lessor_core::repository::{
    append_best_effort, DepositRepository, EventRepository, OrderRepository, RecordRepository,
};
use lessor_shared::events::{Event, EventType, NotificationIntent};

use crate::fees::estimate_damage_fee;

#[derive(Debug, Clone, Deserialize)]
pub struct RefundRequest {
    pub order_id: Uuid,
    /// Defaults to the order's full deposit when absent.
    pub refund_amount: Option<i64>,
    pub refund_reason: Option<String>,
    pub proof: Option<String>,
    /// System-triggered refund on terminal transition; rejects manual callers.
    pub auto_trigger: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DamageReport {
    pub order_id: Uuid,
    pub device_id: Uuid,
    pub damage_type: DamageType,
    /// Explicit fee wins over the tiered estimate.
    pub damage_fee: Option<i64>,
    pub description: Option<String>,
    pub proof_photos: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReturnCheck {
    pub order_id: Uuid,
    pub return_condition: ReturnCondition,
    /// Absent = carry forward a fee recorded by an earlier damage report.
    pub damage_fee: Option<i64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EscalationAction {
    SendReminder,
    MarkLost,
    LegalAction,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NonReturnEscalation {
    pub order_id: Uuid,
    pub action: EscalationAction,
    pub message: Option<String>,
}

pub struct SettlementService {
    orders: Arc<dyn OrderRepository>,
    records: Arc<dyn RecordRepository>,
    deposits: Arc<dyn DepositRepository>,
    events: Arc<dyn EventRepository>,
}

impl SettlementService {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        records: Arc<dyn RecordRepository>,
        deposits: Arc<dyn DepositRepository>,
        events: Arc<dyn EventRepository>,
    ) -> Self {
        Self {
            orders,
            records,
            deposits,
            events,
        }
    }

    /// Refund the held deposit. At most once per order: the refund latch on
    /// the order row is a conditional update, so a concurrent or repeated
    /// call finds it already flipped and is rejected with no second
    /// transaction.
    pub async fn refund_deposit(&self, ctx: &CallerContext, request: RefundRequest) -> DomainResult<Outcome<DepositTransaction>> {
        let order = self
            .orders
            .get(request.order_id)
            .await?
            .ok_or_else(|| DomainError::not_found("order", request.order_id))?;

        if request.auto_trigger {
            if !ctx.is_unscoped() {
                return Err(DomainError::unauthorized("auto-triggered refunds are system-initiated only"));
            }
        } else if !ctx.can_access_tenant(order.provider_id) {
            return Err(DomainError::unauthorized("caller's tenant does not own this order"));
        }

        if !order.status.is_terminal() {
            return Err(DomainError::precondition("order_not_terminal"));
        }

        let amount = request.refund_amount.unwrap_or(order.deposit_amount);
        if amount <= 0 {
            return Err(DomainError::precondition("invalid_refund_amount"));
        }
        if amount > order.deposit_amount {
            return Err(DomainError::precondition("refund_exceeds_deposit"));
        }

        if !self.orders.mark_refunded_if_pending(order.id).await? {
            return Err(DomainError::precondition("deposit_already_refunded"));
        }

        let txn = DepositTransaction::refund(order.id, amount, request.refund_reason.clone(), request.proof.clone());
        self.deposits.insert(&txn).await?;

        let mut warnings = Vec::new();
        append_best_effort(
            self.events.as_ref(),
            Event::new(
                order.id,
                EventType::DepositRefunded,
                ctx.operator_id(),
                serde_json::json!({
                    "amount": amount,
                    "reason": request.refund_reason,
                    "auto_trigger": request.auto_trigger,
                }),
            ),
            &mut warnings,
        )
        .await;

        tracing::info!(order_id = %order.id, amount, "deposit refunded");
        Ok(Outcome::with_warnings(txn, warnings))
    }

    /// Record damage against the order's device. Upserts the rental record
    /// by (order, device); the fee falls back to the tiered estimate.
    pub async fn report_damage(&self, ctx: &CallerContext, report: DamageReport) -> DomainResult<Outcome<RentalRecord>> {
        let order = self
            .orders
            .get(report.order_id)
            .await?
            .ok_or_else(|| DomainError::not_found("order", report.order_id))?;
        if !ctx.can_access_tenant(order.provider_id) {
            return Err(DomainError::unauthorized("caller's tenant does not own this order"));
        }

        if !matches!(order.status, OrderStatus::Active | OrderStatus::Completed) {
            return Err(DomainError::precondition("order_not_active_or_completed"));
        }
        if report.device_id != order.device_id {
            return Err(DomainError::precondition("device_mismatch"));
        }

        let fee = match report.damage_fee {
            Some(fee) if fee >= 0 => fee,
            Some(_) => return Err(DomainError::precondition("invalid_damage_fee")),
            None => estimate_damage_fee(report.damage_type, order.deposit_amount),
        };

        let mut record = self
            .records
            .get_by_order_device(order.id, order.device_id)
            .await?
            .unwrap_or_else(|| RentalRecord::new(order.id, order.device_id));
        record.status = RecordStatus::Damaged;
        record.damage_fee = Some(fee);
        self.records.upsert(&record).await?;

        let mut warnings = Vec::new();
        append_best_effort(
            self.events.as_ref(),
            Event::new(
                order.id,
                EventType::EquipmentDamaged,
                ctx.operator_id(),
                serde_json::json!({
                    "device_id": order.device_id,
                    "damage_type": report.damage_type.as_str(),
                    "damage_fee": fee,
                    "description": report.description,
                    "proof_photo_count": report.proof_photos.len(),
                }),
            ),
            &mut warnings,
        )
        .await;

        Ok(Outcome::with_warnings(record, warnings))
    }

    /// Inspect a returned device. The reported condition drives the record
    /// status; a damage fee recorded earlier is carried forward when this
    /// call supplies none.
    pub async fn check_return(&self, ctx: &CallerContext, check: ReturnCheck) -> DomainResult<Outcome<RentalRecord>> {
        let order = self
            .orders
            .get(check.order_id)
            .await?
            .ok_or_else(|| DomainError::not_found("order", check.order_id))?;
        if !ctx.can_access_tenant(order.provider_id) {
            return Err(DomainError::unauthorized("caller's tenant does not own this order"));
        }
        if order.status != OrderStatus::Active {
            return Err(DomainError::precondition("order_not_active"));
        }

        let mut record = self
            .records
            .get_by_order_device(order.id, order.device_id)
            .await?
            .unwrap_or_else(|| RentalRecord::new(order.id, order.device_id));

        let carried_fee = check.damage_fee.or(record.damage_fee);
        record.status = check.return_condition.record_status();
        record.return_condition = Some(check.return_condition);
        record.damage_fee = carried_fee;
        record.actual_end = Some(Utc::now().date_naive());
        self.records.upsert(&record).await?;

        let mut warnings = Vec::new();
        append_best_effort(
            self.events.as_ref(),
            Event::new(
                order.id,
                EventType::EquipmentReturnChecked,
                ctx.operator_id(),
                serde_json::json!({
                    "device_id": order.device_id,
                    "return_condition": check.return_condition.as_str(),
                    "damage_fee": carried_fee,
                    "notes": check.notes,
                }),
            ),
            &mut warnings,
        )
        .await;

        Ok(Outcome::with_warnings(record, warnings))
    }

    /// Escalate an unreturned device. Only `mark_lost` mutates state; the
    /// other actions exist purely to leave an auditable trace.
    pub async fn escalate_non_return(
        &self,
        ctx: &CallerContext,
        escalation: NonReturnEscalation,
    ) -> DomainResult<Outcome<Option<RentalRecord>>> {
        let order = self
            .orders
            .get(escalation.order_id)
            .await?
            .ok_or_else(|| DomainError::not_found("order", escalation.order_id))?;
        if !ctx.can_access_tenant(order.provider_id) {
            return Err(DomainError::unauthorized("caller's tenant does not own this order"));
        }
        if order.status != OrderStatus::Active {
            return Err(DomainError::precondition("order_not_active"));
        }

        let mut warnings = Vec::new();
        let record = match escalation.action {
            EscalationAction::MarkLost => {
                let mut record = self
                    .records
                    .get_by_order_device(order.id, order.device_id)
                    .await?
                    .unwrap_or_else(|| RentalRecord::new(order.id, order.device_id));
                record.status = RecordStatus::Lost;
                self.records.upsert(&record).await?;

                append_best_effort(
                    self.events.as_ref(),
                    Event::new(
                        order.id,
                        EventType::EquipmentMarkedUnreturned,
                        ctx.operator_id(),
                        serde_json::json!({
                            "device_id": order.device_id,
                            "message": escalation.message,
                        }),
                    ),
                    &mut warnings,
                )
                .await;
                Some(record)
            }
            EscalationAction::SendReminder => {
                let rendered = escalation.message.clone().unwrap_or_else(|| {
                    format!(
                        "Equipment for rental order {} is past its return date. Please arrange return or contact your supplier.",
                        order.id
                    )
                });
                let intent = NotificationIntent {
                    channel: "sms".to_string(),
                    recipient_hint: order.restaurant_id.to_string(),
                    rendered_message: rendered,
                };
                append_best_effort(
                    self.events.as_ref(),
                    Event::new(
                        order.id,
                        EventType::CollectionNotificationSent,
                        ctx.operator_id(),
                        intent.into_metadata(),
                    ),
                    &mut warnings,
                )
                .await;
                None
            }
            EscalationAction::LegalAction => {
                append_best_effort(
                    self.events.as_ref(),
                    Event::new(
                        order.id,
                        EventType::LegalActionRecorded,
                        ctx.operator_id(),
                        serde_json::json!({ "message": escalation.message }),
                    ),
                    &mut warnings,
                )
                .await;
                None
            }
        };

        Ok(Outcome::with_warnings(record, warnings))
    }
}
