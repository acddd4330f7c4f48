//! Pure read path joining the audit trail with current-state rows.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use lessor_core::error::{DomainError, DomainResult};
use lessor_core::identity::CallerContext;
use lessor_core::models::{OrderStatus, PaymentStatus};
use lessor_core::repository::{DeviceRepository, EventRepository, OrderRepository, RecordRepository};
use lessor_shared::events::{Event, EventType};

use crate::contracts::{AssetFact, OrderFact, OrderFactsBundle, TimelineEntry, TraceFact};

pub struct FactsService {
    orders: Arc<dyn OrderRepository>,
    devices: Arc<dyn DeviceRepository>,
    records: Arc<dyn RecordRepository>,
    events: Arc<dyn EventRepository>,
}

impl FactsService {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        devices: Arc<dyn DeviceRepository>,
        records: Arc<dyn RecordRepository>,
        events: Arc<dyn EventRepository>,
    ) -> Self {
        Self {
            orders,
            devices,
            records,
            events,
        }
    }

    /// Reconstruct what actually happened to an order, strictly from the
    /// audit trail plus current rows, and flag every contradiction between
    /// the two. Warnings are advisory; the read always succeeds.
    pub async fn order_facts(&self, ctx: &CallerContext, order_id: Uuid) -> DomainResult<OrderFactsBundle> {
        let order = self
            .orders
            .get(order_id)
            .await?
            .ok_or_else(|| DomainError::not_found("order", order_id))?;
        if !ctx.is_party_to(order.provider_id, order.restaurant_id) {
            return Err(DomainError::unauthorized("caller is not a party to this order"));
        }

        let events = self.events.list_by_order(order_id).await?;
        let records = self.records.list_by_order(order_id).await?;
        let device = self.devices.get(order.device_id).await?;

        let confirmed_at = first_occurrence(&events, EventType::OrderConfirmed);
        let started_at = first_occurrence(&events, EventType::RentalStarted);
        let ended_at = first_occurrence(&events, EventType::RentalEnded);
        let cancelled_at = first_occurrence(&events, EventType::OrderCancelled);
        let deposit_refunded_at = first_occurrence(&events, EventType::DepositRefunded);

        let mut warnings = Vec::new();

        // Occurrence timestamps predating the row's existence contradict the
        // trail.
        for (name, ts) in [
            ("order_confirmed", confirmed_at),
            ("rental_started", started_at),
            ("rental_ended", ended_at),
            ("order_cancelled", cancelled_at),
            ("deposit_refunded", deposit_refunded_at),
        ] {
            if ts.is_some_and(|t| t < order.created_at) {
                warnings.push(format!("event_before_record_creation:{name}"));
            }
        }

        for event in &events {
            if EventType::parse(&event.event_type).is_none() {
                warnings.push(format!("unknown_action_code:{}", event.event_type));
            }
        }
        for (name, ty) in [("rental_started", EventType::RentalStarted), ("rental_ended", EventType::RentalEnded)] {
            if events.iter().filter(|e| e.is_type(ty)).count() > 1 {
                warnings.push(format!("duplicate_event:{name}"));
            }
        }

        // Device registry cross-checks.
        if let Some(device) = &device {
            let held_by_order = device.current_rental_order_id == Some(order.id);
            if order.status.is_terminal() && held_by_order {
                warnings.push("terminal_order_still_holds_device".to_string());
            }
            if order.status == OrderStatus::Active && order.delivered_at.is_some() && !held_by_order {
                warnings.push("active_order_not_holding_device".to_string());
            }
        }

        // Deposit settlement vs. recorded history.
        if order.payment_status == PaymentStatus::Refunded && deposit_refunded_at.is_none() {
            warnings.push("refund_status_without_event".to_string());
        }
        if order.payment_status == PaymentStatus::Pending && deposit_refunded_at.is_some() {
            warnings.push("refund_event_without_status".to_string());
        }

        if !warnings.is_empty() {
            tracing::debug!(order_id = %order.id, warning_count = warnings.len(), "fact derivation found contradictions");
        }

        let timeline = TimelineEntry {
            previous_state: previous_lifecycle_state(&events),
            current_state: order.status.as_str().to_string(),
            next_expected: order.status.next_expected().iter().map(|s| s.to_string()).collect(),
        };

        let order_fact = OrderFact {
            order_id: order.id,
            provider_id: order.provider_id,
            restaurant_id: order.restaurant_id,
            status: order.status.as_str().to_string(),
            payment_status: order.payment_status.as_str().to_string(),
            created_at: order.created_at,
            confirmed_at,
            started_at,
            ended_at,
            cancelled_at,
            deposit_refunded_at,
            timeline,
        };

        // One asset fact per leased device. A device with no rental record
        // yet is still a fact: record_status stays None.
        let record = records.iter().find(|r| r.device_id == order.device_id);
        let assets = vec![AssetFact {
            device_id: order.device_id,
            record_status: record.map(|r| r.status.as_str().to_string()),
            return_condition: record.and_then(|r| r.return_condition).map(|c| c.as_str().to_string()),
            damage_fee: record.and_then(|r| r.damage_fee),
            damaged_at: first_occurrence(&events, EventType::EquipmentDamaged),
            return_checked_at: first_occurrence(&events, EventType::EquipmentReturnChecked),
            marked_lost_at: first_occurrence(&events, EventType::EquipmentMarkedUnreturned),
        }];

        let traces = events
            .iter()
            .map(|e| TraceFact {
                event_id: e.id,
                action: e.event_type.clone(),
                occurred_at: e.occurred_at,
                operator_id: e.operator_id,
                system_initiated: e.operator_id.is_none(),
                metadata: e.metadata.clone(),
            })
            .collect();

        Ok(OrderFactsBundle {
            order: order_fact,
            assets,
            traces,
            fact_warnings: warnings,
        })
    }
}

fn first_occurrence(events: &[Event], ty: EventType) -> Option<DateTime<Utc>> {
    events.iter().filter(|e| e.is_type(ty)).map(|e| e.occurred_at).min()
}

/// State implied before the most recent lifecycle event. The triple
/// (previous, current, next_expected) lets a consumer spot drift without
/// this layer passing judgement.
fn previous_lifecycle_state(events: &[Event]) -> Option<String> {
    let lifecycle_before = |e: &Event| -> Option<&'static str> {
        match EventType::parse(&e.event_type) {
            Some(EventType::OrderConfirmed) => Some(OrderStatus::PendingConfirmation.as_str()),
            Some(EventType::OrderCancelled) => Some(OrderStatus::PendingConfirmation.as_str()),
            Some(EventType::RentalEnded) => Some(OrderStatus::Active.as_str()),
            _ => None,
        }
    };
    events
        .iter()
        .filter_map(|e| lifecycle_before(e).map(|s| (e.occurred_at, s)))
        .max_by_key(|(ts, _)| *ts)
        .map(|(_, s)| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use lessor_core::identity::Role;
    use lessor_core::models::{Device, OrderPatch, RecordStatus, RentalOrder, RentalRecord};
    use lessor_store::MemoryStore;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn admin() -> CallerContext {
        CallerContext::new(Uuid::new_v4(), None, Role::SuperAdmin)
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        service: FactsService,
        order: RentalOrder,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let device = Device::new(Uuid::new_v4());
        DeviceRepository::insert(store.as_ref(), &device).await.unwrap();

        let order = RentalOrder::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            device.id,
            500,
            100,
            d(2025, 1, 1),
            d(2025, 3, 31),
        );
        OrderRepository::insert(store.as_ref(), &order).await.unwrap();

        let service = FactsService::new(store.clone(), store.clone(), store.clone(), store.clone());
        Fixture { store, service, order }
    }

    #[tokio::test]
    async fn test_timestamps_come_only_from_events() {
        let f = fixture().await;

        // The mutable row says active, but no order_confirmed event exists:
        // confirmed_at must be a missing fact, not a backfilled guess.
        OrderRepository::apply_patch(
            f.store.as_ref(),
            f.order.id,
            &OrderPatch {
                order_status: Some(OrderStatus::Active),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let bundle = f.service.order_facts(&admin(), f.order.id).await.unwrap();
        assert_eq!(bundle.order.status, "active");
        assert!(bundle.order.confirmed_at.is_none());
        assert!(bundle.order.started_at.is_none());
        assert!(bundle.order.timeline.previous_state.is_none());
        assert_eq!(bundle.order.timeline.next_expected, vec!["completed", "cancelled"]);
    }

    #[tokio::test]
    async fn test_lifecycle_events_populate_facts() {
        let f = fixture().await;
        let confirm = Event::system(f.order.id, EventType::OrderConfirmed, serde_json::json!({}));
        let start = Event::system(f.order.id, EventType::RentalStarted, serde_json::json!({}));
        EventRepository::append(f.store.as_ref(), &confirm).await.unwrap();
        EventRepository::append(f.store.as_ref(), &start).await.unwrap();
        OrderRepository::apply_patch(
            f.store.as_ref(),
            f.order.id,
            &OrderPatch {
                order_status: Some(OrderStatus::Active),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let bundle = f.service.order_facts(&admin(), f.order.id).await.unwrap();
        assert_eq!(bundle.order.confirmed_at, Some(confirm.occurred_at));
        assert_eq!(bundle.order.started_at, Some(start.occurred_at));
        assert_eq!(bundle.order.timeline.previous_state.as_deref(), Some("pending_confirmation"));
        assert_eq!(bundle.traces.len(), 2);
        assert!(bundle.fact_warnings.is_empty());
    }

    #[tokio::test]
    async fn test_event_before_record_creation_is_flagged() {
        let f = fixture().await;
        let mut ended = Event::system(f.order.id, EventType::RentalEnded, serde_json::json!({}));
        ended.occurred_at = f.order.created_at - Duration::days(3);
        EventRepository::append(f.store.as_ref(), &ended).await.unwrap();
        OrderRepository::apply_patch(
            f.store.as_ref(),
            f.order.id,
            &OrderPatch {
                order_status: Some(OrderStatus::Completed),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let bundle = f.service.order_facts(&admin(), f.order.id).await.unwrap();
        assert!(bundle.fact_warnings.contains(&"event_before_record_creation:rental_ended".to_string()));
    }

    #[tokio::test]
    async fn test_unknown_action_code_is_flagged_but_surfaced() {
        let f = fixture().await;
        let mut odd = Event::system(f.order.id, EventType::MonthlyPayment, serde_json::json!({}));
        odd.event_type = "legacy_migration_fixup".to_string();
        EventRepository::append(f.store.as_ref(), &odd).await.unwrap();

        let bundle = f.service.order_facts(&admin(), f.order.id).await.unwrap();
        assert!(bundle.fact_warnings.contains(&"unknown_action_code:legacy_migration_fixup".to_string()));
        // The trace itself is still returned raw.
        assert_eq!(bundle.traces[0].action, "legacy_migration_fixup");
    }

    #[tokio::test]
    async fn test_terminal_order_still_holding_device_is_flagged() {
        let f = fixture().await;
        DeviceRepository::assign_if_available(f.store.as_ref(), f.order.device_id, f.order.id).await.unwrap();
        OrderRepository::apply_patch(
            f.store.as_ref(),
            f.order.id,
            &OrderPatch {
                order_status: Some(OrderStatus::Completed),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let bundle = f.service.order_facts(&admin(), f.order.id).await.unwrap();
        assert!(bundle.fact_warnings.contains(&"terminal_order_still_holds_device".to_string()));
    }

    #[tokio::test]
    async fn test_refund_status_without_event_is_flagged() {
        let f = fixture().await;
        OrderRepository::mark_refunded_if_pending(f.store.as_ref(), f.order.id).await.unwrap();

        let bundle = f.service.order_facts(&admin(), f.order.id).await.unwrap();
        assert!(bundle.fact_warnings.contains(&"refund_status_without_event".to_string()));
        assert!(bundle.order.deposit_refunded_at.is_none());
    }

    #[tokio::test]
    async fn test_asset_fact_without_record_is_explicit_null() {
        let f = fixture().await;
        let bundle = f.service.order_facts(&admin(), f.order.id).await.unwrap();
        assert_eq!(bundle.assets.len(), 1);
        assert_eq!(bundle.assets[0].device_id, f.order.device_id);
        assert!(bundle.assets[0].record_status.is_none());
        assert!(bundle.assets[0].damaged_at.is_none());
    }

    #[tokio::test]
    async fn test_asset_fact_reflects_record_and_events() {
        let f = fixture().await;
        let mut record = RentalRecord::new(f.order.id, f.order.device_id);
        record.status = RecordStatus::Damaged;
        record.damage_fee = Some(50);
        RecordRepository::upsert(f.store.as_ref(), &record).await.unwrap();
        let damaged = Event::system(f.order.id, EventType::EquipmentDamaged, serde_json::json!({}));
        EventRepository::append(f.store.as_ref(), &damaged).await.unwrap();

        let bundle = f.service.order_facts(&admin(), f.order.id).await.unwrap();
        assert_eq!(bundle.assets[0].record_status.as_deref(), Some("damaged"));
        assert_eq!(bundle.assets[0].damage_fee, Some(50));
        assert_eq!(bundle.assets[0].damaged_at, Some(damaged.occurred_at));
    }

    #[tokio::test]
    async fn test_foreign_tenant_cannot_read_facts() {
        let f = fixture().await;
        let outsider = CallerContext::new(Uuid::new_v4(), Some(Uuid::new_v4()), Role::Provider);
        let err = f.service.order_facts(&outsider, f.order.id).await.unwrap_err();
        assert_eq!(err.code(), "unauthorized");
    }
}
