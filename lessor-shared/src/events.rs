use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Vocabulary of domain occurrences recorded on the audit trail.
///
/// The trail is the sole source of truth for "when did X happen"; derived
/// fact views refuse to backfill these timestamps from mutable rows.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    OrderConfirmed,
    OrderCancelled,
    RentalStarted,
    RentalEnded,
    MonthlyPayment,
    DepositRefunded,
    EquipmentDamaged,
    EquipmentReturnChecked,
    EquipmentMarkedUnreturned,
    CollectionNotificationSent,
    LegalActionRecorded,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::OrderConfirmed => "order_confirmed",
            EventType::OrderCancelled => "order_cancelled",
            EventType::RentalStarted => "rental_started",
            EventType::RentalEnded => "rental_ended",
            EventType::MonthlyPayment => "monthly_payment",
            EventType::DepositRefunded => "deposit_refunded",
            EventType::EquipmentDamaged => "equipment_damaged",
            EventType::EquipmentReturnChecked => "equipment_return_checked",
            EventType::EquipmentMarkedUnreturned => "equipment_marked_unreturned",
            EventType::CollectionNotificationSent => "collection_notification_sent",
            EventType::LegalActionRecorded => "legal_action_recorded",
        }
    }

    /// Parse a stored action code. Returns None for codes outside the
    /// declared vocabulary; the facts layer reports those as warnings
    /// instead of failing the read.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "order_confirmed" => Some(EventType::OrderConfirmed),
            "order_cancelled" => Some(EventType::OrderCancelled),
            "rental_started" => Some(EventType::RentalStarted),
            "rental_ended" => Some(EventType::RentalEnded),
            "monthly_payment" => Some(EventType::MonthlyPayment),
            "deposit_refunded" => Some(EventType::DepositRefunded),
            "equipment_damaged" => Some(EventType::EquipmentDamaged),
            "equipment_return_checked" => Some(EventType::EquipmentReturnChecked),
            "equipment_marked_unreturned" => Some(EventType::EquipmentMarkedUnreturned),
            "collection_notification_sent" => Some(EventType::CollectionNotificationSent),
            "legal_action_recorded" => Some(EventType::LegalActionRecorded),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One append-only audit trail entry.
///
/// `event_type` is stored as the raw action code so that entries written by
/// older deployments survive vocabulary changes; `EventType::parse` decides
/// whether a code is currently known.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub order_id: Uuid,
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    /// None = system-initiated (scheduled job, auto trigger).
    pub operator_id: Option<Uuid>,
    pub metadata: Value,
}

impl Event {
    pub fn new(order_id: Uuid, event_type: EventType, operator_id: Option<Uuid>, metadata: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            event_type: event_type.as_str().to_string(),
            occurred_at: Utc::now(),
            operator_id,
            metadata,
        }
    }

    /// System-initiated entry (no operator attached).
    pub fn system(order_id: Uuid, event_type: EventType, metadata: Value) -> Self {
        Self::new(order_id, event_type, None, metadata)
    }

    pub fn is_type(&self, event_type: EventType) -> bool {
        self.event_type == event_type.as_str()
    }
}

/// Recorded intent to notify an external party. Delivery is someone else's
/// job; the engine only guarantees the intent landed on the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationIntent {
    pub channel: String,
    pub recipient_hint: String,
    pub rendered_message: String,
}

impl NotificationIntent {
    pub fn into_metadata(self) -> Value {
        serde_json::json!({
            "channel": self.channel,
            "recipient_hint": self.recipient_hint,
            "rendered_message": self.rendered_message,
        })
    }
}
