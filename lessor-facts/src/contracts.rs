//! Fact contracts: derived, provenance-tagged views of an order's history.
//!
//! Every field has exactly one allowed data source, stated on the field.
//! "When did X happen" timestamps come exclusively from the audit trail; a
//! missing sourcing event yields `None`, meaning "this fact does not exist",
//! which is deliberately distinct from any default on the mutable row. No
//! field is ever backfilled from a generic last-modified column.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// Where an order has been, where it is, and where it may legally go next.
/// Consumers detect drift by comparing an observed edge against
/// `next_expected`; the derivation layer itself labels nothing an error.
#[derive(Debug, Clone, Serialize)]
pub struct TimelineEntry {
    /// State implied before the latest lifecycle event on the audit trail;
    /// None when no lifecycle event has been recorded.
    pub previous_state: Option<String>,
    /// Source: the mutable order row.
    pub current_state: String,
    /// Legal forward edges out of `current_state`.
    pub next_expected: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderFact {
    /// Source: order row.
    pub order_id: Uuid,
    pub provider_id: Uuid,
    pub restaurant_id: Uuid,
    pub status: String,
    pub payment_status: String,
    /// Source: order row creation timestamp ("row exists since"); this is
    /// not an occurrence timestamp and never substitutes for one.
    pub created_at: DateTime<Utc>,
    /// Source: `order_confirmed` event only.
    pub confirmed_at: Option<DateTime<Utc>>,
    /// Source: `rental_started` event only.
    pub started_at: Option<DateTime<Utc>>,
    /// Source: `rental_ended` event only.
    pub ended_at: Option<DateTime<Utc>>,
    /// Source: `order_cancelled` event only.
    pub cancelled_at: Option<DateTime<Utc>>,
    /// Source: `deposit_refunded` event only.
    pub deposit_refunded_at: Option<DateTime<Utc>>,
    pub timeline: TimelineEntry,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssetFact {
    /// Source: order row (the leased device).
    pub device_id: Uuid,
    /// Source: rental record row. None = no record row exists yet, which is
    /// a real fact (nothing has happened to this occupancy).
    pub record_status: Option<String>,
    pub return_condition: Option<String>,
    pub damage_fee: Option<i64>,
    /// Source: `equipment_damaged` event only.
    pub damaged_at: Option<DateTime<Utc>>,
    /// Source: `equipment_return_checked` event only.
    pub return_checked_at: Option<DateTime<Utc>>,
    /// Source: `equipment_marked_unreturned` event only.
    pub marked_lost_at: Option<DateTime<Utc>>,
}

/// One audit trail entry, surfaced raw. `action` is the stored code even
/// when it is outside the current vocabulary; that mismatch is reported via
/// fact_warnings, not hidden.
#[derive(Debug, Clone, Serialize)]
pub struct TraceFact {
    pub event_id: Uuid,
    pub action: String,
    pub occurred_at: DateTime<Utc>,
    pub operator_id: Option<Uuid>,
    pub system_initiated: bool,
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderFactsBundle {
    pub order: OrderFact,
    pub assets: Vec<AssetFact>,
    pub traces: Vec<TraceFact>,
    /// Advisory contradictions between current state and recorded history.
    /// Never blocks the read.
    pub fact_warnings: Vec<String>,
}
