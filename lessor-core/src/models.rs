use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Rental order lifecycle state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    PendingConfirmation,
    Active,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::PendingConfirmation => "pending_confirmation",
            OrderStatus::Active => "active",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending_confirmation" => Some(OrderStatus::PendingConfirmation),
            "active" => Some(OrderStatus::Active),
            "completed" => Some(OrderStatus::Completed),
            "cancelled" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }

    /// Terminal states are final; re-sending one is a no-op on the device.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    /// Legal forward edges out of this state. Consumers compare an observed
    /// transition against this set to detect drift.
    pub fn next_expected(&self) -> &'static [&'static str] {
        match self {
            OrderStatus::PendingConfirmation => &["active", "cancelled"],
            OrderStatus::Active => &["completed", "cancelled"],
            OrderStatus::Completed | OrderStatus::Cancelled => &[],
        }
    }
}

/// Deposit settlement state of an order. `Refunded` is a one-way latch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PaymentStatus::Pending),
            "refunded" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }
}

/// One customer lease of one device for a period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RentalOrder {
    pub id: Uuid,
    /// Owning supplier tenant.
    pub provider_id: Uuid,
    /// Leasing restaurant.
    pub restaurant_id: Uuid,
    pub device_id: Uuid,
    /// Orders booked together share a batch id and can be confirmed as a group.
    pub batch_id: Option<Uuid>,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub deposit_amount: i64,
    pub monthly_price: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub worker_id: Option<Uuid>,
    pub agreement_id: Option<String>,
    pub is_signed: bool,
    /// Externally hosted proof photo URLs; the engine never uploads.
    pub setup_photos: Vec<String>,
    pub customer_confirmed_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RentalOrder {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        provider_id: Uuid,
        restaurant_id: Uuid,
        device_id: Uuid,
        deposit_amount: i64,
        monthly_price: i64,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            provider_id,
            restaurant_id,
            device_id,
            batch_id: None,
            status: OrderStatus::PendingConfirmation,
            payment_status: PaymentStatus::Pending,
            deposit_amount,
            monthly_price,
            start_date,
            end_date,
            worker_id: None,
            agreement_id: None,
            is_signed: false,
            setup_photos: Vec::new(),
            customer_confirmed_at: None,
            delivered_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_batch(mut self, batch_id: Uuid) -> Self {
        self.batch_id = Some(batch_id);
        self
    }
}

/// Physical asset occupancy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    Available,
    InUse,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Available => "available",
            DeviceStatus::InUse => "in_use",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "available" => Some(DeviceStatus::Available),
            "in_use" => Some(DeviceStatus::InUse),
            _ => None,
        }
    }
}

/// One row per physical asset. The most contended record in the system:
/// every mutation is conditioned on `current_rental_order_id` so a writer
/// must still hold the claim it is releasing or occupying.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: Uuid,
    pub rental_status: DeviceStatus,
    pub current_rental_order_id: Option<Uuid>,
}

impl Device {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            rental_status: DeviceStatus::Available,
            current_rental_order_id: None,
        }
    }
}

/// Sub-outcome recorded against an order x device occupancy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Active,
    Returned,
    Damaged,
    Lost,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Active => "active",
            RecordStatus::Returned => "returned",
            RecordStatus::Damaged => "damaged",
            RecordStatus::Lost => "lost",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(RecordStatus::Active),
            "returned" => Some(RecordStatus::Returned),
            "damaged" => Some(RecordStatus::Damaged),
            "lost" => Some(RecordStatus::Lost),
            _ => None,
        }
    }
}

/// Condition reported at return time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReturnCondition {
    Good,
    NormalWear,
    Damaged,
    Lost,
}

impl ReturnCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReturnCondition::Good => "good",
            ReturnCondition::NormalWear => "normal_wear",
            ReturnCondition::Damaged => "damaged",
            ReturnCondition::Lost => "lost",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "good" => Some(ReturnCondition::Good),
            "normal_wear" => Some(ReturnCondition::NormalWear),
            "damaged" => Some(ReturnCondition::Damaged),
            "lost" => Some(ReturnCondition::Lost),
            _ => None,
        }
    }

    /// Record status implied by the reported condition.
    pub fn record_status(&self) -> RecordStatus {
        match self {
            ReturnCondition::Good | ReturnCondition::NormalWear => RecordStatus::Returned,
            ReturnCondition::Damaged => RecordStatus::Damaged,
            ReturnCondition::Lost => RecordStatus::Lost,
        }
    }
}

/// Lazily created on the first damage/return event for an order x device
/// pair; upserted by that key thereafter so two flows never race into
/// competing rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RentalRecord {
    pub id: Uuid,
    pub order_id: Uuid,
    pub device_id: Uuid,
    pub status: RecordStatus,
    pub return_condition: Option<ReturnCondition>,
    pub damage_fee: Option<i64>,
    pub actual_start: Option<NaiveDate>,
    pub actual_end: Option<NaiveDate>,
    pub updated_at: DateTime<Utc>,
}

impl RentalRecord {
    pub fn new(order_id: Uuid, device_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            device_id,
            status: RecordStatus::Active,
            return_condition: None,
            damage_fee: None,
            actual_start: None,
            actual_end: None,
            updated_at: Utc::now(),
        }
    }
}

/// Billing cycle settlement state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CycleStatus {
    Pending,
    Partial,
    Paid,
    Overdue,
    Disputed,
    Locked,
}

impl CycleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleStatus::Pending => "pending",
            CycleStatus::Partial => "partial",
            CycleStatus::Paid => "paid",
            CycleStatus::Overdue => "overdue",
            CycleStatus::Disputed => "disputed",
            CycleStatus::Locked => "locked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(CycleStatus::Pending),
            "partial" => Some(CycleStatus::Partial),
            "paid" => Some(CycleStatus::Paid),
            "overdue" => Some(CycleStatus::Overdue),
            "disputed" => Some(CycleStatus::Disputed),
            "locked" => Some(CycleStatus::Locked),
            _ => None,
        }
    }

    /// Whether a payment may still be applied. Paid cycles reject further
    /// money (monotonicity), locked/disputed cycles are frozen.
    pub fn accepts_payment(&self) -> bool {
        matches!(self, CycleStatus::Pending | CycleStatus::Partial | CycleStatus::Overdue)
    }

    /// Whether the overdue sweep may transition this cycle.
    pub fn sweepable(&self) -> bool {
        matches!(self, CycleStatus::Pending | CycleStatus::Partial)
    }
}

/// One period's amount owed against an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingCycle {
    pub id: Uuid,
    pub order_id: Uuid,
    /// Calendar month key, `"YYYY-MM"`. Unique per order.
    pub cycle_month: String,
    pub due_date: NaiveDate,
    pub amount_due: i64,
    pub amount_paid: i64,
    pub status: CycleStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub payment_method: Option<String>,
    pub payment_proof: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BillingCycle {
    pub fn new(order_id: Uuid, cycle_month: String, due_date: NaiveDate, amount_due: i64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            order_id,
            cycle_month,
            due_date,
            amount_due,
            amount_paid: 0,
            status: CycleStatus::Pending,
            paid_at: None,
            payment_method: None,
            payment_proof: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.amount_paid >= self.amount_due
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DepositTxnKind {
    Refunded,
}

impl DepositTxnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DepositTxnKind::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "refunded" => Some(DepositTxnKind::Refunded),
            _ => None,
        }
    }
}

/// Append-only money movement against an order's held deposit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositTransaction {
    pub id: Uuid,
    pub order_id: Uuid,
    pub kind: DepositTxnKind,
    pub amount: i64,
    pub reason: Option<String>,
    pub proof: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DepositTransaction {
    pub fn refund(order_id: Uuid, amount: i64, reason: Option<String>, proof: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            kind: DepositTxnKind::Refunded,
            amount,
            reason,
            proof,
            created_at: Utc::now(),
        }
    }
}

/// Severity tier used to estimate a damage fee when no explicit fee is given.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DamageType {
    Minor,
    Major,
    Total,
}

impl DamageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DamageType::Minor => "minor",
            DamageType::Major => "major",
            DamageType::Total => "total",
        }
    }
}

/// Partial-field mutation accepted by the generic update operation. Every
/// field is optional; absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderPatch {
    pub order_status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub is_signed: Option<bool>,
    pub setup_photos: Option<Vec<String>>,
    pub worker_id: Option<Uuid>,
    pub agreement_id: Option<String>,
}

impl OrderPatch {
    pub fn is_empty(&self) -> bool {
        self.order_status.is_none()
            && self.payment_status.is_none()
            && self.is_signed.is_none()
            && self.setup_photos.is_none()
            && self.worker_id.is_none()
            && self.agreement_id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_status_edges() {
        assert!(OrderStatus::Completed.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(!OrderStatus::Active.is_terminal());
        assert_eq!(OrderStatus::PendingConfirmation.next_expected(), &["active", "cancelled"]);
        assert!(OrderStatus::Completed.next_expected().is_empty());
    }

    #[test]
    fn test_return_condition_maps_to_record_status() {
        assert_eq!(ReturnCondition::Good.record_status(), RecordStatus::Returned);
        assert_eq!(ReturnCondition::NormalWear.record_status(), RecordStatus::Returned);
        assert_eq!(ReturnCondition::Damaged.record_status(), RecordStatus::Damaged);
        assert_eq!(ReturnCondition::Lost.record_status(), RecordStatus::Lost);
    }

    #[test]
    fn test_cycle_status_gates() {
        assert!(CycleStatus::Pending.accepts_payment());
        assert!(CycleStatus::Overdue.accepts_payment());
        assert!(!CycleStatus::Paid.accepts_payment());
        assert!(!CycleStatus::Locked.accepts_payment());
        assert!(CycleStatus::Partial.sweepable());
        assert!(!CycleStatus::Overdue.sweepable());
    }

    #[test]
    fn test_status_string_round_trips() {
        for s in [OrderStatus::PendingConfirmation, OrderStatus::Active, OrderStatus::Completed, OrderStatus::Cancelled] {
            assert_eq!(OrderStatus::parse(s.as_str()), Some(s));
        }
        for s in [
            CycleStatus::Pending,
            CycleStatus::Partial,
            CycleStatus::Paid,
            CycleStatus::Overdue,
            CycleStatus::Disputed,
            CycleStatus::Locked,
        ] {
            assert_eq!(CycleStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(OrderStatus::parse("archived"), None);
    }
}
