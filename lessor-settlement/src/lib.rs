pub mod fees;
pub mod service;

pub use fees::estimate_damage_fee;
pub use service::{DamageReport, EscalationAction, NonReturnEscalation, RefundRequest, ReturnCheck, SettlementService};
