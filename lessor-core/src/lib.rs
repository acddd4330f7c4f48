pub mod error;
pub mod identity;
pub mod models;
pub mod repository;

pub use error::{DomainError, DomainResult, Outcome};
pub use identity::{CallerContext, Role};
pub use models::{
    BillingCycle, CycleStatus, DamageType, DepositTransaction, DepositTxnKind, Device, DeviceStatus, OrderPatch,
    OrderStatus, PaymentStatus, RecordStatus, RentalOrder, RentalRecord, ReturnCondition,
};
