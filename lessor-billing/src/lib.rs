pub mod engine;

pub use engine::{select_overdue, BillingEngine, BillingStats, MonthlyPayment};
