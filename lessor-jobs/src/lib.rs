pub mod sweeps;

pub use sweeps::{NonReturnSweep, OverdueBillingSweep, SweepItem, SweepOptions, SweepReport};
