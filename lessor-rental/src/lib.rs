pub mod service;

pub use service::{ConfirmOutcome, ConfirmTarget, Delivery, NewRental, RentalService};
