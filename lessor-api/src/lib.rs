pub mod billing;
pub mod cron;
pub mod error;
pub mod facts;
pub mod rentals;
pub mod settlement;
pub mod state;

pub use error::ApiError;
pub use state::{AppState, Repositories};
