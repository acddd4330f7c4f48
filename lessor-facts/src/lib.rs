pub mod contracts;
pub mod service;

pub use contracts::{AssetFact, OrderFact, OrderFactsBundle, TimelineEntry, TraceFact};
pub use service::FactsService;
