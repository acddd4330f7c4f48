pub mod envelope;
pub mod events;
pub mod util;

pub use envelope::ApiResponse;
pub use events::{Event, EventType};
