pub mod error;
pub mod events;
pub mod progress;
pub mod service;
pub mod validation;

pub use error::ServiceError;
pub use events::{create_event_channel, Event, EventReceiver, EventSender};
pub use progress::{ProgressSnapshot, ProgressTracker};
pub use service::ScanService;
pub use validation::{validate, ConfigField, UnsupportedConfiguration};
