pub mod config;
pub mod error;
pub mod event_bus;
pub mod types;

pub use config::{AppConfig, TrackingConfig};
pub use error::{TrackingError, TrackingResult};
pub use types::{DestinationId, EventKind, IdentityData, TrackedEvent};
