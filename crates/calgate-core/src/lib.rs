//! Shared ambient concerns: tracing setup and structured event logging

pub mod events;
pub mod tracing;

pub use events::{Event, EventLogger};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
