// src/lib.rs
pub mod cli;
pub mod config;
pub mod forwarder;
mod handler;
pub mod native;
pub mod record;
pub mod registry;
pub mod resolver;
pub mod stats;

// Re-export tracing for use in other modules
pub use tracing;

// Re-export for tests
pub use handler::{handle_invoke, parse_timestamp, pick_target, InvokeError, RESPONSE_PREFIX};
pub use native::{build_router, AppState};
pub use record::ServiceRecord;
pub use resolver::{Lookup, NotFound, RegisterError, ServiceResolver};
