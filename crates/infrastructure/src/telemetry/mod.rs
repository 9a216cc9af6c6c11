//! Telemetry infrastructure
//!
//! Installs the global tracing subscriber used by the interceptor and the
//! bundled server.

mod subscriber;

pub use subscriber::{TelemetryError, init_tracing};
