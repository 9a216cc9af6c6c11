//! Infrastructure layer - configuration and telemetry
//!
//! Loads the interceptor's settings and preloaded faults from file and
//! environment, and installs the tracing subscriber.

pub mod config;
pub mod telemetry;

pub use config::{
    AppConfig, ConfigLoadError, FaultSpec, InterceptorSettings, LogFormat, MethodFaults,
    PayloadSpec, ServerSettings, StatusCodeSpec, TelemetrySettings,
};
pub use telemetry::{TelemetryError, init_tracing};
