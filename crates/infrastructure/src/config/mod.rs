//! Application configuration
//!
//! Split into focused sub-modules:
//! - `server`: listener for the bundled server
//! - `interceptor`: reply timeout and controller buffering
//! - `telemetry`: log filter and format
//! - `faults`: preloaded per-method fault queues

mod faults;
mod interceptor;
mod server;
mod telemetry;

use std::collections::HashMap;
use std::path::Path;

use application::{ApplicationError, Fault, FaultInterceptor};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub use faults::{FaultSpec, MethodFaults, PayloadSpec, StatusCodeSpec};
pub use interceptor::InterceptorSettings;
pub use server::ServerSettings;
pub use telemetry::{LogFormat, TelemetrySettings};

/// Base name of the optional configuration file (`faultline.toml`)
pub const CONFIG_FILE: &str = "faultline";

/// Prefix for environment overrides, e.g. `FAULTLINE__INTERCEPTOR__REPLY_TIMEOUT_MS`
pub const ENV_PREFIX: &str = "FAULTLINE";

/// Errors raised while loading or interpreting configuration
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("Failed to load configuration: {0}")]
    Source(#[from] config::ConfigError),

    #[error("Fault table entry has an empty method name")]
    EmptyMethod,

    #[error("Unknown status code: {0}")]
    UnknownCode(String),

    #[error("Invalid fault payload for {method}: {reason}")]
    InvalidPayload { method: String, reason: String },

    #[error(transparent)]
    Interceptor(#[from] ApplicationError),
}

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub interceptor: InterceptorSettings,

    #[serde(default)]
    pub telemetry: TelemetrySettings,

    /// Faults served before any controller is consulted
    #[serde(default)]
    pub faults: Vec<MethodFaults>,
}

impl AppConfig {
    /// Load configuration from environment and optional `faultline.toml`
    pub fn load() -> Result<Self, ConfigLoadError> {
        Self::build(config::File::with_name(CONFIG_FILE).required(false))
    }

    /// Load configuration from an explicit file plus environment overrides
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigLoadError> {
        Self::build(config::File::from(path.as_ref()).required(true))
    }

    fn build<S>(file: S) -> Result<Self, ConfigLoadError>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let config = config::Config::builder()
            .add_source(file)
            // Override with environment variables (e.g., FAULTLINE__SERVER__LISTEN_ADDR)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Convert the fault table into per-method queues
    ///
    /// Entries naming the same method are concatenated in file order.
    pub fn preloaded_faults(&self) -> Result<HashMap<String, Vec<Fault>>, ConfigLoadError> {
        let mut table: HashMap<String, Vec<Fault>> = HashMap::new();
        for entry in &self.faults {
            let method = entry.method.as_str();
            if method.is_empty() {
                return Err(ConfigLoadError::EmptyMethod);
            }
            let queue = entry
                .queue
                .iter()
                .map(|spec| spec.to_fault(method))
                .collect::<Result<Vec<_>, _>>()?;
            debug!(method, count = queue.len(), "Loaded preloaded faults");
            table.entry(method.to_string()).or_default().extend(queue);
        }
        Ok(table)
    }

    /// Build an interceptor from these settings, with its fault queues loaded
    pub fn build_interceptor(&self) -> Result<FaultInterceptor, ConfigLoadError> {
        let faults = self.preloaded_faults()?;
        Ok(FaultInterceptor::with_preloaded(
            self.interceptor.to_interceptor_config(),
            faults,
        )?)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tonic::Code;

    use super::*;

    const SAMPLE: &str = r#"
[server]
listen_addr = "0.0.0.0:6000"

[interceptor]
reply_timeout_ms = 250

[telemetry]
log_format = "json"

[[faults]]
method = "/gnoi.system.System/Reboot"

  [[faults.queue]]
  code = "PERMISSION_DENIED"
  message = "First failure"

  [[faults.queue]]
  code = 8
  message = "Second failure"

[[faults]]
method = "/gnoi.system.System/Time"

  [[faults.queue]]
  code = "unavailable"
"#;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults_without_sections() {
        let config = AppConfig::default();
        assert_eq!(config.server.listen_addr, "127.0.0.1:50051");
        assert_eq!(config.interceptor.reply_timeout_ms, 1000);
        assert_eq!(config.telemetry.log_format, LogFormat::Text);
        assert!(config.faults.is_empty());
    }

    #[test]
    fn loads_sample_file() {
        let file = write_config(SAMPLE);
        let config = AppConfig::load_from(file.path()).unwrap();

        assert_eq!(config.server.listen_addr, "0.0.0.0:6000");
        assert_eq!(config.interceptor.reply_timeout_ms, 250);
        assert_eq!(config.interceptor.subscription_buffer, 64);
        assert_eq!(config.telemetry.log_format, LogFormat::Json);
        assert_eq!(config.telemetry.log_filter, "info");
        assert_eq!(config.faults.len(), 2);
    }

    #[test]
    fn preloaded_faults_keep_order() {
        let file = write_config(SAMPLE);
        let config = AppConfig::load_from(file.path()).unwrap();
        let table = config.preloaded_faults().unwrap();

        let reboot = &table["/gnoi.system.System/Reboot"];
        assert_eq!(reboot.len(), 2);
        assert_eq!(reboot[0].status().code(), Code::PermissionDenied);
        assert_eq!(reboot[0].status().message(), "First failure");
        assert_eq!(reboot[1].status().code(), Code::ResourceExhausted);

        let time = &table["/gnoi.system.System/Time"];
        assert_eq!(time[0].status().code(), Code::Unavailable);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(matches!(
            AppConfig::load_from("/nonexistent/faultline.toml"),
            Err(ConfigLoadError::Source(_))
        ));
    }

    #[test]
    fn empty_method_is_rejected() {
        let config = AppConfig {
            faults: vec![MethodFaults {
                method: String::new(),
                queue: vec![FaultSpec::default()],
            }],
            ..AppConfig::default()
        };
        assert!(matches!(
            config.preloaded_faults(),
            Err(ConfigLoadError::EmptyMethod)
        ));
    }

    #[test]
    fn method_names_are_kept_as_written() {
        let config = AppConfig {
            faults: vec![MethodFaults {
                method: " /a.B/C".to_string(),
                queue: vec![FaultSpec::default()],
            }],
            ..AppConfig::default()
        };
        let table = config.preloaded_faults().unwrap();
        assert!(table.contains_key(" /a.B/C"));
        assert!(!table.contains_key("/a.B/C"));
    }

    #[test]
    fn duplicate_methods_are_concatenated() {
        let entry = |message: &str| MethodFaults {
            method: "/a.B/C".to_string(),
            queue: vec![FaultSpec {
                code: StatusCodeSpec::Name("ABORTED".to_string()),
                message: message.to_string(),
                payload: None,
            }],
        };
        let config = AppConfig {
            faults: vec![entry("one"), entry("two")],
            ..AppConfig::default()
        };
        let table = config.preloaded_faults().unwrap();
        let messages: Vec<_> = table["/a.B/C"].iter().map(|f| f.status().message()).collect();
        assert_eq!(messages, vec!["one", "two"]);
    }

    #[test]
    fn builds_interceptor_with_queues() {
        let file = write_config(SAMPLE);
        let config = AppConfig::load_from(file.path()).unwrap();
        let interceptor = config.build_interceptor().unwrap();

        assert_eq!(interceptor.queued_faults("/gnoi.system.System/Reboot"), 2);
        assert_eq!(
            interceptor.config().reply_timeout,
            std::time::Duration::from_millis(250)
        );
    }
}
