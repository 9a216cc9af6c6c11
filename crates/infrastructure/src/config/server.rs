//! gRPC server configuration.

use serde::{Deserialize, Serialize};

/// Listener for the bundled server binary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Socket address to bind to
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Graceful shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

fn default_listen_addr() -> String {
    "127.0.0.1:50051".to_string()
}

const fn default_shutdown_timeout() -> u64 {
    10
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}
