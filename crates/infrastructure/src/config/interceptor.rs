//! Interceptor tuning.

use std::time::Duration;

use application::{DEFAULT_SUBSCRIPTION_BUFFER, InterceptorConfig};
use serde::{Deserialize, Serialize};

/// Interceptor settings as they appear in the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterceptorSettings {
    /// How long a message waits for its controller reply (default: 1000ms)
    #[serde(default = "default_reply_timeout_ms")]
    pub reply_timeout_ms: u64,

    /// Interceptions buffered per controller before callers wait (default: 64)
    #[serde(default = "default_subscription_buffer")]
    pub subscription_buffer: usize,
}

const fn default_reply_timeout_ms() -> u64 {
    1000
}

const fn default_subscription_buffer() -> usize {
    DEFAULT_SUBSCRIPTION_BUFFER
}

impl Default for InterceptorSettings {
    fn default() -> Self {
        Self {
            reply_timeout_ms: default_reply_timeout_ms(),
            subscription_buffer: default_subscription_buffer(),
        }
    }
}

impl InterceptorSettings {
    #[must_use]
    pub fn to_interceptor_config(&self) -> InterceptorConfig {
        InterceptorConfig::default()
            .with_reply_timeout(Duration::from_millis(self.reply_timeout_ms))
            .with_subscription_buffer(self.subscription_buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_interceptor_defaults() {
        let config = InterceptorSettings::default().to_interceptor_config();
        assert_eq!(config.reply_timeout, application::DEFAULT_REPLY_TIMEOUT);
        assert_eq!(config.subscription_buffer, DEFAULT_SUBSCRIPTION_BUFFER);
    }

    #[test]
    fn converts_milliseconds() {
        let settings = InterceptorSettings {
            reply_timeout_ms: 250,
            subscription_buffer: 8,
        };
        let config = settings.to_interceptor_config();
        assert_eq!(config.reply_timeout, Duration::from_millis(250));
        assert_eq!(config.subscription_buffer, 8);
    }
}
