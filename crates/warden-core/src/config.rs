//! Orchestrator configuration.

use std::time::Duration;

/// Default name of the control thread.
pub const DEFAULT_THREAD_NAME: &str = "warden-orchestrator";

/// Orchestrator configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Fail a startup whose engine has not signalled readiness in time.
    /// `None` waits forever.
    pub handshake_timeout: Option<Duration>,
    /// Name of the control thread.
    pub thread_name: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: None,
            thread_name: DEFAULT_THREAD_NAME.to_string(),
        }
    }
}

impl OrchestratorConfig {
    /// Create config from environment variables.
    ///
    /// Environment variables:
    /// - WARDEN_HANDSHAKE_TIMEOUT_MS: Handshake timeout in ms (0 = wait forever)
    /// - WARDEN_THREAD_NAME: Control thread name
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            handshake_timeout: lookup("WARDEN_HANDSHAKE_TIMEOUT_MS")
                .and_then(|value| value.parse().ok())
                .map_or(defaults.handshake_timeout, timeout_from_millis),
            thread_name: lookup("WARDEN_THREAD_NAME")
                .filter(|name| !name.is_empty())
                .unwrap_or(defaults.thread_name),
        }
    }

    /// Set the handshake timeout (builder style).
    pub fn with_handshake_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.handshake_timeout = timeout;
        self
    }
}

/// Interpret a millisecond count where 0 means "no timeout".
pub fn timeout_from_millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.handshake_timeout, None);
        assert_eq!(config.thread_name, "warden-orchestrator");
    }

    #[test]
    fn test_from_lookup() {
        let vars = HashMap::from([
            ("WARDEN_HANDSHAKE_TIMEOUT_MS", "250"),
            ("WARDEN_THREAD_NAME", "spawner"),
        ]);
        let config = OrchestratorConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(config.handshake_timeout, Some(Duration::from_millis(250)));
        assert_eq!(config.thread_name, "spawner");
    }

    #[test]
    fn test_zero_and_garbage_mean_default() {
        let config = OrchestratorConfig::from_lookup(|key| match key {
            "WARDEN_HANDSHAKE_TIMEOUT_MS" => Some("0".to_string()),
            _ => None,
        });
        assert_eq!(config.handshake_timeout, None);

        let config = OrchestratorConfig::from_lookup(|key| match key {
            "WARDEN_HANDSHAKE_TIMEOUT_MS" => Some("soon".to_string()),
            "WARDEN_THREAD_NAME" => Some(String::new()),
            _ => None,
        });
        assert_eq!(config, OrchestratorConfig::default());
    }
}
