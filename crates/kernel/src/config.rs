use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration for a Ghostgate session.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    pub gate: GateConfig,
    pub dispatch: DispatchConfig,
}

/// Intent Gate timing and visibility.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Minimum continuous hold before a confirm action is honored (default: 400)
    pub min_hold_ms: u64,
    /// Suggestions below this confidence stay hidden (default: 0.0).
    /// Affects visibility only, never authority.
    pub min_confidence_to_show: f64,
    /// Transitions kept per gate in its journal (default: 256)
    pub journal_capacity: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            min_hold_ms: 400,
            min_confidence_to_show: 0.0,
            journal_capacity: 256,
        }
    }
}

impl GateConfig {
    pub fn min_hold(&self) -> Duration {
        Duration::from_millis(self.min_hold_ms)
    }
}

/// Authorization Dispatcher limits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Hold an intent must have achieved to be dispatched (default: 400)
    pub required_hold_ms: u64,
    /// Per-call bridge timeout; `None` waits indefinitely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bridge_timeout_ms: Option<u64>,
    /// How long a confirmation stays dispatchable (default: 30000).
    /// `None` never lapses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation_ttl_ms: Option<u64>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            required_hold_ms: 400,
            bridge_timeout_ms: None,
            confirmation_ttl_ms: Some(30_000),
        }
    }
}

impl DispatchConfig {
    pub fn required_hold(&self) -> Duration {
        Duration::from_millis(self.required_hold_ms)
    }

    pub fn bridge_timeout(&self) -> Option<Duration> {
        self.bridge_timeout_ms.map(Duration::from_millis)
    }

    pub fn confirmation_ttl(&self) -> Option<Duration> {
        self.confirmation_ttl_ms.map(Duration::from_millis)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("min_confidence_to_show must be within [0.0, 1.0], got {0}")]
    ConfidenceThreshold(f64),

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("journal_capacity must be greater than zero")]
    ZeroJournal,
}

impl KernelConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.gate.min_confidence_to_show;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::ConfidenceThreshold(threshold));
        }
        if self.gate.min_hold_ms == 0 {
            return Err(ConfigError::ZeroDuration("gate.min_hold_ms"));
        }
        if self.dispatch.required_hold_ms == 0 {
            return Err(ConfigError::ZeroDuration("dispatch.required_hold_ms"));
        }
        if self.dispatch.bridge_timeout_ms == Some(0) {
            return Err(ConfigError::ZeroDuration("dispatch.bridge_timeout_ms"));
        }
        if self.dispatch.confirmation_ttl_ms == Some(0) {
            return Err(ConfigError::ZeroDuration("dispatch.confirmation_ttl_ms"));
        }
        if self.gate.journal_capacity == 0 {
            return Err(ConfigError::ZeroJournal);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = KernelConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.gate.min_hold(), Duration::from_millis(400));
        assert_eq!(config.dispatch.bridge_timeout(), None);
        assert_eq!(
            config.dispatch.confirmation_ttl(),
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn rejects_bad_threshold_and_zero_hold() {
        let mut config = KernelConfig::default();
        config.gate.min_confidence_to_show = 1.2;
        assert_eq!(
            config.validate(),
            Err(ConfigError::ConfidenceThreshold(1.2))
        );

        let mut config = KernelConfig::default();
        config.dispatch.required_hold_ms = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroDuration("dispatch.required_hold_ms"))
        ));

        let mut config = KernelConfig::default();
        config.dispatch.confirmation_ttl_ms = Some(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroDuration("dispatch.confirmation_ttl_ms"))
        ));
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: KernelConfig =
            serde_json::from_str(r#"{"gate": {"min_hold_ms": 600}}"#).unwrap();
        assert_eq!(config.gate.min_hold_ms, 600);
        assert_eq!(config.gate.journal_capacity, 256);
        assert_eq!(config.dispatch.required_hold_ms, 400);
    }
}
