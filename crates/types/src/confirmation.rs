use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Proof of deliberate intent: how long the confirmation input was held
/// against the minimum the gate required at the time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationMetrics {
    pub held_ms: u64,
    pub required_ms: u64,
}

impl ConfirmationMetrics {
    pub fn new(held: Duration, required: Duration) -> Self {
        Self {
            held_ms: saturating_millis(held),
            required_ms: saturating_millis(required),
        }
    }

    pub fn held(&self) -> Duration {
        Duration::from_millis(self.held_ms)
    }

    pub fn required(&self) -> Duration {
        Duration::from_millis(self.required_ms)
    }

    /// Whether the recorded hold meets the recorded minimum.
    pub fn is_sufficient(&self) -> bool {
        self.held_ms >= self.required_ms
    }

    /// Whether the recorded hold meets some other minimum.
    pub fn satisfies(&self, minimum: Duration) -> bool {
        self.held() >= minimum
    }
}

fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl std::fmt::Display for ConfirmationMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "held {}ms of {}ms", self.held_ms, self.required_ms)
    }
}
