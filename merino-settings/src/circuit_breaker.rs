use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings for the circuit breaker guarding one integration point.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CircuitBreakerSettings {
    /// The number of consecutive failures that opens the circuit. At least 1.
    pub failure_threshold: u32,

    /// How long the circuit stays open before a trial call is let through, in
    /// seconds. Fractions are allowed.
    pub recovery_timeout_sec: f64,
}

impl CircuitBreakerSettings {
    /// The recovery timeout as a `Duration`.
    ///
    /// Only meaningful for validated settings. Invalid values collapse to zero.
    pub fn recovery_timeout(&self) -> Duration {
        if self.recovery_timeout_sec.is_finite() && self.recovery_timeout_sec >= 0.0 {
            Duration::from_secs_f64(self.recovery_timeout_sec)
        } else {
            Duration::ZERO
        }
    }

    /// Check that the threshold and timeout are usable.
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.failure_threshold < 1 {
            return Err("failure_threshold must be at least 1".to_string());
        }
        if !self.recovery_timeout_sec.is_finite() || self.recovery_timeout_sec < 0.0 {
            return Err(format!(
                "recovery_timeout_sec must be a non-negative number, got {}",
                self.recovery_timeout_sec
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::CircuitBreakerSettings;
    use std::time::Duration;

    #[test]
    fn fractional_recovery_timeouts() {
        let settings = CircuitBreakerSettings {
            failure_threshold: 1,
            recovery_timeout_sec: 0.25,
        };
        assert!(settings.validate().is_ok());
        assert_eq!(settings.recovery_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn negative_recovery_timeout_is_invalid() {
        let settings = CircuitBreakerSettings {
            failure_threshold: 5,
            recovery_timeout_sec: -1.0,
        };
        assert!(settings.validate().is_err());
        assert_eq!(settings.recovery_timeout(), Duration::ZERO);
    }
}
