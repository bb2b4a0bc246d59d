//! Per-server circuit breaker arithmetic.
//!
//! This is a local host-skip heuristic, not a global breaker: a server whose
//! successive connection failures reach the threshold is skipped for a
//! blackout window that doubles with every further failure.
//!
//! ```text
//! failures < threshold        → no blackout
//! diff = min(failures - threshold, 16)
//! blackout = min((1 << diff) * factor, max)
//! ```

use std::time::Duration;

use crate::config::CircuitBreakerConfig;

/// Largest shift applied to the blackout factor.
pub const MAX_BLACKOUT_SHIFT: u32 = 16;

/// Blackout window for a server with `failures` successive connection failures.
pub fn blackout_duration(failures: u32, config: &CircuitBreakerConfig) -> Duration {
    let threshold = config.connection_failure_threshold;
    if failures < threshold {
        return Duration::ZERO;
    }

    let diff = (failures - threshold).min(MAX_BLACKOUT_SHIFT);
    let secs = (1u64 << diff)
        .saturating_mul(config.circuit_trip_timeout_factor_secs)
        .min(config.circuit_trip_max_timeout_secs);

    Duration::from_secs(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(failures: u32) -> u64 {
        blackout_duration(failures, &CircuitBreakerConfig::default()).as_secs()
    }

    #[test]
    fn test_blackout_below_threshold() {
        assert_eq!(secs(0), 0);
        assert_eq!(secs(2), 0);
    }

    #[test]
    fn test_blackout_doubles_then_caps() {
        assert_eq!(secs(3), 10);
        assert_eq!(secs(4), 20);
        assert_eq!(secs(5), 30);
        assert_eq!(secs(20), 30);
        assert_eq!(secs(u32::MAX), 30);
    }

    #[test]
    fn test_shift_clamp_prevents_overflow() {
        let config = CircuitBreakerConfig {
            connection_failure_threshold: 1,
            circuit_trip_timeout_factor_secs: 1,
            circuit_trip_max_timeout_secs: u64::MAX,
            ..CircuitBreakerConfig::default()
        };
        assert_eq!(blackout_duration(17, &config).as_secs(), 1 << 16);
        assert_eq!(blackout_duration(1000, &config).as_secs(), 1 << 16);
    }
}
