//! Dynamic per-`(logical_model, provider)` weight clamping math.
//!
//! Kept as a standalone module (rather than inlined into
//! [`super::state::RoutingStateService`]) because it is pure and
//! property-testable independent of Redis.

/// Lower bound on the clamp relative to `base_weight`.
pub const MIN_FACTOR: f64 = 0.2;
/// Upper bound on the clamp relative to `base_weight`.
pub const MAX_FACTOR: f64 = 3.0;
/// Absolute floor regardless of how small `base_weight` is.
pub const ABSOLUTE_MIN: f64 = 0.01;
/// Fraction of `base_weight` added to the running weight on success.
pub const SUCCESS_FACTOR: f64 = 0.05;
/// Fraction of `base_weight` subtracted on a retryable failure.
pub const RETRYABLE_FAILURE_FACTOR: f64 = -0.2;
/// Fraction of `base_weight` subtracted on a fatal (non-retryable) failure.
pub const FATAL_FAILURE_FACTOR: f64 = -0.5;

/// Clamps `value` into `[max(base*MIN_FACTOR, ABSOLUTE_MIN), max(base*MAX_FACTOR, lower)]`.
///
/// A non-positive `base_weight` is treated as `ABSOLUTE_MIN` so a
/// misconfigured zero weight still yields a usable, bounded range instead of
/// collapsing the window to a single point at zero.
pub fn clamp_weight(value: f64, base_weight: f64) -> f64 {
    let safe_base = if base_weight > 0.0 {
        base_weight
    } else {
        ABSOLUTE_MIN
    };
    let lower = (safe_base * MIN_FACTOR).max(ABSOLUTE_MIN);
    let upper = (safe_base * MAX_FACTOR).max(lower);
    value.clamp(lower, upper)
}

pub fn success_delta(base_weight: f64) -> f64 {
    (base_weight * SUCCESS_FACTOR).max(ABSOLUTE_MIN)
}

pub fn failure_delta(base_weight: f64, retryable: bool) -> f64 {
    let factor = if retryable {
        RETRYABLE_FAILURE_FACTOR
    } else {
        FATAL_FAILURE_FACTOR
    };
    base_weight * factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_respects_bounds() {
        assert_eq!(clamp_weight(100.0, 1.0), 3.0);
        assert_eq!(clamp_weight(-100.0, 1.0), 0.2);
        assert_eq!(clamp_weight(0.5, 1.0), 0.5);
    }

    #[test]
    fn clamp_handles_tiny_base() {
        // base*0.2 underflows below ABSOLUTE_MIN, so the floor wins.
        assert_eq!(clamp_weight(-1.0, 0.01), ABSOLUTE_MIN);
    }

    #[test]
    fn success_then_failure_stays_in_bounds() {
        let base = 1.0;
        let mut w = base;
        for _ in 0..1000 {
            w = clamp_weight(w + success_delta(base), base);
        }
        assert!(w <= base * MAX_FACTOR);
        for _ in 0..1000 {
            w = clamp_weight(w + failure_delta(base, true), base);
        }
        assert!(w >= (base * MIN_FACTOR).max(ABSOLUTE_MIN));
    }
}
