//! Normalization helpers shared by every feature

/// Map `value` from `[min, max]` onto `[0, 1]`
///
/// A degenerate range (`max <= min`) yields the neutral 0.5, and NaN inputs
/// yield 0, so the result is always a finite value in `[0, 1]`.
pub fn normalize(value: f64, min: f64, max: f64) -> f64 {
    if max.is_nan() || min.is_nan() || max <= min {
        return 0.5;
    }
    let scaled = (value - min) / (max - min);
    if scaled.is_nan() {
        0.0
    } else {
        scaled.clamp(0.0, 1.0)
    }
}

/// Ratio of `count` to `denominator`, 0 when there is nothing to compare
pub fn ratio(count: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        normalize(count as f64, 0.0, denominator as f64)
    }
}

/// Count against a fixed cap, 0 when the cap is unset
pub fn capped(count: u64, cap: u32) -> f64 {
    if cap == 0 {
        0.0
    } else {
        normalize(count as f64, 0.0, f64::from(cap))
    }
}

/// Decreasing map from a non-negative distance onto `(0, 1]`
pub fn inverse_log(distance: f64) -> f64 {
    if distance.is_nan() {
        return 0.0;
    }
    1.0 / (1.0 + (1.0 + distance.max(0.0)).ln())
}
