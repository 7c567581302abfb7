// =============================================================================
// Step quantization for prices and quantities
// =============================================================================

/// Floor `value` to an exact multiple of `step`.
///
/// Works through the step's reciprocal rounded to the nearest integer, which
/// keeps `0.1`-style steps exact where dividing by the step directly would
/// not. The result is never greater than `value`. A non-positive or
/// non-finite step returns `value` unchanged.
pub fn round_to_step(value: f64, step: f64) -> f64 {
    if step <= 0.0 || !step.is_finite() {
        return value;
    }
    let inverse = (1.0 / step).round();
    if inverse < 1.0 {
        // Steps above 2.0 have a reciprocal that rounds to zero; fall back to
        // a plain floored multiple.
        return (value / step).floor() * step;
    }
    (value * inverse).floor() / inverse
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floors_to_tick() {
        assert_eq!(round_to_step(100.567, 0.01), 100.56);
        assert_eq!(round_to_step(100.999, 0.1), 100.9);
        assert_eq!(round_to_step(0.123_456, 0.001), 0.123);
    }

    #[test]
    fn never_rounds_up() {
        for value in [0.019_999, 100.567, 7.0 - 1e-9] {
            for step in [0.001, 0.01, 0.5, 1.0] {
                assert!(round_to_step(value, step) <= value);
            }
        }
    }

    #[test]
    fn exact_multiple_is_unchanged() {
        assert_eq!(round_to_step(100.56, 0.01), 100.56);
        assert_eq!(round_to_step(3.0, 1.0), 3.0);
        assert_eq!(round_to_step(0.005, 0.005), 0.005);
    }

    #[test]
    fn below_one_step_floors_to_zero() {
        assert_eq!(round_to_step(0.0001, 0.001), 0.0);
        assert_eq!(round_to_step(0.9, 1.0), 0.0);
    }

    #[test]
    fn result_is_step_multiple() {
        let rounded = round_to_step(19.377, 0.05);
        let ratio = rounded / 0.05;
        assert!((ratio - ratio.round()).abs() < 1e-9);
    }

    #[test]
    fn degenerate_step_passes_value_through() {
        assert_eq!(round_to_step(42.5, 0.0), 42.5);
        assert_eq!(round_to_step(42.5, -1.0), 42.5);
        assert_eq!(round_to_step(42.5, f64::NAN), 42.5);
    }

    #[test]
    fn large_step_falls_back_to_plain_floor() {
        assert_eq!(round_to_step(7.9, 2.5), 7.5);
    }
}
