//! Decay curves
//!
//! All curves are monotonically non-increasing in elapsed time, never push a
//! score below the floor, and never use the floor to raise a score that is
//! already beneath it. `elapsed == 0` always returns the input unchanged.

use crate::config::DecayMode;
use crate::error::{Result, RetentionError};

/// Apply a decay curve to `importance` after `elapsed` time units
pub fn decay(
    mode: DecayMode,
    importance: f32,
    rate: f32,
    elapsed: f64,
    floor: f32,
    step_size: f64,
) -> Result<f32> {
    if !elapsed.is_finite() || elapsed < 0.0 {
        return Err(RetentionError::Validation(format!(
            "elapsed time must be a non-negative number, got {}",
            elapsed
        )));
    }
    if !rate.is_finite() || rate < 0.0 {
        return Err(RetentionError::Validation(format!(
            "decay rate must be a non-negative number, got {}",
            rate
        )));
    }
    if !importance.is_finite() {
        return Err(RetentionError::Validation(format!(
            "importance must be finite, got {}",
            importance
        )));
    }
    if mode == DecayMode::Step && !(step_size.is_finite() && step_size > 0.0) {
        return Err(RetentionError::Validation(format!(
            "step size must be positive, got {}",
            step_size
        )));
    }

    if elapsed == 0.0 || mode == DecayMode::None {
        return Ok(importance);
    }

    let x = importance as f64;
    let r = rate as f64;
    let decayed = match mode {
        DecayMode::Linear => x - r * elapsed,
        DecayMode::Exponential => x * (-r * elapsed).exp(),
        DecayMode::Logarithmic => x * (1.0 - (1.0 + r * elapsed).ln()).max(0.0),
        DecayMode::Step => x - r * (elapsed / step_size).floor(),
        DecayMode::None => x,
    };

    Ok((decayed as f32).max(floor).min(importance))
}

/// Multiply a score by `factor`, respecting the floor
pub fn scale(importance: f32, factor: f32, floor: f32) -> Result<f32> {
    if !factor.is_finite() || !(0.0..=1.0).contains(&factor) {
        return Err(RetentionError::Validation(format!(
            "decay factor must be in [0.0, 1.0], got {}",
            factor
        )));
    }
    Ok((importance * factor).max(floor).min(importance))
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLOOR: f32 = 0.1;

    #[test]
    fn test_exponential() {
        let v = decay(DecayMode::Exponential, 0.8, 0.1, 10.0, FLOOR, 1.0).unwrap();
        assert!((v - 0.2943).abs() < 1e-3);
    }

    #[test]
    fn test_linear_zero_elapsed_is_noop() {
        let v = decay(DecayMode::Linear, 0.42, 0.5, 0.0, FLOOR, 1.0).unwrap();
        assert_eq!(v, 0.42);
    }

    #[test]
    fn test_linear_hits_floor() {
        let v = decay(DecayMode::Linear, 0.5, 0.1, 100.0, FLOOR, 1.0).unwrap();
        assert_eq!(v, FLOOR);
    }

    #[test]
    fn test_logarithmic() {
        // 0.8 * (1 - ln(2))
        let v = decay(DecayMode::Logarithmic, 0.8, 1.0, 1.0, 0.0, 1.0).unwrap();
        assert!((v - 0.8 * (1.0 - 2f32.ln())).abs() < 1e-5);
        // multiplier goes negative past e - 1; clamp to floor
        let v = decay(DecayMode::Logarithmic, 0.8, 1.0, 5.0, FLOOR, 1.0).unwrap();
        assert_eq!(v, FLOOR);
    }

    #[test]
    fn test_step() {
        let v = decay(DecayMode::Step, 0.8, 0.1, 2.9, FLOOR, 1.0).unwrap();
        assert!((v - 0.6).abs() < 1e-6);
        let v = decay(DecayMode::Step, 0.8, 0.1, 0.9, FLOOR, 1.0).unwrap();
        assert_eq!(v, 0.8);
        assert!(decay(DecayMode::Step, 0.8, 0.1, 1.0, FLOOR, 0.0).is_err());
    }

    #[test]
    fn test_none_mode() {
        let v = decay(DecayMode::None, 0.7, 0.5, 1000.0, FLOOR, 1.0).unwrap();
        assert_eq!(v, 0.7);
    }

    #[test]
    fn test_floor_never_raises() {
        for mode in [
            DecayMode::Linear,
            DecayMode::Exponential,
            DecayMode::Logarithmic,
            DecayMode::Step,
        ] {
            let v = decay(mode, 0.05, 0.1, 3.0, FLOOR, 1.0).unwrap();
            assert_eq!(v, 0.05, "{} raised a sub-floor value", mode);
        }
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(matches!(
            decay(DecayMode::Linear, 0.5, 0.1, -1.0, FLOOR, 1.0),
            Err(RetentionError::Validation(_))
        ));
        assert!(decay(DecayMode::Linear, 0.5, 0.1, f64::NAN, FLOOR, 1.0).is_err());
        assert!(decay(DecayMode::Linear, 0.5, -0.1, 1.0, FLOOR, 1.0).is_err());
        assert!(decay(DecayMode::Exponential, f32::NAN, 0.1, 1.0, FLOOR, 1.0).is_err());
    }

    #[test]
    fn test_scale() {
        assert!((scale(0.8, 0.5, FLOOR).unwrap() - 0.4).abs() < 1e-6);
        assert_eq!(scale(0.15, 0.1, FLOOR).unwrap(), FLOOR);
        assert_eq!(scale(0.05, 0.5, FLOOR).unwrap(), 0.05);
        assert!(scale(0.5, 1.5, FLOOR).is_err());
    }
}
