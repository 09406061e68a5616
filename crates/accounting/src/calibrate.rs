//! Calibration of a single noise scale against a target epsilon.

use dp_budget_core::{DpError, Result};

/// Absolute tolerance of the minimum-noise binary search.
pub const NOISE_SEARCH_TOLERANCE: f64 = 1e-4;

const MAX_BRACKET_NOISE: f64 = 1e12;

/// Final interval of a noise search.
///
/// `high` always satisfies the target; `low` is either zero or a noise level
/// known to violate it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NoiseBracket {
    /// Largest noise known to be insufficient (or zero).
    pub low: f64,
    /// Smallest noise known to be sufficient.
    pub high: f64,
}

impl NoiseBracket {
    /// Width of the interval.
    pub fn width(&self) -> f64 {
        self.high - self.low
    }
}

/// Find a noise level whose epsilon is within `target_epsilon`.
///
/// Starting from 1, the noise is doubled before each evaluation until the
/// epsilon drops to the target. Epsilon must be non-increasing in the noise.
pub fn bracket_noise(
    mut epsilon_for: impl FnMut(f64) -> Result<f64>,
    target_epsilon: f64,
) -> Result<f64> {
    let mut noise = 1.0_f64;
    loop {
        noise *= 2.0;
        if noise > MAX_BRACKET_NOISE {
            return Err(DpError::numerical(
                "failed to bracket a noise level achieving the target epsilon",
            ));
        }
        let eps = epsilon_for(noise)?;
        tracing::trace!(noise, eps, "bracketing noise");
        if eps <= target_epsilon {
            return Ok(noise);
        }
    }
}

/// Binary search for the smallest noise whose epsilon is within the target.
///
/// The search stops once the bracket is no wider than `tolerance`; the
/// returned `high` is the calibrated noise.
pub fn calibrate_minimum_noise(
    mut epsilon_for: impl FnMut(f64) -> Result<f64>,
    target_epsilon: f64,
    tolerance: f64,
) -> Result<NoiseBracket> {
    if !tolerance.is_finite() || tolerance <= 0.0 {
        return Err(DpError::invalid("search tolerance must be positive"));
    }

    let high = bracket_noise(&mut epsilon_for, target_epsilon)?;
    let mut bracket = NoiseBracket { low: 0.0, high };
    while bracket.width() > tolerance {
        let mid = bracket.low + (bracket.high - bracket.low) / 2.0;
        if mid <= bracket.low || mid >= bracket.high {
            // Out of float resolution at this magnitude.
            break;
        }
        let eps = epsilon_for(mid)?;
        tracing::trace!(noise = mid, eps, "noise search step");
        // NaN lands on the insufficient side.
        if eps <= target_epsilon {
            bracket.high = mid;
        } else {
            bracket.low = mid;
        }
    }
    Ok(bracket)
}
