//! Log-odds conversions.
//!
//! ```text
//! log_odds = ln(p / (1 − p))
//! p        = 1 / (1 + exp(−log_odds))
//! ```
//!
//! Probabilities of exactly 0 or 1 map to ±∞ in log-odds, so every
//! probability entering the fusion rules first goes through
//! [`clamp_probability`], which pins it into `[ε, 1 − ε]`.

use crate::FusionError;

/// Distance kept from 0 and 1 when clamping probabilities.
pub const DEFAULT_PROBABILITY_EPSILON: f64 = 1e-6;

/// Convert a probability to log-odds.
///
/// The caller is responsible for passing a value strictly inside `(0, 1)`.
pub fn logodds(p: f64) -> f32 {
    (p / (1.0 - p)).ln() as f32
}

/// Convert log-odds back to a probability.
pub fn probability(log_odds: f32) -> f64 {
    1.0 / (1.0 + (-(log_odds as f64)).exp())
}

/// Validate `p` and pin it into `[epsilon, 1 − epsilon]`.
///
/// NaN and values outside `[0, 1]` are rejected with
/// [`FusionError::DegenerateProbability`]; the boundary values 0 and 1 are
/// clamped.
pub fn clamp_probability(p: f64, epsilon: f64) -> Result<f64, FusionError> {
    if !(0.0..=1.0).contains(&p) {
        return Err(FusionError::DegenerateProbability(p));
    }
    Ok(p.clamp(epsilon, 1.0 - epsilon))
}
