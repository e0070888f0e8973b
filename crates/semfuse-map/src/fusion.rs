//! Evidence fusion rules.
//!
//! Both rules combine two conditionally independent estimates of the same
//! voxel (independent-opinion / naive-Bayes pooling).
//!
//! Occupancy, for a local estimate `pl` and a global estimate `pg`:
//! ```text
//! posterior = pl·pg / (pl·pg + (1 − pl)·(1 − pg))
//! ```
//! stored as log-odds.
//!
//! Semantics, the categorical analogue: the element-wise product of the two
//! class vectors, followed by an explicit [`normalize`] step.
//!
//! # Example
//!
//! ```rust
//! use semfuse_map::fusion::{fuse_occupancy, fuse_semantics, normalize};
//! use semfuse_types::{probability::probability, Semantics};
//!
//! let fused = fuse_occupancy(0.9, 0.2).unwrap();
//! assert!((probability(fused) - 0.6923).abs() < 1e-3);
//!
//! let sl = Semantics::new(vec![0.9, 0.05, 0.05]);
//! let sg = Semantics::new(vec![0.1, 0.8, 0.1]);
//! let s = normalize(fuse_semantics(&sl, &sg).unwrap()).unwrap();
//! assert!((s.label[0] - 0.667).abs() < 1e-3);
//! ```

use semfuse_types::probability::{DEFAULT_PROBABILITY_EPSILON, clamp_probability, logodds};
use semfuse_types::{FusionError, Semantics};

// ────────────────────────────────────────────────────────────────────────────
// Occupancy
// ────────────────────────────────────────────────────────────────────────────

/// Fuse two occupancy probabilities into a log-odds posterior, clamping with
/// [`DEFAULT_PROBABILITY_EPSILON`].
pub fn fuse_occupancy(p_local: f64, p_global: f64) -> Result<f32, FusionError> {
    fuse_occupancy_clamped(p_local, p_global, DEFAULT_PROBABILITY_EPSILON)
}

/// Fuse two occupancy probabilities, keeping inputs and posterior inside
/// `[epsilon, 1 − epsilon]` so the returned log-odds is always finite.
pub fn fuse_occupancy_clamped(
    p_local: f64,
    p_global: f64,
    epsilon: f64,
) -> Result<f32, FusionError> {
    let pl = clamp_probability(p_local, epsilon)?;
    let pg = clamp_probability(p_global, epsilon)?;

    let occupied = pl * pg;
    let free = (1.0 - pl) * (1.0 - pg);
    let posterior = clamp_probability(occupied / (occupied + free), epsilon)?;

    Ok(logodds(posterior))
}

// ────────────────────────────────────────────────────────────────────────────
// Semantics
// ────────────────────────────────────────────────────────────────────────────

/// Element-wise product of two class distributions.
///
/// The result is **not** normalized; pass it through [`normalize`] before
/// storing it.  The observation count is carried over from `global`.
///
/// Whether a voxel's semantics are set is decided by the caller holding an
/// `Option<Semantics>`: `None` means unset.  A `global` with `count == 0`
/// (a freshly created voxel) is a valid distribution and is fused normally.
pub fn fuse_semantics(local: &Semantics, global: &Semantics) -> Result<Semantics, FusionError> {
    if local.num_classes() != global.num_classes() {
        return Err(FusionError::LabelCountMismatch {
            local: local.num_classes(),
            global: global.num_classes(),
        });
    }
    let label = local
        .label
        .iter()
        .zip(&global.label)
        .map(|(l, g)| l * g)
        .collect();
    Ok(Semantics {
        label,
        count: global.count,
    })
}

/// Rescale a class vector so it sums to one.
///
/// Fails with [`FusionError::ZeroEvidenceSemantics`] when no class carries any
/// probability mass (or the vector is empty).
pub fn normalize(mut semantics: Semantics) -> Result<Semantics, FusionError> {
    let total = semantics.sum();
    if !total.is_finite() || total <= 0.0 {
        return Err(FusionError::ZeroEvidenceSemantics);
    }
    for p in semantics.label.iter_mut() {
        *p /= total;
    }
    Ok(semantics)
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
