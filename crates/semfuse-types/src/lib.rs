//! Shared data types for the semantic map fusion workspace.
//!
//! - [`Semantics`] – categorical distribution over a fixed set of classes plus
//!   an observation counter, attached to a voxel.
//! - [`Color`] – display colour derived from semantics.
//! - [`VoxelKey`] – quantized 3-D coordinate identifying a voxel.
//! - [`FusionError`] – every failure the fusion engine can report.
//! - [`probability`] – log-odds conversions and the degenerate-input policy.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub mod probability;

// ────────────────────────────────────────────────────────────────────────────
// Semantics
// ────────────────────────────────────────────────────────────────────────────

/// Categorical probability distribution over `K` semantic classes.
///
/// `label[i]` is the probability of class `i`; once set the vector sums to 1
/// within floating-point tolerance.  `count` is the number of observations
/// fused into this distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Semantics {
    pub label: Vec<f32>,
    pub count: u32,
}

impl Semantics {
    /// A distribution carrying a single observation.
    pub fn new(label: Vec<f32>) -> Self {
        Self { label, count: 1 }
    }

    /// Certain class `class` out of `num_classes`.
    ///
    /// Returns `None` when `class` is not a valid index.
    pub fn one_hot(num_classes: usize, class: usize) -> Option<Self> {
        if class >= num_classes {
            return None;
        }
        let mut label = vec![0.0; num_classes];
        label[class] = 1.0;
        Some(Self::new(label))
    }

    /// Override the observation counter.
    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    /// Number of classes `K`.
    pub fn num_classes(&self) -> usize {
        self.label.len()
    }

    pub fn sum(&self) -> f32 {
        self.label.iter().sum()
    }

    /// True when the label vector sums to 1 within `tolerance`.
    pub fn is_normalized(&self, tolerance: f32) -> bool {
        !self.label.is_empty() && (self.sum() - 1.0).abs() <= tolerance
    }

    /// Index of the most probable class; the first one wins on ties.
    pub fn dominant_class(&self) -> Option<usize> {
        let mut best: Option<(usize, f32)> = None;
        for (i, &p) in self.label.iter().enumerate() {
            match best {
                Some((_, bp)) if p <= bp => {}
                _ => best = Some((i, p)),
            }
        }
        best.map(|(i, _)| i)
    }

    /// Fold one more observation into the running average.
    ///
    /// ```text
    /// label = (label * count + observation) / (count + 1)
    /// ```
    ///
    /// An empty distribution (or one with `count == 0`) simply adopts the
    /// observation.
    pub fn average_with(&mut self, observation: &[f32]) -> Result<(), FusionError> {
        if self.label.is_empty() || self.count == 0 {
            self.label = observation.to_vec();
            self.count = 1;
            return Ok(());
        }
        if self.num_classes() != observation.len() {
            return Err(FusionError::LabelCountMismatch {
                local: observation.len(),
                global: self.num_classes(),
            });
        }
        let n = self.count as f32;
        for (p, &o) in self.label.iter_mut().zip(observation) {
            *p = (*p * n + o) / (n + 1.0);
        }
        self.count += 1;
        Ok(())
    }
}

impl fmt::Display for Semantics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, p) in self.label.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{p:.3}")?;
        }
        write!(f, "] (n={})", self.count)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Color
// ────────────────────────────────────────────────────────────────────────────

/// 8-bit RGB display colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} {} {})", self.r, self.g, self.b)
    }
}

/// Class colours used when no palette is configured: white, red, green,
/// blue, yellow.
pub const DEFAULT_PALETTE: [Color; 5] = [
    Color::new(255, 255, 255),
    Color::new(255, 0, 0),
    Color::new(0, 255, 0),
    Color::new(0, 0, 255),
    Color::new(255, 255, 0),
];

// ────────────────────────────────────────────────────────────────────────────
// VoxelKey
// ────────────────────────────────────────────────────────────────────────────

/// Quantized voxel coordinate: `floor(coordinate / resolution)` per axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VoxelKey {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl VoxelKey {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Key of the voxel containing the world point `(x, y, z)`.
    ///
    /// Returns `None` when a coordinate is not finite or its cell index does
    /// not fit in an `i32`.
    pub fn from_point(x: f64, y: f64, z: f64, resolution: f64) -> Option<Self> {
        let quantize = |c: f64| {
            let cell = (c / resolution).floor();
            let in_range = cell.is_finite() && cell >= i32::MIN as f64 && cell <= i32::MAX as f64;
            in_range.then(|| cell as i32)
        };
        Some(Self {
            x: quantize(x)?,
            y: quantize(y)?,
            z: quantize(z)?,
        })
    }

    /// World coordinate of the voxel centre.
    pub fn centre(&self, resolution: f64) -> [f64; 3] {
        [
            (self.x as f64 + 0.5) * resolution,
            (self.y as f64 + 0.5) * resolution,
            (self.z as f64 + 0.5) * resolution,
        ]
    }
}

impl fmt::Display for VoxelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Failures raised by the fusion rules and the merge engine.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FusionError {
    #[error("Inconsistent State: global voxel {key} exists without semantics")]
    InconsistentState { key: VoxelKey },

    #[error("Degenerate Probability: {0} is not a usable occupancy probability")]
    DegenerateProbability(f64),

    #[error("Zero Evidence: semantics product has no surviving class")]
    ZeroEvidenceSemantics,

    #[error("Label Count Mismatch: local has {local} classes, global has {global}")]
    LabelCountMismatch { local: usize, global: usize },

    #[error("Resolution Mismatch: local map {local}, global map {global}")]
    ResolutionMismatch { local: f64, global: f64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_hot_sets_single_class() {
        let s = Semantics::one_hot(3, 1).unwrap();
        assert_eq!(s.num_classes(), 3);
        assert_eq!(s.label, vec![0.0, 1.0, 0.0]);
        assert_eq!(s.count, 1);
        assert!(s.is_normalized(1e-6));
    }

    #[test]
    fn one_hot_rejects_out_of_range_class() {
        assert!(Semantics::one_hot(3, 3).is_none());
    }

    #[test]
    fn average_with_adopts_first_observation() {
        let mut s = Semantics::new(Vec::new()).with_count(0);
        s.average_with(&[0.0, 0.0, 1.0]).unwrap();
        assert_eq!(s.label, vec![0.0, 0.0, 1.0]);
        assert_eq!(s.count, 1);
    }

    #[test]
    fn average_with_computes_running_mean() {
        let mut s = Semantics::one_hot(3, 0).unwrap();
        s.average_with(&[0.0, 1.0, 0.0]).unwrap();
        s.average_with(&[0.0, 1.0, 0.0]).unwrap();
        assert_eq!(s.count, 3);
        assert!((s.label[0] - 1.0 / 3.0).abs() < 1e-6);
        assert!((s.label[1] - 2.0 / 3.0).abs() < 1e-6);
        assert!(s.is_normalized(1e-5));
    }

    #[test]
    fn average_with_rejects_length_mismatch() {
        let mut s = Semantics::one_hot(3, 0).unwrap();
        let err = s.average_with(&[0.5, 0.5]).unwrap_err();
        assert_eq!(err, FusionError::LabelCountMismatch { local: 2, global: 3 });
    }

    #[test]
    fn dominant_class_prefers_first_on_tie() {
        let s = Semantics::new(vec![0.4, 0.4, 0.2]);
        assert_eq!(s.dominant_class(), Some(0));
        let s = Semantics::new(vec![0.1, 0.2, 0.7]);
        assert_eq!(s.dominant_class(), Some(2));
        assert_eq!(Semantics::new(Vec::new()).dominant_class(), None);
    }

    #[test]
    fn voxel_key_quantizes_with_floor() {
        let k = VoxelKey::from_point(0.25, -0.05, 1.0, 0.1).unwrap();
        assert_eq!(k, VoxelKey::new(2, -1, 10));
        let c = k.centre(0.1);
        assert!((c[0] - 0.25).abs() < 1e-9);
        assert!((c[1] + 0.05).abs() < 1e-9);
    }

    #[test]
    fn voxel_key_rejects_unrepresentable_points() {
        assert_eq!(VoxelKey::from_point(f64::NAN, 0.0, 0.0, 0.1), None);
        assert_eq!(VoxelKey::from_point(0.0, f64::INFINITY, 0.0, 0.1), None);
        assert_eq!(VoxelKey::from_point(0.0, 0.0, f64::NEG_INFINITY, 0.1), None);
        assert_eq!(VoxelKey::from_point(1e300, 0.0, 0.0, 0.1), None);
        assert_eq!(VoxelKey::from_point(-1e300, 0.0, 0.0, 0.1), None);
        // 3e8 m at 0.1 m is 3e9 cells, past i32::MAX.
        assert_eq!(VoxelKey::from_point(3e8, 0.0, 0.0, 0.1), None);
    }

    #[test]
    fn voxel_key_accepts_extreme_representable_cells() {
        let max = i32::MAX as f64;
        let k = VoxelKey::from_point(max, i32::MIN as f64, 0.0, 1.0).unwrap();
        assert_eq!(k, VoxelKey::new(i32::MAX, i32::MIN, 0));
    }

    #[test]
    fn semantics_serialization_roundtrip() {
        let s = Semantics::new(vec![0.7, 0.2, 0.1]).with_count(4);
        let json = serde_json::to_string(&s).unwrap();
        let back: Semantics = serde_json::from_str(&json).unwrap();
        assert_eq!(s, back);
    }

    #[test]
    fn fusion_error_display() {
        let err = FusionError::InconsistentState { key: VoxelKey::new(1, 2, 3) };
        assert!(err.to_string().contains("(1, 2, 3)"));
        assert!(FusionError::ZeroEvidenceSemantics.to_string().contains("Zero Evidence"));
    }
}
