//! Colorization pass.
//!
//! Paints every voxel whose semantics are confidently dominated by one class
//! with that class's palette colour, for visual inspection only.  Occupancy
//! and semantics are never modified, so the pass may be re-run or skipped.
//!
//! Classes are checked in index order and every class above the threshold
//! overwrites the colour, so when several classes pass the **last** one
//! wins.  Voxels where no class passes keep whatever colour they had.

use std::collections::BTreeSet;

use semfuse_types::Color;
use tracing::{debug, warn};

use crate::voxel_map::SpatialMap;

/// Probability a class must exceed to claim a voxel's colour.
pub const DEFAULT_COLOR_THRESHOLD: f32 = 0.6;

/// Colour every voxel of `map` from its semantics.
///
/// Returns the number of voxels that received a colour.
pub fn colorize<M>(map: &mut M, palette: &[Color], threshold: f32) -> usize
where
    M: SpatialMap + ?Sized,
{
    let mut coloured = 0;
    let mut unpainted_classes = BTreeSet::new();

    for node in map.nodes_mut() {
        let Some(semantics) = node.semantics.as_ref() else {
            continue;
        };
        let mut assigned = None;
        for (class, &p) in semantics.label.iter().enumerate() {
            if p <= threshold {
                continue;
            }
            match palette.get(class) {
                Some(&color) => assigned = Some(color),
                None => {
                    unpainted_classes.insert(class);
                }
            }
        }
        if let Some(color) = assigned {
            node.color = Some(color);
            coloured += 1;
        }
    }

    for class in unpainted_classes {
        warn!(class, palette_len = palette.len(), "no palette colour for class");
    }
    debug!(coloured, "colorization pass complete");
    coloured
}
