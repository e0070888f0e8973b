//! Map Fusion Engine.
//!
//! Folds the occupied leaves of a freshly built **local** map into a
//! persistent **global** map.  For every occupied local leaf `L`:
//!
//! 1. Look up the global node `G` at `L`'s key.
//! 2. `G` absent → create it with `L`'s occupancy copied verbatim and `L`'s
//!    semantics copied with the observation count reset to zero.  An unseen
//!    voxel is treated as a flat prior, so nothing is fused.
//! 3. `G` present → fuse occupancy with [`fuse_occupancy_clamped`], fuse and
//!    normalize semantics, store both and increment the count.
//!
//! The local map is only read.  Global nodes outside the local key set are
//! never touched.  A voxel that cannot be fused (missing semantics, zero
//! evidence, mismatched class count, degenerate probability) is logged,
//! left as it was and recorded in the [`MergeReport`]; the merge carries on.
//!
//! Merging is **not idempotent**: merging the same local map twice counts
//! its evidence twice.
//!
//! # Example
//!
//! ```rust
//! use semfuse_map::merge::merge;
//! use semfuse_map::voxel_map::{SpatialMap, VoxelMap};
//! use semfuse_types::Semantics;
//!
//! let mut local = VoxelMap::new(0.1);
//! let key = local.integrate_hit(0.0, 0.0, 0.0).unwrap();
//! local.average_node_semantics(key, &[0.0, 1.0, 0.0]).unwrap();
//!
//! let mut global = VoxelMap::new(0.1);
//! let report = merge(&local, &mut global).unwrap();
//! assert_eq!(report.created, 1);
//! assert_eq!(global.lookup(key).unwrap().semantics.as_ref().unwrap().count, 0);
//! ```

use tracing::{debug, error, info};

use semfuse_types::probability::DEFAULT_PROBABILITY_EPSILON;
use semfuse_types::{FusionError, VoxelKey};

use crate::fusion::{fuse_occupancy_clamped, fuse_semantics, normalize};
use crate::voxel_map::{SemanticNode, SpatialMap};

// ────────────────────────────────────────────────────────────────────────────
// Parameters & report
// ────────────────────────────────────────────────────────────────────────────

/// Tunables for a merge pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionParams {
    /// Probabilities are clamped into `[epsilon, 1 − epsilon]` before fusion.
    pub epsilon: f64,
}

impl Default for FusionParams {
    fn default() -> Self {
        Self {
            epsilon: DEFAULT_PROBABILITY_EPSILON,
        }
    }
}

/// Outcome of a merge pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeReport {
    /// Global nodes created from local leaves.
    pub created: usize,
    /// Existing global nodes updated by fusion.
    pub fused: usize,
    /// Voxels left untouched, with the reason.
    pub failures: Vec<(VoxelKey, FusionError)>,
}

impl MergeReport {
    pub fn skipped(&self) -> usize {
        self.failures.len()
    }

    /// Leaves visited in total.
    pub fn visited(&self) -> usize {
        self.created + self.fused + self.skipped()
    }
}

enum LeafOutcome {
    Created,
    Fused,
}

// ────────────────────────────────────────────────────────────────────────────
// merge
// ────────────────────────────────────────────────────────────────────────────

/// Merge `local` into `global` with default [`FusionParams`].
pub fn merge<L, G>(local: &L, global: &mut G) -> Result<MergeReport, FusionError>
where
    L: SpatialMap + ?Sized,
    G: SpatialMap + ?Sized,
{
    merge_with(local, global, &FusionParams::default())
}

/// Merge `local` into `global`.
///
/// The only fatal error is [`FusionError::ResolutionMismatch`], raised before
/// any node is modified.  Per-voxel failures are collected in the report.
pub fn merge_with<L, G>(
    local: &L,
    global: &mut G,
    params: &FusionParams,
) -> Result<MergeReport, FusionError>
where
    L: SpatialMap + ?Sized,
    G: SpatialMap + ?Sized,
{
    if (local.resolution() - global.resolution()).abs() > f64::EPSILON {
        return Err(FusionError::ResolutionMismatch {
            local: local.resolution(),
            global: global.resolution(),
        });
    }

    let mut report = MergeReport::default();
    for (key, leaf) in local.occupied_leaves() {
        match merge_leaf(key, leaf, global, params) {
            Ok(LeafOutcome::Created) => report.created += 1,
            Ok(LeafOutcome::Fused) => report.fused += 1,
            Err(e) => {
                error!(key = %key, error = %e, "voxel fusion skipped");
                report.failures.push((key, e));
            }
        }
    }

    info!(
        created = report.created,
        fused = report.fused,
        skipped = report.skipped(),
        "merge complete"
    );
    Ok(report)
}

/// Fold one occupied local leaf into the global map.
///
/// A global voxel counts as having semantics when `semantics` is `Some`;
/// `None` means unset, not `count == 0`.  Voxels created by an earlier pass
/// carry `count == 0` and are fused like any other.
fn merge_leaf<G>(
    key: VoxelKey,
    leaf: &SemanticNode,
    global: &mut G,
    params: &FusionParams,
) -> Result<LeafOutcome, FusionError>
where
    G: SpatialMap + ?Sized,
{
    let Some(node) = global.lookup_mut(key) else {
        let created = global.update_node(key, leaf.log_odds);
        created.semantics = leaf.semantics.clone().map(|s| s.with_count(0));
        debug!(key = %key, occupancy = leaf.occupancy(), "created global voxel");
        return Ok(LeafOutcome::Created);
    };

    let (Some(global_sem), Some(local_sem)) = (node.semantics.as_ref(), leaf.semantics.as_ref())
    else {
        return Err(FusionError::InconsistentState { key });
    };

    // Compute everything before writing so a failing voxel stays untouched.
    let log_odds = fuse_occupancy_clamped(leaf.occupancy(), node.occupancy(), params.epsilon)?;
    let mut semantics = normalize(fuse_semantics(local_sem, global_sem)?)?;
    semantics.count = global_sem.count.saturating_add(1);

    debug!(key = %key, before = node.occupancy(), log_odds, "fused global voxel");
    node.log_odds = log_odds;
    node.semantics = Some(semantics);
    Ok(LeafOutcome::Fused)
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
