//! Fusion session: labelled evidence → local map → global map.
//!
//! 1. Every point is integrated as a hit into a fresh local map.
//! 2. Each point's class is averaged into the semantics of its voxel; voxels
//!    left without a label get class 0.
//! 3. The local map is merged into the global map `passes` times.  Merging is
//!    not idempotent, so every pass beyond the first re-counts the same
//!    evidence.
//! 4. Both maps are colorized.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use semfuse_map::colorize::colorize;
use semfuse_map::merge::{FusionParams, MergeReport, merge_with};
use semfuse_map::voxel_map::{SpatialMap, VoxelMap};
use semfuse_types::{FusionError, Semantics};

use crate::cloud::{CloudError, LabelledPoint};
use crate::config::Config;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("evidence file not found: {}", .0.display())]
    MissingInputFile(PathBuf),

    #[error(transparent)]
    Cloud(#[from] CloudError),

    #[error(transparent)]
    Fusion(#[from] FusionError),

    #[error("config error: {0}")]
    Config(String),
}

// ────────────────────────────────────────────────────────────────────────────
// Summary types
// ────────────────────────────────────────────────────────────────────────────

/// Counters gathered while building the local map.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LocalBuild {
    pub points: usize,
    /// Points whose class was averaged into their voxel.
    pub labelled: usize,
    /// Points with a missing or out-of-range class.
    pub unlabelled: usize,
    /// Points too far from the origin to have a voxel at this resolution.
    pub unplaced: usize,
    /// Voxels that fell back to class 0.
    pub defaulted: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PassSummary {
    pub created: usize,
    pub fused: usize,
    pub skipped: usize,
}

impl From<&MergeReport> for PassSummary {
    fn from(report: &MergeReport) -> Self {
        Self {
            created: report.created,
            fused: report.fused,
            skipped: report.skipped(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub local: LocalBuild,
    pub local_voxels: usize,
    pub global_voxels: usize,
    pub passes: Vec<PassSummary>,
    pub local_coloured: usize,
    pub global_coloured: usize,
    /// Global voxels per dominant class.
    pub class_histogram: Vec<usize>,
}

/// Maps and summary of a finished session.
#[derive(Debug)]
pub struct Session {
    pub local: VoxelMap,
    pub global: VoxelMap,
    pub summary: SessionSummary,
}

// ────────────────────────────────────────────────────────────────────────────
// Pipeline
// ────────────────────────────────────────────────────────────────────────────

/// Build the local map from labelled points.
pub fn build_local_map(
    points: &[LabelledPoint],
    cfg: &Config,
) -> Result<(VoxelMap, LocalBuild), CliError> {
    let fallback = Semantics::one_hot(cfg.num_classes, 0)
        .ok_or_else(|| CliError::Config("num_classes must be at least 1".to_string()))?;

    let mut map = VoxelMap::new(cfg.resolution);
    let mut stats = LocalBuild {
        points: points.len(),
        ..LocalBuild::default()
    };

    let keys: Vec<_> = points
        .iter()
        .map(|p| map.integrate_hit(p.x, p.y, p.z))
        .collect();

    for (point, key) in points.iter().zip(keys) {
        let Some(key) = key else {
            warn!(
                x = point.x,
                y = point.y,
                z = point.z,
                "point outside the addressable map, dropped"
            );
            stats.unplaced += 1;
            continue;
        };
        let Some(observation) = point
            .class()
            .and_then(|class| Semantics::one_hot(cfg.num_classes, class))
        else {
            warn!(key = %key, extra = ?point.extra, "point has no usable class index");
            stats.unlabelled += 1;
            continue;
        };
        map.average_node_semantics(key, &observation.label)?;
        stats.labelled += 1;
    }

    stats.defaulted = map.fill_unset_semantics(&fallback);
    info!(
        points = stats.points,
        voxels = map.len(),
        defaulted = stats.defaulted,
        "local map built"
    );
    Ok((map, stats))
}

/// Run a complete session on already parsed evidence.
pub fn run_session(
    points: &[LabelledPoint],
    cfg: &Config,
    passes: usize,
) -> Result<Session, CliError> {
    let (mut local, local_stats) = build_local_map(points, cfg)?;
    let mut global = VoxelMap::new(cfg.resolution);
    let params = FusionParams {
        epsilon: cfg.probability_epsilon,
    };

    let mut pass_summaries = Vec::with_capacity(passes);
    for pass in 1..=passes {
        let report = merge_with(&local, &mut global, &params)?;
        info!(pass, global_voxels = global.len(), "merge pass finished");
        pass_summaries.push(PassSummary::from(&report));
    }

    let local_coloured = colorize(&mut local, &cfg.palette, cfg.color_threshold);
    let global_coloured = colorize(&mut global, &cfg.palette, cfg.color_threshold);

    let mut class_histogram = vec![0; cfg.num_classes];
    for (_, node) in global.leaves() {
        if let Some(class) = node.semantics.as_ref().and_then(Semantics::dominant_class)
            && let Some(slot) = class_histogram.get_mut(class)
        {
            *slot += 1;
        }
    }

    let summary = SessionSummary {
        local: local_stats,
        local_voxels: local.len(),
        global_voxels: global.len(),
        passes: pass_summaries,
        local_coloured,
        global_coloured,
        class_histogram,
    };
    Ok(Session {
        local,
        global,
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use semfuse_types::DEFAULT_PALETTE;

    fn pt(x: f64, class: f32) -> LabelledPoint {
        LabelledPoint {
            x,
            y: 0.05,
            z: 0.05,
            extra: vec![0.0, 0.0, 0.0, class],
        }
    }

    #[test]
    fn local_map_averages_point_classes() {
        let points = [pt(0.05, 1.0), pt(0.06, 1.0), pt(0.07, 2.0), pt(0.15, 2.0)];
        let (map, stats) = build_local_map(&points, &Config::default()).unwrap();

        assert_eq!(map.len(), 2);
        assert_eq!(stats.labelled, 4);
        let s = map.search(0.05, 0.05, 0.05).unwrap().semantics.clone().unwrap();
        assert_eq!(s.count, 3);
        assert!((s.label[1] - 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn unlabelled_voxels_default_to_class_zero() {
        let points = [pt(0.05, 7.0), pt(0.15, 2.0)];
        let (map, stats) = build_local_map(&points, &Config::default()).unwrap();

        assert_eq!(stats.unlabelled, 1);
        assert_eq!(stats.defaulted, 1);
        let s = map.search(0.05, 0.05, 0.05).unwrap().semantics.clone().unwrap();
        assert_eq!(s.label, vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn single_pass_copies_local_into_global() {
        let points = [pt(0.05, 1.0), pt(0.15, 2.0), pt(0.25, 0.0)];
        let session = run_session(&points, &Config::default(), 1).unwrap();

        assert_eq!(session.summary.passes, vec![PassSummary { created: 3, fused: 0, skipped: 0 }]);
        assert_eq!(session.summary.global_voxels, 3);
        for (key, leaf) in session.local.leaves() {
            let node = session.global.lookup(key).unwrap();
            assert_eq!(node.log_odds, leaf.log_odds);
        }
        assert_eq!(session.summary.class_histogram, vec![1, 1, 1]);
    }

    #[test]
    fn second_pass_refuses_same_evidence() {
        let points = [pt(0.05, 1.0), pt(0.15, 2.0)];
        let once = run_session(&points, &Config::default(), 1).unwrap();
        let twice = run_session(&points, &Config::default(), 2).unwrap();

        assert_eq!(twice.summary.passes[1], PassSummary { created: 0, fused: 2, skipped: 0 });
        let key = once.global.key_for(0.05, 0.05, 0.05).unwrap();
        let a = once.global.lookup(key).unwrap();
        let b = twice.global.lookup(key).unwrap();
        assert!(b.occupancy() > a.occupancy());
    }

    #[test]
    fn confident_voxels_are_coloured_in_both_maps() {
        let points = [pt(0.05, 1.0), pt(0.15, 2.0)];
        let session = run_session(&points, &Config::default(), 1).unwrap();

        assert_eq!(session.summary.local_coloured, 2);
        assert_eq!(session.summary.global_coloured, 2);
        let node = session.global.search(0.15, 0.05, 0.05).unwrap();
        assert_eq!(node.color, Some(DEFAULT_PALETTE[2]));
    }

    #[test]
    fn far_points_do_not_share_a_voxel_or_leak_their_class() {
        let points = [
            LabelledPoint { x: 0.05, y: 0.05, z: 0.05, extra: vec![0.0, 0.0, 0.0, 1.0] },
            LabelledPoint { x: 1e300, y: 0.0, z: 0.0, extra: vec![0.0, 0.0, 0.0, 1.0] },
            LabelledPoint { x: 1e301, y: 0.0, z: 0.0, extra: vec![0.0, 0.0, 0.0, 2.0] },
        ];
        let session = run_session(&points, &Config::default(), 1).unwrap();

        assert_eq!(session.summary.local.unplaced, 2);
        assert_eq!(session.summary.local.labelled, 1);
        assert_eq!(session.summary.global_voxels, 1);
        let s = session.global.search(0.05, 0.05, 0.05).unwrap().semantics.clone().unwrap();
        assert_eq!(s.label, vec![0.0, 1.0, 0.0]);
        assert!(session.global.leaves().all(|(k, _)| k.x != i32::MAX));
    }

    #[test]
    fn empty_evidence_yields_empty_maps() {
        let session = run_session(&[], &Config::default(), 1).unwrap();
        assert_eq!(session.summary.global_voxels, 0);
        assert_eq!(session.summary.passes, vec![PassSummary::default()]);
    }
}
