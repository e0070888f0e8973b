//! Voxel store backing the fusion engine.
//!
//! The engine only talks to maps through the [`SpatialMap`] capability:
//! coordinate-keyed lookup and creation, log-odds occupancy storage and a
//! restartable walk over the leaves.  [`VoxelMap`] is a flat, sorted
//! in-memory implementation of that capability.
//!
//! # Key types
//!
//! | Type | Role |
//! |------|------|
//! | [`SemanticNode`] | One voxel: log-odds occupancy, semantics, colour. |
//! | [`SensorModel`]  | Hit probability and clamping bounds.              |
//! | [`SpatialMap`]   | Capability consumed by `merge` and `colorize`.    |
//! | [`VoxelMap`]     | In-memory map keyed by [`VoxelKey`].              |
//!
//! # Example
//!
//! ```rust
//! use semfuse_map::voxel_map::{SpatialMap, VoxelMap};
//!
//! let mut map = VoxelMap::new(0.1);
//! let key = map.integrate_hit(1.0, 2.0, 3.0).unwrap();
//!
//! assert!(map.search(1.0, 2.0, 3.0).is_some());
//! assert!(map.search(0.0, 0.0, 0.0).is_none());
//! assert!(map.is_occupied(map.lookup(key).unwrap()));
//! ```

use std::collections::BTreeMap;

use semfuse_types::probability::{logodds, probability};
use semfuse_types::{Color, FusionError, Semantics, VoxelKey};

// ────────────────────────────────────────────────────────────────────────────
// SemanticNode
// ────────────────────────────────────────────────────────────────────────────

/// A single voxel.
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticNode {
    /// Occupancy in log-odds form.
    pub log_odds: f32,
    /// `None` until the first semantic observation is assigned.
    pub semantics: Option<Semantics>,
    /// Display colour; `None` until a colorization pass assigns one.
    pub color: Option<Color>,
}

impl SemanticNode {
    fn with_log_odds(log_odds: f32) -> Self {
        Self {
            log_odds,
            semantics: None,
            color: None,
        }
    }

    /// Occupancy probability.
    pub fn occupancy(&self) -> f64 {
        probability(self.log_odds)
    }

    pub fn is_semantics_set(&self) -> bool {
        self.semantics.is_some()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SensorModel
// ────────────────────────────────────────────────────────────────────────────

/// Inverse sensor model used when integrating point hits, all in log-odds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorModel {
    pub hit: f32,
    pub clamp_min: f32,
    pub clamp_max: f32,
    /// Nodes strictly above this value count as occupied.
    pub occupancy_threshold: f32,
}

impl SensorModel {
    /// Build a model from probabilities.
    pub fn from_probabilities(
        prob_hit: f64,
        clamp_min: f64,
        clamp_max: f64,
        occupancy_threshold: f64,
    ) -> Self {
        Self {
            hit: logodds(prob_hit),
            clamp_min: logodds(clamp_min),
            clamp_max: logodds(clamp_max),
            occupancy_threshold: logodds(occupancy_threshold),
        }
    }
}

impl Default for SensorModel {
    fn default() -> Self {
        Self::from_probabilities(0.7, 0.1192, 0.971, 0.5)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SpatialMap
// ────────────────────────────────────────────────────────────────────────────

/// Coordinate-keyed voxel storage consumed by the fusion engine.
pub trait SpatialMap {
    /// Edge length of a voxel in metres.
    fn resolution(&self) -> f64;

    /// Node at `key`, if it exists.
    fn lookup(&self, key: VoxelKey) -> Option<&SemanticNode>;

    fn lookup_mut(&mut self, key: VoxelKey) -> Option<&mut SemanticNode>;

    /// Create the node at `key` or overwrite its occupancy with `log_odds`.
    fn update_node(&mut self, key: VoxelKey, log_odds: f32) -> &mut SemanticNode;

    /// Every leaf in the map.  Each call starts a fresh traversal.
    fn leaves(&self) -> Box<dyn Iterator<Item = (VoxelKey, &SemanticNode)> + '_>;

    /// Mutable access to every node, used by cosmetic passes.
    fn nodes_mut(&mut self) -> Box<dyn Iterator<Item = &mut SemanticNode> + '_>;

    fn is_occupied(&self, node: &SemanticNode) -> bool;

    /// Leaves whose occupancy is above the map's threshold.
    fn occupied_leaves(&self) -> Box<dyn Iterator<Item = (VoxelKey, &SemanticNode)> + '_> {
        Box::new(self.leaves().filter(move |(_, node)| self.is_occupied(node)))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// VoxelMap
// ────────────────────────────────────────────────────────────────────────────

/// In-memory [`SpatialMap`] at a fixed resolution.
///
/// Every stored node is a leaf; nodes are kept sorted by key so traversals
/// are deterministic.
#[derive(Debug, Clone, PartialEq)]
pub struct VoxelMap {
    resolution: f64,
    sensor: SensorModel,
    nodes: BTreeMap<VoxelKey, SemanticNode>,
}

impl VoxelMap {
    /// Create an empty map with the default sensor model.
    pub fn new(resolution: f64) -> Self {
        Self::with_sensor_model(resolution, SensorModel::default())
    }

    pub fn with_sensor_model(resolution: f64, sensor: SensorModel) -> Self {
        Self {
            resolution,
            sensor,
            nodes: BTreeMap::new(),
        }
    }

    pub fn sensor_model(&self) -> &SensorModel {
        &self.sensor
    }

    /// Number of leaves.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Key of the voxel containing a world point.
    ///
    /// `None` for points that have no key at this resolution (non-finite or
    /// beyond the `i32` cell range).
    pub fn key_for(&self, x: f64, y: f64, z: f64) -> Option<VoxelKey> {
        VoxelKey::from_point(x, y, z, self.resolution)
    }

    /// Node containing the world point, if any.
    pub fn search(&self, x: f64, y: f64, z: f64) -> Option<&SemanticNode> {
        self.nodes.get(&self.key_for(x, y, z)?)
    }

    /// Register an occupied measurement at a world point.
    ///
    /// Adds the sensor model's hit log-odds to the voxel (created at 0 log-odds,
    /// i.e. p = 0.5) and clamps the result into the model's bounds.  Points
    /// without a key (see [`VoxelMap::key_for`]) leave the map unchanged and
    /// return `None`.
    pub fn integrate_hit(&mut self, x: f64, y: f64, z: f64) -> Option<VoxelKey> {
        let key = self.key_for(x, y, z)?;
        let sensor = self.sensor;
        let node = self
            .nodes
            .entry(key)
            .or_insert_with(|| SemanticNode::with_log_odds(0.0));
        node.log_odds = (node.log_odds + sensor.hit).clamp(sensor.clamp_min, sensor.clamp_max);
        Some(key)
    }

    /// Fold a class observation into the node's running semantic average.
    ///
    /// Returns `Ok(false)` when no node exists at `key`.
    pub fn average_node_semantics(
        &mut self,
        key: VoxelKey,
        observation: &[f32],
    ) -> Result<bool, FusionError> {
        let Some(node) = self.nodes.get_mut(&key) else {
            return Ok(false);
        };
        match node.semantics.as_mut() {
            Some(semantics) => semantics.average_with(observation)?,
            None => node.semantics = Some(Semantics::new(observation.to_vec())),
        }
        Ok(true)
    }

    /// Give every node without semantics the `fallback` distribution.
    ///
    /// Returns the number of nodes updated.
    pub fn fill_unset_semantics(&mut self, fallback: &Semantics) -> usize {
        let mut filled = 0;
        for node in self.nodes.values_mut().filter(|n| n.semantics.is_none()) {
            node.semantics = Some(fallback.clone());
            filled += 1;
        }
        filled
    }
}

impl SpatialMap for VoxelMap {
    fn resolution(&self) -> f64 {
        self.resolution
    }

    fn lookup(&self, key: VoxelKey) -> Option<&SemanticNode> {
        self.nodes.get(&key)
    }

    fn lookup_mut(&mut self, key: VoxelKey) -> Option<&mut SemanticNode> {
        self.nodes.get_mut(&key)
    }

    fn update_node(&mut self, key: VoxelKey, log_odds: f32) -> &mut SemanticNode {
        let node = self
            .nodes
            .entry(key)
            .or_insert_with(|| SemanticNode::with_log_odds(log_odds));
        node.log_odds = log_odds;
        node
    }

    fn leaves(&self) -> Box<dyn Iterator<Item = (VoxelKey, &SemanticNode)> + '_> {
        Box::new(self.nodes.iter().map(|(k, n)| (*k, n)))
    }

    fn nodes_mut(&mut self) -> Box<dyn Iterator<Item = &mut SemanticNode> + '_> {
        Box::new(self.nodes.values_mut())
    }

    fn is_occupied(&self, node: &SemanticNode) -> bool {
        node.log_odds > self.sensor.occupancy_threshold
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
