//! `semfuse-map` – semantic occupancy map fusion.
//!
//! Combines a freshly observed local voxel map with a persistent global map,
//! pooling both occupancy and semantic-class evidence.
//!
//! # Modules
//!
//! - [`voxel_map`] – [`SpatialMap`][voxel_map::SpatialMap]: the storage
//!   capability the engine relies on, and
//!   [`VoxelMap`][voxel_map::VoxelMap], an in-memory implementation.
//! - [`fusion`] – the occupancy and semantics fusion rules.
//! - [`merge`] – [`merge`][merge::merge]: folds every occupied local leaf
//!   into the global map.
//! - [`colorize`] – display colours derived from semantics.

pub mod colorize;
pub mod fusion;
pub mod merge;
pub mod voxel_map;
