//! Configuration – reads/writes `~/.semfuse/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use semfuse_map::colorize::DEFAULT_COLOR_THRESHOLD;
use semfuse_types::probability::DEFAULT_PROBABILITY_EPSILON;
use semfuse_types::{Color, DEFAULT_PALETTE};

/// Fusion session settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Voxel edge length in metres, shared by the local and global maps.
    #[serde(default = "default_resolution")]
    pub resolution: f64,

    /// Number of semantic classes `K`.
    #[serde(default = "default_num_classes")]
    pub num_classes: usize,

    /// Extra columns after `x y z` on each evidence line; the last one holds
    /// the class index.
    #[serde(default = "default_extra_columns")]
    pub extra_columns: usize,

    /// A class must exceed this probability to colour a voxel.
    #[serde(default = "default_color_threshold")]
    pub color_threshold: f32,

    /// Occupancy probabilities are clamped into `[ε, 1 − ε]` before fusion.
    #[serde(default = "default_probability_epsilon")]
    pub probability_epsilon: f64,

    /// Display colour per class index.
    #[serde(default = "default_palette")]
    pub palette: Vec<Color>,
}

fn default_resolution() -> f64 {
    0.1
}
fn default_num_classes() -> usize {
    3
}
fn default_extra_columns() -> usize {
    4
}
fn default_color_threshold() -> f32 {
    DEFAULT_COLOR_THRESHOLD
}
fn default_probability_epsilon() -> f64 {
    DEFAULT_PROBABILITY_EPSILON
}
fn default_palette() -> Vec<Color> {
    DEFAULT_PALETTE.to_vec()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            resolution: default_resolution(),
            num_classes: default_num_classes(),
            extra_columns: default_extra_columns(),
            color_threshold: default_color_threshold(),
            probability_epsilon: default_probability_epsilon(),
            palette: default_palette(),
        }
    }
}

impl Config {
    /// Reject settings the engine cannot work with.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.resolution.is_finite() && self.resolution > 0.0) {
            return Err(format!("resolution must be positive, got {}", self.resolution));
        }
        if self.num_classes == 0 {
            return Err("num_classes must be at least 1".to_string());
        }
        if self.extra_columns == 0 {
            return Err("extra_columns must be at least 1 (the class column)".to_string());
        }
        if !(self.color_threshold > 0.0 && self.color_threshold < 1.0) {
            return Err(format!(
                "color_threshold must lie in (0, 1), got {}",
                self.color_threshold
            ));
        }
        if !(self.probability_epsilon > 0.0 && self.probability_epsilon < 0.5) {
            return Err(format!(
                "probability_epsilon must lie in (0, 0.5), got {}",
                self.probability_epsilon
            ));
        }
        Ok(())
    }
}

/// Return the path to `~/.semfuse/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".semfuse").join("config.toml")
}

/// Load the config from a specific path.  Returns `None` if the file does
/// not exist.
pub fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Load `path` (or the default location), fall back to defaults when the
/// file is absent, and validate the result.
pub fn resolve(path: Option<&Path>) -> Result<Config, String> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(config_path);
    let cfg = match load_from(&path)? {
        Some(cfg) => cfg,
        None => {
            let mut cfg = Config::default();
            apply_env_overrides(&mut cfg);
            cfg
        }
    };
    cfg.validate()?;
    Ok(cfg)
}

/// Apply `SEMFUSE_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `SEMFUSE_RESOLUTION` | `resolution` |
/// | `SEMFUSE_NUM_CLASSES` | `num_classes` |
/// | `SEMFUSE_COLOR_THRESHOLD` | `color_threshold` |
///
/// Values that fail to parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("SEMFUSE_RESOLUTION")
        && let Ok(res) = v.parse::<f64>()
    {
        cfg.resolution = res;
    }
    if let Ok(v) = std::env::var("SEMFUSE_NUM_CLASSES")
        && let Ok(k) = v.parse::<usize>()
    {
        cfg.num_classes = k;
    }
    if let Ok(v) = std::env::var("SEMFUSE_COLOR_THRESHOLD")
        && let Ok(t) = v.parse::<f32>()
    {
        cfg.color_threshold = t;
    }
}

/// Save the config to a specific path, creating the parent directory.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
