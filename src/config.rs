//! Run configuration shared by every product pipeline.
//!
//! Loaded from a JSON file; every field has a default so a partial file (or none)
//! is enough.

use crate::core::metadata::DEFAULT_AUTHORS;
use crate::types::{BoundingBox, GridError, GridResult, EARTH_RADIUS_M};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Shared settings for a processing run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegridConfig {
    /// Target domain
    pub bbox: BoundingBox,
    /// Sphere radius for cell areas, metres
    pub earth_radius_m: f64,
    /// Product version written into output names
    pub version: u32,
    pub authors: String,
    /// Top directory holding one sub-directory per source product
    pub input_root: PathBuf,
    /// Directory receiving every product
    pub output_dir: PathBuf,
    /// Write `redownload_<product>.txt` next to the output when files failed to open
    pub write_redownload_list: bool,
    /// Delete files that failed to open
    pub purge_corrupt: bool,
    /// Points per bounding-box edge when projecting it into another CRS
    pub densify_points: usize,
}

impl Default for RegridConfig {
    fn default() -> Self {
        Self {
            bbox: BoundingBox::EURO_CORDEX,
            earth_radius_m: EARTH_RADIUS_M,
            version: 1,
            authors: DEFAULT_AUTHORS.to_string(),
            input_root: PathBuf::from("."),
            output_dir: PathBuf::from("Europe/input/remote_sensing/vegetation"),
            write_redownload_list: true,
            purge_corrupt: false,
            densify_points: 21,
        }
    }
}

impl RegridConfig {
    pub fn from_json_str(content: &str) -> GridResult<Self> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> GridResult<Self> {
        log::info!("Loading configuration: {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn validate(&self) -> GridResult<()> {
        BoundingBox::new(self.bbox.min_lon, self.bbox.max_lon, self.bbox.min_lat, self.bbox.max_lat)?;
        if !(self.earth_radius_m > 0.0) {
            return Err(GridError::Config(format!("Earth radius must be positive, got {}", self.earth_radius_m)));
        }
        if self.version == 0 {
            return Err(GridError::Config("Product version starts at 1".to_string()));
        }
        if self.densify_points == 0 {
            return Err(GridError::Config("densify_points must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Input directory of one source product
    pub fn input_dir(&self, product_dir: &str) -> PathBuf {
        self.input_root.join(product_dir)
    }

    pub fn to_json(&self) -> GridResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
