// src/config.rs - Run parameters for the proximity engine, loaded from TOML

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{ProximityError, Result};

/// Configuration for a proximity run
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    pub input_path: String,
    pub output_base_dir: String,

    /// Physical length per pixel (um / px)
    #[serde(default = "default_x_y_ratio")]
    pub x_y_ratio: f64,

    /// Maximum centroid distance for a candidate pair, in physical units
    #[serde(default = "default_max_distance")]
    pub max_distance: f64,

    /// Objects must have strictly more pixels than this
    #[serde(default = "default_min_area")]
    pub min_area: u32,

    /// Threshold as a fraction of the frame maximum
    #[serde(default = "default_th_percentage")]
    pub th_percentage: f64,

    /// Number of closest point pairs averaged for the average distance
    #[serde(default = "default_average_k")]
    pub average_k: usize,

    #[serde(default = "default_roi_padding")]
    pub roi_padding: u32,

    /// Merged ROIs larger than this on either axis are not painted into the mask
    #[serde(default = "default_roi_paint_cap")]
    pub roi_paint_cap: u32,

    /// Size cap used by ROI map consumers
    #[serde(default = "default_roi_map_cap")]
    pub roi_map_cap: u32,

    #[serde(default)]
    pub structuring_element: StructuringElement,

    #[serde(default = "default_kernel_radius")]
    pub kernel_radius: u8,

    #[serde(default)]
    pub connectivity: Connectivity2d,

    #[serde(default)]
    pub pairing: PairingMode,

    /// Channel token sorted last inside a file group (channel B)
    #[serde(default = "default_reference_channel")]
    pub reference_channel: String,

    #[serde(default = "default_parallel")]
    pub use_parallel: bool,

    /// Write preprocessed stacks and the mask volume next to the results
    #[serde(default = "default_save_filtered")]
    pub save_filtered: bool,

    /// Optional 3D persistence filter applied to the binarized stacks
    #[serde(default)]
    pub persistence: Option<PersistenceFilter>,

    /// Physical depth per frame, used for volume densities
    #[serde(default = "default_z_ratio")]
    pub z_ratio: f64,

    /// Density threshold as a fraction of the frame maximum
    #[serde(default)]
    pub density_th_percentage: f64,

    /// Neighbourhood of the objects counted for the volume density
    #[serde(default = "default_density_connectivity")]
    pub density_connectivity: Connectivity3d,
}

/// Structuring element of the opening/closing pass
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StructuringElement {
    /// 3x3 ellipse, i.e. a plus shape
    #[default]
    Cross,
    /// 3x3 square
    Square,
}

/// 2D neighbourhood used for frame labeling
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity2d {
    #[default]
    Four,
    Eight,
}

/// 3D neighbourhood used for volume labeling
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity3d {
    Six,
    #[default]
    TwentySix,
}

/// How objects of the two channels are paired inside a frame
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PairingMode {
    /// Every A x B combination inside the centroid budget
    #[default]
    AllPairs,
    /// Only the largest object of each channel, no centroid budget
    LargestObject,
}

/// Keep only binary components that persist through several frames
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PersistenceFilter {
    #[serde(default)]
    pub connectivity: Connectivity3d,

    #[serde(default = "default_min_frames")]
    pub min_frames: usize,

    #[serde(default = "default_min_voxels")]
    pub min_voxels: usize,

    #[serde(default = "default_max_voxels")]
    pub max_voxels: usize,
}

impl Default for PersistenceFilter {
    fn default() -> Self {
        Self {
            connectivity: Connectivity3d::TwentySix,
            min_frames: default_min_frames(),
            min_voxels: default_min_voxels(),
            max_voxels: default_max_voxels(),
        }
    }
}

fn default_x_y_ratio() -> f64 {
    0.008
}

fn default_max_distance() -> f64 {
    0.2
}

fn default_min_area() -> u32 {
    6
}

fn default_th_percentage() -> f64 {
    0.9
}

fn default_average_k() -> usize {
    5
}

fn default_roi_padding() -> u32 {
    10
}

fn default_roi_paint_cap() -> u32 {
    200
}

fn default_roi_map_cap() -> u32 {
    1000
}

fn default_kernel_radius() -> u8 {
    1
}

fn default_reference_channel() -> String {
    "SYPH".to_string()
}

fn default_parallel() -> bool {
    true
}

fn default_save_filtered() -> bool {
    true
}

fn default_min_frames() -> usize {
    2
}

fn default_min_voxels() -> usize {
    150
}

fn default_max_voxels() -> usize {
    99999
}

fn default_z_ratio() -> f64 {
    0.07
}

fn default_density_connectivity() -> Connectivity3d {
    Connectivity3d::Six
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_path: "./input".to_string(),
            output_base_dir: "./output".to_string(),
            x_y_ratio: default_x_y_ratio(),
            max_distance: default_max_distance(),
            min_area: default_min_area(),
            th_percentage: default_th_percentage(),
            average_k: default_average_k(),
            roi_padding: default_roi_padding(),
            roi_paint_cap: default_roi_paint_cap(),
            roi_map_cap: default_roi_map_cap(),
            structuring_element: StructuringElement::Cross,
            kernel_radius: default_kernel_radius(),
            connectivity: Connectivity2d::Four,
            pairing: PairingMode::AllPairs,
            reference_channel: default_reference_channel(),
            use_parallel: default_parallel(),
            save_filtered: default_save_filtered(),
            persistence: None,
            z_ratio: default_z_ratio(),
            density_th_percentage: 0.0,
            density_connectivity: default_density_connectivity(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ProximityError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;

        toml::from_str(&content).map_err(|source| ProximityError::ConfigLoad {
            source,
            path: path.to_path_buf(),
        })
    }

    /// Squared centroid budget in pixels
    pub fn max_distance_px_sq(&self) -> f64 {
        crate::candidate::max_distance_px_sq(self.max_distance, self.x_y_ratio)
    }

    /// Validate numeric parameters
    pub fn validate(&self) -> Result<()> {
        if !(self.x_y_ratio > 0.0) || !self.x_y_ratio.is_finite() {
            return Err(ProximityError::Config(
                "x_y_ratio must be a finite value > 0.0".to_string(),
            ));
        }

        if !(self.z_ratio > 0.0) || !self.z_ratio.is_finite() {
            return Err(ProximityError::Config(
                "z_ratio must be a finite value > 0.0".to_string(),
            ));
        }

        if !(self.max_distance >= 0.0) || !self.max_distance.is_finite() {
            return Err(ProximityError::Config(
                "max_distance must be a finite value >= 0.0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.th_percentage) {
            return Err(ProximityError::Config(
                "th_percentage must be between 0.0 and 1.0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.density_th_percentage) {
            return Err(ProximityError::Config(
                "density_th_percentage must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.average_k == 0 {
            return Err(ProximityError::Config(
                "average_k must be > 0".to_string(),
            ));
        }

        // Smallest objects that can survive segmentation have min_area + 1 pixels;
        // an overflowing count bounds nothing
        let smallest_pair_count = (self.min_area as usize)
            .checked_add(1)
            .and_then(|n| n.checked_pow(2))
            .unwrap_or(usize::MAX);
        if self.average_k > smallest_pair_count {
            return Err(ProximityError::Config(format!(
                "average_k ({}) exceeds the point pairs of two minimal objects ({}); raise min_area or lower average_k",
                self.average_k, smallest_pair_count
            )));
        }

        if self.kernel_radius == 0 {
            return Err(ProximityError::Config(
                "kernel_radius must be > 0".to_string(),
            ));
        }

        if self.roi_paint_cap == 0 || self.roi_map_cap == 0 {
            return Err(ProximityError::Config(
                "roi_paint_cap and roi_map_cap must be > 0".to_string(),
            ));
        }

        if self.reference_channel.trim().is_empty() {
            return Err(ProximityError::Config(
                "reference_channel must not be empty".to_string(),
            ));
        }

        if let Some(filter) = &self.persistence {
            if filter.min_frames == 0 {
                return Err(ProximityError::Config(
                    "persistence.min_frames must be > 0".to_string(),
                ));
            }
            if filter.min_voxels > filter.max_voxels {
                return Err(ProximityError::Config(
                    "persistence.min_voxels must be <= persistence.max_voxels".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Check the input path and create the output directories
    pub fn prepare_paths(&self) -> Result<()> {
        let input_path = PathBuf::from(&self.input_path);
        if !input_path.exists() {
            return Err(ProximityError::InvalidPath(input_path));
        }

        let base_dir = PathBuf::from(&self.output_base_dir);
        fs::create_dir_all(&base_dir)?;
        if self.save_filtered {
            fs::create_dir_all(base_dir.join("Filtered"))?;
        }

        Ok(())
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            ProximityError::Config(format!("Failed to serialize config: {}", e))
        })?;

        fs::write(path, content)?;

        Ok(())
    }
}
