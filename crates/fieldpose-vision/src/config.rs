//! Tuning knobs for the vision pipeline.
//!
//! Every field has a serde default, so an empty `[vision]` table (or none at
//! all) yields the competition-tuned values.

use serde::{Deserialize, Serialize};

/// Which camera-side solver output is gated and fused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorMode {
    /// Full multi-tag solve; heading comes from the tags.
    #[default]
    Megatag1,
    /// Solve seeded with the gyro heading.
    Megatag2,
}

/// Positions of the x, y and yaw standard deviations in a camera's
/// twelve-entry vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StdDevIndices {
    pub x: usize,
    pub y: usize,
    pub yaw: usize,
}

impl EstimatorMode {
    pub fn std_dev_indices(&self) -> StdDevIndices {
        match self {
            EstimatorMode::Megatag1 => StdDevIndices { x: 0, y: 1, yaw: 5 },
            EstimatorMode::Megatag2 => StdDevIndices { x: 6, y: 7, yaw: 11 },
        }
    }
}

/// How two same-cycle estimates are aligned before averaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionAlignment {
    /// Average the poses as reported.
    #[default]
    Raw,
    /// Carry the earlier estimate forward by the odometry delta between the
    /// two capture times, then average.
    ProjectEarlier,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisionConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub estimator_mode: EstimatorMode,
    #[serde(default)]
    pub fusion_alignment: FusionAlignment,
    /// Single-tag solves with any tag above this ambiguity are dropped.
    #[serde(default = "default_ambiguity_threshold")]
    pub ambiguity_threshold: f64,
    /// Minimum average tag area (% of image) for a single-tag solve.
    #[serde(default = "default_single_tag_min_area")]
    pub single_tag_min_area: f64,
    /// Below this area a single-tag solve must also agree with the prior
    /// heading.
    #[serde(default = "default_yaw_check_area")]
    pub yaw_check_area: f64,
    #[serde(default = "default_yaw_tolerance_deg")]
    pub yaw_tolerance_deg: f64,
    /// Metres.
    #[serde(default = "default_z_tolerance")]
    pub z_tolerance: f64,
    /// Metres from the field origin.
    #[serde(default = "default_min_norm")]
    pub min_norm: f64,
    /// Variance treated as "no information".
    #[serde(default = "default_large_variance")]
    pub large_variance: f64,
    #[serde(default = "default_gyro_lookback_seconds")]
    pub gyro_lookback_seconds: f64,
    /// rad/s
    #[serde(default = "default_gyro_max_yaw_rate")]
    pub gyro_max_yaw_rate: f64,
}

fn default_enabled() -> bool {
    true
}

fn default_ambiguity_threshold() -> f64 {
    0.19
}

fn default_single_tag_min_area() -> f64 {
    1.0
}

fn default_yaw_check_area() -> f64 {
    2.0
}

fn default_yaw_tolerance_deg() -> f64 {
    5.0
}

fn default_z_tolerance() -> f64 {
    0.2
}

fn default_min_norm() -> f64 {
    1.0
}

fn default_large_variance() -> f64 {
    1e6
}

fn default_gyro_lookback_seconds() -> f64 {
    0.3
}

fn default_gyro_max_yaw_rate() -> f64 {
    5.0
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            estimator_mode: EstimatorMode::default(),
            fusion_alignment: FusionAlignment::default(),
            ambiguity_threshold: default_ambiguity_threshold(),
            single_tag_min_area: default_single_tag_min_area(),
            yaw_check_area: default_yaw_check_area(),
            yaw_tolerance_deg: default_yaw_tolerance_deg(),
            z_tolerance: default_z_tolerance(),
            min_norm: default_min_norm(),
            large_variance: default_large_variance(),
            gyro_lookback_seconds: default_gyro_lookback_seconds(),
            gyro_max_yaw_rate: default_gyro_max_yaw_rate(),
        }
    }
}
