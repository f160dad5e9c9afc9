//! [`GateLadder`] – ordered plausibility checks for a camera's pose solve.
//!
//! A candidate is passed through every registered [`EstimateGate`] in order;
//! the first failure returns a [`Rejection`] and the remaining gates are not
//! evaluated.  Rejections are ordinary outcomes, not faults: the pipeline
//! logs them and moves on to the next camera.
//!
//! Two ladders are assembled from a [`VisionConfig`]:
//!
//! | Ladder | Gates, in order |
//! |---|---|
//! | [`GateLadder::megatag`] | stale timestamp, single-tag quality, minimum norm, planar height, exclusive tag, prior pose |
//! | [`GateLadder::gyro`] | stale timestamp, single tag only, yaw-rate stability, prior pose, tag in layout |
//!
//! # Example
//!
//! ```rust
//! use fieldpose_state::RobotState;
//! use fieldpose_types::{CameraObservation, MegatagPoseEstimate, Pose2d};
//! use fieldpose_vision::gates::{GateInput, GateLadder, Rejection, StaleTimestampGate};
//!
//! let state = RobotState::new(Box::new(|_| {}));
//! let mut ladder = GateLadder::new();
//! ladder.add_gate(Box::new(StaleTimestampGate));
//!
//! let estimate = MegatagPoseEstimate {
//!     field_to_robot: Pose2d::new(3.0, 0.0, 0.0),
//!     timestamp_seconds: 0.0,
//!     fiducial_ids: vec![1],
//!     avg_tag_area: 1.5,
//!     quality: 1.0,
//! };
//! let camera = CameraObservation::not_visible();
//! let input = GateInput { camera: &camera, estimate: &estimate, state: &state };
//! assert!(matches!(ladder.evaluate(&input), Err(Rejection::Stale { .. })));
//! ```

use std::sync::Arc;

use fieldpose_state::RobotState;
use fieldpose_types::{CameraObservation, MegatagPoseEstimate, angle_modulus};
use thiserror::Error;

use crate::config::VisionConfig;
use crate::layout::FieldLayout;

// ────────────────────────────────────────────────────────────────────────────
// Rejection reasons
// ────────────────────────────────────────────────────────────────────────────

/// Why a candidate estimate was not accepted.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Rejection {
    #[error("camera reports no target")]
    NoTarget,

    #[error("camera produced no pose estimate for the configured mode")]
    NoEstimate,

    #[error("timestamp {timestamp} not newer than last accepted {last_accepted}")]
    Stale { timestamp: f64, last_accepted: f64 },

    #[error("tag {tag} ambiguity {ambiguity} above {threshold}")]
    Ambiguous {
        tag: i32,
        ambiguity: f64,
        threshold: f64,
    },

    #[error("average tag area {area} below {minimum}")]
    AreaTooSmall { area: f64, minimum: f64 },

    #[error("heading differs from prior by {diff_deg:.2}°")]
    YawMismatch { diff_deg: f64 },

    #[error("distance from origin {norm} below {minimum}")]
    NormTooSmall { norm: f64, minimum: f64 },

    #[error("no raw 3-D pose to check height against")]
    MissingPose3d,

    #[error("height {z} exceeds tolerance {tolerance}")]
    OutOfPlane { z: f64, tolerance: f64 },

    #[error("exclusive tag {tag} not observed")]
    ExclusiveTagMissing { tag: i32 },

    #[error("no prior pose at {timestamp}")]
    NoPriorPose { timestamp: f64 },

    #[error("{count} tags seen; path accepts one")]
    NotSingleTag { count: usize },

    #[error("no yaw-rate samples in the lookback window")]
    NoYawRateData,

    #[error("yaw rate {yaw_rate} rad/s above {limit}")]
    Spinning { yaw_rate: f64, limit: f64 },

    #[error("tag {id} not in field layout")]
    UnknownTag { id: i32 },

    #[error("solver quality {0} is not usable")]
    BadQuality(f64),

    #[error("standard deviation index {index} missing (vector has {len} entries)")]
    MissingStdDev { index: usize, len: usize },

    #[error("standard deviation {value} at index {index} is not positive and finite")]
    InvalidStdDev { index: usize, value: f64 },
}

// ────────────────────────────────────────────────────────────────────────────
// Gate trait
// ────────────────────────────────────────────────────────────────────────────

/// Everything a gate may look at for one candidate.
#[derive(Clone, Copy)]
pub struct GateInput<'a> {
    pub camera: &'a CameraObservation,
    pub estimate: &'a MegatagPoseEstimate,
    pub state: &'a RobotState,
}

/// A single plausibility check.
pub trait EstimateGate: Send + Sync {
    /// Short name used in debug logs.
    fn name(&self) -> &str;

    fn check(&self, input: &GateInput<'_>) -> Result<(), Rejection>;
}

// ────────────────────────────────────────────────────────────────────────────
// GateLadder
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct GateLadder {
    gates: Vec<Box<dyn EstimateGate>>,
}

impl GateLadder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a gate.  Gates run in insertion order.
    pub fn add_gate(&mut self, gate: Box<dyn EstimateGate>) {
        self.gates.push(gate);
    }

    /// Gates for a camera's own multi/single-tag solve.
    pub fn megatag(config: &VisionConfig) -> Self {
        let mut ladder = Self::new();
        ladder.add_gate(Box::new(StaleTimestampGate));
        ladder.add_gate(Box::new(SingleTagGate {
            ambiguity_threshold: config.ambiguity_threshold,
            min_area: config.single_tag_min_area,
            yaw_check_area: config.yaw_check_area,
            yaw_tolerance_rad: config.yaw_tolerance_deg.to_radians(),
        }));
        ladder.add_gate(Box::new(MinNormGate {
            min_norm: config.min_norm,
        }));
        ladder.add_gate(Box::new(PlanarHeightGate {
            tolerance: config.z_tolerance,
        }));
        ladder.add_gate(Box::new(ExclusiveTagGate));
        ladder.add_gate(Box::new(PriorPoseGate));
        ladder
    }

    /// Gates for the single-tag gyro fallback.
    pub fn gyro(config: &VisionConfig, layout: Arc<dyn FieldLayout>) -> Self {
        let mut ladder = Self::new();
        ladder.add_gate(Box::new(StaleTimestampGate));
        ladder.add_gate(Box::new(SingleTagOnlyGate));
        ladder.add_gate(Box::new(YawRateGate {
            lookback_seconds: config.gyro_lookback_seconds,
            max_yaw_rate: config.gyro_max_yaw_rate,
        }));
        ladder.add_gate(Box::new(PriorPoseGate));
        ladder.add_gate(Box::new(TagInLayoutGate { layout }));
        ladder
    }

    pub fn len(&self) -> usize {
        self.gates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }

    /// Names of the registered gates, in evaluation order.
    pub fn gate_names(&self) -> Vec<&str> {
        self.gates.iter().map(|g| g.name()).collect()
    }

    /// Run every gate; the first rejection wins.
    pub fn evaluate(&self, input: &GateInput<'_>) -> Result<(), Rejection> {
        for gate in &self.gates {
            gate.check(input)?;
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Built-in gates
// ────────────────────────────────────────────────────────────────────────────

/// Rejects anything not strictly newer than the last accepted correction.
pub struct StaleTimestampGate;

impl EstimateGate for StaleTimestampGate {
    fn name(&self) -> &str {
        "stale_timestamp"
    }

    fn check(&self, input: &GateInput<'_>) -> Result<(), Rejection> {
        let timestamp = input.estimate.timestamp_seconds;
        let last_accepted = input.state.last_accepted_vision_timestamp();
        if timestamp <= last_accepted {
            return Err(Rejection::Stale {
                timestamp,
                last_accepted,
            });
        }
        Ok(())
    }
}

/// Extra scrutiny for solves from fewer than two tags.
pub struct SingleTagGate {
    pub ambiguity_threshold: f64,
    pub min_area: f64,
    /// Below this area the solve must also agree with the prior heading.
    pub yaw_check_area: f64,
    pub yaw_tolerance_rad: f64,
}

impl EstimateGate for SingleTagGate {
    fn name(&self) -> &str {
        "single_tag"
    }

    fn check(&self, input: &GateInput<'_>) -> Result<(), Rejection> {
        let estimate = input.estimate;
        if estimate.tag_count() >= 2 {
            return Ok(());
        }

        if let Some(fiducial) = input
            .camera
            .fiducials
            .iter()
            .find(|f| f.ambiguity > self.ambiguity_threshold)
        {
            return Err(Rejection::Ambiguous {
                tag: fiducial.id,
                ambiguity: fiducial.ambiguity,
                threshold: self.ambiguity_threshold,
            });
        }

        if estimate.avg_tag_area < self.min_area {
            return Err(Rejection::AreaTooSmall {
                area: estimate.avg_tag_area,
                minimum: self.min_area,
            });
        }

        if estimate.avg_tag_area < self.yaw_check_area
            && let Some(prior) = input.state.field_pose_at(estimate.timestamp_seconds)
        {
            let diff = angle_modulus(prior.heading - estimate.field_to_robot.heading).abs();
            if diff > self.yaw_tolerance_rad {
                return Err(Rejection::YawMismatch {
                    diff_deg: diff.to_degrees(),
                });
            }
        }
        Ok(())
    }
}

/// Rejects degenerate solves sitting at (or near) the field origin.
pub struct MinNormGate {
    pub min_norm: f64,
}

impl EstimateGate for MinNormGate {
    fn name(&self) -> &str {
        "min_norm"
    }

    fn check(&self, input: &GateInput<'_>) -> Result<(), Rejection> {
        let norm = input.estimate.field_to_robot.translation().norm();
        if norm < self.min_norm {
            return Err(Rejection::NormTooSmall {
                norm,
                minimum: self.min_norm,
            });
        }
        Ok(())
    }
}

/// The robot lives on the floor; a large solved Z means a bad solve.
pub struct PlanarHeightGate {
    pub tolerance: f64,
}

impl EstimateGate for PlanarHeightGate {
    fn name(&self) -> &str {
        "planar_height"
    }

    fn check(&self, input: &GateInput<'_>) -> Result<(), Rejection> {
        let pose3d = input.camera.pose3d.ok_or(Rejection::MissingPose3d)?;
        if pose3d.z.abs() > self.tolerance {
            return Err(Rejection::OutOfPlane {
                z: pose3d.z,
                tolerance: self.tolerance,
            });
        }
        Ok(())
    }
}

/// When the ledger names an exclusive tag, the solve must include it.
pub struct ExclusiveTagGate;

impl EstimateGate for ExclusiveTagGate {
    fn name(&self) -> &str {
        "exclusive_tag"
    }

    fn check(&self, input: &GateInput<'_>) -> Result<(), Rejection> {
        match input.state.exclusive_tag() {
            Some(tag) if !input.estimate.fiducial_ids.contains(&tag) => {
                Err(Rejection::ExclusiveTagMissing { tag })
            }
            _ => Ok(()),
        }
    }
}

/// The pose history must be able to answer for the capture time.
pub struct PriorPoseGate;

impl EstimateGate for PriorPoseGate {
    fn name(&self) -> &str {
        "prior_pose"
    }

    fn check(&self, input: &GateInput<'_>) -> Result<(), Rejection> {
        let timestamp = input.estimate.timestamp_seconds;
        match input.state.field_pose_at(timestamp) {
            Some(_) => Ok(()),
            None => Err(Rejection::NoPriorPose { timestamp }),
        }
    }
}

/// The gyro fallback only handles a single tag.
pub struct SingleTagOnlyGate;

impl EstimateGate for SingleTagOnlyGate {
    fn name(&self) -> &str {
        "single_tag_only"
    }

    fn check(&self, input: &GateInput<'_>) -> Result<(), Rejection> {
        let count = input.estimate.tag_count();
        if count > 1 {
            return Err(Rejection::NotSingleTag { count });
        }
        Ok(())
    }
}

/// Rejects solves captured while the robot was spinning.
///
/// The window is `[t − lookback, t)`; an empty window counts as unstable.
pub struct YawRateGate {
    pub lookback_seconds: f64,
    pub max_yaw_rate: f64,
}

impl EstimateGate for YawRateGate {
    fn name(&self) -> &str {
        "yaw_rate"
    }

    fn check(&self, input: &GateInput<'_>) -> Result<(), Rejection> {
        let t = input.estimate.timestamp_seconds;
        let yaw_rate = input
            .state
            .max_abs_yaw_rate_in_window(t - self.lookback_seconds, t)
            .ok_or(Rejection::NoYawRateData)?;
        if yaw_rate.abs() > self.max_yaw_rate {
            return Err(Rejection::Spinning {
                yaw_rate,
                limit: self.max_yaw_rate,
            });
        }
        Ok(())
    }
}

/// The single observed tag must have a known field pose.
pub struct TagInLayoutGate {
    pub layout: Arc<dyn FieldLayout>,
}

impl EstimateGate for TagInLayoutGate {
    fn name(&self) -> &str {
        "tag_in_layout"
    }

    fn check(&self, input: &GateInput<'_>) -> Result<(), Rejection> {
        let id = input
            .estimate
            .fiducial_ids
            .first()
            .copied()
            .ok_or(Rejection::NotSingleTag { count: 0 })?;
        match self.layout.tag_pose(id) {
            Some(_) => Ok(()),
            None => Err(Rejection::UnknownTag { id }),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
