//! [`VisionPipeline`] – once-per-cycle camera gating and fusion.
//!
//! ```text
//!  VisionSource ──read_inputs──▶ VisionInputs
//!                                   │  per camera
//!                                   ▼
//!                 megatag ladder ──ok──▶ estimate (σ ÷ quality)
//!                      │ rejected
//!                      ▼
//!                 gyro ladder ────ok──▶ estimate (prior heading, σθ = large)
//!                                   │
//!         one estimate ─────────────┤
//!         two estimates ──fuse──────┤
//!                                   ▼
//!                      RobotState::accept_vision_estimate
//! ```
//!
//! Nothing in a cycle is fatal.  Every rejection is recorded in the returned
//! [`CycleReport`] and logged at `debug`; the cycle simply ends without a
//! correction.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use fieldpose_state::RobotState;
//! use fieldpose_vision::{ScriptedVisionSource, TagLayout, VisionConfig, VisionPipeline};
//!
//! let state = Arc::new(RobotState::new(Box::new(|_| {})));
//! let mut pipeline = VisionPipeline::new(
//!     Box::new(ScriptedVisionSource::new()),
//!     Arc::clone(&state),
//!     Arc::new(TagLayout::empty()),
//!     VisionConfig::default(),
//! );
//!
//! let report = pipeline.run_cycle();
//! assert!(report.accepted.is_none());
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use fieldpose_state::RobotState;
use fieldpose_types::{
    CameraId, CameraObservation, MegatagPoseEstimate, Pose2d, StdDevs, VisionEstimate,
    VisionInputs,
};
use tracing::{debug, info};

use crate::config::{EstimatorMode, VisionConfig};
use crate::fusion::fuse_estimates;
use crate::gates::{GateInput, GateLadder, Rejection};
use crate::layout::FieldLayout;
use crate::transport::{VisionSource, read_inputs};

// ────────────────────────────────────────────────────────────────────────────
// Cycle report
// ────────────────────────────────────────────────────────────────────────────

/// Which ladder produced an accepted single-camera estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstimatePath {
    Megatag,
    Gyro,
}

/// What happened to one camera this cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum CameraOutcome {
    /// Vision was disabled; the camera was not evaluated.
    Skipped,
    NotVisible,
    Rejected {
        megatag: Rejection,
        gyro: Rejection,
    },
    Accepted {
        path: EstimatePath,
        estimate: VisionEstimate,
    },
}

impl CameraOutcome {
    pub fn estimate(&self) -> Option<&VisionEstimate> {
        match self {
            CameraOutcome::Accepted { estimate, .. } => Some(estimate),
            _ => None,
        }
    }

    pub fn path(&self) -> Option<EstimatePath> {
        match self {
            CameraOutcome::Accepted { path, .. } => Some(*path),
            _ => None,
        }
    }
}

/// Summary of one [`VisionPipeline::run_cycle`].
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub used_vision: bool,
    /// Cameras whose transport read faulted.
    pub transport_faults: usize,
    pub camera_a: CameraOutcome,
    pub camera_b: CameraOutcome,
    /// The estimate forwarded to the ledger, if any.
    pub accepted: Option<VisionEstimate>,
    /// `true` when `accepted` is the fusion of both cameras.
    pub fused: bool,
    pub latency: Duration,
}

impl CycleReport {
    pub fn camera(&self, id: CameraId) -> &CameraOutcome {
        match id {
            CameraId::A => &self.camera_a,
            CameraId::B => &self.camera_b,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// VisionPipeline
// ────────────────────────────────────────────────────────────────────────────

pub struct VisionPipeline {
    source: Box<dyn VisionSource>,
    state: Arc<RobotState>,
    layout: Arc<dyn FieldLayout>,
    config: VisionConfig,
    megatag_gates: GateLadder,
    gyro_gates: GateLadder,
    use_vision: AtomicBool,
    inputs: VisionInputs,
}

impl VisionPipeline {
    pub fn new(
        source: Box<dyn VisionSource>,
        state: Arc<RobotState>,
        layout: Arc<dyn FieldLayout>,
        config: VisionConfig,
    ) -> Self {
        Self {
            megatag_gates: GateLadder::megatag(&config),
            gyro_gates: GateLadder::gyro(&config, Arc::clone(&layout)),
            use_vision: AtomicBool::new(config.enabled),
            source,
            state,
            layout,
            config,
            inputs: VisionInputs::default(),
        }
    }

    /// Turn the whole pipeline on or off at runtime.
    pub fn set_use_vision(&self, enabled: bool) {
        self.use_vision.store(enabled, Ordering::Release);
    }

    pub fn use_vision(&self) -> bool {
        self.use_vision.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &VisionConfig {
        &self.config
    }

    /// Snapshots read during the last cycle.
    pub fn inputs(&self) -> &VisionInputs {
        &self.inputs
    }

    /// Read both cameras, gate, fuse, and forward at most one estimate to the
    /// ledger.
    pub fn run_cycle(&mut self) -> CycleReport {
        let start = Instant::now();
        let transport_faults = read_inputs(self.source.as_mut(), &mut self.inputs);
        for camera in CameraId::ALL {
            log_camera_inputs(camera, self.inputs.camera(camera));
        }

        if !self.use_vision() {
            let latency = start.elapsed();
            debug!(
                using_vision = false,
                exclusive_tag = self.state.exclusive_tag().unwrap_or(-1),
                latency_sec = latency.as_secs_f64(),
                "vision cycle skipped"
            );
            return CycleReport {
                used_vision: false,
                transport_faults,
                camera_a: CameraOutcome::Skipped,
                camera_b: CameraOutcome::Skipped,
                accepted: None,
                fused: false,
                latency,
            };
        }

        let camera_a = self.process_camera(CameraId::A);
        let camera_b = self.process_camera(CameraId::B);

        let (accepted, fused) = match (camera_a.estimate(), camera_b.estimate()) {
            (Some(a), Some(b)) => (
                Some(fuse_estimates(
                    a,
                    b,
                    &self.state,
                    self.config.fusion_alignment,
                    self.config.large_variance,
                )),
                true,
            ),
            (Some(only), None) | (None, Some(only)) => (Some(only.clone()), false),
            (None, None) => (None, false),
        };

        if let Some(estimate) = &accepted {
            info!(
                fused,
                x = estimate.pose.x,
                y = estimate.pose.y,
                heading = estimate.pose.heading,
                timestamp = estimate.timestamp_seconds,
                tags = estimate.tag_count,
                "vision estimate accepted"
            );
            self.state.accept_vision_estimate(estimate);
        }

        let latency = start.elapsed();
        debug!(
            using_vision = true,
            exclusive_tag = self.state.exclusive_tag().unwrap_or(-1),
            latency_sec = latency.as_secs_f64(),
            "vision cycle complete"
        );

        CycleReport {
            used_vision: true,
            transport_faults,
            camera_a,
            camera_b,
            accepted,
            fused,
            latency,
        }
    }

    // ── per camera ──────────────────────────────────────────────────────────

    fn process_camera(&self, id: CameraId) -> CameraOutcome {
        let camera = self.inputs.camera(id);
        if !camera.sees_target {
            return CameraOutcome::NotVisible;
        }
        let Some(estimate) = self.selected_estimate(camera) else {
            debug!(camera = id.label(), "no pose estimate for configured mode");
            return CameraOutcome::Rejected {
                megatag: Rejection::NoEstimate,
                gyro: Rejection::NoEstimate,
            };
        };

        let input = GateInput {
            camera,
            estimate,
            state: &self.state,
        };

        let megatag = match self.megatag_estimate(&input) {
            Ok(accepted) => {
                debug!(camera = id.label(), path = "megatag", "camera estimate accepted");
                return CameraOutcome::Accepted {
                    path: EstimatePath::Megatag,
                    estimate: accepted,
                };
            }
            Err(reason) => reason,
        };
        debug!(camera = id.label(), path = "megatag", reason = %megatag, "rejected");

        match self.gyro_estimate(&input) {
            Ok(accepted) => {
                debug!(camera = id.label(), path = "gyro", "camera estimate accepted");
                CameraOutcome::Accepted {
                    path: EstimatePath::Gyro,
                    estimate: accepted,
                }
            }
            Err(gyro) => {
                debug!(camera = id.label(), path = "gyro", reason = %gyro, "rejected");
                CameraOutcome::Rejected { megatag, gyro }
            }
        }
    }

    fn selected_estimate<'a>(
        &self,
        camera: &'a CameraObservation,
    ) -> Option<&'a MegatagPoseEstimate> {
        match self.config.estimator_mode {
            EstimatorMode::Megatag1 => camera.megatag.as_ref(),
            EstimatorMode::Megatag2 => camera.megatag2.as_ref(),
        }
    }

    /// The camera's own solve, with σ scaled by `1 / quality`.
    fn megatag_estimate(&self, input: &GateInput<'_>) -> Result<VisionEstimate, Rejection> {
        self.megatag_gates.evaluate(input)?;

        let estimate = input.estimate;
        if !(estimate.quality.is_finite() && estimate.quality > 0.0) {
            return Err(Rejection::BadQuality(estimate.quality));
        }
        let scale = 1.0 / estimate.quality;
        let indices = self.config.estimator_mode.std_dev_indices();
        let x_std = std_dev(input.camera, indices.x)? * scale;
        let y_std = std_dev(input.camera, indices.y)? * scale;
        let yaw_std = std_dev(input.camera, indices.yaw)? * scale;
        let xy_std = x_std.max(y_std);

        Ok(VisionEstimate::new(
            estimate.field_to_robot,
            estimate.timestamp_seconds,
            StdDevs::new(xy_std, xy_std, yaw_std),
            estimate.tag_count(),
        ))
    }

    /// Position-only correction from a single tag, keeping the prior heading.
    ///
    /// σ is always read from the MegaTag1 x/y slots, whatever the estimator
    /// mode.
    fn gyro_estimate(&self, input: &GateInput<'_>) -> Result<VisionEstimate, Rejection> {
        self.gyro_gates.evaluate(input)?;

        let estimate = input.estimate;
        let timestamp = estimate.timestamp_seconds;
        let prior = self
            .state
            .field_pose_at(timestamp)
            .ok_or(Rejection::NoPriorPose { timestamp })?;
        let tag_id = estimate
            .fiducial_ids
            .first()
            .copied()
            .ok_or(Rejection::NotSingleTag { count: 0 })?;
        let field_to_tag = self
            .layout
            .tag_pose(tag_id)
            .ok_or(Rejection::UnknownTag { id: tag_id })?
            .to_pose2d();

        let robot_to_tag = field_to_tag.relative_to(&estimate.field_to_robot);
        let position =
            field_to_tag.translation() - robot_to_tag.translation().rotate_by(prior.heading);
        let pose = Pose2d::from_translation(position, prior.heading);

        let indices = EstimatorMode::Megatag1.std_dev_indices();
        let xy_std = std_dev(input.camera, indices.x)?.max(std_dev(input.camera, indices.y)?);

        Ok(VisionEstimate::new(
            pose,
            timestamp,
            StdDevs::new(xy_std, xy_std, self.config.large_variance),
            estimate.tag_count(),
        ))
    }
}

/// A usable σ: present, finite and strictly positive.
fn std_dev(camera: &CameraObservation, index: usize) -> Result<f64, Rejection> {
    let value = camera.std_dev(index).map_err(|_| Rejection::MissingStdDev {
        index,
        len: camera.std_devs.len(),
    })?;
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(Rejection::InvalidStdDev { index, value })
    }
}

fn log_camera_inputs(id: CameraId, camera: &CameraObservation) {
    let megatag = camera.megatag.as_ref().or(camera.megatag2.as_ref());
    debug!(
        camera = id.label(),
        sees_target = camera.sees_target,
        megatag_count = camera.megatag_count,
        megatag2_count = camera.megatag2_count,
        fiducial_count = camera.fiducials.len(),
        quality = megatag.map(|m| m.quality),
        avg_tag_area = megatag.map(|m| m.avg_tag_area),
        z = camera.pose3d.map(|p| p.z),
        "camera inputs"
    );
}
