//! Drivetrain and gyro input for the control loop.
//!
//! [`DriveSource`] is the seam to the hardware layer: once per tick it
//! reports the odometry pose and a [`MotionSample`].  [`SimDriveSource`]
//! integrates a constant chassis velocity instead, and can also script
//! matching camera frames into a [`ScriptedVisionSource`] so the whole stack
//! runs without hardware.

use fieldpose_state::{MotionSample, VelocityRegisters};
use fieldpose_types::{
    CameraId, CameraObservation, ChassisSpeeds, EXPECTED_STD_DEV_LEN, FieldPoseError,
    FiducialObservation, MegatagPoseEstimate, Pose2d, Pose3d, RobotFrame,
};
use fieldpose_vision::ScriptedVisionSource;

/// One tick of drivetrain data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriveSample {
    /// Odometry pose (subject to drift).
    pub pose: Pose2d,
    pub motion: MotionSample,
}

/// Supplies odometry and gyro data once per tick.
pub trait DriveSource: Send {
    fn sample(&mut self, timestamp: f64) -> Result<DriveSample, FieldPoseError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Simulation
// ────────────────────────────────────────────────────────────────────────────

/// Capture delay applied to simulated camera frames.
const SIM_CAMERA_LATENCY_SEC: f64 = 0.03;

struct VisionFeed {
    feeder: ScriptedVisionSource,
    every_n_ticks: u64,
}

/// Constant-velocity drivetrain with optional odometry drift.
pub struct SimDriveSource {
    truth: Pose2d,
    odometry: Pose2d,
    speeds: ChassisSpeeds<RobotFrame>,
    /// Odometry over-reports translation by this factor.
    drift: f64,
    last_time: Option<f64>,
    ticks: u64,
    vision: Option<VisionFeed>,
}

impl SimDriveSource {
    pub fn new(start: Pose2d, speeds: ChassisSpeeds<RobotFrame>) -> Self {
        Self {
            truth: start,
            odometry: start,
            speeds,
            drift: 1.0,
            last_time: None,
            ticks: 0,
            vision: None,
        }
    }

    pub fn with_drift(mut self, drift: f64) -> Self {
        self.drift = drift;
        self
    }

    /// Push a camera frame of the true pose every `every_n_ticks` ticks,
    /// alternating between the two cameras.
    pub fn with_vision_feed(mut self, feeder: ScriptedVisionSource, every_n_ticks: u64) -> Self {
        self.vision = Some(VisionFeed {
            feeder,
            every_n_ticks: every_n_ticks.max(1),
        });
        self
    }

    pub fn truth(&self) -> Pose2d {
        self.truth
    }

    fn feed_camera(&self, timestamp: f64) {
        let Some(feed) = &self.vision else {
            return;
        };
        if self.ticks % feed.every_n_ticks != 0 {
            return;
        }
        let capture_time = (timestamp - SIM_CAMERA_LATENCY_SEC).max(0.0);
        let camera = if (self.ticks / feed.every_n_ticks) % 2 == 0 {
            CameraId::A
        } else {
            CameraId::B
        };
        feed.feeder
            .push_frame(camera, simulated_frame(self.truth, capture_time));
    }
}

impl DriveSource for SimDriveSource {
    fn sample(&mut self, timestamp: f64) -> Result<DriveSample, FieldPoseError> {
        if !timestamp.is_finite() || timestamp < 0.0 {
            return Err(FieldPoseError::InvalidTimestamp(timestamp));
        }
        let dt = self
            .last_time
            .map_or(0.0, |last| (timestamp - last).max(0.0));
        self.last_time = Some(timestamp);
        self.ticks += 1;

        let twist = self.speeds.to_twist(dt);
        self.truth = self.truth.exp(&twist);
        let mut drifted = twist;
        drifted.dx *= self.drift;
        drifted.dy *= self.drift;
        self.odometry = self.odometry.exp(&drifted);

        self.feed_camera(timestamp);

        let field = self.speeds.to_field_relative(self.odometry.heading);
        Ok(DriveSample {
            pose: self.odometry,
            motion: MotionSample {
                yaw_rate: self.speeds.omega,
                velocities: VelocityRegisters {
                    desired_robot: self.speeds,
                    desired_field: field,
                    measured_robot: self.speeds,
                    measured_field: field,
                    fused_field: field,
                },
                ..MotionSample::default()
            },
        })
    }
}

/// A clean two-tag solve of `pose`.
fn simulated_frame(pose: Pose2d, capture_time: f64) -> CameraObservation {
    let mut std_devs = vec![0.5; EXPECTED_STD_DEV_LEN];
    std_devs[0] = 0.3;
    std_devs[1] = 0.3;
    let fiducial = |id| FiducialObservation {
        id,
        horizontal_angle_deg: 0.0,
        vertical_angle_deg: 0.0,
        ambiguity: 0.05,
        area: 2.5,
    };
    CameraObservation {
        sees_target: true,
        fiducials: vec![fiducial(1), fiducial(2)],
        megatag: Some(MegatagPoseEstimate {
            field_to_robot: pose,
            timestamp_seconds: capture_time,
            fiducial_ids: vec![1, 2],
            avg_tag_area: 2.5,
            quality: 1.0,
        }),
        megatag_count: 1,
        pose3d: Some(Pose3d::new(pose.x, pose.y, 0.0, 0.0, 0.0, pose.heading)),
        std_devs,
        ..CameraObservation::default()
    }
}
