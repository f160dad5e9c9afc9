//! [`RobotState`] – the shared kinematic and pose ledger.
//!
//! One instance is created at startup and shared (`Arc<RobotState>`) between
//! the control loop, which is the only writer, and any number of readers
//! (command threads predicting a future pose, loggers, tests).
//!
//! # Layout
//!
//! ```text
//!   pose history       TimeIndexedHistory<Pose2d>   (screw-motion blend)
//!   yaw/pitch/roll rate TimeIndexedHistory<f64>     (linear blend)
//!   pitch / roll       TimeIndexedHistory<f64>
//!   accel x / y        TimeIndexedHistory<f64>
//!   velocities         RwLock<VelocityRegisters>    (swapped as one unit)
//!   flags / counters   atomics
//! ```
//!
//! Accepted vision corrections are *not* written into the pose history.  They
//! are recorded as "last accepted" and forwarded to the registered
//! [`VisionEstimateConsumer`], which owns the actual odometry/vision filter.
//!
//! # Example
//!
//! ```rust
//! use fieldpose_state::RobotState;
//! use fieldpose_types::Pose2d;
//!
//! let state = RobotState::new(Box::new(|_estimate| {}));
//! state.record_odometry(0.02, Pose2d::new(1.0, 0.0, 0.0)).unwrap();
//! assert_eq!(state.latest_field_pose().map(|(t, _)| t), Some(0.02));
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

use fieldpose_types::{
    ChassisSpeeds, FieldFrame, FieldPoseError, Pose2d, RobotFrame, VisionEstimate,
};
use parking_lot::RwLock;
use tracing::debug;

use crate::history::TimeIndexedHistory;

/// Default retention window of every history, in seconds.
pub const LOOKBACK_TIME_SEC: f64 = 1.0;

/// Stored in the exclusive-tag register when no tag is required.
const NO_EXCLUSIVE_TAG: i64 = i64::MIN;

/// Handler invoked with every accepted vision estimate.
pub type VisionEstimateConsumer = Box<dyn Fn(&VisionEstimate) + Send + Sync>;

// ────────────────────────────────────────────────────────────────────────────
// Collaborators
// ────────────────────────────────────────────────────────────────────────────

/// Answers "are we on the red alliance?" for field-relative sign conventions.
pub trait AllianceProvider: Send + Sync {
    fn is_red_alliance(&self) -> bool;
}

impl<F> AllianceProvider for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn is_red_alliance(&self) -> bool {
        self()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Per-cycle inputs
// ────────────────────────────────────────────────────────────────────────────

/// Chassis velocities captured in one control cycle.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VelocityRegisters {
    pub desired_robot: ChassisSpeeds<RobotFrame>,
    pub desired_field: ChassisSpeeds<FieldFrame>,
    pub measured_robot: ChassisSpeeds<RobotFrame>,
    pub measured_field: ChassisSpeeds<FieldFrame>,
    pub fused_field: ChassisSpeeds<FieldFrame>,
}

/// Everything the gyro and drivetrain report for one control cycle.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MotionSample {
    /// rad/s
    pub roll_rate: f64,
    /// rad/s
    pub pitch_rate: f64,
    /// rad/s
    pub yaw_rate: f64,
    /// rad
    pub pitch: f64,
    /// rad
    pub roll: f64,
    /// m/s²
    pub accel_x: f64,
    /// m/s²
    pub accel_y: f64,
    pub velocities: VelocityRegisters,
}

// ────────────────────────────────────────────────────────────────────────────
// RobotState
// ────────────────────────────────────────────────────────────────────────────

/// Single authoritative, concurrently readable ledger of robot pose and
/// kinematic history.
pub struct RobotState {
    field_to_robot: TimeIndexedHistory<Pose2d>,
    yaw_rate: TimeIndexedHistory<f64>,
    pitch_rate: TimeIndexedHistory<f64>,
    roll_rate: TimeIndexedHistory<f64>,
    pitch: TimeIndexedHistory<f64>,
    roll: TimeIndexedHistory<f64>,
    accel_x: TimeIndexedHistory<f64>,
    accel_y: TimeIndexedHistory<f64>,

    velocities: RwLock<VelocityRegisters>,
    last_vision: RwLock<(f64, Pose2d)>,

    iteration: AtomicU64,
    path_cancel: AtomicBool,
    auto_start_time: AtomicU64,
    exclusive_tag: AtomicI64,

    vision_consumer: VisionEstimateConsumer,
    alliance: Option<Box<dyn AllianceProvider>>,
}

impl RobotState {
    /// Create a ledger with the default one-second retention.
    pub fn new(vision_consumer: VisionEstimateConsumer) -> Self {
        Self::with_retention(LOOKBACK_TIME_SEC, vision_consumer)
    }

    /// Create a ledger whose histories keep `retention_seconds` of samples.
    ///
    /// The pose history is seeded with the identity pose and the yaw-rate
    /// history with zero, both at `t = 0`.
    pub fn with_retention(
        retention_seconds: f64,
        vision_consumer: VisionEstimateConsumer,
    ) -> Self {
        Self {
            field_to_robot: TimeIndexedHistory::interpolating(retention_seconds)
                .with_seed(Pose2d::identity()),
            yaw_rate: TimeIndexedHistory::scalar(retention_seconds).with_seed(0.0),
            pitch_rate: TimeIndexedHistory::scalar(retention_seconds),
            roll_rate: TimeIndexedHistory::scalar(retention_seconds),
            pitch: TimeIndexedHistory::scalar(retention_seconds),
            roll: TimeIndexedHistory::scalar(retention_seconds),
            accel_x: TimeIndexedHistory::scalar(retention_seconds),
            accel_y: TimeIndexedHistory::scalar(retention_seconds),
            velocities: RwLock::new(VelocityRegisters::default()),
            last_vision: RwLock::new((0.0, Pose2d::identity())),
            iteration: AtomicU64::new(0),
            path_cancel: AtomicBool::new(false),
            auto_start_time: AtomicU64::new(0.0f64.to_bits()),
            exclusive_tag: AtomicI64::new(NO_EXCLUSIVE_TAG),
            vision_consumer,
            alliance: None,
        }
    }

    /// Register the alliance provider queried by [`is_red_alliance`](Self::is_red_alliance).
    pub fn with_alliance(mut self, provider: impl AllianceProvider + 'static) -> Self {
        self.alliance = Some(Box::new(provider));
        self
    }

    // ── recording ───────────────────────────────────────────────────────────

    /// Append an odometry pose.  No correction is applied here.
    pub fn record_odometry(&self, timestamp: f64, pose: Pose2d) -> Result<(), FieldPoseError> {
        self.field_to_robot.insert(timestamp, pose)
    }

    /// Record one cycle of gyro and drivetrain data.
    ///
    /// The timestamp is validated before any series is touched, so a rejected
    /// sample leaves every history and register unchanged.  The velocity
    /// registers are replaced as one unit.
    pub fn record_motion_sample(
        &self,
        timestamp: f64,
        sample: &MotionSample,
    ) -> Result<(), FieldPoseError> {
        if !timestamp.is_finite() || timestamp < 0.0 {
            return Err(FieldPoseError::InvalidTimestamp(timestamp));
        }

        self.roll_rate.insert(timestamp, sample.roll_rate)?;
        self.pitch_rate.insert(timestamp, sample.pitch_rate)?;
        self.yaw_rate.insert(timestamp, sample.yaw_rate)?;
        self.pitch.insert(timestamp, sample.pitch)?;
        self.roll.insert(timestamp, sample.roll)?;
        self.accel_x.insert(timestamp, sample.accel_x)?;
        self.accel_y.insert(timestamp, sample.accel_y)?;

        *self.velocities.write() = sample.velocities;
        Ok(())
    }

    // ── pose queries ────────────────────────────────────────────────────────

    /// The newest `(timestamp, pose)` in the pose history.
    pub fn latest_field_pose(&self) -> Option<(f64, Pose2d)> {
        self.field_to_robot
            .latest()
            .map(|sample| (sample.timestamp, sample.value))
    }

    /// The (interpolated) pose at `timestamp`.
    pub fn field_pose_at(&self, timestamp: f64) -> Option<Pose2d> {
        self.field_to_robot.sample_at(timestamp)
    }

    /// Extrapolate the latest pose by the measured robot-relative velocity
    /// held for `lookahead_seconds`, along a constant-curvature arc.
    pub fn predicted_pose(&self, lookahead_seconds: f64) -> Pose2d {
        let twist = self
            .latest_measured_robot_relative_speeds()
            .to_twist(lookahead_seconds);
        self.latest_pose_or_identity().exp(&twist)
    }

    /// Like [`predicted_pose`](Self::predicted_pose) but the forward and
    /// lateral displacement are clamped to be non-negative.
    pub fn predicted_pose_non_negative(&self, lookahead_seconds: f64) -> Pose2d {
        let mut twist = self
            .latest_measured_robot_relative_speeds()
            .to_twist(lookahead_seconds);
        twist.dx = twist.dx.max(0.0);
        twist.dy = twist.dy.max(0.0);
        self.latest_pose_or_identity().exp(&twist)
    }

    fn latest_pose_or_identity(&self) -> Pose2d {
        self.latest_field_pose()
            .map_or_else(Pose2d::identity, |(_, pose)| pose)
    }

    // ── scalar series ───────────────────────────────────────────────────────

    pub fn max_abs_yaw_rate_in_window(&self, min_time: f64, max_time: f64) -> Option<f64> {
        self.yaw_rate.max_absolute_in_window(min_time, max_time)
    }

    pub fn max_abs_pitch_rate_in_window(&self, min_time: f64, max_time: f64) -> Option<f64> {
        self.pitch_rate.max_absolute_in_window(min_time, max_time)
    }

    pub fn max_abs_roll_rate_in_window(&self, min_time: f64, max_time: f64) -> Option<f64> {
        self.roll_rate.max_absolute_in_window(min_time, max_time)
    }

    /// `(pitch, roll)` at `timestamp`, if both series hold data.
    pub fn tilt_at(&self, timestamp: f64) -> Option<(f64, f64)> {
        Some((self.pitch.sample_at(timestamp)?, self.roll.sample_at(timestamp)?))
    }

    /// `(accel_x, accel_y)` at `timestamp`, if both series hold data.
    pub fn acceleration_at(&self, timestamp: f64) -> Option<(f64, f64)> {
        Some((
            self.accel_x.sample_at(timestamp)?,
            self.accel_y.sample_at(timestamp)?,
        ))
    }

    // ── velocity registers ──────────────────────────────────────────────────

    /// All velocity registers from the most recent motion sample.
    pub fn velocities(&self) -> VelocityRegisters {
        *self.velocities.read()
    }

    pub fn latest_desired_robot_relative_speeds(&self) -> ChassisSpeeds<RobotFrame> {
        self.velocities.read().desired_robot
    }

    pub fn latest_desired_field_relative_speeds(&self) -> ChassisSpeeds<FieldFrame> {
        self.velocities.read().desired_field
    }

    pub fn latest_measured_robot_relative_speeds(&self) -> ChassisSpeeds<RobotFrame> {
        self.velocities.read().measured_robot
    }

    pub fn latest_measured_field_relative_speeds(&self) -> ChassisSpeeds<FieldFrame> {
        self.velocities.read().measured_field
    }

    pub fn latest_fused_field_relative_speeds(&self) -> ChassisSpeeds<FieldFrame> {
        self.velocities.read().fused_field
    }

    /// Measured robot-relative translation combined with the fused angular
    /// velocity.
    pub fn latest_fused_robot_relative_speeds(&self) -> ChassisSpeeds<RobotFrame> {
        let registers = self.velocities.read();
        ChassisSpeeds::new(
            registers.measured_robot.vx,
            registers.measured_robot.vy,
            registers.fused_field.omega,
        )
    }

    // ── vision ──────────────────────────────────────────────────────────────

    /// Record `estimate` as the last accepted correction and forward it to the
    /// registered consumer.
    ///
    /// Monotonicity is not enforced here; the vision pipeline rejects stale
    /// candidates before they reach this call.
    pub fn accept_vision_estimate(&self, estimate: &VisionEstimate) {
        *self.last_vision.write() = (estimate.timestamp_seconds, estimate.pose);
        (self.vision_consumer)(estimate);
    }

    /// Timestamp of the last accepted correction; `0.0` means none yet.
    pub fn last_accepted_vision_timestamp(&self) -> f64 {
        self.last_vision.read().0
    }

    pub fn last_accepted_vision_pose(&self) -> Pose2d {
        self.last_vision.read().1
    }

    // ── flags and counters ──────────────────────────────────────────────────

    pub fn increment_iteration(&self) -> u64 {
        self.iteration.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn iteration(&self) -> u64 {
        self.iteration.load(Ordering::Relaxed)
    }

    pub fn enable_path_cancel(&self) {
        self.path_cancel.store(true, Ordering::Release);
    }

    pub fn disable_path_cancel(&self) {
        self.path_cancel.store(false, Ordering::Release);
    }

    pub fn path_cancel(&self) -> bool {
        self.path_cancel.load(Ordering::Acquire)
    }

    pub fn set_auto_start_time(&self, timestamp: f64) {
        self.auto_start_time
            .store(timestamp.to_bits(), Ordering::Release);
    }

    pub fn auto_start_time(&self) -> f64 {
        f64::from_bits(self.auto_start_time.load(Ordering::Acquire))
    }

    /// Require the vision pipeline to see `tag_id` before accepting anything.
    pub fn set_exclusive_tag(&self, tag_id: i32) {
        self.exclusive_tag
            .store(i64::from(tag_id), Ordering::Release);
    }

    pub fn clear_exclusive_tag(&self) {
        self.exclusive_tag.store(NO_EXCLUSIVE_TAG, Ordering::Release);
    }

    pub fn exclusive_tag(&self) -> Option<i32> {
        match self.exclusive_tag.load(Ordering::Acquire) {
            NO_EXCLUSIVE_TAG => None,
            id => i32::try_from(id).ok(),
        }
    }

    /// `false` when no provider was registered.
    pub fn is_red_alliance(&self) -> bool {
        self.alliance
            .as_ref()
            .is_some_and(|provider| provider.is_red_alliance())
    }

    // ── logging ─────────────────────────────────────────────────────────────

    /// Emit the latest pose, yaw rate and velocities as structured fields.
    pub fn log_snapshot(&self) {
        let (pose_time, pose) = self
            .latest_field_pose()
            .unwrap_or((0.0, Pose2d::identity()));
        let yaw_rate = self.yaw_rate.latest().map_or(0.0, |s| s.value);
        let v = self.velocities();
        debug!(
            iteration = self.iteration(),
            pose_time,
            x = pose.x,
            y = pose.y,
            heading = pose.heading,
            yaw_rate,
            measured_vx = v.measured_robot.vx,
            measured_vy = v.measured_robot.vy,
            measured_omega = v.measured_robot.omega,
            fused_field_vx = v.fused_field.vx,
            fused_field_vy = v.fused_field.vy,
            fused_field_omega = v.fused_field.omega,
            last_vision_time = self.last_accepted_vision_timestamp(),
            "RobotState snapshot"
        );
    }
}

impl fmt::Debug for RobotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RobotState")
            .field("field_to_robot", &self.field_to_robot)
            .field("velocities", &self.velocities())
            .field("last_vision", &*self.last_vision.read())
            .field("iteration", &self.iteration())
            .finish_non_exhaustive()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
