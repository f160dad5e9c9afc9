//! [`ControlLoop`] – the fixed-cadence tick that feeds the ledger.
//!
//! Each tick, in order:
//!
//! 1. bump the ledger's iteration counter,
//! 2. read the [`DriveSource`] and record odometry plus the motion sample,
//! 3. run one [`VisionPipeline`] cycle,
//! 4. log a ledger snapshot.
//!
//! Timestamps are seconds since the loop was created.  The loop is the only
//! writer of the [`RobotState`]; any other thread may read it concurrently.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use fieldpose_runtime::{ControlLoop, SimDriveSource};
//! use fieldpose_state::RobotState;
//! use fieldpose_types::{ChassisSpeeds, Pose2d};
//! use fieldpose_vision::{ScriptedVisionSource, TagLayout, VisionConfig, VisionPipeline};
//!
//! let state = Arc::new(RobotState::new(Box::new(|_| {})));
//! let vision = VisionPipeline::new(
//!     Box::new(ScriptedVisionSource::new()),
//!     Arc::clone(&state),
//!     Arc::new(TagLayout::empty()),
//!     VisionConfig::default(),
//! );
//! let drive = SimDriveSource::new(Pose2d::identity(), ChassisSpeeds::new(1.0, 0.0, 0.0));
//! let period = Duration::from_millis(20);
//! let mut control = ControlLoop::new(Box::new(drive), vision, Arc::clone(&state), period);
//!
//! control.tick_at(0.02).unwrap();
//! assert_eq!(state.iteration(), 1);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use fieldpose_state::RobotState;
use fieldpose_types::FieldPoseError;
use fieldpose_vision::{CycleReport, VisionPipeline};
use tracing::{info, warn};

use crate::drive::DriveSource;

pub struct ControlLoop {
    drive: Box<dyn DriveSource>,
    vision: VisionPipeline,
    state: Arc<RobotState>,
    period: Duration,
    epoch: Instant,
}

impl ControlLoop {
    pub fn new(
        drive: Box<dyn DriveSource>,
        vision: VisionPipeline,
        state: Arc<RobotState>,
        period: Duration,
    ) -> Self {
        Self {
            drive,
            vision,
            state,
            period,
            epoch: Instant::now(),
        }
    }

    /// Seconds since the loop was created.
    pub fn now(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn state(&self) -> &Arc<RobotState> {
        &self.state
    }

    pub fn vision(&self) -> &VisionPipeline {
        &self.vision
    }

    /// Run one tick stamped with the current loop time.
    pub fn tick(&mut self) -> Result<CycleReport, FieldPoseError> {
        let now = self.now();
        self.tick_at(now)
    }

    /// Run one tick stamped with `timestamp`.
    ///
    /// A drive fault or an invalid timestamp aborts the tick before the
    /// vision cycle runs; the ledger is left as it was.
    pub fn tick_at(&mut self, timestamp: f64) -> Result<CycleReport, FieldPoseError> {
        self.state.increment_iteration();

        let sample = self.drive.sample(timestamp)?;
        self.state.record_odometry(timestamp, sample.pose)?;
        self.state.record_motion_sample(timestamp, &sample.motion)?;

        let report = self.vision.run_cycle();
        self.state.log_snapshot();
        Ok(report)
    }

    /// Tick at the configured period until `shutdown` is set.
    ///
    /// Failed ticks are logged and skipped.  Returns the number of ticks run.
    pub fn run(&mut self, shutdown: &AtomicBool) -> u64 {
        info!(period_ms = self.period.as_millis() as u64, "control loop started");
        let mut ticks = 0u64;
        let mut accepted = 0u64;

        while !shutdown.load(Ordering::Acquire) {
            let started = Instant::now();
            match self.tick() {
                Ok(report) => {
                    if report.accepted.is_some() {
                        accepted += 1;
                    }
                }
                Err(e) => warn!(error = %e, "tick failed; skipping"),
            }
            ticks += 1;

            let elapsed = started.elapsed();
            if elapsed > self.period {
                warn!(
                    elapsed_ms = elapsed.as_secs_f64() * 1e3,
                    period_ms = self.period.as_millis() as u64,
                    "control loop overrun"
                );
            } else {
                std::thread::sleep(self.period - elapsed);
            }
        }

        info!(ticks, accepted, "control loop stopped");
        ticks
    }
}
