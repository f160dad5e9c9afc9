//! `fieldpose-state` – the robot's kinematic ledger.
//!
//! # Modules
//!
//! - [`history`] – [`TimeIndexedHistory`][history::TimeIndexedHistory]: a
//!   bounded-retention, time-ordered sample store with pluggable
//!   interpolation, safe to read from any thread while the control loop
//!   writes.
//! - [`robot_state`] – [`RobotState`][robot_state::RobotState]: the
//!   process-wide ledger of field pose, gyro/accelerometer series and chassis
//!   velocities.  Accepted vision corrections pass through it on their way to
//!   the external pose filter.

pub mod history;
pub mod robot_state;

pub use history::{Interpolate, Interpolator, Sample, TimeIndexedHistory};
pub use robot_state::{
    AllianceProvider, LOOKBACK_TIME_SEC, MotionSample, RobotState, VelocityRegisters,
    VisionEstimateConsumer,
};
