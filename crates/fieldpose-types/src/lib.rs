//! `fieldpose-types` – shared vocabulary of the FieldPose stack.
//!
//! # Modules
//!
//! - [`geometry`] – planar rigid transforms ([`Pose2d`], [`Twist2d`]),
//!   translations, the 3-D [`Pose3d`] reported by cameras, and frame-tagged
//!   [`ChassisSpeeds`].
//! - [`estimate`] – [`VisionEstimate`], an accepted camera pose correction
//!   together with its per-axis uncertainty.
//! - [`observation`] – raw per-camera snapshots as delivered by the sensor
//!   transport ([`CameraObservation`], [`FiducialObservation`],
//!   [`MegatagPoseEstimate`]).

pub mod estimate;
pub mod geometry;
pub mod observation;

pub use estimate::{StdDevs, VisionEstimate};
pub use geometry::{
    ChassisSpeeds, FieldFrame, Pose2d, Pose3d, RobotFrame, Translation2d, Twist2d, angle_modulus,
};
pub use observation::{
    CameraId, CameraObservation, EXPECTED_STD_DEV_LEN, FiducialObservation, MegatagPoseEstimate,
    VisionInputs,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Global error type spanning bad timestamps, transport faults, malformed
/// camera records, and configuration problems.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldPoseError {
    #[error("Invalid timestamp: {0} (must be finite and non-negative)")]
    InvalidTimestamp(f64),

    #[error("Transport fault on {camera}: {details}")]
    Transport { camera: String, details: String },

    #[error("Standard deviation index {index} missing (vector has {len} entries)")]
    MissingStdDev { index: usize, len: usize },

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Field Layout Error: {0}")]
    Layout(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_names_the_camera() {
        let err = FieldPoseError::Transport {
            camera: "CameraA".to_string(),
            details: "table timeout".to_string(),
        };
        assert!(err.to_string().contains("CameraA"));
        assert!(err.to_string().contains("table timeout"));
    }

    #[test]
    fn invalid_timestamp_display() {
        let err = FieldPoseError::InvalidTimestamp(-1.5);
        assert!(err.to_string().contains("-1.5"));
    }

    #[test]
    fn error_serialization_roundtrip() {
        let err = FieldPoseError::MissingStdDev { index: 11, len: 6 };
        let json = serde_json::to_string(&err).unwrap();
        let back: FieldPoseError = serde_json::from_str(&json).unwrap();
        assert_eq!(err, back);
    }
}
