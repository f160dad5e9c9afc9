//! Raw per-camera snapshots as delivered by the sensor transport.
//!
//! These records are transient: the transport fills one
//! [`CameraObservation`] per camera per control cycle, the vision pipeline
//! gates it, and it is dropped at the end of the cycle.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::FieldPoseError;
use crate::geometry::{Pose2d, Pose3d};

/// Length of the standard-deviation vector reported by each camera:
/// `[MT1 x, y, z, roll, pitch, yaw, MT2 x, y, z, roll, pitch, yaw]`.
pub const EXPECTED_STD_DEV_LEN: usize = 12;

/// The two independent cameras mounted on the robot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CameraId {
    A,
    B,
}

impl CameraId {
    pub const ALL: [CameraId; 2] = [CameraId::A, CameraId::B];

    /// Label used in log fields, e.g. `"CameraA"`.
    pub fn label(&self) -> &'static str {
        match self {
            CameraId::A => "CameraA",
            CameraId::B => "CameraB",
        }
    }
}

impl fmt::Display for CameraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single fiducial (tag) detection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FiducialObservation {
    pub id: i32,
    /// Horizontal offset from the crosshair (degrees).
    pub horizontal_angle_deg: f64,
    /// Vertical offset from the crosshair (degrees).
    pub vertical_angle_deg: f64,
    /// Pose ambiguity in `[0, 1]`; higher is less trustworthy.
    pub ambiguity: f64,
    /// Apparent area as a percentage of the image.
    pub area: f64,
}

/// A camera's own field-to-robot solve from one or more fiducials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MegatagPoseEstimate {
    pub field_to_robot: Pose2d,
    pub timestamp_seconds: f64,
    pub fiducial_ids: Vec<i32>,
    pub avg_tag_area: f64,
    /// Solver quality; uncertainty is scaled by `1 / quality`.
    pub quality: f64,
}

impl MegatagPoseEstimate {
    pub fn tag_count(&self) -> usize {
        self.fiducial_ids.len()
    }
}

/// Everything one camera reported during a single control cycle.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CameraObservation {
    pub sees_target: bool,
    #[serde(default)]
    pub fiducials: Vec<FiducialObservation>,
    /// MegaTag1 estimate (full solve, heading included).
    #[serde(default)]
    pub megatag: Option<MegatagPoseEstimate>,
    /// MegaTag2 estimate (heading seeded from the gyro).
    #[serde(default)]
    pub megatag2: Option<MegatagPoseEstimate>,
    #[serde(default)]
    pub megatag_count: usize,
    #[serde(default)]
    pub megatag2_count: usize,
    /// Raw 3-D solve, used to reject estimates that leave the floor plane.
    #[serde(default)]
    pub pose3d: Option<Pose3d>,
    /// See [`EXPECTED_STD_DEV_LEN`] for the layout.
    #[serde(default)]
    pub std_devs: Vec<f64>,
}

impl CameraObservation {
    /// The snapshot used whenever a camera sees nothing or its transport
    /// faulted.
    pub fn not_visible() -> Self {
        Self::default()
    }

    /// Look up one entry of the standard-deviation vector.
    ///
    /// # Errors
    ///
    /// Returns [`FieldPoseError::MissingStdDev`] when the vector is shorter
    /// than `index + 1`.
    pub fn std_dev(&self, index: usize) -> Result<f64, FieldPoseError> {
        self.std_devs
            .get(index)
            .copied()
            .ok_or(FieldPoseError::MissingStdDev {
                index,
                len: self.std_devs.len(),
            })
    }
}

/// One cycle's worth of raw input from both cameras.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VisionInputs {
    pub camera_a: CameraObservation,
    pub camera_b: CameraObservation,
}

impl VisionInputs {
    pub fn camera(&self, id: CameraId) -> &CameraObservation {
        match id {
            CameraId::A => &self.camera_a,
            CameraId::B => &self.camera_b,
        }
    }

    pub fn camera_mut(&mut self, id: CameraId) -> &mut CameraObservation {
        match id {
            CameraId::A => &mut self.camera_a,
            CameraId::B => &mut self.camera_b,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_visible_is_empty() {
        let obs = CameraObservation::not_visible();
        assert!(!obs.sees_target);
        assert!(obs.fiducials.is_empty());
        assert!(obs.megatag.is_none());
        assert!(obs.pose3d.is_none());
    }

    #[test]
    fn std_dev_lookup_reports_missing_index() {
        let obs = CameraObservation {
            std_devs: vec![0.1, 0.2, 0.3],
            ..CameraObservation::default()
        };
        assert_eq!(obs.std_dev(1), Ok(0.2));
        assert_eq!(
            obs.std_dev(5),
            Err(FieldPoseError::MissingStdDev { index: 5, len: 3 })
        );
    }

    #[test]
    fn camera_labels() {
        assert_eq!(CameraId::A.label(), "CameraA");
        assert_eq!(CameraId::B.to_string(), "CameraB");
    }

    #[test]
    fn inputs_select_camera() {
        let mut inputs = VisionInputs::default();
        inputs.camera_mut(CameraId::B).sees_target = true;
        assert!(!inputs.camera(CameraId::A).sees_target);
        assert!(inputs.camera(CameraId::B).sees_target);
    }

    #[test]
    fn observation_deserializes_with_missing_optional_fields() {
        let obs: CameraObservation = serde_json::from_str(r#"{ "sees_target": true }"#).unwrap();
        assert!(obs.sees_target);
        assert!(obs.std_devs.is_empty());
    }
}
