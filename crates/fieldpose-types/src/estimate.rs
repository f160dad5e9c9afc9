//! Accepted vision pose corrections.

use serde::{Deserialize, Serialize};

use crate::geometry::Pose2d;

/// Per-axis standard deviations of a pose measurement.
///
/// Only the diagonal of the covariance is modelled; cross-terms are assumed
/// to be zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StdDevs {
    /// σ along field X (metres).
    pub x: f64,
    /// σ along field Y (metres).
    pub y: f64,
    /// σ of the heading (radians).
    pub heading: f64,
}

impl StdDevs {
    pub fn new(x: f64, y: f64, heading: f64) -> Self {
        Self { x, y, heading }
    }

    /// Build from the covariance diagonal `(σx², σy², σθ²)`.
    pub fn from_variances(variances: [f64; 3]) -> Self {
        Self::new(variances[0].sqrt(), variances[1].sqrt(), variances[2].sqrt())
    }

    /// The covariance diagonal `(σx², σy², σθ²)`.
    pub fn variances(&self) -> [f64; 3] {
        [self.x * self.x, self.y * self.y, self.heading * self.heading]
    }
}

/// One accepted camera-derived pose correction plus its uncertainty.
///
/// Produced by the vision pipeline at most once per control cycle and handed
/// to `RobotState::accept_vision_estimate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisionEstimate {
    /// Field-relative robot pose implied by the measurement.
    pub pose: Pose2d,
    /// Capture time on the process clock (seconds).
    pub timestamp_seconds: f64,
    pub std_devs: StdDevs,
    /// Number of fiducials that contributed to the solve.
    pub tag_count: usize,
}

impl VisionEstimate {
    pub fn new(pose: Pose2d, timestamp_seconds: f64, std_devs: StdDevs, tag_count: usize) -> Self {
        Self {
            pose,
            timestamp_seconds,
            std_devs,
            tag_count,
        }
    }

    /// Shorthand for `self.std_devs.variances()`.
    pub fn covariance_diag(&self) -> [f64; 3] {
        self.std_devs.variances()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn variances_are_squared_std_devs() {
        let s = StdDevs::new(0.2, 0.3, 0.1);
        let v = s.variances();
        assert_relative_eq!(v[0], 0.04, epsilon = 1e-12);
        assert_relative_eq!(v[1], 0.09, epsilon = 1e-12);
        assert_relative_eq!(v[2], 0.01, epsilon = 1e-12);
    }

    #[test]
    fn from_variances_inverts_variances() {
        let s = StdDevs::from_variances([0.04, 0.04, 0.01]);
        assert_relative_eq!(s.x, 0.2, epsilon = 1e-12);
        assert_relative_eq!(s.heading, 0.1, epsilon = 1e-12);
    }

    #[test]
    fn estimate_roundtrip() {
        let est = VisionEstimate::new(
            Pose2d::new(3.0, 1.0, 0.25),
            10.0,
            StdDevs::new(0.5, 0.5, 0.8),
            2,
        );
        let json = serde_json::to_string(&est).unwrap();
        let back: VisionEstimate = serde_json::from_str(&json).unwrap();
        assert_eq!(est, back);
        assert_relative_eq!(back.covariance_diag()[2], 0.64, epsilon = 1e-12);
    }
}
