//! Cross-camera fusion of two same-cycle estimates.
//!
//! Position axes are combined independently by inverse-variance weighting:
//! ```text
//! w       = 1 / σ²
//! x_fused = (x_a·w_ax + x_b·w_bx) / (w_ax + w_bx)
//! σ²_x    = 1 / (w_ax + w_bx)
//! ```
//! Heading is a variance-weighted circular mean,
//! ```text
//! θ_fused = atan2(sin θ_a / σ²_θa + sin θ_b / σ²_θb,
//!                 cos θ_a / σ²_θa + cos θ_b / σ²_θb)
//! ```
//! used only when both heading variances are below the "large variance"
//! cutoff; otherwise the later estimate's heading is kept.
//!
//! # Example
//!
//! ```rust
//! use fieldpose_state::RobotState;
//! use fieldpose_types::{Pose2d, StdDevs, VisionEstimate};
//! use fieldpose_vision::config::FusionAlignment;
//! use fieldpose_vision::fusion::fuse_estimates;
//!
//! let state = RobotState::new(Box::new(|_| {}));
//! let a = VisionEstimate::new(Pose2d::new(2.0, 0.0, 0.0), 0.5, StdDevs::new(1.0, 1.0, 1.0), 1);
//! let b = VisionEstimate::new(Pose2d::new(4.0, 0.0, 0.0), 0.6, StdDevs::new(1.0, 1.0, 1.0), 2);
//!
//! let fused = fuse_estimates(&a, &b, &state, FusionAlignment::Raw, 1e6);
//! assert!((fused.pose.x - 3.0).abs() < 1e-12);
//! assert_eq!(fused.tag_count, 3);
//! ```

use fieldpose_state::RobotState;
use fieldpose_types::{Pose2d, StdDevs, VisionEstimate};
use tracing::debug;

use crate::config::FusionAlignment;

/// Combine two accepted estimates into one.
///
/// The inputs may arrive in either order; the earlier one is treated as `a`.
/// The result carries the later timestamp and the summed tag count.
pub fn fuse_estimates(
    first: &VisionEstimate,
    second: &VisionEstimate,
    state: &RobotState,
    alignment: FusionAlignment,
    large_variance: f64,
) -> VisionEstimate {
    let (a, b) = if second.timestamp_seconds < first.timestamp_seconds {
        (second, first)
    } else {
        (first, second)
    };

    let pose_a = match alignment {
        FusionAlignment::Raw => a.pose,
        FusionAlignment::ProjectEarlier => project_forward(a, b.timestamp_seconds, state),
    };
    let pose_b = b.pose;

    let [var_ax, var_ay, var_ah] = a.covariance_diag();
    let [var_bx, var_by, var_bh] = b.covariance_diag();

    let heading = if var_ah < large_variance && var_bh < large_variance {
        match (var_ah == 0.0, var_bh == 0.0) {
            (true, false) => pose_a.heading,
            (false, true) => pose_b.heading,
            (true, true) => circular_mean(pose_a.heading, 1.0, pose_b.heading, 1.0),
            (false, false) => circular_mean(pose_a.heading, var_ah, pose_b.heading, var_bh),
        }
    } else {
        pose_b.heading
    };

    let (x, var_x) = weighted_mean(pose_a.x, var_ax, pose_b.x, var_bx);
    let (y, var_y) = weighted_mean(pose_a.y, var_ay, pose_b.y, var_by);
    let (_, var_h) = weighted_mean(0.0, var_ah, 0.0, var_bh);

    let pose = Pose2d::new(x, y, heading);
    let variances = [var_x, var_y, var_h];

    VisionEstimate::new(
        pose,
        b.timestamp_seconds,
        StdDevs::from_variances(variances),
        a.tag_count + b.tag_count,
    )
}

/// Inverse-variance mean of one axis and its variance.  A zero-variance
/// input is exact and taken outright.
fn weighted_mean(a: f64, var_a: f64, b: f64, var_b: f64) -> (f64, f64) {
    match (var_a == 0.0, var_b == 0.0) {
        (true, true) => (0.5 * (a + b), 0.0),
        (true, false) => (a, 0.0),
        (false, true) => (b, 0.0),
        (false, false) => {
            let (w_a, w_b) = (1.0 / var_a, 1.0 / var_b);
            ((a * w_a + b * w_b) / (w_a + w_b), 1.0 / (w_a + w_b))
        }
    }
}

fn circular_mean(a: f64, var_a: f64, b: f64, var_b: f64) -> f64 {
    let sin = a.sin() / var_a + b.sin() / var_b;
    let cos = a.cos() / var_a + b.cos() / var_b;
    sin.atan2(cos)
}

/// Carry `a` to `target_time` by the odometry delta between the two times.
///
/// Falls back to `a.pose` when the history cannot answer for either time.
fn project_forward(a: &VisionEstimate, target_time: f64, state: &RobotState) -> Pose2d {
    match (
        state.field_pose_at(a.timestamp_seconds),
        state.field_pose_at(target_time),
    ) {
        (Some(at_a), Some(at_b)) => a.pose.compose(&at_b.relative_to(&at_a)),
        _ => {
            debug!(
                timestamp = a.timestamp_seconds,
                "no odometry for projection; fusing unaligned"
            );
            a.pose
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

    fn state() -> RobotState {
        RobotState::with_retention(100.0, Box::new(|_| {}))
    }

    fn est(x: f64, y: f64, heading: f64, t: f64, std: StdDevs, tags: usize) -> VisionEstimate {
        VisionEstimate::new(Pose2d::new(x, y, heading), t, std, tags)
    }

    #[test]
    fn equal_variance_gives_arithmetic_mean() {
        let std = StdDevs::new(1.0, 1.0, 1.0);
        let a = est(2.0, 1.0, 0.0, 10.0, std, 1);
        let b = est(4.0, 3.0, FRAC_PI_2, 10.02, std, 2);
        let fused = fuse_estimates(&a, &b, &state(), FusionAlignment::Raw, 1e6);

        assert_abs_diff_eq!(fused.pose.x, 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(fused.pose.y, 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(fused.pose.heading, FRAC_PI_4, epsilon = 1e-12);
        assert_eq!(fused.timestamp_seconds, 10.02);
        assert_eq!(fused.tag_count, 3);
        let var = fused.covariance_diag();
        assert_abs_diff_eq!(var[0], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(var[1], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(var[2], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn confident_estimate_dominates() {
        let a = est(2.0, 1.0, 0.3, 10.0, StdDevs::new(1e-4, 1e-4, 1e-4), 1);
        let b = est(6.0, -5.0, -1.0, 10.02, StdDevs::new(100.0, 100.0, 100.0), 1);
        let fused = fuse_estimates(&a, &b, &state(), FusionAlignment::Raw, 1e6);
        assert_abs_diff_eq!(fused.pose.x, 2.0, epsilon = 1e-6);
        assert_abs_diff_eq!(fused.pose.y, 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(fused.pose.heading, 0.3, epsilon = 1e-6);
    }

    #[test]
    fn zero_variance_estimate_is_taken_outright() {
        let a = est(2.0, 1.0, 0.1, 10.0, StdDevs::new(0.0, 0.0, 0.0), 1);
        let b = est(2.4, 1.6, 0.5, 10.02, StdDevs::new(0.2, 0.2, 0.2), 1);
        let fused = fuse_estimates(&a, &b, &state(), FusionAlignment::Raw, 1e6);

        assert_eq!(fused.pose, Pose2d::new(2.0, 1.0, 0.1));
        assert_eq!(fused.std_devs, StdDevs::new(0.0, 0.0, 0.0));
        assert_eq!(fused.timestamp_seconds, 10.02);
        assert_eq!(fused.tag_count, 2);
    }

    #[test]
    fn both_zero_variance_split_the_difference() {
        let exact = StdDevs::new(0.0, 0.0, 0.0);
        let a = est(2.0, 1.0, 0.2, 10.0, exact, 1);
        let b = est(3.0, 2.0, 0.4, 10.02, exact, 1);
        let fused = fuse_estimates(&a, &b, &state(), FusionAlignment::Raw, 1e6);
        assert_abs_diff_eq!(fused.pose.x, 2.5, epsilon = 1e-12);
        assert_abs_diff_eq!(fused.pose.y, 1.5, epsilon = 1e-12);
        assert_abs_diff_eq!(fused.pose.heading, 0.3, epsilon = 1e-12);
        assert!(fused.pose.x.is_finite() && fused.std_devs.x == 0.0);
    }

    #[test]
    fn input_order_does_not_matter() {
        let std = StdDevs::new(0.2, 0.4, 0.1);
        let a = est(2.0, 1.0, 0.1, 10.0, std, 1);
        let b = est(4.0, 3.0, 0.2, 10.02, StdDevs::new(0.3, 0.3, 0.3), 2);
        let s = state();
        assert_eq!(
            fuse_estimates(&a, &b, &s, FusionAlignment::Raw, 1e6),
            fuse_estimates(&b, &a, &s, FusionAlignment::Raw, 1e6)
        );
    }

    #[test]
    fn large_heading_variance_keeps_later_heading() {
        let gyro_std = StdDevs::new(0.5, 0.5, 1e6);
        let a = est(2.0, 1.0, 0.4, 10.0, gyro_std, 1);
        let b = est(4.0, 3.0, -0.7, 10.02, StdDevs::new(0.5, 0.5, 0.1), 1);
        let fused = fuse_estimates(&a, &b, &state(), FusionAlignment::Raw, 1e6);
        assert_abs_diff_eq!(fused.pose.heading, -0.7, epsilon = 1e-12);
    }

    #[test]
    fn heading_mean_wraps_across_pi() {
        let std = StdDevs::new(1.0, 1.0, 1.0);
        let a = est(2.0, 0.0, 3.0, 10.0, std, 1);
        let b = est(2.0, 0.0, -3.0, 10.02, std, 1);
        let fused = fuse_estimates(&a, &b, &state(), FusionAlignment::Raw, 1e6);
        assert_abs_diff_eq!(fused.pose.heading.abs(), std::f64::consts::PI, epsilon = 1e-9);
    }

    #[test]
    fn project_earlier_applies_odometry_delta() {
        let s = state();
        s.record_odometry(10.0, Pose2d::new(0.0, 0.0, 0.0)).unwrap();
        s.record_odometry(10.02, Pose2d::new(0.1, 0.0, 0.0)).unwrap();

        let std = StdDevs::new(1.0, 1.0, 1.0);
        let a = est(2.0, 0.0, 0.0, 10.0, std, 1);
        let b = est(2.1, 0.0, 0.0, 10.02, std, 1);

        let raw = fuse_estimates(&a, &b, &s, FusionAlignment::Raw, 1e6);
        let projected = fuse_estimates(&a, &b, &s, FusionAlignment::ProjectEarlier, 1e6);
        assert_abs_diff_eq!(raw.pose.x, 2.05, epsilon = 1e-9);
        assert_abs_diff_eq!(projected.pose.x, 2.1, epsilon = 1e-9);
    }
}
