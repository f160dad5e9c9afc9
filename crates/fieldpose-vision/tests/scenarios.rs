//! End-to-end cycles: scripted cameras → pipeline → ledger → consumer.

use std::sync::{Arc, Mutex};

use approx::assert_abs_diff_eq;
use fieldpose_state::{MotionSample, RobotState};
use fieldpose_types::{
    CameraId, CameraObservation, FiducialObservation, MegatagPoseEstimate, Pose2d, Pose3d,
    VisionEstimate,
};
use fieldpose_vision::{
    CameraOutcome, EstimatePath, Rejection, ScriptedVisionSource, TagEntry, TagLayout,
    VisionConfig, VisionPipeline,
};

struct Rig {
    pipeline: VisionPipeline,
    feeder: ScriptedVisionSource,
    state: Arc<RobotState>,
    forwarded: Arc<Mutex<Vec<VisionEstimate>>>,
}

fn rig() -> Rig {
    rig_with_layout(TagLayout::empty())
}

fn rig_with_layout(layout: TagLayout) -> Rig {
    let forwarded = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&forwarded);
    let state = Arc::new(RobotState::with_retention(
        100.0,
        Box::new(move |e: &VisionEstimate| sink.lock().unwrap().push(e.clone())),
    ));
    let feeder = ScriptedVisionSource::new();
    let pipeline = VisionPipeline::new(
        Box::new(feeder.clone()),
        Arc::clone(&state),
        Arc::new(layout),
        VisionConfig::default(),
    );
    Rig {
        pipeline,
        feeder,
        state,
        forwarded,
    }
}

/// Std-dev vector whose MegaTag1 x/y/yaw entries are `xy`, `xy`, `yaw`.
fn std_vector(xy: f64, yaw: f64) -> Vec<f64> {
    let mut v = vec![0.0; 12];
    v[0] = xy;
    v[1] = xy;
    v[5] = yaw;
    v
}

fn single_tag(
    ambiguity: f64,
    area: f64,
    t: f64,
    pose: Pose2d,
    quality: f64,
    std_devs: Vec<f64>,
) -> CameraObservation {
    CameraObservation {
        sees_target: true,
        fiducials: vec![FiducialObservation {
            id: 3,
            horizontal_angle_deg: -4.0,
            vertical_angle_deg: 1.0,
            ambiguity,
            area,
        }],
        megatag: Some(MegatagPoseEstimate {
            field_to_robot: pose,
            timestamp_seconds: t,
            fiducial_ids: vec![3],
            avg_tag_area: area,
            quality,
        }),
        megatag_count: 1,
        pose3d: Some(Pose3d::new(pose.x, pose.y, 0.05, 0.0, 0.0, pose.heading)),
        std_devs,
        ..CameraObservation::default()
    }
}

#[test]
fn single_camera_estimate_is_accepted_unmodified() {
    let mut rig = rig();
    rig.state
        .record_odometry(10.0, Pose2d::new(2.95, 0.02, 0.01))
        .unwrap();

    // Area 1.5 sits between the minimum (1.0) and the yaw-check area (2.0),
    // so the solve must also agree with the odometry heading (0.57° apart).
    let pose = Pose2d::new(3.0, 0.0, 0.0);
    let mut std_devs = std_vector(0.4, 0.8);
    std_devs[1] = 0.3;
    rig.feeder
        .push_frame(CameraId::A, single_tag(0.05, 1.5, 10.0, pose, 0.8, std_devs));

    let report = rig.pipeline.run_cycle();

    assert_eq!(report.camera_b, CameraOutcome::NotVisible);
    assert_eq!(report.camera_a.path(), Some(EstimatePath::Megatag));
    assert!(!report.fused);

    let accepted = report.accepted.unwrap();
    assert_eq!(accepted.pose, pose);
    assert_eq!(accepted.timestamp_seconds, 10.0);
    assert_eq!(accepted.tag_count, 1);
    // max(0.4, 0.3) / 0.8 on both axes, 0.8 / 0.8 on heading.
    assert_abs_diff_eq!(accepted.std_devs.x, 0.5, epsilon = 1e-12);
    assert_abs_diff_eq!(accepted.std_devs.y, 0.5, epsilon = 1e-12);
    assert_abs_diff_eq!(accepted.std_devs.heading, 1.0, epsilon = 1e-12);

    assert_eq!(rig.state.last_accepted_vision_timestamp(), 10.0);
    assert_eq!(rig.state.last_accepted_vision_pose(), pose);
    assert_eq!(rig.forwarded.lock().unwrap().as_slice(), &[accepted]);
}

#[test]
fn two_cameras_with_equal_variance_are_averaged() {
    let mut rig = rig();
    // σ = 0.2, 0.2, 0.1 → variances 0.04, 0.04, 0.01.
    rig.feeder.push_frame(
        CameraId::A,
        single_tag(0.05, 2.5, 10.0, Pose2d::new(3.0, 1.0, 0.2), 1.0, std_vector(0.2, 0.1)),
    );
    rig.feeder.push_frame(
        CameraId::B,
        single_tag(0.05, 2.5, 10.02, Pose2d::new(3.2, 1.4, 0.4), 1.0, std_vector(0.2, 0.1)),
    );

    let report = rig.pipeline.run_cycle();
    assert!(report.fused);
    let fused = report.accepted.unwrap();

    assert_abs_diff_eq!(fused.pose.x, 3.1, epsilon = 1e-9);
    assert_abs_diff_eq!(fused.pose.y, 1.2, epsilon = 1e-9);
    // Circular mean of equal weights is the bisector.
    assert_abs_diff_eq!(fused.pose.heading, 0.3, epsilon = 1e-9);
    assert_eq!(fused.tag_count, 2);
    assert_eq!(fused.timestamp_seconds, 10.02);
    let var = fused.covariance_diag();
    assert_abs_diff_eq!(var[0], 0.02, epsilon = 1e-12);
    assert_abs_diff_eq!(var[2], 0.005, epsilon = 1e-12);

    assert_eq!(rig.state.last_accepted_vision_timestamp(), 10.02);
    assert_eq!(rig.forwarded.lock().unwrap().len(), 1);
}

#[test]
fn ambiguous_single_tag_is_rejected() {
    let mut rig = rig();
    rig.feeder.push_frame(
        CameraId::A,
        single_tag(0.5, 2.5, 10.0, Pose2d::new(3.0, 0.0, 0.0), 1.0, std_vector(0.2, 0.1)),
    );

    let report = rig.pipeline.run_cycle();

    match report.camera_a {
        CameraOutcome::Rejected { megatag, .. } => assert!(matches!(
            megatag,
            Rejection::Ambiguous { ambiguity, .. } if ambiguity == 0.5
        )),
        other => panic!("expected rejection, got {other:?}"),
    }
    assert!(report.accepted.is_none());
    assert_eq!(rig.state.last_accepted_vision_timestamp(), 0.0);
    assert!(rig.forwarded.lock().unwrap().is_empty());
}

#[test]
fn accepted_timestamps_never_go_backwards() {
    let mut rig = rig();
    let pose = Pose2d::new(3.0, 0.0, 0.0);
    let frame = |t: f64| single_tag(0.05, 2.5, t, pose, 1.0, std_vector(0.2, 0.1));

    rig.feeder.push_frame(CameraId::A, frame(10.0));
    assert!(rig.pipeline.run_cycle().accepted.is_some());

    for stale in [10.0, 9.5] {
        rig.feeder.push_frame(CameraId::A, frame(stale));
        let report = rig.pipeline.run_cycle();
        assert!(report.accepted.is_none());
        assert!(matches!(
            report.camera_a,
            CameraOutcome::Rejected {
                megatag: Rejection::Stale { .. },
                gyro: Rejection::Stale { .. },
            }
        ));
    }

    rig.feeder.push_frame(CameraId::A, frame(10.5));
    assert!(rig.pipeline.run_cycle().accepted.is_some());

    let forwarded = rig.forwarded.lock().unwrap();
    let times: Vec<f64> = forwarded.iter().map(|e| e.timestamp_seconds).collect();
    assert_eq!(times, vec![10.0, 10.5]);
}

#[test]
fn one_camera_rejected_other_accepted_is_not_fused() {
    let mut rig = rig();
    rig.feeder.push_frame(
        CameraId::A,
        single_tag(0.9, 2.5, 10.0, Pose2d::new(3.0, 0.0, 0.0), 1.0, std_vector(0.2, 0.1)),
    );
    rig.feeder.push_frame(
        CameraId::B,
        single_tag(0.05, 2.5, 10.01, Pose2d::new(4.0, 0.0, 0.0), 1.0, std_vector(0.2, 0.1)),
    );

    let report = rig.pipeline.run_cycle();
    assert!(!report.fused);
    assert_eq!(report.accepted.map(|e| e.pose.x), Some(4.0));
}

#[test]
fn faulted_camera_does_not_abort_the_cycle() {
    let mut rig = rig();
    rig.feeder.push_fault(CameraId::A, "link reset");
    rig.feeder.push_frame(
        CameraId::B,
        single_tag(0.05, 2.5, 10.0, Pose2d::new(3.0, 0.0, 0.0), 1.0, std_vector(0.2, 0.1)),
    );

    let report = rig.pipeline.run_cycle();
    assert_eq!(report.transport_faults, 1);
    assert_eq!(report.camera_a, CameraOutcome::NotVisible);
    assert!(report.accepted.is_some());
}

#[test]
fn mid_area_single_tag_disagreeing_with_odometry_is_rejected() {
    let mut rig = rig();
    rig.state
        .record_odometry(10.0, Pose2d::new(3.0, 0.0, 0.0))
        .unwrap();
    let pose = Pose2d::new(3.0, 0.0, 10f64.to_radians());
    rig.feeder.push_frame(
        CameraId::A,
        single_tag(0.05, 1.5, 10.0, pose, 0.8, std_vector(0.4, 0.8)),
    );

    let report = rig.pipeline.run_cycle();
    assert!(matches!(
        report.camera_a,
        CameraOutcome::Rejected {
            megatag: Rejection::YawMismatch { .. },
            ..
        }
    ));
    assert!(report.accepted.is_none());
}

#[test]
fn zero_std_dev_camera_is_rejected_and_never_reaches_the_ledger() {
    let mut rig = rig();
    rig.feeder.push_frame(
        CameraId::A,
        single_tag(0.05, 2.5, 10.0, Pose2d::new(3.0, 1.0, 0.1), 1.0, std_vector(0.0, 0.0)),
    );
    rig.feeder.push_frame(
        CameraId::B,
        single_tag(0.05, 2.5, 10.02, Pose2d::new(3.2, 1.2, 0.1), 1.0, std_vector(0.2, 0.2)),
    );

    let report = rig.pipeline.run_cycle();
    assert!(matches!(
        report.camera_a,
        CameraOutcome::Rejected {
            megatag: Rejection::InvalidStdDev { .. },
            ..
        }
    ));
    assert!(!report.fused);

    let accepted = report.accepted.unwrap();
    assert_eq!(accepted.pose, Pose2d::new(3.2, 1.2, 0.1));
    assert!(accepted.std_devs.x.is_finite() && accepted.std_devs.x > 0.0);

    let last = rig.state.last_accepted_vision_pose();
    assert!(last.x.is_finite() && last.y.is_finite());
    assert_eq!(last, accepted.pose);
    assert_eq!(rig.forwarded.lock().unwrap().as_slice(), &[accepted]);
}

#[test]
fn ambiguous_single_tag_falls_back_to_gyro_position_fix() {
    let mut rig = rig_with_layout(TagLayout::from_entries([TagEntry {
        id: 3,
        pose: Pose3d::new(6.0, 2.0, 0.5, 0.0, 0.0, 0.0),
    }]));
    rig.state
        .record_odometry(10.0, Pose2d::new(2.8, 1.4, 0.1))
        .unwrap();
    let turning_slowly = MotionSample {
        yaw_rate: 0.2,
        ..MotionSample::default()
    };
    rig.state.record_motion_sample(9.9, &turning_slowly).unwrap();

    // The solve claims heading 0.3; the fix keeps the odometry heading 0.1
    // and re-places the robot around the tag with it.
    let reported = Pose2d::new(3.0, 1.0, 0.3);
    rig.feeder.push_frame(
        CameraId::A,
        single_tag(0.5, 2.5, 10.0, reported, 0.8, std_vector(0.2, 0.1)),
    );

    let report = rig.pipeline.run_cycle();
    assert_eq!(report.camera_a.path(), Some(EstimatePath::Gyro));

    let accepted = report.accepted.unwrap();
    let (sin, cos) = (-0.2f64).sin_cos();
    assert_abs_diff_eq!(accepted.pose.x, 6.0 - (3.0 * cos - sin), epsilon = 1e-9);
    assert_abs_diff_eq!(accepted.pose.y, 2.0 - (3.0 * sin + cos), epsilon = 1e-9);
    assert_abs_diff_eq!(accepted.pose.heading, 0.1, epsilon = 1e-12);
    // No quality scaling on this path; heading σ is the large constant.
    assert_abs_diff_eq!(accepted.std_devs.x, 0.2, epsilon = 1e-12);
    assert_abs_diff_eq!(accepted.std_devs.y, 0.2, epsilon = 1e-12);
    assert_eq!(accepted.std_devs.heading, VisionConfig::default().large_variance);

    assert_eq!(rig.state.last_accepted_vision_timestamp(), 10.0);
    assert_eq!(rig.forwarded.lock().unwrap().len(), 1);
}
