use board_tracker_aruco::{builtins::DICT_4X4_50, DetectedMarkers, GridBoard, GridBoardSpec, Marker};
use board_tracker_core::{CameraIntrinsics, Distortion};
use board_tracker_pose::{solve_board_pose, AxisAngle, PoseError};
use nalgebra::{Matrix3, Point2, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn board() -> GridBoard {
    GridBoard::new(GridBoardSpec {
        rows: 2,
        cols: 2,
        marker_length: 0.05,
        marker_separation: 0.01,
        dictionary: DICT_4X4_50,
        first_marker: 0,
    })
    .expect("board")
}

fn camera(dist: &[f64]) -> CameraIntrinsics {
    CameraIntrinsics::from_parts(
        [[800.0, 0.0, 320.0], [0.0, 800.0, 240.0], [0.0, 0.0, 1.0]],
        dist,
    )
    .expect("camera")
}

/// Project every board marker, optionally with uniform pixel noise.
fn observe(
    board: &GridBoard,
    camera: &CameraIntrinsics,
    r: &Matrix3<f64>,
    t: &Vector3<f64>,
    noise_px: f64,
    rng: &mut StdRng,
) -> DetectedMarkers {
    let markers = board
        .marker_ids()
        .map(|id| {
            let obj = board.marker_object_points(id).expect("on board");
            let corners = obj.map(|p| {
                let px = camera.project(&(r * p.coords + t)).expect("visible");
                let n = if noise_px > 0.0 {
                    Point2::new(
                        rng.gen_range(-noise_px..noise_px),
                        rng.gen_range(-noise_px..noise_px),
                    )
                } else {
                    Point2::origin()
                };
                Point2::new(px.x + n.x, px.y + n.y).cast::<f32>()
            });
            Marker {
                id,
                corners,
                hamming: 0,
                score: 1.0,
            }
        })
        .collect();
    DetectedMarkers {
        markers,
        rejected: Vec::new(),
    }
}

#[test]
fn four_markers_at_one_meter() {
    let board = board();
    let camera = camera(&[0.0, 0.0, 0.0, 0.0]);
    let mut rng = StdRng::seed_from_u64(1);
    let t = Vector3::new(0.0, 0.0, 1.0);
    let detected = observe(&board, &camera, &Matrix3::identity(), &t, 0.0, &mut rng);
    assert_eq!(detected.len(), 4);

    let est = solve_board_pose(&detected, &board, &camera).expect("pose");
    assert_eq!(est.used_markers, 4);
    assert!((est.translation - t).norm() < 0.01, "t = {:?}", est.translation);
    assert!(est.rotation.angle() < 0.01, "rvec = {:?}", est.rotation);
}

#[test]
fn tilted_board_with_noise_and_distortion() {
    let board = board();
    let camera = camera(&[-0.2, 0.05, 0.001, -0.001, 0.0]);
    let mut rng = StdRng::seed_from_u64(2);

    let facing = AxisAngle::new(std::f64::consts::PI, 0.0, 0.0).to_rotation_matrix();
    let r = AxisAngle::new(0.25, -0.3, 0.1).to_rotation_matrix() * facing;
    let t = Vector3::new(-0.06, 0.05, 0.55);
    let detected = observe(&board, &camera, &r, &t, 0.2, &mut rng);

    let est = solve_board_pose(&detected, &board, &camera).expect("pose");
    let q_true = AxisAngle::from_rotation_matrix(&r).to_quaternion();
    let q_est = est.rotation.to_quaternion();
    assert!(q_true.angle_to(&q_est) < 0.01);
    assert!((est.translation - t).norm() < 0.005);
    assert!(est.rms_reprojection_px < 0.5, "rms {}", est.rms_reprojection_px);
}

#[test]
fn single_marker_is_enough() {
    let board = board();
    let camera = camera(&[0.0, 0.0, 0.0, 0.0]);
    let mut rng = StdRng::seed_from_u64(3);
    let facing = AxisAngle::new(std::f64::consts::PI, 0.0, 0.0).to_rotation_matrix();
    let t = Vector3::new(-0.03, 0.03, 0.4);
    let mut detected = observe(&board, &camera, &facing, &t, 0.0, &mut rng);
    detected.markers.retain(|m| m.id == 2);

    let est = solve_board_pose(&detected, &board, &camera).expect("pose");
    assert_eq!(est.used_markers, 1);
    assert!((est.translation - t).norm() < 1e-3);
}

#[test]
fn empty_detection_is_insufficient() {
    let board = board();
    let camera = camera(&[0.0, 0.0, 0.0, 0.0]);
    let err = solve_board_pose(&DetectedMarkers::default(), &board, &camera).unwrap_err();
    assert!(matches!(err, PoseError::InsufficientMarkers { found: 0, .. }));
}

#[test]
fn distortion_round_trip_through_camera() {
    let d = Distortion::from_coeffs(&[-0.2, 0.05, 0.001, -0.001, 0.0]).expect("coeffs");
    let camera = CameraIntrinsics::new(camera(&[0.0; 4]).matrix, d).expect("camera");
    let px = Point2::new(500.0, 100.0);
    let ideal = camera.undistort_pixel(px).expect("undistort");
    let back = camera.distort_pixel(ideal);
    assert!((back - px).norm() < 1e-6);
}
