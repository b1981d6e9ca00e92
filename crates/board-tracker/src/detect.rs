use crate::aruco::{DetectedMarkers, GridBoard, MarkerDetector};
use crate::core::{self, CameraIntrinsics};
use crate::pose::{BoardPoseEstimate, BoardPoseSolver, PoseError};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Convert an `image::GrayImage` into the lightweight `board-tracker-core` view type.
pub fn gray_view(img: &::image::GrayImage) -> core::GrayImageView<'_> {
    core::GrayImageView {
        width: img.width() as usize,
        height: img.height() as usize,
        data: img.as_raw(),
    }
}

/// Luma conversion of a color frame.
pub fn to_gray(frame: &::image::RgbImage) -> ::image::GrayImage {
    ::image::imageops::grayscale(frame)
}

/// Detect markers, then promote rejected candidates that fit the board.
#[cfg_attr(
    feature = "tracing",
    instrument(
        level = "info",
        skip(img, detector, board),
        fields(width = img.width(), height = img.height())
    )
)]
pub fn detect_board_markers(
    img: &::image::GrayImage,
    detector: &MarkerDetector,
    board: &GridBoard,
) -> DetectedMarkers {
    let view = gray_view(img);
    let detected = detector.detect(&view);
    detector.refine(&view, board, detected)
}

/// Run detection, refinement and the board pose solve end-to-end.
pub fn estimate_board_pose(
    img: &::image::GrayImage,
    detector: &MarkerDetector,
    solver: &BoardPoseSolver,
    board: &GridBoard,
    camera: &CameraIntrinsics,
) -> Result<(DetectedMarkers, BoardPoseEstimate), PoseError> {
    let detected = detect_board_markers(img, detector, board);
    let estimate = solver.solve(&detected, board, camera)?;
    Ok((detected, estimate))
}

/// Convenience overload using default detector and solver parameters.
pub fn estimate_board_pose_default(
    img: &::image::GrayImage,
    board: &GridBoard,
    camera: &CameraIntrinsics,
) -> Result<(DetectedMarkers, BoardPoseEstimate), PoseError> {
    let detector = MarkerDetector::new(board.dictionary(), Default::default());
    estimate_board_pose(img, &detector, &BoardPoseSolver::default(), board, camera)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aruco::builtins::DICT_4X4_50;
    use crate::aruco::test_utils::render_board;
    use crate::aruco::GridBoardSpec;
    use crate::core::Homography;
    use crate::pose::{AxisAngle, SolverParams};
    use nalgebra::{Matrix3, Rotation3, Vector3};

    const W: usize = 640;
    const H: usize = 480;

    fn board() -> GridBoard {
        GridBoard::new(GridBoardSpec {
            rows: 2,
            cols: 3,
            marker_length: 0.04,
            marker_separation: 0.01,
            dictionary: DICT_4X4_50,
            first_marker: 0,
        })
        .expect("board")
    }

    fn camera() -> CameraIntrinsics {
        CameraIntrinsics::pinhole(600.0, 600.0, 320.0, 240.0).expect("camera")
    }

    /// Board facing the camera, spun by `spin` about the optical axis and
    /// tilted by `tilt` about the camera x axis, centred 0.5 m away.
    fn board_pose(spin: f64, tilt: f64) -> (Matrix3<f64>, Vector3<f64>) {
        let facing = Matrix3::from_diagonal(&Vector3::new(1.0, -1.0, -1.0));
        let r = Rotation3::from_axis_angle(&Vector3::z_axis(), spin).into_inner()
            * Rotation3::from_axis_angle(&Vector3::x_axis(), tilt).into_inner()
            * facing;
        let (w, h) = board().size();
        let t = Vector3::new(0.0, 0.0, 0.5) - r * Vector3::new(w / 2.0, h / 2.0, 0.0);
        (r, t)
    }

    fn render(r: &Matrix3<f64>, t: &Vector3<f64>) -> ::image::GrayImage {
        let m = Matrix3::from_columns(&[r.column(0).into_owned(), r.column(1).into_owned(), *t]);
        let gray = render_board(&board(), &Homography::new(camera().matrix * m), W, H);
        ::image::GrayImage::from_raw(W as u32, H as u32, gray.data).expect("size")
    }

    #[test]
    fn oblique_boards_are_solved() {
        let deg = std::f64::consts::PI / 180.0;
        for (spin, tilt) in [(30.0, 0.0), (90.0, 30.0), (180.0, 0.0), (0.0, 35.0)] {
            let (r, t) = board_pose(spin * deg, tilt * deg);
            let (markers, est) =
                estimate_board_pose_default(&render(&r, &t), &board(), &camera()).expect("pose");
            assert_eq!(markers.len(), 6, "spin {spin} tilt {tilt}");
            assert_eq!(est.used_markers, 6);
            assert!(
                (est.translation - t).norm() < 0.01,
                "spin {spin} tilt {tilt}: {:?}",
                est.translation
            );
            let expected = AxisAngle::from_rotation_matrix(&r).to_quaternion();
            let err = est.rotation.to_quaternion().angle_to(&expected);
            assert!(err < 0.04, "spin {spin} tilt {tilt}: rotation error {err}");
        }
    }

    #[test]
    fn blank_frame_has_no_pose() {
        let img = ::image::GrayImage::from_pixel(W as u32, H as u32, ::image::Luma([255]));
        assert!(matches!(
            estimate_board_pose_default(&img, &board(), &camera()),
            Err(PoseError::InsufficientMarkers { found: 0, .. })
        ));
    }

    #[test]
    fn solver_minimum_is_honoured() {
        let (r, t) = board_pose(0.0, 0.0);
        let detector = MarkerDetector::new(DICT_4X4_50, Default::default());
        let solver = BoardPoseSolver::new(SolverParams {
            min_markers: 7,
            ..SolverParams::default()
        });
        let res = estimate_board_pose(&render(&r, &t), &detector, &solver, &board(), &camera());
        assert!(matches!(
            res,
            Err(PoseError::InsufficientMarkers {
                found: 6,
                required: 7
            })
        ));
    }

    #[test]
    fn gray_conversion_keeps_size() {
        let rgb = ::image::RgbImage::from_pixel(5, 3, ::image::Rgb([255, 255, 255]));
        let gray = to_gray(&rgb);
        assert_eq!(gray.dimensions(), (5, 3));
        assert!(gray.pixels().all(|p| p.0[0] == 255));
    }
}
