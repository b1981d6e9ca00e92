//! Camera pose of a whole grid board from its detected markers.

use crate::lm::{refine_pose_lm, LmParams};
use crate::planar::pose_from_homography;
use crate::{AxisAngle, Pose};
use board_tracker_aruco::{DetectedMarkers, GridBoard};
use board_tracker_core::{estimate_homography, CameraIntrinsics};
use log::debug;
use nalgebra::{Point2, Point3, Vector3};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Why a frame produced no pose.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PoseError {
    #[error("insufficient markers: found {found} on the board, need {required}")]
    InsufficientMarkers { found: usize, required: usize },
    #[error("degenerate marker configuration")]
    Degenerate,
}

/// Solver configuration.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverParams {
    /// Minimum number of board markers needed for a solve (at least 1).
    pub min_markers: usize,
    pub lm: LmParams,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            min_markers: 1,
            lm: LmParams::default(),
        }
    }
}

/// Board pose in the camera frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoardPoseEstimate {
    /// Rodrigues vector of the board-to-camera rotation.
    pub rotation: AxisAngle,
    /// Board origin in camera coordinates, meters.
    pub translation: Vector3<f64>,
    /// Board markers that contributed corners.
    pub used_markers: usize,
    /// RMS reprojection error over all used corners, pixels.
    pub rms_reprojection_px: f64,
}

impl BoardPoseEstimate {
    #[inline]
    pub fn pose(&self) -> Pose {
        Pose::from_axis_angle(&self.rotation, self.translation)
    }
}

/// Solves all detected board corners jointly as one rigid planar target.
#[derive(Clone, Debug, Default)]
pub struct BoardPoseSolver {
    params: SolverParams,
}

impl BoardPoseSolver {
    pub fn new(params: SolverParams) -> Self {
        Self { params }
    }

    #[inline]
    pub fn params(&self) -> &SolverParams {
        &self.params
    }

    /// Estimate the board pose. Markers whose id is not on the board are
    /// ignored.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip_all, fields(markers = detected.markers.len()))
    )]
    pub fn solve(
        &self,
        detected: &DetectedMarkers,
        board: &GridBoard,
        camera: &CameraIntrinsics,
    ) -> Result<BoardPoseEstimate, PoseError> {
        let required = self.params.min_markers.max(1);
        let mut object: Vec<Point3<f64>> = Vec::new();
        let mut observed: Vec<Point2<f64>> = Vec::new();
        let mut used = 0usize;
        for m in &detected.markers {
            let Some(obj) = board.marker_object_points(m.id) else {
                continue;
            };
            object.extend_from_slice(&obj);
            observed.extend(m.corners.iter().map(|p| p.cast::<f64>()));
            used += 1;
        }
        if used < required {
            return Err(PoseError::InsufficientMarkers {
                found: used,
                required,
            });
        }

        let undistorted = observed
            .iter()
            .map(|p| camera.undistort_pixel(*p))
            .collect::<Option<Vec<_>>>()
            .ok_or(PoseError::Degenerate)?;
        let plane: Vec<Point2<f64>> = object.iter().map(|p| Point2::new(p.x, p.y)).collect();

        let h = estimate_homography(&plane, &undistorted).ok_or(PoseError::Degenerate)?;
        let (r0, t0) = pose_from_homography(&camera.matrix, &h.h).ok_or(PoseError::Degenerate)?;
        let refined = refine_pose_lm(camera, &object, &observed, r0, t0, &self.params.lm)
            .ok_or(PoseError::Degenerate)?;

        let rotation = AxisAngle::from_rotation_matrix(&refined.rotation);
        if !refined.translation.iter().all(|x| x.is_finite()) || !rotation.0.iter().all(|x| x.is_finite()) {
            return Err(PoseError::Degenerate);
        }

        debug!(
            "board pose: {} markers, rms {:.3} px, {} iterations",
            used, refined.rms_px, refined.iterations
        );
        Ok(BoardPoseEstimate {
            rotation,
            translation: refined.translation,
            used_markers: used,
            rms_reprojection_px: refined.rms_px,
        })
    }
}

/// Solve with default parameters.
pub fn solve_board_pose(
    detected: &DetectedMarkers,
    board: &GridBoard,
    camera: &CameraIntrinsics,
) -> Result<BoardPoseEstimate, PoseError> {
    BoardPoseSolver::default().solve(detected, board, camera)
}

#[cfg(test)]
mod tests {
    use super::*;
    use board_tracker_aruco::{builtins::DICT_4X4_50, GridBoardSpec, Marker};

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

    #[test]
    fn no_markers_is_insufficient() {
        let camera = CameraIntrinsics::pinhole(800.0, 800.0, 320.0, 240.0).expect("camera");
        let err = solve_board_pose(&DetectedMarkers::default(), &board(), &camera).unwrap_err();
        assert_eq!(
            err,
            PoseError::InsufficientMarkers {
                found: 0,
                required: 1
            }
        );
    }

    #[test]
    fn foreign_markers_are_ignored() {
        let camera = CameraIntrinsics::pinhole(800.0, 800.0, 320.0, 240.0).expect("camera");
        let quad = [
            Point2::new(100.0, 100.0),
            Point2::new(150.0, 100.0),
            Point2::new(150.0, 150.0),
            Point2::new(100.0, 150.0),
        ];
        let detected = DetectedMarkers {
            markers: vec![Marker {
                id: 17,
                corners: quad,
                hamming: 0,
                score: 1.0,
            }],
            rejected: Vec::new(),
        };
        assert!(matches!(
            solve_board_pose(&detected, &board(), &camera),
            Err(PoseError::InsufficientMarkers { found: 0, .. })
        ));
    }

    #[test]
    fn min_markers_is_respected() {
        let camera = CameraIntrinsics::pinhole(800.0, 800.0, 320.0, 240.0).expect("camera");
        let board = board();
        let corners = board
            .marker_object_points(0)
            .expect("marker 0")
            .map(|p| {
                camera
                    .project(&(p.coords + Vector3::new(-0.03, -0.03, 0.5)))
                    .expect("visible")
                    .cast::<f32>()
            });
        let detected = DetectedMarkers {
            markers: vec![Marker {
                id: 0,
                corners,
                hamming: 0,
                score: 1.0,
            }],
            rejected: Vec::new(),
        };
        let solver = BoardPoseSolver::new(SolverParams {
            min_markers: 2,
            ..SolverParams::default()
        });
        assert!(matches!(
            solver.solve(&detected, &board, &camera),
            Err(PoseError::InsufficientMarkers {
                found: 1,
                required: 2
            })
        ));
        assert!(solve_board_pose(&detected, &board, &camera).is_ok());
    }
}
