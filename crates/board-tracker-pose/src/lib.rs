//! Rotation conversions and camera pose estimation for planar marker boards.
//!
//! - [`rotation`]: Rodrigues vectors, unit quaternions and 4×4 homogeneous
//!   matrices, with [`to_matrix`] and [`to_quaternion`] as the two core
//!   conversions.
//! - [`BoardPoseSolver`]: all detected corners of a [`GridBoard`] solved
//!   jointly (homography initialisation refined by Levenberg–Marquardt on the
//!   distorted reprojection error).
//! - [`Pose`] / [`TimestampedPose`]: the values published each frame.
//!
//! [`GridBoard`]: board_tracker_aruco::GridBoard

mod lm;
mod planar;
mod pose;
pub mod rotation;
mod solver;

pub use lm::{refine_pose_lm, LmOutcome, LmParams};
pub use planar::pose_from_homography;
pub use pose::{Pose, Stamp, TimestampedPose};
pub use rotation::{to_matrix, to_quaternion, AxisAngle, Quaternion};
pub use solver::{solve_board_pose, BoardPoseEstimate, BoardPoseSolver, PoseError, SolverParams};
