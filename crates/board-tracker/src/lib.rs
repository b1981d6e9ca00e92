//! Real-time camera pose tracking against a printed ArUco grid board.
//!
//! This crate provides:
//! - re-exports of the detector and pose crates
//! - calibration and tracker configuration loading
//! - the fixed-rate tracking loop with its frame sources and sinks
//! - the `board-tracker` command-line binary (feature `cli`)
//!
//! ## Quickstart
//!
//! ```no_run
//! use board_tracker::aruco::{builtins, GridBoard, GridBoardSpec};
//! use board_tracker::{calibration, detect};
//! use image::ImageReader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let board = GridBoard::new(GridBoardSpec {
//!     rows: 5,
//!     cols: 7,
//!     marker_length: 0.04,
//!     marker_separation: 0.01,
//!     dictionary: builtins::DICT_4X4_50,
//!     first_marker: 0,
//! })?;
//! let camera = calibration::load_calibration("calibration.yaml")?;
//! let img = ImageReader::open("frame.png")?.decode()?.to_luma8();
//!
//! let (markers, estimate) = detect::estimate_board_pose_default(&img, &board, &camera)?;
//! println!("{} markers, board at {:?}", markers.len(), estimate.translation);
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `board_tracker::core`: image views, homographies, camera model, logger.
//! - `board_tracker::aruco`: dictionaries, marker detection, grid boards, refinement.
//! - `board_tracker::pose`: rotation conversions, board pose solver, pose types.
//! - `board_tracker::tracker`: [`TrackerContext`] and the loop state machine.

pub use board_tracker_aruco as aruco;
pub use board_tracker_core as core;
pub use board_tracker_pose as pose;

pub mod calibration;
pub mod config;
pub mod detect;
#[cfg(feature = "display")]
pub mod display;
pub mod overlay;
pub mod rate;
pub mod sink;
pub mod source;
pub mod tracker;

pub use board_tracker_aruco::{DetectedMarkers, GridBoard, GridBoardSpec, MarkerDetector};
pub use board_tracker_pose::{AxisAngle, BoardPoseEstimate, Pose, Quaternion, TimestampedPose};
pub use calibration::{load_calibration, CalibrationError};
pub use config::{ConfigError, TrackerConfig};
pub use sink::{FrameSink, PoseSink, PublishError};
pub use source::{FrameError, FrameSource};
pub use tracker::{OutputMode, TrackerContext, TrackerError, TrackerState};
