//! ArUco marker detection and grid-board layouts.
//!
//! This crate covers:
//! - embedded built-in dictionaries (compiled into the binary),
//! - square-marker detection in grayscale images (adaptive threshold,
//!   connected components, quad fitting, bit decoding, dictionary matching),
//! - the OpenCV-compatible `GridBoard` layout,
//! - board-guided refinement that recovers markers the plain detector rejected.
//!
//! ## Quickstart
//!
//! ```no_run
//! use board_tracker_aruco::{builtins, DetectorParams, GridBoard, GridBoardSpec, MarkerDetector};
//! use board_tracker_core::GrayImageView;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let board = GridBoard::new(GridBoardSpec {
//!     rows: 2,
//!     cols: 2,
//!     marker_length: 0.05,
//!     marker_separation: 0.01,
//!     dictionary: builtins::DICT_4X4_50,
//!     first_marker: 0,
//! })?;
//! let detector = MarkerDetector::new(board.dictionary(), DetectorParams::default());
//!
//! let pixels = vec![0u8; 640 * 480];
//! let view = GrayImageView::new(640, 480, &pixels).ok_or("bad buffer")?;
//! let detected = detector.detect(&view);
//! let detected = detector.refine(&view, &board, detected);
//! println!("ids: {:?}", detected.ids());
//! # Ok(())
//! # }
//! ```

pub mod builtins;
mod board;
mod components;
mod decode;
mod detector;
mod dictionary;
mod matcher;
mod quad;
mod refine;
#[doc(hidden)]
pub mod test_utils;
mod threshold;

pub use board::{GridBoard, GridBoardError, GridBoardSpec};
pub use components::{label_components, Component, Run};
pub use decode::{decode_marker, DecodeParams, MarkerObservation};
pub use detector::{DetectedMarkers, DetectorParams, Marker, MarkerDetector};
pub use dictionary::Dictionary;
pub use matcher::{rotate_code_u64, Match, Matcher};
pub use quad::{fit_quad, QuadParams};
pub use refine::RefineParams;
pub use threshold::{adaptive_threshold, AdaptiveThresholdParams};
