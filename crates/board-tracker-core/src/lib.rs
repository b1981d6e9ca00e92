//! Core types and utilities for fiducial board tracking.
//!
//! This crate is small and purely geometric: grayscale image views, planar
//! homographies, the pinhole camera model with OpenCV-style lens distortion,
//! and the logging setup shared by the other `board-tracker-*` crates.
//! It does *not* depend on any concrete image decoding library.

mod camera;
mod homography;
mod image;
mod logger;

pub use camera::{CameraError, CameraIntrinsics, Distortion, UndistortConfig};
pub use homography::{estimate_homography, homography_from_4pt, Homography};
pub use image::{GrayImage, GrayImageView};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;
