//! Grid board layout: a planar `rows × cols` array of equally spaced markers.
//!
//! The layout matches OpenCV's `aruco::GridBoard`: marker ids run row-major
//! from the top-left, and the board frame has its origin at the bottom-left
//! outer marker corner with x to the right, y up and z out of the board.

use crate::Dictionary;
use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};

/// Static grid board specification (lengths in meters).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridBoardSpec {
    pub rows: u32,
    pub cols: u32,
    /// Printed marker side length.
    pub marker_length: f64,
    /// Gap between neighbouring markers.
    pub marker_separation: f64,
    pub dictionary: Dictionary,
    /// Id of the top-left marker.
    #[serde(default)]
    pub first_marker: u32,
}

/// Board specification validation errors.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum GridBoardError {
    #[error("rows and cols must be >= 1")]
    InvalidSize,
    #[error("marker_length must be > 0")]
    InvalidMarkerLength,
    #[error("marker_separation must be >= 0")]
    InvalidMarkerSeparation,
    #[error("board needs marker ids up to {needed}, dictionary {dictionary} has {available}")]
    NotEnoughDictionaryCodes {
        dictionary: &'static str,
        needed: usize,
        available: usize,
    },
}

/// Validated grid board with precomputed marker corners.
#[derive(Clone, Debug)]
pub struct GridBoard {
    spec: GridBoardSpec,
    /// Board-frame corners (TL, TR, BR, BL) per marker, indexed by `id - first_marker`.
    corners: Vec<[Point2<f64>; 4]>,
}

impl GridBoard {
    /// Validate and create a board from a spec.
    pub fn new(spec: GridBoardSpec) -> Result<Self, GridBoardError> {
        if spec.rows == 0 || spec.cols == 0 {
            return Err(GridBoardError::InvalidSize);
        }
        if !spec.marker_length.is_finite() || spec.marker_length <= 0.0 {
            return Err(GridBoardError::InvalidMarkerLength);
        }
        if !spec.marker_separation.is_finite() || spec.marker_separation < 0.0 {
            return Err(GridBoardError::InvalidMarkerSeparation);
        }

        let count = spec.rows as usize * spec.cols as usize;
        let needed = spec.first_marker as usize + count;
        let available = spec.dictionary.len();
        if available < needed {
            return Err(GridBoardError::NotEnoughDictionaryCodes {
                dictionary: spec.dictionary.name,
                needed,
                available,
            });
        }

        let l = spec.marker_length;
        let pitch = l + spec.marker_separation;
        let max_y = spec.rows as f64 * l + (spec.rows as f64 - 1.0) * spec.marker_separation;
        let mut corners = Vec::with_capacity(count);
        for row in 0..spec.rows {
            for col in 0..spec.cols {
                let x0 = col as f64 * pitch;
                let y0 = max_y - row as f64 * pitch;
                corners.push([
                    Point2::new(x0, y0),
                    Point2::new(x0 + l, y0),
                    Point2::new(x0 + l, y0 - l),
                    Point2::new(x0, y0 - l),
                ]);
            }
        }

        Ok(Self { spec, corners })
    }

    #[inline]
    pub fn spec(&self) -> GridBoardSpec {
        self.spec
    }

    #[inline]
    pub fn dictionary(&self) -> Dictionary {
        self.spec.dictionary
    }

    /// Number of markers on the board.
    #[inline]
    pub fn marker_count(&self) -> usize {
        self.corners.len()
    }

    /// All marker ids on the board, in row-major order.
    pub fn marker_ids(&self) -> impl Iterator<Item = u32> + '_ {
        let first = self.spec.first_marker;
        (0..self.corners.len() as u32).map(move |i| first + i)
    }

    #[inline]
    pub fn contains(&self, id: u32) -> bool {
        self.index_of(id).is_some()
    }

    /// Id of the marker at `(row, col)`; row 0 is the top row.
    pub fn marker_id(&self, row: u32, col: u32) -> Option<u32> {
        (row < self.spec.rows && col < self.spec.cols)
            .then(|| self.spec.first_marker + row * self.spec.cols + col)
    }

    /// `(row, col)` of a marker id.
    pub fn marker_cell(&self, id: u32) -> Option<(u32, u32)> {
        let idx = self.index_of(id)? as u32;
        Some((idx / self.spec.cols, idx % self.spec.cols))
    }

    /// Board-plane corners (TL, TR, BR, BL) of a marker, meters.
    pub fn marker_corners_xy(&self, id: u32) -> Option<[Point2<f64>; 4]> {
        self.corners.get(self.index_of(id)?).copied()
    }

    /// 3D board-frame corners (z = 0) of a marker, meters.
    pub fn marker_object_points(&self, id: u32) -> Option<[Point3<f64>; 4]> {
        self.marker_corners_xy(id)
            .map(|c| c.map(|p| Point3::new(p.x, p.y, 0.0)))
    }

    /// Physical board extent `(width, height)` in meters.
    pub fn size(&self) -> (f64, f64) {
        let s = self.spec.marker_separation;
        let l = self.spec.marker_length;
        (
            self.spec.cols as f64 * l + (self.spec.cols as f64 - 1.0) * s,
            self.spec.rows as f64 * l + (self.spec.rows as f64 - 1.0) * s,
        )
    }

    fn index_of(&self, id: u32) -> Option<usize> {
        let idx = id.checked_sub(self.spec.first_marker)? as usize;
        (idx < self.corners.len()).then_some(idx)
    }
}
