//! Reading marker bits from an image quad.

use crate::threshold::otsu_threshold_from_samples;
use crate::{Match, Matcher};
use board_tracker_core::{homography_from_4pt, GrayImageView, Homography};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Bit-reading configuration.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeParams {
    /// Marker border width in cells (OpenCV uses 1).
    pub border_bits: usize,
    /// Require border-black ratio >= this.
    pub min_border_score: f32,
}

impl Default for DecodeParams {
    fn default() -> Self {
        Self {
            border_bits: 1,
            min_border_score: 0.85,
        }
    }
}

/// Raw bits read from one quad.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MarkerObservation {
    /// Inner bits, row-major, white = 1, in the quad's own corner order.
    pub code: u64,
    /// Fraction of border cells read as black.
    pub border_score: f32,
}

/// Side of one cell in the canonical sampling square.
const CELL_PX: f64 = 10.0;
/// Threshold samples per cell along each axis.
const THRESH_SUBDIV: usize = 3;

/// Samples a marker through the homography from a canonical square to the
/// image quad. Scratch buffers are reused across quads.
pub(crate) struct MarkerReader {
    params: DecodeParams,
    bits: usize,
    cells: usize,
    points: Vec<Point2<f64>>, // row-major: cy * cells + cx
    threshold_points: Vec<Point2<f64>>,
    scratch_bits: Vec<u8>,
    scratch_thr: Vec<u8>,
}

impl MarkerReader {
    pub(crate) fn new(params: DecodeParams, bits: usize) -> Option<Self> {
        let cells = bits + 2 * params.border_bits;
        if bits == 0 || bits * bits > 64 {
            return None;
        }

        let points = (0..cells)
            .flat_map(|cy| {
                (0..cells).map(move |cx| {
                    Point2::new((cx as f64 + 0.5) * CELL_PX, (cy as f64 + 0.5) * CELL_PX)
                })
            })
            .collect::<Vec<_>>();

        let grid = cells * THRESH_SUBDIV;
        let step = cells as f64 * CELL_PX / grid as f64;
        let threshold_points = (0..grid)
            .flat_map(|ty| {
                (0..grid).map(move |tx| {
                    Point2::new((tx as f64 + 0.5) * step, (ty as f64 + 0.5) * step)
                })
            })
            .collect::<Vec<_>>();

        Some(Self {
            params,
            bits,
            cells,
            scratch_bits: Vec::with_capacity(points.len()),
            scratch_thr: Vec::with_capacity(threshold_points.len()),
            points,
            threshold_points,
        })
    }

    fn canonical_corners(&self) -> [Point2<f64>; 4] {
        let s = self.cells as f64 * CELL_PX;
        [
            Point2::new(0.0, 0.0),
            Point2::new(s, 0.0),
            Point2::new(s, s),
            Point2::new(0.0, s),
        ]
    }

    /// Read the bits inside `corners` (TL, TR, BR, BL of the quad as seen).
    pub(crate) fn read(
        &mut self,
        img: &GrayImageView<'_>,
        corners: &[Point2<f32>; 4],
    ) -> Option<MarkerObservation> {
        let dst = corners.map(|p| p.cast::<f64>());
        let h = homography_from_4pt(&self.canonical_corners(), &dst)?;
        self.read_warped(img, &h)
    }

    fn read_warped(&mut self, img: &GrayImageView<'_>, h: &Homography) -> Option<MarkerObservation> {
        self.scratch_bits.clear();
        for p in &self.points {
            let q = h.apply(*p)?;
            self.scratch_bits.push(sample_mean_3x3(img, q.x, q.y)?);
        }

        self.scratch_thr.clear();
        for p in &self.threshold_points {
            if let Some(v) = h.apply(*p).and_then(|q| sample_mean_3x3(img, q.x, q.y)) {
                self.scratch_thr.push(v);
            }
        }

        decode_samples(
            &self.scratch_bits,
            &self.scratch_thr,
            self.cells,
            self.bits,
            self.params.border_bits,
            self.params.min_border_score,
        )
    }
}

/// Read and identify the marker inside `corners`.
///
/// Returns the dictionary match together with the corners reordered so that
/// index 0 is the marker's canonical top-left corner.
pub fn decode_marker(
    img: &GrayImageView<'_>,
    corners: &[Point2<f32>; 4],
    matcher: &Matcher,
    params: &DecodeParams,
) -> Option<(Match, [Point2<f32>; 4])> {
    let mut reader = MarkerReader::new(*params, matcher.dictionary().marker_size)?;
    let obs = reader.read(img, corners)?;
    let m = matcher.match_code(obs.code)?;
    Some((m, reorder_corners(corners, m.rotation)))
}

/// Canonical corner `k` sits at observed index `(k + rotation) % 4`.
#[inline]
pub(crate) fn reorder_corners(corners: &[Point2<f32>; 4], rotation: u8) -> [Point2<f32>; 4] {
    let r = (rotation & 3) as usize;
    [0usize, 1, 2, 3].map(|k| corners[(k + r) % 4])
}

fn decode_samples(
    samples: &[u8],
    thr_samples: &[u8],
    cells: usize,
    bits: usize,
    border: usize,
    min_border_score: f32,
) -> Option<MarkerObservation> {
    if samples.len() != cells * cells {
        return None;
    }

    let thr = if thr_samples.is_empty() {
        otsu_threshold_from_samples(samples)
    } else {
        otsu_threshold_from_samples(thr_samples)
    };

    let mut border_ok = 0u32;
    let mut border_total = 0u32;
    let mut code: u64 = 0;

    for cy in 0..cells {
        for cx in 0..cells {
            let is_black = samples[cy * cells + cx] < thr;
            let is_border = cx < border
                || cy < border
                || cx >= cells - border
                || cy >= cells - border;
            if is_border {
                border_total += 1;
                border_ok += u32::from(is_black);
            } else if !is_black {
                let idx = (cy - border) * bits + (cx - border);
                code |= 1u64 << idx;
            }
        }
    }

    let border_score = if border_total > 0 {
        border_ok as f32 / border_total as f32
    } else {
        1.0
    };
    if border_score < min_border_score {
        return None;
    }

    Some(MarkerObservation { code, border_score })
}

fn sample_mean_3x3(img: &GrayImageView<'_>, x: f64, y: f64) -> Option<u8> {
    if !x.is_finite() || !y.is_finite() {
        return None;
    }
    let ix = x.floor() as i64;
    let iy = y.floor() as i64;
    if ix < 1 || iy < 1 || ix + 1 >= img.width as i64 || iy + 1 >= img.height as i64 {
        return None;
    }

    let (ix, iy) = (ix as i32, iy as i32);
    let mut sum = 0u32;
    for dy in -1..=1 {
        for dx in -1..=1 {
            sum += img.get_or_black(ix + dx, iy + dy) as u32;
        }
    }
    Some((sum / 9) as u8)
}
