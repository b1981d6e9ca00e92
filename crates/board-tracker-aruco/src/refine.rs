//! Board-guided recovery of rejected marker candidates.
//!
//! Markers already identified on the board fix a plane-to-image homography.
//! Every board marker that was not found is projected through it, and the
//! closest rejected quad is promoted when its corners agree with the
//! prediction and its bits are close enough to the expected id.

use crate::decode::MarkerReader;
use crate::detector::{DetectedMarkers, Marker, MarkerDetector};
use crate::GridBoard;
use board_tracker_core::{estimate_homography, GrayImageView};
use log::debug;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Refinement settings.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefineParams {
    /// Maximum mean corner distance between a candidate and the prediction.
    pub min_repr_distance_px: f32,
    /// Bit-error budget for a promoted candidate, as a multiple of the
    /// dictionary's `max_correction_bits`. Negative disables the bit check.
    pub error_correction_rate: f32,
    /// Try the four cyclic corner orders of each candidate instead of only
    /// the order it was found in.
    pub check_all_orders: bool,
}

impl Default for RefineParams {
    fn default() -> Self {
        Self {
            min_repr_distance_px: 10.0,
            error_correction_rate: 3.0,
            check_all_orders: true,
        }
    }
}

impl MarkerDetector {
    /// Promote rejected candidates that fit the board layout.
    ///
    /// Accepted markers are never removed or moved. Without at least one
    /// accepted board marker the input is returned unchanged.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip_all, fields(accepted = detected.markers.len(), rejected = detected.rejected.len()))
    )]
    pub fn refine(
        &self,
        image: &GrayImageView<'_>,
        board: &GridBoard,
        mut detected: DetectedMarkers,
    ) -> DetectedMarkers {
        if detected.rejected.is_empty() {
            return detected;
        }

        let mut src = Vec::new();
        let mut dst = Vec::new();
        for m in &detected.markers {
            if let Some(obj) = board.marker_corners_xy(m.id) {
                src.extend_from_slice(&obj);
                dst.extend(m.corners.iter().map(|p| p.cast::<f64>()));
            }
        }
        if src.is_empty() {
            return detected;
        }
        let Some(h) = estimate_homography(&src, &dst) else {
            return detected;
        };
        let Some(mut reader) = MarkerReader::new(
            self.params().decode,
            self.dictionary().marker_size,
        ) else {
            return detected;
        };

        let params = self.params().refine;
        let budget = (self.dictionary().max_correction_bits as f32 * params.error_correction_rate)
            .floor()
            .max(0.0) as u32;
        let (w, hgt) = (image.width as f64, image.height as f64);
        let bits = self.dictionary().bit_count().max(1) as f32;
        let mut promoted = 0usize;

        for id in board.marker_ids() {
            if detected.get(id).is_some() || detected.rejected.is_empty() {
                continue;
            }
            let Some(obj) = board.marker_corners_xy(id) else {
                continue;
            };
            let Some(predicted) = project_all(&h, &obj) else {
                continue;
            };
            if predicted
                .iter()
                .any(|p| p.x < 0.0 || p.y < 0.0 || p.x >= w || p.y >= hgt)
            {
                continue;
            }
            let predicted = predicted.map(|p| p.cast::<f32>());

            let Some((idx, shift)) = closest_candidate(
                &detected.rejected,
                &predicted,
                params.check_all_orders,
                params.min_repr_distance_px,
            ) else {
                continue;
            };

            let cand = detected.rejected[idx];
            let corners = [0usize, 1, 2, 3].map(|k| cand[(k + shift) % 4]);

            let obs = reader.read(image, &corners);
            let hamming = match obs {
                Some(o) => self.matcher().distance_to(id, 0, o.code),
                None => None,
            };
            if params.error_correction_rate >= 0.0 {
                match hamming {
                    Some(d) if d as u32 <= budget => {}
                    _ => continue,
                }
            }

            let hamming = hamming.unwrap_or(0);
            let score = obs.map_or(0.0, |o| o.border_score * (1.0 - hamming as f32 / bits));
            detected.markers.push(Marker {
                id,
                corners,
                hamming,
                score: score.clamp(0.0, 1.0),
            });
            detected.rejected.swap_remove(idx);
            promoted += 1;
        }

        if promoted > 0 {
            detected.markers.sort_by_key(|m| m.id);
            debug!("refine: promoted {promoted} rejected candidates");
        }
        detected
    }
}

fn project_all(
    h: &board_tracker_core::Homography,
    pts: &[Point2<f64>; 4],
) -> Option<[Point2<f64>; 4]> {
    let mut out = [Point2::origin(); 4];
    for (o, p) in out.iter_mut().zip(pts.iter()) {
        *o = h.apply(*p)?;
    }
    Some(out)
}

/// Index of the candidate closest to `predicted` and the cyclic shift `s`
/// such that `candidate[(k + s) % 4]` matches `predicted[k]`.
fn closest_candidate(
    candidates: &[[Point2<f32>; 4]],
    predicted: &[Point2<f32>; 4],
    all_orders: bool,
    max_mean_dist: f32,
) -> Option<(usize, usize)> {
    let shifts = if all_orders { 4 } else { 1 };
    let mut best: Option<(usize, usize, f32)> = None;
    for (i, cand) in candidates.iter().enumerate() {
        for s in 0..shifts {
            let d = (0..4)
                .map(|k| (cand[(k + s) % 4] - predicted[k]).norm())
                .sum::<f32>()
                / 4.0;
            if d < max_mean_dist && best.is_none_or(|(_, _, bd)| d < bd) {
                best = Some((i, s, d));
            }
        }
    }
    best.map(|(i, s, _)| (i, s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::DICT_4X4_50;
    use crate::test_utils::{mean_corner_error, render_board_with, top_down_homography};
    use crate::{DetectorParams, GridBoardSpec, Matcher};

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

    /// Two flipped bits: beyond the detector's budget, within refinement's.
    fn corrupted_code(id: u32) -> u64 {
        let code = DICT_4X4_50.codes[id as usize];
        let strict = Matcher::new(DICT_4X4_50, DICT_4X4_50.max_correction_bits);
        for a in 0..16 {
            for b in (a + 1)..16 {
                let c = code ^ (1 << a) ^ (1 << b);
                if strict.match_code(c).is_none() {
                    return c;
                }
            }
        }
        unreachable!("no two-bit corruption escapes single-bit correction")
    }

    #[test]
    fn corrupted_marker_is_promoted() {
        let board = board();
        let h = top_down_homography(&board, 2000.0, 40.0);
        let bad = corrupted_code(4);
        let img = render_board_with(&board, &h, 360, 260, |id| {
            if id == 4 {
                bad
            } else {
                DICT_4X4_50.codes[id as usize]
            }
        });

        let det = MarkerDetector::new(DICT_4X4_50, DetectorParams::default());
        let detected = det.detect(&img.view());
        assert_eq!(detected.ids(), vec![0, 1, 2, 3, 5]);
        assert!(!detected.rejected.is_empty());

        let refined = det.refine(&img.view(), &board, detected.clone());
        assert_eq!(refined.ids(), vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(refined.rejected.len(), detected.rejected.len() - 1);
        for m in &detected.markers {
            assert_eq!(refined.get(m.id), Some(m));
        }

        let m4 = refined.get(4).expect("promoted");
        assert_eq!(m4.hamming, 2);
        let expected = board
            .marker_corners_xy(4)
            .expect("on board")
            .map(|p| h.apply(p).expect("finite"));
        assert!(mean_corner_error(&m4.corners, &expected) < 1.0);
    }

    #[test]
    fn bit_check_rejects_when_budget_is_zero() {
        let board = board();
        let h = top_down_homography(&board, 2000.0, 40.0);
        let bad = corrupted_code(1);
        let img = render_board_with(&board, &h, 360, 260, |id| {
            if id == 1 {
                bad
            } else {
                DICT_4X4_50.codes[id as usize]
            }
        });

        let params = DetectorParams {
            refine: RefineParams {
                error_correction_rate: 0.0,
                ..RefineParams::default()
            },
            ..DetectorParams::default()
        };
        let det = MarkerDetector::new(DICT_4X4_50, params);
        let detected = det.detect(&img.view());
        let refined = det.refine(&img.view(), &board, detected.clone());
        assert!(refined.get(1).is_none());
        assert_eq!(refined, detected);
    }

    #[test]
    fn without_accepted_markers_nothing_changes() {
        let board = board();
        let det = MarkerDetector::new(DICT_4X4_50, DetectorParams::default());
        let quad = [
            Point2::new(10.0, 10.0),
            Point2::new(50.0, 10.0),
            Point2::new(50.0, 50.0),
            Point2::new(10.0, 50.0),
        ];
        let input = DetectedMarkers {
            markers: Vec::new(),
            rejected: vec![quad],
        };
        let img = board_tracker_core::GrayImage::filled(100, 100, 255);
        let out = det.refine(&img.view(), &board, input.clone());
        assert_eq!(out, input);
    }

    #[test]
    fn closest_candidate_finds_cyclic_shift() {
        let predicted = [
            Point2::new(0.0, 0.0),
            Point2::new(10.0, 0.0),
            Point2::new(10.0, 10.0),
            Point2::new(0.0, 10.0),
        ];
        let shifted = [predicted[3], predicted[0], predicted[1], predicted[2]];
        let far = predicted.map(|p| p + nalgebra::Vector2::new(100.0, 0.0));

        let (idx, s) = closest_candidate(&[far, shifted], &predicted, true, 5.0).expect("match");
        assert_eq!(idx, 1);
        assert_eq!([0usize, 1, 2, 3].map(|k| shifted[(k + s) % 4]), predicted);

        assert!(closest_candidate(&[shifted], &predicted, false, 5.0).is_none());
        assert!(closest_candidate(&[far], &predicted, true, 5.0).is_none());
    }
}
