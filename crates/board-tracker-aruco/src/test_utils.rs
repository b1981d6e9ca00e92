//! Synthetic board images for tests and benchmarks.

use crate::GridBoard;
use board_tracker_core::{GrayImage, Homography};
use nalgebra::Point2;

/// Homography mapping the board plane onto a fronto-parallel image.
///
/// The board's top-left outer corner lands at `(margin_px, margin_px)` and
/// one meter spans `px_per_meter` pixels; board y points up, image y down.
pub fn top_down_homography(board: &GridBoard, px_per_meter: f64, margin_px: f64) -> Homography {
    let (_, height) = board.size();
    Homography::new(nalgebra::Matrix3::new(
        px_per_meter,
        0.0,
        margin_px,
        0.0,
        -px_per_meter,
        margin_px + px_per_meter * height,
        0.0,
        0.0,
        1.0,
    ))
}

/// Render `board` through `board_to_image` on a white background.
pub fn render_board(
    board: &GridBoard,
    board_to_image: &Homography,
    width: usize,
    height: usize,
) -> GrayImage {
    let dict = board.dictionary();
    render_board_with(board, board_to_image, width, height, |id| {
        dict.code(id).unwrap_or(0)
    })
}

/// Like [`render_board`], with the printed inner bits chosen per marker id.
///
/// Bits are row-major from the marker's top-left, white = 1.
#[must_use]
pub fn render_board_with(
    board: &GridBoard,
    board_to_image: &Homography,
    width: usize,
    height: usize,
    code_for: impl Fn(u32) -> u64,
) -> GrayImage {
    let mut img = GrayImage::filled(width, height, 255);
    let Some(image_to_board) = board_to_image.inverse() else {
        return img;
    };

    let spec = board.spec();
    let bits = spec.dictionary.marker_size;
    let cells = bits + 2;
    let l = spec.marker_length;
    let pitch = l + spec.marker_separation;
    let (_, board_h) = board.size();
    let cell = l / cells as f64;
    let codes: Vec<u64> = board.marker_ids().map(&code_for).collect();

    for v in 0..height {
        for u in 0..width {
            let Some(p) = image_to_board.apply(Point2::new(u as f64 + 0.5, v as f64 + 0.5)) else {
                continue;
            };
            // Distances from the board's top-left corner, x right, y down.
            let dx = p.x;
            let dy = board_h - p.y;
            if dx < 0.0 || dy < 0.0 {
                continue;
            }
            let col = (dx / pitch).floor();
            let row = (dy / pitch).floor();
            if col >= spec.cols as f64 || row >= spec.rows as f64 {
                continue;
            }
            let (lx, ly) = (dx - col * pitch, dy - row * pitch);
            if lx >= l || ly >= l {
                continue;
            }

            let cx = ((lx / cell) as usize).min(cells - 1);
            let cy = ((ly / cell) as usize).min(cells - 1);
            let border = cx == 0 || cy == 0 || cx == cells - 1 || cy == cells - 1;
            let white = !border && {
                let idx = row as usize * spec.cols as usize + col as usize;
                (codes[idx] >> ((cy - 1) * bits + (cx - 1))) & 1 == 1
            };
            if !white {
                img.put(u, v, 0);
            }
        }
    }
    img
}

/// Mean distance between corresponding corners.
pub fn mean_corner_error(detected: &[Point2<f32>; 4], expected: &[Point2<f64>; 4]) -> f64 {
    detected
        .iter()
        .zip(expected.iter())
        .map(|(d, e)| (d.cast::<f64>() - e).norm())
        .sum::<f64>()
        / 4.0
}
