//! Thresholding: local-mean binarisation for candidate search and Otsu's
//! method for reading marker bits.

use board_tracker_core::GrayImageView;
use serde::{Deserialize, Serialize};

/// Local-mean binarisation settings.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveThresholdParams {
    /// Side of the averaging window in pixels (forced odd, at least 3).
    pub window: usize,
    /// A pixel is dark when `value < local_mean - offset`.
    pub offset: f32,
}

impl Default for AdaptiveThresholdParams {
    fn default() -> Self {
        Self {
            window: 23,
            offset: 7.0,
        }
    }
}

/// Binarise `img`: `1` for dark pixels, `0` otherwise.
///
/// The local mean comes from a summed-area table, so the cost does not depend
/// on the window size. Windows are clipped at the image border.
pub fn adaptive_threshold(img: &GrayImageView<'_>, params: &AdaptiveThresholdParams) -> Vec<u8> {
    let (w, h) = (img.width, img.height);
    let mut out = vec![0u8; w * h];
    if img.is_empty() || img.data.len() != w * h {
        return out;
    }

    let integral = integral_image(img);
    let stride = w + 1;
    let half = (params.window.max(3) | 1) / 2;

    for y in 0..h {
        let y0 = y.saturating_sub(half);
        let y1 = (y + half + 1).min(h);
        for x in 0..w {
            let x0 = x.saturating_sub(half);
            let x1 = (x + half + 1).min(w);
            let sum = integral[y1 * stride + x1] + integral[y0 * stride + x0]
                - integral[y0 * stride + x1]
                - integral[y1 * stride + x0];
            let area = ((y1 - y0) * (x1 - x0)) as f32;
            let mean = sum as f32 / area;
            if (img.data[y * w + x] as f32) < mean - params.offset {
                out[y * w + x] = 1;
            }
        }
    }
    out
}

/// Summed-area table with a zero first row/column, `(w + 1) * (h + 1)` entries.
fn integral_image(img: &GrayImageView<'_>) -> Vec<u64> {
    let (w, h) = (img.width, img.height);
    let stride = w + 1;
    let mut integral = vec![0u64; stride * (h + 1)];
    for y in 0..h {
        let mut row_sum = 0u64;
        for x in 0..w {
            row_sum += img.data[y * w + x] as u64;
            integral[(y + 1) * stride + x + 1] = integral[y * stride + x + 1] + row_sum;
        }
    }
    integral
}

/// Compute Otsu threshold from a set of sample intensities.
pub(crate) fn otsu_threshold_from_samples(samples: &[u8]) -> u8 {
    if samples.is_empty() {
        return 127;
    }

    let mut min_v = 255u8;
    let mut max_v = 0u8;
    for &v in samples {
        min_v = min_v.min(v);
        max_v = max_v.max(v);
    }
    if min_v == max_v {
        return min_v;
    }

    let mut hist = [0u32; 256];
    for &v in samples {
        hist[v as usize] += 1;
    }
    let mut nonzero_bins = 0u32;
    for &h in &hist {
        if h > 0 {
            nonzero_bins += 1;
        }
    }
    if nonzero_bins <= 2 {
        return ((min_v as u16 + max_v as u16) / 2) as u8;
    }

    let total: f64 = samples.len() as f64;
    let mut sum_total = 0f64;
    for (i, &h) in hist.iter().enumerate() {
        sum_total += (i as f64) * (h as f64);
    }

    let mut sum_b = 0f64;
    let mut w_b = 0f64;
    let mut best_var = -1f64;
    let mut best_t = 127u8;

    for (t, &h) in hist.iter().enumerate() {
        w_b += h as f64;
        if w_b < 1.0 {
            continue;
        }
        let w_f = total - w_b;
        if w_f < 1.0 {
            break;
        }

        sum_b += (t as f64) * (h as f64);
        let m_b = sum_b / w_b;
        let m_f = (sum_total - sum_b) / w_f;

        let var_between = w_b * w_f * (m_b - m_f) * (m_b - m_f);
        if var_between > best_var {
            best_var = var_between;
            best_t = t as u8;
        }
    }

    best_t
}
