//! Pinhole camera intrinsics with OpenCV-ordered lens distortion.
//!
//! Distortion follows the `k1 k2 p1 p2 [k3 [k4 k5 k6]]` layout: radial terms
//! (optionally rational) plus Brown-Conrady tangential terms, applied in
//! normalized image coordinates.

use nalgebra::{Matrix3, Point2, Vector3};
use serde::{Deserialize, Serialize};

/// Camera model construction errors.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CameraError {
    #[error("distortion vector must have 4, 5 or 8 coefficients, got {len}")]
    InvalidDistortionLength { len: usize },
    #[error("distortion coefficients must be finite")]
    NonFiniteDistortion,
    #[error("camera matrix must have finite non-zero focal lengths and last row [0, 0, 1]")]
    InvalidCameraMatrix,
}

/// Lens distortion coefficients (rational radial + tangential model).
///
/// Missing trailing coefficients are zero, so a 4- or 5-element vector is the
/// plain Brown-Conrady model.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Distortion {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    #[serde(default)]
    pub k3: f64,
    #[serde(default)]
    pub k4: f64,
    #[serde(default)]
    pub k5: f64,
    #[serde(default)]
    pub k6: f64,
}

impl Distortion {
    /// Parse an OpenCV-ordered coefficient vector of length 4, 5 or 8.
    pub fn from_coeffs(coeffs: &[f64]) -> Result<Self, CameraError> {
        if !matches!(coeffs.len(), 4 | 5 | 8) {
            return Err(CameraError::InvalidDistortionLength { len: coeffs.len() });
        }
        if coeffs.iter().any(|c| !c.is_finite()) {
            return Err(CameraError::NonFiniteDistortion);
        }
        let at = |i: usize| coeffs.get(i).copied().unwrap_or(0.0);
        Ok(Self {
            k1: at(0),
            k2: at(1),
            p1: at(2),
            p2: at(3),
            k3: at(4),
            k4: at(5),
            k5: at(6),
            k6: at(7),
        })
    }

    /// Coefficients in OpenCV order, trimmed to the shortest faithful length.
    pub fn to_coeffs(&self) -> Vec<f64> {
        let all = [
            self.k1, self.k2, self.p1, self.p2, self.k3, self.k4, self.k5, self.k6,
        ];
        if self.k4 != 0.0 || self.k5 != 0.0 || self.k6 != 0.0 {
            all.to_vec()
        } else {
            all[..5].to_vec()
        }
    }

    pub fn is_zero(&self) -> bool {
        self.to_coeffs().iter().all(|&c| c == 0.0)
    }

    /// Ratio applied to the radial distance: `(1 + k1 r² + ...) / (1 + k4 r² + ...)`.
    #[inline]
    fn radial(&self, r2: f64) -> f64 {
        let r4 = r2 * r2;
        let r6 = r4 * r2;
        let num = 1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6;
        let den = 1.0 + self.k4 * r2 + self.k5 * r4 + self.k6 * r6;
        num / den
    }

    #[inline]
    fn tangential(&self, x: f64, y: f64, r2: f64) -> (f64, f64) {
        (
            2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x),
            self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y,
        )
    }

    /// Apply distortion to normalized coordinates.
    pub fn distort(&self, p: Point2<f64>) -> Point2<f64> {
        let r2 = p.x * p.x + p.y * p.y;
        let radial = self.radial(r2);
        let (dx, dy) = self.tangential(p.x, p.y, r2);
        Point2::new(p.x * radial + dx, p.y * radial + dy)
    }

    /// Invert [`Distortion::distort`] by fixed-point iteration.
    pub fn undistort(&self, pd: Point2<f64>, cfg: UndistortConfig) -> Option<Point2<f64>> {
        let (mut x, mut y) = (pd.x, pd.y);

        for _ in 0..cfg.max_iters.max(1) {
            let r2 = x * x + y * y;
            let radial = self.radial(r2);
            if !radial.is_finite() || radial.abs() < 1e-12 {
                return None;
            }
            let (dx, dy) = self.tangential(x, y, r2);
            let x_next = (pd.x - dx) / radial;
            let y_next = (pd.y - dy) / radial;
            if !x_next.is_finite() || !y_next.is_finite() {
                return None;
            }

            let step = ((x_next - x).powi(2) + (y_next - y).powi(2)).sqrt();
            x = x_next;
            y = y_next;
            if step <= cfg.eps.max(0.0) {
                break;
            }
        }

        Some(Point2::new(x, y))
    }
}

/// Iterative undistortion settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct UndistortConfig {
    /// Maximum fixed-point iterations.
    pub max_iters: usize,
    /// Stop when the update norm is below this threshold.
    pub eps: f64,
}

impl Default for UndistortConfig {
    fn default() -> Self {
        Self {
            max_iters: 20,
            eps: 1e-12,
        }
    }
}

/// Camera matrix `K` plus distortion, loaded once and shared read-only.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CameraIntrinsics {
    pub matrix: Matrix3<f64>,
    pub distortion: Distortion,
}

impl CameraIntrinsics {
    /// Validate and build intrinsics.
    pub fn new(matrix: Matrix3<f64>, distortion: Distortion) -> Result<Self, CameraError> {
        let finite = matrix.iter().all(|v| v.is_finite());
        let last_row_ok = matrix[(2, 0)] == 0.0 && matrix[(2, 1)] == 0.0 && matrix[(2, 2)] == 1.0;
        let focal_ok = matrix[(0, 0)].abs() > 1e-12 && matrix[(1, 1)].abs() > 1e-12;
        if !(finite && last_row_ok && focal_ok && matrix[(1, 0)] == 0.0) {
            return Err(CameraError::InvalidCameraMatrix);
        }
        Ok(Self { matrix, distortion })
    }

    /// Build from a row-major 3x3 matrix and an OpenCV distortion vector.
    pub fn from_parts(rows: [[f64; 3]; 3], dist_coeffs: &[f64]) -> Result<Self, CameraError> {
        let matrix = Matrix3::from_row_slice(&[
            rows[0][0], rows[0][1], rows[0][2], //
            rows[1][0], rows[1][1], rows[1][2], //
            rows[2][0], rows[2][1], rows[2][2],
        ]);
        Self::new(matrix, Distortion::from_coeffs(dist_coeffs)?)
    }

    /// Ideal pinhole camera without distortion.
    pub fn pinhole(fx: f64, fy: f64, cx: f64, cy: f64) -> Result<Self, CameraError> {
        Self::new(
            Matrix3::new(fx, 0.0, cx, 0.0, fy, cy, 0.0, 0.0, 1.0),
            Distortion::default(),
        )
    }

    #[inline]
    pub fn fx(&self) -> f64 {
        self.matrix[(0, 0)]
    }

    #[inline]
    pub fn fy(&self) -> f64 {
        self.matrix[(1, 1)]
    }

    #[inline]
    pub fn cx(&self) -> f64 {
        self.matrix[(0, 2)]
    }

    #[inline]
    pub fn cy(&self) -> f64 {
        self.matrix[(1, 2)]
    }

    #[inline]
    pub fn skew(&self) -> f64 {
        self.matrix[(0, 1)]
    }

    pub fn pixel_to_normalized(&self, p: Point2<f64>) -> Point2<f64> {
        let y = (p.y - self.cy()) / self.fy();
        let x = (p.x - self.cx() - self.skew() * y) / self.fx();
        Point2::new(x, y)
    }

    pub fn normalized_to_pixel(&self, p: Point2<f64>) -> Point2<f64> {
        Point2::new(
            self.fx() * p.x + self.skew() * p.y + self.cx(),
            self.fy() * p.y + self.cy(),
        )
    }

    /// Project a camera-frame point into (distorted) pixel coordinates.
    ///
    /// Points at or behind the camera plane return `None`.
    pub fn project(&self, p_cam: &Vector3<f64>) -> Option<Point2<f64>> {
        if p_cam.z.is_nan() || p_cam.z <= 1e-9 {
            return None;
        }
        let n = Point2::new(p_cam.x / p_cam.z, p_cam.y / p_cam.z);
        let px = self.normalized_to_pixel(self.distortion.distort(n));
        (px.x.is_finite() && px.y.is_finite()).then_some(px)
    }

    /// Undistorted normalized coordinates of an observed pixel.
    pub fn undistort_normalized(&self, p: Point2<f64>) -> Option<Point2<f64>> {
        let n = self.pixel_to_normalized(p);
        if self.distortion.is_zero() {
            return Some(n);
        }
        self.distortion.undistort(n, UndistortConfig::default())
    }

    /// Observed pixel mapped to where an ideal pinhole camera would see it.
    pub fn undistort_pixel(&self, p: Point2<f64>) -> Option<Point2<f64>> {
        self.undistort_normalized(p)
            .map(|n| self.normalized_to_pixel(n))
    }

    /// Ideal pinhole pixel mapped to the observed (distorted) pixel.
    pub fn distort_pixel(&self, p: Point2<f64>) -> Point2<f64> {
        let n = self.pixel_to_normalized(p);
        self.normalized_to_pixel(self.distortion.distort(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn camera() -> CameraIntrinsics {
        CameraIntrinsics::from_parts(
            [[800.0, 0.0, 320.0], [0.0, 780.0, 240.0], [0.0, 0.0, 1.0]],
            &[-0.21, 0.05, 0.001, -0.0007, 0.01],
        )
        .expect("camera")
    }

    #[test]
    fn distortion_length_is_validated() {
        for len in [0usize, 3, 6, 7, 9] {
            let coeffs = vec![0.0; len];
            assert_eq!(
                Distortion::from_coeffs(&coeffs),
                Err(CameraError::InvalidDistortionLength { len })
            );
        }
        assert!(Distortion::from_coeffs(&[0.0; 4]).is_ok());
        assert!(Distortion::from_coeffs(&[0.0; 8]).is_ok());
    }

    #[test]
    fn rational_coefficients_are_kept() {
        let d = Distortion::from_coeffs(&[0.1, 0.01, 0.0, 0.0, 0.001, 0.2, 0.02, 0.002])
            .expect("dist");
        assert_eq!(d.k6, 0.002);
        assert_eq!(d.to_coeffs().len(), 8);
    }

    #[test]
    fn bad_camera_matrix_is_rejected() {
        let err = CameraIntrinsics::from_parts(
            [[0.0, 0.0, 320.0], [0.0, 780.0, 240.0], [0.0, 0.0, 1.0]],
            &[0.0; 5],
        );
        assert_eq!(err, Err(CameraError::InvalidCameraMatrix));
    }

    #[test]
    fn undistort_inverts_distort() {
        let cam = camera();
        for p in [
            Point2::new(320.0, 240.0),
            Point2::new(40.0, 30.0),
            Point2::new(600.0, 450.0),
            Point2::new(100.0, 400.0),
        ] {
            let distorted = cam.distort_pixel(p);
            let back = cam.undistort_pixel(distorted).expect("undistort");
            assert_abs_diff_eq!(back.x, p.x, epsilon = 1e-6);
            assert_abs_diff_eq!(back.y, p.y, epsilon = 1e-6);
        }
    }

    #[test]
    fn project_rejects_points_behind_camera() {
        let cam = camera();
        assert!(cam.project(&Vector3::new(0.0, 0.0, -1.0)).is_none());
        let center = cam.project(&Vector3::new(0.0, 0.0, 2.0)).expect("in front");
        assert_abs_diff_eq!(center.x, 320.0, epsilon = 1e-12);
        assert_abs_diff_eq!(center.y, 240.0, epsilon = 1e-12);
    }

    #[test]
    fn intrinsics_serde_round_trip() {
        let cam = camera();
        let json = serde_json::to_string(&cam).expect("serialize");
        let back: CameraIntrinsics = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, cam);
    }
}
