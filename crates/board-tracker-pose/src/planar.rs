//! Linear pose initialisation from a plane-induced homography.

use nalgebra::{Matrix3, Vector3};

/// Decompose `H` (board plane `z = 0` to pixels) into `(R, t)` given `K`.
///
/// The rotation is projected onto SO(3) and the translation is flipped, if
/// needed, so that the board lies in front of the camera. Returns `None` for
/// degenerate homographies.
pub fn pose_from_homography(k: &Matrix3<f64>, h: &Matrix3<f64>) -> Option<(Matrix3<f64>, Vector3<f64>)> {
    let k_inv = k.try_inverse()?;
    let a = k_inv * h;
    let h1 = a.column(0).into_owned();
    let h2 = a.column(1).into_owned();
    let h3 = a.column(2).into_owned();

    let (n1, n2) = (h1.norm(), h2.norm());
    if n1 <= 1e-12 || n2 <= 1e-12 {
        return None;
    }
    let lambda = 2.0 / (n1 + n2);

    let mut r1 = h1 * lambda;
    let mut r2 = h2 * lambda;
    let mut t = h3 * lambda;
    if t.z < 0.0 {
        r1 = -r1;
        r2 = -r2;
        t = -t;
    }
    let r3 = r1.cross(&r2);
    if r3.norm() <= 1e-12 {
        return None;
    }

    let r = Matrix3::from_columns(&[r1, r2, r3]);
    let svd = r.svd(true, true);
    let (u, v_t) = (svd.u?, svd.v_t?);
    let mut r_orth = u * v_t;
    if r_orth.determinant() < 0.0 {
        let mut u_flipped = u;
        u_flipped.column_mut(2).neg_mut();
        r_orth = u_flipped * v_t;
    }

    let finite = r_orth.iter().chain(t.iter()).all(|x| x.is_finite());
    finite.then_some((r_orth, t))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AxisAngle;
    use approx::assert_abs_diff_eq;

    fn k() -> Matrix3<f64> {
        Matrix3::new(800.0, 0.0, 320.0, 0.0, 780.0, 240.0, 0.0, 0.0, 1.0)
    }

    /// `H = K [r1 r2 t]`, scaled arbitrarily.
    fn homography(r: &Matrix3<f64>, t: &Vector3<f64>, scale: f64) -> Matrix3<f64> {
        let m = Matrix3::from_columns(&[r.column(0).into_owned(), r.column(1).into_owned(), *t]);
        k() * m * scale
    }

    #[test]
    fn recovers_exact_pose() {
        let r = AxisAngle::new(0.1, -0.25, 0.05).to_rotation_matrix();
        let t = Vector3::new(0.05, -0.02, 0.8);
        let (r_est, t_est) = pose_from_homography(&k(), &homography(&r, &t, 3.7)).expect("pose");
        assert_abs_diff_eq!(r_est, r, epsilon = 1e-9);
        assert_abs_diff_eq!(t_est, t, epsilon = 1e-9);
    }

    #[test]
    fn negative_scale_is_resolved_in_front_of_camera() {
        let r = AxisAngle::new(3.0, 0.0, 0.0).to_rotation_matrix();
        let t = Vector3::new(0.0, 0.0, 1.2);
        let (r_est, t_est) = pose_from_homography(&k(), &homography(&r, &t, -0.01)).expect("pose");
        assert!(t_est.z > 0.0);
        assert_abs_diff_eq!(r_est, r, epsilon = 1e-9);
        assert_abs_diff_eq!(r_est.determinant(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn degenerate_homography_is_rejected() {
        let mut h = Matrix3::zeros();
        h[(2, 2)] = 1.0;
        assert!(pose_from_homography(&k(), &h).is_none());
    }
}
