//! Levenberg–Marquardt refinement of a camera pose against observed pixels.

use crate::AxisAngle;
use board_tracker_core::CameraIntrinsics;
use nalgebra::{DMatrix, DVector, Matrix3, Matrix6, Point2, Point3, Vector3, Vector6};
use serde::{Deserialize, Serialize};

/// Iteration limits for [`refine_pose_lm`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LmParams {
    pub max_iterations: usize,
    pub initial_lambda: f64,
    /// Stop once the update norm falls below this.
    pub step_eps: f64,
}

impl Default for LmParams {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            initial_lambda: 1e-3,
            step_eps: 1e-10,
        }
    }
}

/// Refined pose and fit quality.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LmOutcome {
    pub rotation: Matrix3<f64>,
    pub translation: Vector3<f64>,
    /// RMS distance between projected and observed points, pixels.
    pub rms_px: f64,
    pub iterations: usize,
}

const JACOBIAN_STEP: f64 = 1e-6;

/// Minimise the distorted reprojection error over the six pose parameters.
///
/// Updates are applied on the left: `R' = exp(w) R`, `t' = exp(w) t + v`.
/// Returns `None` when the starting pose does not project every point.
pub fn refine_pose_lm(
    camera: &CameraIntrinsics,
    object: &[Point3<f64>],
    image: &[Point2<f64>],
    rotation: Matrix3<f64>,
    translation: Vector3<f64>,
    params: &LmParams,
) -> Option<LmOutcome> {
    if object.len() != image.len() || object.is_empty() {
        return None;
    }

    let mut r = rotation;
    let mut t = translation;
    let mut res = residuals(camera, object, image, &r, &t)?;
    let mut cost = res.norm_squared();
    let mut lambda = params.initial_lambda.max(1e-12);
    let mut iterations = 0;

    while iterations < params.max_iterations {
        iterations += 1;

        let Some(j) = jacobian(camera, object, image, &r, &t) else {
            break;
        };
        let jt = j.transpose();
        let jtj: Matrix6<f64> = (&jt * &j).fixed_view::<6, 6>(0, 0).into_owned();
        let jtr: Vector6<f64> = (&jt * &res).fixed_rows::<6>(0).into_owned();

        let mut damped = jtj;
        for k in 0..6 {
            damped[(k, k)] += lambda * jtj[(k, k)].max(1e-9);
        }
        let Some(delta) = damped.cholesky().map(|c| c.solve(&(-jtr))) else {
            lambda *= 10.0;
            continue;
        };
        if delta.iter().any(|x| !x.is_finite()) {
            break;
        }

        let (r_new, t_new) = apply_update(&r, &t, &delta);
        match residuals(camera, object, image, &r_new, &t_new) {
            Some(res_new) if res_new.norm_squared() < cost => {
                r = r_new;
                t = t_new;
                cost = res_new.norm_squared();
                res = res_new;
                lambda = (lambda * 0.1).max(1e-12);
            }
            _ => {
                lambda *= 10.0;
                if lambda > 1e12 {
                    break;
                }
                continue;
            }
        }

        if delta.norm() < params.step_eps {
            break;
        }
    }

    Some(LmOutcome {
        rotation: r,
        translation: t,
        rms_px: (cost / object.len() as f64).sqrt(),
        iterations,
    })
}

/// Stacked `projected - observed`, two rows per point.
fn residuals(
    camera: &CameraIntrinsics,
    object: &[Point3<f64>],
    image: &[Point2<f64>],
    r: &Matrix3<f64>,
    t: &Vector3<f64>,
) -> Option<DVector<f64>> {
    let mut out = DVector::zeros(object.len() * 2);
    for (i, (p, obs)) in object.iter().zip(image.iter()).enumerate() {
        let proj = camera.project(&(r * p.coords + t))?;
        out[2 * i] = proj.x - obs.x;
        out[2 * i + 1] = proj.y - obs.y;
    }
    Some(out)
}

/// Central-difference Jacobian of [`residuals`] with respect to the update.
fn jacobian(
    camera: &CameraIntrinsics,
    object: &[Point3<f64>],
    image: &[Point2<f64>],
    r: &Matrix3<f64>,
    t: &Vector3<f64>,
) -> Option<DMatrix<f64>> {
    let mut j = DMatrix::zeros(object.len() * 2, 6);
    for k in 0..6 {
        let mut step = Vector6::zeros();
        step[k] = JACOBIAN_STEP;
        let (rp, tp) = apply_update(r, t, &step);
        let (rm, tm) = apply_update(r, t, &(-step));
        let plus = residuals(camera, object, image, &rp, &tp)?;
        let minus = residuals(camera, object, image, &rm, &tm)?;
        j.set_column(k, &((plus - minus) / (2.0 * JACOBIAN_STEP)));
    }
    Some(j)
}

fn apply_update(
    r: &Matrix3<f64>,
    t: &Vector3<f64>,
    delta: &Vector6<f64>,
) -> (Matrix3<f64>, Vector3<f64>) {
    let dr = AxisAngle::new(delta[0], delta[1], delta[2]).to_rotation_matrix();
    let dt = Vector3::new(delta[3], delta[4], delta[5]);
    (dr * r, dr * t + dt)
}
