//! Rotation representations: axis-angle (Rodrigues) vectors, unit quaternions
//! and homogeneous 4×4 matrices.

use nalgebra::{Matrix3, Matrix4, Vector3};
use serde::{Deserialize, Serialize};

/// Below this angle (radians) an axis-angle vector is treated as the identity.
pub const IDENTITY_ANGLE_EPS: f64 = 1e-8;

/// Rotation as a 3-vector: direction = axis, norm = angle in radians.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AxisAngle(pub Vector3<f64>);

impl AxisAngle {
    #[inline]
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self(Vector3::new(x, y, z))
    }

    #[inline]
    pub fn identity() -> Self {
        Self(Vector3::zeros())
    }

    #[inline]
    pub fn vector(&self) -> Vector3<f64> {
        self.0
    }

    /// Rotation angle in radians.
    #[inline]
    pub fn angle(&self) -> f64 {
        self.0.norm()
    }

    /// Unit rotation axis, or `None` for (near-)identity rotations.
    pub fn axis(&self) -> Option<Vector3<f64>> {
        let angle = self.angle();
        (angle >= IDENTITY_ANGLE_EPS && angle.is_finite()).then(|| self.0 / angle)
    }

    /// Rodrigues' formula. Exactly the identity below [`IDENTITY_ANGLE_EPS`].
    pub fn to_rotation_matrix(&self) -> Matrix3<f64> {
        let Some(k) = self.axis() else {
            return Matrix3::identity();
        };
        let angle = self.angle();
        let kx = skew(&k);
        Matrix3::identity() + kx * angle.sin() + kx * kx * (1.0 - angle.cos())
    }

    /// Homogeneous 4×4 form of [`Self::to_rotation_matrix`].
    #[inline]
    pub fn to_matrix(&self) -> Matrix4<f64> {
        to_matrix(self)
    }

    #[inline]
    pub fn to_quaternion(&self) -> Quaternion {
        rotation_matrix_to_quaternion(&self.to_rotation_matrix())
    }

    /// Logarithm map of a unit quaternion; the result has angle in `[0, π]`.
    pub fn from_quaternion(q: &Quaternion) -> Self {
        let q = q.normalized().canonical();
        let v = Vector3::new(q.x, q.y, q.z);
        let s = v.norm();
        if s < 1e-12 {
            // sin(θ/2) ≈ θ/2 for tiny angles.
            return Self(v * 2.0);
        }
        let angle = 2.0 * s.atan2(q.w);
        Self(v * (angle / s))
    }

    pub fn from_rotation_matrix(m: &Matrix3<f64>) -> Self {
        Self::from_quaternion(&rotation_matrix_to_quaternion(m))
    }
}

impl From<Vector3<f64>> for AxisAngle {
    fn from(v: Vector3<f64>) -> Self {
        Self(v)
    }
}

/// Unit quaternion with the vector part first, as published in pose messages.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::identity()
    }
}

impl Quaternion {
    #[inline]
    pub const fn new(x: f64, y: f64, z: f64, w: f64) -> Self {
        Self { x, y, z, w }
    }

    #[inline]
    pub const fn identity() -> Self {
        Self::new(0.0, 0.0, 0.0, 1.0)
    }

    #[inline]
    pub fn norm(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w).sqrt()
    }

    /// Scaled to unit norm; zero or non-finite input gives the identity.
    pub fn normalized(&self) -> Self {
        let n = self.norm();
        if !n.is_finite() || n <= f64::EPSILON {
            return Self::identity();
        }
        Self::new(self.x / n, self.y / n, self.z / n, self.w / n)
    }

    /// The representative of `{q, -q}` with `w >= 0`.
    pub fn canonical(&self) -> Self {
        if self.w < 0.0 {
            Self::new(-self.x, -self.y, -self.z, -self.w)
        } else {
            *self
        }
    }

    #[inline]
    pub fn dot(&self, other: &Self) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z + self.w * other.w
    }

    /// Angle in radians of the rotation taking `self` to `other`, ignoring sign.
    pub fn angle_to(&self, other: &Self) -> f64 {
        let d = self.normalized().dot(&other.normalized()).abs().min(1.0);
        2.0 * d.acos()
    }

    pub fn to_rotation_matrix(&self) -> Matrix3<f64> {
        let Self { x, y, z, w } = self.normalized();
        Matrix3::new(
            1.0 - 2.0 * (y * y + z * z),
            2.0 * (x * y - z * w),
            2.0 * (x * z + y * w),
            2.0 * (x * y + z * w),
            1.0 - 2.0 * (x * x + z * z),
            2.0 * (y * z - x * w),
            2.0 * (x * z - y * w),
            2.0 * (y * z + x * w),
            1.0 - 2.0 * (x * x + y * y),
        )
    }

    #[inline]
    pub fn to_axis_angle(&self) -> AxisAngle {
        AxisAngle::from_quaternion(self)
    }

    #[inline]
    pub fn as_array(&self) -> [f64; 4] {
        [self.x, self.y, self.z, self.w]
    }
}

/// Axis-angle vector to a homogeneous 4×4 rotation matrix.
///
/// Angles below [`IDENTITY_ANGLE_EPS`] give exactly the identity.
pub fn to_matrix(rotation: &AxisAngle) -> Matrix4<f64> {
    let mut m = Matrix4::identity();
    m.fixed_view_mut::<3, 3>(0, 0)
        .copy_from(&rotation.to_rotation_matrix());
    m
}

/// Rotation block of a homogeneous matrix to a unit quaternion with `w >= 0`.
pub fn to_quaternion(m: &Matrix4<f64>) -> Quaternion {
    rotation_matrix_to_quaternion(&m.fixed_view::<3, 3>(0, 0).into_owned())
}

/// Trace-based extraction, falling back to the largest diagonal element when
/// the trace is not positive.
pub fn rotation_matrix_to_quaternion(m: &Matrix3<f64>) -> Quaternion {
    let (m00, m01, m02) = (m[(0, 0)], m[(0, 1)], m[(0, 2)]);
    let (m10, m11, m12) = (m[(1, 0)], m[(1, 1)], m[(1, 2)]);
    let (m20, m21, m22) = (m[(2, 0)], m[(2, 1)], m[(2, 2)]);
    let trace = m00 + m11 + m22;

    let q = if trace > 0.0 {
        let s = 0.5 / (trace + 1.0).sqrt();
        Quaternion::new((m21 - m12) * s, (m02 - m20) * s, (m10 - m01) * s, 0.25 / s)
    } else if m00 > m11 && m00 > m22 {
        let s = 2.0 * (1.0 + m00 - m11 - m22).sqrt();
        Quaternion::new(0.25 * s, (m01 + m10) / s, (m02 + m20) / s, (m21 - m12) / s)
    } else if m11 > m22 {
        let s = 2.0 * (1.0 + m11 - m00 - m22).sqrt();
        Quaternion::new((m01 + m10) / s, 0.25 * s, (m12 + m21) / s, (m02 - m20) / s)
    } else {
        let s = 2.0 * (1.0 + m22 - m00 - m11).sqrt();
        Quaternion::new((m02 + m20) / s, (m12 + m21) / s, 0.25 * s, (m10 - m01) / s)
    };

    q.normalized().canonical()
}

#[inline]
fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}
