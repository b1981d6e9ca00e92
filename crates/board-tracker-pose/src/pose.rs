//! Rigid board poses and their timestamped form.

use crate::rotation::{AxisAngle, Quaternion};
use nalgebra::{Matrix4, Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Board pose in camera coordinates: `p_cam = R * p_board + position`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// Board origin in the camera frame, meters.
    pub position: Vector3<f64>,
    pub orientation: Quaternion,
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

impl Pose {
    /// Zero translation, identity rotation.
    pub const fn identity() -> Self {
        Self {
            position: Vector3::new(0.0, 0.0, 0.0),
            orientation: Quaternion::identity(),
        }
    }

    pub fn new(position: Vector3<f64>, orientation: Quaternion) -> Self {
        Self {
            position,
            orientation: orientation.normalized().canonical(),
        }
    }

    /// Build from a Rodrigues vector and a translation.
    pub fn from_axis_angle(rotation: &AxisAngle, translation: Vector3<f64>) -> Self {
        Self {
            position: translation,
            orientation: rotation.to_quaternion(),
        }
    }

    #[inline]
    pub fn axis_angle(&self) -> AxisAngle {
        self.orientation.to_axis_angle()
    }

    #[inline]
    pub fn rotation_matrix(&self) -> nalgebra::Matrix3<f64> {
        self.orientation.to_rotation_matrix()
    }

    /// Homogeneous board-to-camera transform.
    pub fn to_matrix(&self) -> Matrix4<f64> {
        let mut m = Matrix4::identity();
        m.fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&self.rotation_matrix());
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.position);
        m
    }

    /// Board-frame point to camera frame.
    pub fn transform_point(&self, p: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.rotation_matrix() * p.coords + self.position)
    }
}

/// Wall-clock time split into whole seconds and nanoseconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Stamp {
    pub sec: i64,
    pub nanosec: u32,
}

impl Stamp {
    pub fn now() -> Self {
        Self::from(SystemTime::now())
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.sec as f64 + self.nanosec as f64 * 1e-9
    }
}

impl From<SystemTime> for Stamp {
    fn from(t: SystemTime) -> Self {
        match t.duration_since(UNIX_EPOCH) {
            Ok(d) => Self {
                sec: d.as_secs() as i64,
                nanosec: d.subsec_nanos(),
            },
            // Before the epoch: floor to the previous whole second.
            Err(e) => {
                let d: Duration = e.duration();
                let (sec, nanosec) = if d.subsec_nanos() == 0 {
                    (-(d.as_secs() as i64), 0)
                } else {
                    (-(d.as_secs() as i64) - 1, 1_000_000_000 - d.subsec_nanos())
                };
                Self { sec, nanosec }
            }
        }
    }
}

/// A pose with the time it was published and the frame it is expressed in.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimestampedPose {
    pub stamp: Stamp,
    pub frame_id: String,
    pub pose: Pose,
}

impl TimestampedPose {
    pub fn new(pose: Pose, stamp: Stamp, frame_id: impl Into<String>) -> Self {
        Self {
            stamp,
            frame_id: frame_id.into(),
            pose,
        }
    }

    /// Stamp `pose` with the current wall-clock time.
    pub fn now(pose: Pose, frame_id: impl Into<String>) -> Self {
        Self::new(pose, Stamp::now(), frame_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn identity_pose_is_origin() {
        let p = Pose::identity();
        assert_eq!(p.position, Vector3::zeros());
        assert_eq!(p.orientation, Quaternion::identity());
        assert_eq!(p.to_matrix(), Matrix4::identity());
        assert_eq!(Pose::default(), p);
    }

    #[test]
    fn transform_matches_homogeneous_matrix() {
        let pose = Pose::from_axis_angle(&AxisAngle::new(0.0, 0.0, FRAC_PI_2), Vector3::new(1.0, 2.0, 3.0));
        let p = pose.transform_point(&Point3::new(1.0, 0.0, 0.0));
        assert_abs_diff_eq!(p, Point3::new(1.0, 3.0, 3.0), epsilon = 1e-12);

        let h = pose.to_matrix() * nalgebra::Vector4::new(1.0, 0.0, 0.0, 1.0);
        assert_abs_diff_eq!(h.xyz(), p.coords, epsilon = 1e-12);
    }

    #[test]
    fn stamp_splits_seconds() {
        let t = UNIX_EPOCH + Duration::new(12, 345);
        assert_eq!(Stamp::from(t), Stamp { sec: 12, nanosec: 345 });

        let before = UNIX_EPOCH - Duration::from_millis(1500);
        let s = Stamp::from(before);
        assert_eq!(s, Stamp { sec: -2, nanosec: 500_000_000 });
        assert_abs_diff_eq!(s.as_secs_f64(), -1.5, epsilon = 1e-12);
    }

    #[test]
    fn timestamped_pose_json_shape() {
        let tp = TimestampedPose::new(Pose::identity(), Stamp { sec: 1, nanosec: 2 }, "map");
        let v = serde_json::to_value(&tp).expect("serialize");
        assert_eq!(v["frame_id"], "map");
        assert_eq!(v["stamp"]["nanosec"], 2);
        assert_eq!(v["pose"]["orientation"]["w"], 1.0);
    }
}
