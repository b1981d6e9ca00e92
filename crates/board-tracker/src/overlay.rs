//! Frame annotations: marker outlines and board axes.

use crate::aruco::DetectedMarkers;
use crate::core::CameraIntrinsics;
use crate::pose::BoardPoseEstimate;
use image::{Rgb, RgbImage};
use nalgebra::{Point2, Vector3};

pub const OUTLINE_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const FIRST_CORNER_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const X_AXIS_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const Y_AXIS_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const Z_AXIS_COLOR: Rgb<u8> = Rgb([0, 0, 255]);

/// Bresenham line, clipped to the image.
pub fn draw_line(img: &mut RgbImage, from: Point2<f64>, to: Point2<f64>, color: Rgb<u8>) {
    let coords = [from.x, from.y, to.x, to.y];
    if coords.iter().any(|c| !c.is_finite() || c.abs() > 1e6) {
        return;
    }
    let (w, h) = (img.width() as i64, img.height() as i64);
    let (mut x, mut y) = (from.x.round() as i64, from.y.round() as i64);
    let (x1, y1) = (to.x.round() as i64, to.y.round() as i64);
    let dx = (x1 - x).abs();
    let dy = -(y1 - y).abs();
    let sx = if x < x1 { 1 } else { -1 };
    let sy = if y < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if x >= 0 && y >= 0 && x < w && y < h {
            img.put_pixel(x as u32, y as u32, color);
        }
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

fn draw_box(img: &mut RgbImage, center: Point2<f64>, half: f64, color: Rgb<u8>) {
    let c = [
        Point2::new(center.x - half, center.y - half),
        Point2::new(center.x + half, center.y - half),
        Point2::new(center.x + half, center.y + half),
        Point2::new(center.x - half, center.y + half),
    ];
    for k in 0..4 {
        draw_line(img, c[k], c[(k + 1) % 4], color);
    }
}

/// Outline every accepted marker; corner 0 gets a small box.
pub fn draw_markers(img: &mut RgbImage, detected: &DetectedMarkers) {
    for m in &detected.markers {
        let c = m.corners.map(|p| p.cast::<f64>());
        for k in 0..4 {
            draw_line(img, c[k], c[(k + 1) % 4], OUTLINE_COLOR);
        }
        draw_box(img, c[0], 2.0, FIRST_CORNER_COLOR);
    }
}

/// Board axes at the board origin: x red, y green, z blue.
///
/// Nothing is drawn when the origin or an axis tip is behind the camera.
pub fn draw_axes(
    img: &mut RgbImage,
    camera: &CameraIntrinsics,
    estimate: &BoardPoseEstimate,
    length: f64,
) {
    let r = estimate.rotation.to_rotation_matrix();
    let t = estimate.translation;
    let project = |v: Vector3<f64>| camera.project(&(r * v + t));

    let Some(origin) = project(Vector3::zeros()) else {
        return;
    };
    let tips = [
        (Vector3::x() * length, X_AXIS_COLOR),
        (Vector3::y() * length, Y_AXIS_COLOR),
        (Vector3::z() * length, Z_AXIS_COLOR),
    ];
    let Some(ends) = tips
        .iter()
        .map(|(v, c)| project(*v).map(|p| (p, *c)))
        .collect::<Option<Vec<_>>>()
    else {
        return;
    };
    for (end, color) in ends {
        draw_line(img, origin, end, color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aruco::Marker;
    use crate::pose::AxisAngle;

    #[test]
    fn line_covers_endpoints_and_clips() {
        let mut img = RgbImage::new(10, 10);
        draw_line(&mut img, Point2::new(1.0, 1.0), Point2::new(8.0, 5.0), OUTLINE_COLOR);
        assert_eq!(*img.get_pixel(1, 1), OUTLINE_COLOR);
        assert_eq!(*img.get_pixel(8, 5), OUTLINE_COLOR);

        let mut img = RgbImage::new(10, 10);
        draw_line(&mut img, Point2::new(-20.0, 5.0), Point2::new(30.0, 5.0), OUTLINE_COLOR);
        assert!((0..10).all(|x| *img.get_pixel(x, 5) == OUTLINE_COLOR));

        draw_line(&mut img, Point2::new(f64::NAN, 0.0), Point2::new(3.0, 3.0), X_AXIS_COLOR);
    }

    #[test]
    fn marker_outline_is_drawn() {
        let mut img = RgbImage::new(40, 40);
        let detected = DetectedMarkers {
            markers: vec![Marker {
                id: 0,
                corners: [
                    Point2::new(10.0, 10.0),
                    Point2::new(30.0, 10.0),
                    Point2::new(30.0, 30.0),
                    Point2::new(10.0, 30.0),
                ],
                hamming: 0,
                score: 1.0,
            }],
            rejected: Vec::new(),
        };
        draw_markers(&mut img, &detected);
        assert_eq!(*img.get_pixel(20, 30), OUTLINE_COLOR);
        assert_eq!(*img.get_pixel(30, 20), OUTLINE_COLOR);
        assert_eq!(*img.get_pixel(20, 20), Rgb([0, 0, 0]));
    }

    #[test]
    fn axes_point_along_projected_directions() {
        let camera = CameraIntrinsics::pinhole(500.0, 500.0, 50.0, 50.0).expect("camera");
        let estimate = BoardPoseEstimate {
            rotation: AxisAngle::identity(),
            translation: Vector3::new(0.0, 0.0, 1.0),
            used_markers: 1,
            rms_reprojection_px: 0.0,
        };
        let mut img = RgbImage::new(100, 100);
        draw_axes(&mut img, &camera, &estimate, 0.05);
        // x axis runs right from the principal point, y axis runs down.
        assert_eq!(*img.get_pixel(60, 50), X_AXIS_COLOR);
        assert_eq!(*img.get_pixel(50, 60), Y_AXIS_COLOR);

        let behind = BoardPoseEstimate {
            translation: Vector3::new(0.0, 0.0, -1.0),
            ..estimate
        };
        let mut blank = RgbImage::new(100, 100);
        draw_axes(&mut blank, &camera, &behind, 0.05);
        assert!(blank.pixels().all(|p| *p == Rgb([0, 0, 0])));
    }
}
