//! Quadrilateral fitting for dark connected components.

use crate::components::Component;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Geometric acceptance limits for marker outline candidates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuadParams {
    /// Minimum side length of the fitted quad, in pixels.
    pub min_side_px: f32,
    /// Maximum component extent relative to the larger image dimension.
    pub max_size_rel: f32,
    /// Minimum ratio `area(quad) / area(convex hull)`.
    pub min_hull_fill: f32,
}

impl Default for QuadParams {
    fn default() -> Self {
        Self {
            min_side_px: 10.0,
            max_size_rel: 0.95,
            min_hull_fill: 0.85,
        }
    }
}

/// Fit a convex quad to a component outline.
///
/// Corners are returned with positive shoelace area, i.e. clockwise on screen
/// in y-down image coordinates. Returns `None` when the outline is not
/// quad-like enough.
pub fn fit_quad(component: &Component, params: &QuadParams) -> Option<[Point2<f32>; 4]> {
    let min_side = params.min_side_px.max(1.0) as f64;
    if (component.width() as f64) < min_side || (component.height() as f64) < min_side {
        return None;
    }

    let hull = convex_hull(outline_points(component));
    if hull.len() < 4 {
        return None;
    }
    let hull_area = polygon_area(&hull);
    if hull_area <= 0.0 {
        return None;
    }

    let quad = reduce_to_quad(hull);
    let quad: [Point2<f64>; 4] = quad.try_into().ok()?;
    let quad_area = polygon_area(&quad);
    if quad_area < params.min_hull_fill as f64 * hull_area {
        return None;
    }

    for i in 0..4 {
        if (quad[(i + 1) % 4] - quad[i]).norm() < min_side {
            return None;
        }
    }

    Some(quad.map(|p| p.cast::<f32>()))
}

/// Pixel-square corners at both ends of every run.
fn outline_points(component: &Component) -> Vec<Point2<f64>> {
    let mut pts = Vec::with_capacity(component.runs.len() * 4);
    for run in &component.runs {
        let (y0, y1) = (run.y as f64, run.y as f64 + 1.0);
        let (x0, x1) = (run.x_start as f64, run.x_end as f64 + 1.0);
        pts.extend([
            Point2::new(x0, y0),
            Point2::new(x0, y1),
            Point2::new(x1, y0),
            Point2::new(x1, y1),
        ]);
    }
    pts
}

#[inline]
fn cross(o: Point2<f64>, a: Point2<f64>, b: Point2<f64>) -> f64 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

/// Monotone-chain convex hull without collinear vertices, positive orientation.
pub(crate) fn convex_hull(mut pts: Vec<Point2<f64>>) -> Vec<Point2<f64>> {
    pts.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
    pts.dedup();
    if pts.len() < 3 {
        return pts;
    }

    let mut hull: Vec<Point2<f64>> = Vec::with_capacity(pts.len() + 1);
    for &p in &pts {
        while hull.len() >= 2 && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0.0 {
            hull.pop();
        }
        hull.push(p);
    }
    let lower_len = hull.len() + 1;
    for &p in pts.iter().rev().skip(1) {
        while hull.len() >= lower_len && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0.0
        {
            hull.pop();
        }
        hull.push(p);
    }
    hull.pop();
    hull
}

/// Repeatedly drop the vertex spanning the smallest triangle with its neighbours.
fn reduce_to_quad(mut poly: Vec<Point2<f64>>) -> Vec<Point2<f64>> {
    while poly.len() > 4 {
        let n = poly.len();
        let mut min_area = f64::MAX;
        let mut min_idx = 0;
        for i in 0..n {
            let area = cross(poly[(i + n - 1) % n], poly[i], poly[(i + 1) % n]).abs();
            if area < min_area {
                min_area = area;
                min_idx = i;
            }
        }
        poly.remove(min_idx);
    }
    poly
}

/// Signed shoelace area (positive for the orientation produced by `convex_hull`).
pub(crate) fn polygon_area(poly: &[Point2<f64>]) -> f64 {
    let n = poly.len();
    (0..n)
        .map(|i| {
            let (a, b) = (poly[i], poly[(i + 1) % n]);
            a.x * b.y - b.x * a.y
        })
        .sum::<f64>()
        * 0.5
}
