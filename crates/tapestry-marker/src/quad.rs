//! Four-corner marker outlines in photo pixel coordinates.

use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

/// Marker outline: TL, TR, BR, BL in the marker's own orientation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quad {
    pub corners: [Point2<f64>; 4],
}

impl Quad {
    pub fn new(corners: [Point2<f64>; 4]) -> Self {
        Self { corners }
    }

    /// Axis-aligned square with top-left at `(x, y)`.
    pub fn square(x: f64, y: f64, side: f64) -> Self {
        Self::new([
            Point2::new(x, y),
            Point2::new(x + side, y),
            Point2::new(x + side, y + side),
            Point2::new(x, y + side),
        ])
    }

    #[inline]
    fn edge(&self, i: usize) -> Vector2<f64> {
        self.corners[(i + 1) % 4] - self.corners[i]
    }

    /// Shoelace area; positive when the corners run clockwise on screen (y down).
    pub fn signed_area(&self) -> f64 {
        let mut acc = 0.0;
        for i in 0..4 {
            let a = self.corners[i];
            let b = self.corners[(i + 1) % 4];
            acc += a.x * b.y - b.x * a.y;
        }
        0.5 * acc
    }

    #[inline]
    pub fn area(&self) -> f64 {
        self.signed_area().abs()
    }

    /// Lengths of TL→TR, TR→BR, BR→BL, BL→TL.
    pub fn side_lengths(&self) -> [f64; 4] {
        [0, 1, 2, 3].map(|i| self.edge(i).norm())
    }

    pub fn mean_side(&self) -> f64 {
        self.side_lengths().iter().sum::<f64>() / 4.0
    }

    /// Mean of the four corners.
    pub fn centroid(&self) -> Point2<f64> {
        let sum = self
            .corners
            .iter()
            .fold(Vector2::zeros(), |acc, p| acc + p.coords);
        Point2::from(sum / 4.0)
    }

    /// Strictly convex with every turn in the same direction. Rejects
    /// self-intersecting (bow-tie) outlines and collinear corners.
    pub fn is_convex(&self) -> bool {
        let mut sign = 0.0f64;
        for i in 0..4 {
            let a = self.edge(i);
            let b = self.edge((i + 1) % 4);
            let cross = a.x * b.y - a.y * b.x;
            if cross.abs() <= f64::EPSILON * a.norm() * b.norm() || !cross.is_finite() {
                return false;
            }
            if sign == 0.0 {
                sign = cross.signum();
            } else if cross.signum() != sign {
                return false;
            }
        }
        true
    }

    /// Direction of the marker's horizontal axis, in degrees clockwise from
    /// the photo's +x axis (y down). Averages the top and bottom edges.
    pub fn orientation_deg(&self) -> f64 {
        let top = self.corners[1] - self.corners[0];
        let bottom = self.corners[2] - self.corners[3];
        let axis = top + bottom;
        axis.y.atan2(axis.x).to_degrees().rem_euclid(360.0)
    }

    /// 1.0 for a perfect rectangle, falling towards 0 as opposite sides
    /// differ in length and corners leave 90°.
    pub fn rectangularity(&self) -> f64 {
        let sides = self.side_lengths();
        let mut side_score = 1.0;
        for (a, b) in [(sides[0], sides[2]), (sides[1], sides[3])] {
            let hi = a.max(b);
            side_score *= if hi > 0.0 { a.min(b) / hi } else { 0.0 };
        }

        let right = std::f64::consts::FRAC_PI_2;
        let mut angle_score = 1.0;
        for i in 0..4 {
            let v1 = self.corners[(i + 3) % 4] - self.corners[i];
            let v2 = self.corners[(i + 1) % 4] - self.corners[i];
            let denom = v1.norm() * v2.norm();
            if denom <= 0.0 {
                return 0.0;
            }
            let angle = (v1.dot(&v2) / denom).clamp(-1.0, 1.0).acos();
            angle_score *= (1.0 - (angle - right).abs() / right).max(0.0);
        }
        side_score * angle_score
    }

    pub fn is_finite(&self) -> bool {
        self.corners.iter().all(|p| p.x.is_finite() && p.y.is_finite())
    }

    /// Projective image of `(u, v)` on the unit square whose corners
    /// (0,0), (1,0), (1,1), (0,1) map to corners 0..3 of this quad.
    ///
    /// `None` when the outline is degenerate or the point maps to infinity.
    pub fn map_unit(&self, u: f64, v: f64) -> Option<Point2<f64>> {
        let [p0, p1, p2, p3] = self.corners;
        let sum = (p0 - p1) + (p2 - p3);
        let d1 = p1 - p2;
        let d2 = p3 - p2;
        let den = d1.x * d2.y - d2.x * d1.y;
        if !den.is_finite() || den.abs() <= f64::EPSILON * d1.norm() * d2.norm() {
            return None;
        }
        let g = (sum.x * d2.y - d2.x * sum.y) / den;
        let h = (d1.x * sum.y - sum.x * d1.y) / den;

        let w = g * u + h * v + 1.0;
        if w.abs() <= f64::EPSILON {
            return None;
        }
        let x = (p1.x - p0.x + g * p1.x) * u + (p3.x - p0.x + h * p3.x) * v + p0.x;
        let y = (p1.y - p0.y + g * p1.y) * u + (p3.y - p0.y + h * p3.y) * v + p0.y;
        Some(Point2::new(x / w, y / w))
    }

    /// Sub-square `[0, t]²` of the projective unit square, anchored at
    /// corner 0.
    pub fn sub_square(&self, t: f64) -> Option<Quad> {
        Some(Quad::new([
            self.corners[0],
            self.map_unit(t, 0.0)?,
            self.map_unit(t, t)?,
            self.map_unit(0.0, t)?,
        ]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn rotated_square(cx: f64, cy: f64, side: f64, deg: f64) -> Quad {
        let (s, c) = deg.to_radians().sin_cos();
        let h = side / 2.0;
        let local = [(-h, -h), (h, -h), (h, h), (-h, h)];
        Quad::new(local.map(|(x, y)| Point2::new(cx + c * x - s * y, cy + s * x + c * y)))
    }

    #[test]
    fn square_metrics() {
        let q = Quad::square(10.0, 20.0, 10.0);
        assert_relative_eq!(q.area(), 100.0);
        assert!(q.signed_area() > 0.0);
        assert_relative_eq!(q.mean_side(), 10.0);
        assert_relative_eq!(q.centroid(), Point2::new(15.0, 25.0));
        assert!(q.is_convex());
        assert_relative_eq!(q.rectangularity(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(q.orientation_deg(), 0.0);
    }

    #[test]
    fn orientation_follows_clockwise_rotation() {
        for deg in [0.0, 30.0, 90.0, 180.0, 270.0, 315.0] {
            let q = rotated_square(50.0, 50.0, 20.0, deg);
            let got = q.orientation_deg();
            let diff = (got - deg).rem_euclid(360.0);
            assert!(diff < 1e-9 || 360.0 - diff < 1e-9, "{deg} -> {got}");
            assert_relative_eq!(q.area(), 400.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn bow_tie_and_collinear_are_not_convex() {
        let bow = Quad::new([
            Point2::new(0.0, 0.0),
            Point2::new(10.0, 10.0),
            Point2::new(10.0, 0.0),
            Point2::new(0.0, 10.0),
        ]);
        assert!(!bow.is_convex());

        let flat = Quad::new([
            Point2::new(0.0, 0.0),
            Point2::new(5.0, 0.0),
            Point2::new(10.0, 0.0),
            Point2::new(0.0, 10.0),
        ]);
        assert!(!flat.is_convex());
    }

    #[test]
    fn unit_map_hits_corners_under_perspective() {
        let q = Quad::new([
            Point2::new(12.0, 5.0),
            Point2::new(90.0, 14.0),
            Point2::new(84.0, 70.0),
            Point2::new(4.0, 80.0),
        ]);
        let unit = [(1.0, 0.0), (1.0, 1.0), (0.0, 1.0)];
        for ((u, v), corner) in unit.into_iter().zip(&q.corners[1..]) {
            assert_relative_eq!(q.map_unit(u, v).unwrap(), *corner, epsilon = 1e-9);
        }
        let whole = q.sub_square(1.0).unwrap();
        for (a, b) in whole.corners.iter().zip(&q.corners) {
            assert_relative_eq!(*a, *b, epsilon = 1e-9);
        }
    }

    #[test]
    fn sub_square_keeps_origin_corner() {
        let q = Quad::square(100.0, 50.0, 22.0);
        let inner = q.sub_square(21.0 / 22.0).unwrap();
        let expect = Quad::square(100.0, 50.0, 21.0);
        for (a, b) in inner.corners.iter().zip(&expect.corners) {
            assert_relative_eq!(*a, *b, epsilon = 1e-9);
        }
        assert!(Quad::new([Point2::new(1.0, 1.0); 4]).sub_square(0.5).is_none());
    }

    #[test]
    fn trapezoid_scores_below_rectangle() {
        let q = Quad::new([
            Point2::new(2.0, 0.0),
            Point2::new(8.0, 0.0),
            Point2::new(10.0, 10.0),
            Point2::new(0.0, 10.0),
        ]);
        let r = q.rectangularity();
        assert!(r > 0.0 && r < 0.7, "{r}");
    }
}
