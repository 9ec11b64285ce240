// geometry.rs - 🚀 Blazingly Fast Contour Geometry 🚀

use imageproc::geometry::convex_hull;
use imageproc::point::Point;
use nalgebra::Matrix2;

/// Axis-aligned bounding box in pixel coordinates, `w`/`h` inclusive of the
/// boundary pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl BoundingBox {
    pub fn of(points: &[Point<i32>]) -> Self {
        let mut min_x = i32::MAX;
        let mut min_y = i32::MAX;
        let mut max_x = i32::MIN;
        let mut max_y = i32::MIN;
        for p in points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Self {
            x: min_x,
            y: min_y,
            w: max_x - min_x + 1,
            h: max_y - min_y + 1,
        }
    }

    /// Horizontal center, integer pixel coordinates.
    pub fn center_x(&self) -> i32 {
        self.x + self.w / 2
    }

    /// Vertical center, integer pixel coordinates.
    pub fn center_y(&self) -> i32 {
        self.y + self.h / 2
    }

    pub fn area(&self) -> i64 {
        self.w as i64 * self.h as i64
    }

    /// Intersection area with another box, zero when disjoint.
    pub fn overlap_area(&self, other: &BoundingBox) -> i64 {
        let ox = ((self.x + self.w).min(other.x + other.w) - self.x.max(other.x)).max(0) as i64;
        let oy = ((self.y + self.h).min(other.y + other.h) - self.y.max(other.y)).max(0) as i64;
        ox * oy
    }
}

/// Polygon area of a closed contour via the shoelace formula.
pub fn contour_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut area = 0.0;
    for i in 0..points.len() {
        let j = (i + 1) % points.len();
        area += points[i].x as f64 * points[j].y as f64;
        area -= points[j].x as f64 * points[i].y as f64;
    }
    area.abs() / 2.0
}

/// Arc length of the closed contour polygon.
pub fn perimeter(points: &[Point<i32>]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    let mut length = 0.0;
    for i in 0..points.len() {
        let j = (i + 1) % points.len();
        let dx = (points[j].x - points[i].x) as f64;
        let dy = (points[j].y - points[i].y) as f64;
        length += (dx * dx + dy * dy).sqrt();
    }
    length
}

/// `4π·area/perimeter²`; 1.0 for a perfect circle.
pub fn circularity(area: f64, perimeter: f64) -> f64 {
    if perimeter <= 0.0 {
        return 0.0;
    }
    4.0 * std::f64::consts::PI * area / (perimeter * perimeter)
}

/// Area of the convex hull of the contour.
pub fn convex_hull_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let hull = convex_hull(points);
    contour_area(&hull)
}

/// Area of the ellipse fitted to the contour from its second central
/// moments. Semi-axes are `sqrt(2λ)` for the covariance eigenvalues λ, which
/// reproduces the source circle for points sampled on a circle boundary.
/// Returns `None` for degenerate point sets.
pub fn fitted_ellipse_area(points: &[Point<i32>]) -> Option<f64> {
    if points.len() < 5 {
        return None;
    }
    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p.x as f64).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.y as f64).sum::<f64>() / n;

    let mut sxx = 0.0;
    let mut syy = 0.0;
    let mut sxy = 0.0;
    for p in points {
        let dx = p.x as f64 - mean_x;
        let dy = p.y as f64 - mean_y;
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }
    sxx /= n;
    syy /= n;
    sxy /= n;

    let covariance = Matrix2::new(sxx, sxy, sxy, syy);
    let eigen = covariance.symmetric_eigen();
    let l1 = eigen.eigenvalues[0];
    let l2 = eigen.eigenvalues[1];
    if l1 <= f64::EPSILON || l2 <= f64::EPSILON {
        return None;
    }

    let semi_major = (2.0 * l1).sqrt();
    let semi_minor = (2.0 * l2).sqrt();
    Some(std::f64::consts::PI * semi_major * semi_minor)
}
