use crate::Point2D;

/// Centre of an `[x1, y1, x2, y2]` box
pub fn box_centroid(bbox: &[f32; 4]) -> Point2D {
    let [x1, y1, x2, y2] = *bbox;
    ((x1 + x2) / 2., (y1 + y2) / 2.)
}

pub fn is_finite_box(bbox: &[f32; 4]) -> bool {
    bbox.iter().all(|v| v.is_finite())
}

/// Unit normal of the line running from `a` to `b`, rotated so that a
/// left-to-right horizontal line has its normal pointing down the image (+y).
/// Returns None for a degenerate (zero-length) segment.
pub fn unit_normal(a: &Point2D, b: &Point2D) -> Option<Point2D> {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let length = f32::sqrt(dx * dx + dy * dy);
    if length > 0. && length.is_finite() {
        Some((-dy / length, dx / length))
    } else {
        None
    }
}

pub fn dot(a: &Point2D, b: &Point2D) -> f32 {
    a.0 * b.0 + a.1 * b.1
}
