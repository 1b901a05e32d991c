use serde::{Deserialize, Serialize};

use crate::{
    Point2D,
    geometry_utils::{dot, unit_normal},
};

/// Which way the counting line runs across the frame.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum LineOrientation {
    /// `y = position`; Near is the top of the frame
    #[default]
    Horizontal,
    /// `x = position`; Near is the left of the frame
    Vertical,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Near,
    Far,
}

/// A straight counting line plus its hysteresis margin (pixels).
///
/// Stored as a unit normal and offset, so that the "relevant coordinate" of
/// any point is its signed distance from the line: negative on the Near side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundaryLine {
    start: Point2D,
    end: Point2D,
    normal: Point2D,
    offset: f32,
    margin: f32,
}

impl BoundaryLine {
    /// Line through `start` and `end`. Near is the side to the left of the
    /// direction of travel in image coordinates (i.e. "above" for a line
    /// drawn left to right). None if the two points coincide.
    pub fn through(start: Point2D, end: Point2D, margin: f32) -> Option<Self> {
        let normal = unit_normal(&start, &end)?;
        Some(BoundaryLine {
            start,
            end,
            normal,
            offset: dot(&normal, &start),
            margin: margin.max(0.),
        })
    }

    pub fn horizontal(y: f32, margin: f32) -> Self {
        BoundaryLine {
            start: (0., y),
            end: (1., y),
            normal: (0., 1.),
            offset: y,
            margin: margin.max(0.),
        }
    }

    pub fn vertical(x: f32, margin: f32) -> Self {
        BoundaryLine {
            start: (x, 1.),
            end: (x, 0.),
            normal: (1., 0.),
            offset: x,
            margin: margin.max(0.),
        }
    }

    /// Place the line at a fraction of the frame height (or width, for a
    /// vertical line), truncated to a whole pixel.
    pub fn from_fraction(
        orientation: LineOrientation,
        fraction: f32,
        width: u32,
        height: u32,
        margin: f32,
    ) -> Self {
        match orientation {
            LineOrientation::Horizontal => {
                BoundaryLine::horizontal((height as f32 * fraction).floor(), margin)
            }
            LineOrientation::Vertical => {
                BoundaryLine::vertical((width as f32 * fraction).floor(), margin)
            }
        }
    }

    pub fn at_position(orientation: LineOrientation, position: f32, margin: f32) -> Self {
        match orientation {
            LineOrientation::Horizontal => BoundaryLine::horizontal(position, margin),
            LineOrientation::Vertical => BoundaryLine::vertical(position, margin),
        }
    }

    pub fn signed_distance(&self, point: &Point2D) -> f32 {
        dot(&self.normal, point) - self.offset
    }

    pub fn margin(&self) -> f32 {
        self.margin
    }

    /// The two points the line was defined from, for drawing
    pub fn segment(&self) -> (Point2D, Point2D) {
        (self.start, self.end)
    }
}

/// Which side of `line` a point is on.
///
/// Without the margin (first sighting) anything short of the line is Near.
/// With the margin a point must be more than `margin` onto the Near side to
/// count as Near; the band `[-margin, 0)` and the line itself resolve to Far.
pub fn classify(point: &Point2D, line: &BoundaryLine, use_margin: bool) -> Side {
    let threshold = if use_margin { -line.margin } else { 0. };
    if line.signed_distance(point) < threshold {
        Side::Near
    } else {
        Side::Far
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_without_margin() {
        let line = BoundaryLine::horizontal(300., 5.);
        assert_eq!(classify(&(0., 250.), &line, false), Side::Near);
        assert_eq!(classify(&(0., 299.9), &line, false), Side::Near);
        assert_eq!(classify(&(0., 300.), &line, false), Side::Far); // tie
        assert_eq!(classify(&(0., 320.), &line, false), Side::Far);
    }

    #[test]
    fn test_classify_with_margin() {
        let line = BoundaryLine::horizontal(300., 5.);
        assert_eq!(classify(&(0., 294.), &line, true), Side::Near);
        assert_eq!(classify(&(0., 295.), &line, true), Side::Far); // tie on the band edge
        assert_eq!(classify(&(0., 298.), &line, true), Side::Far);
        assert_eq!(classify(&(0., 305.), &line, true), Side::Far);
    }

    #[test]
    fn test_vertical_line() {
        let line = BoundaryLine::vertical(100., 2.);
        assert_eq!(classify(&(90., 0.), &line, true), Side::Near);
        assert_eq!(classify(&(99., 1000.), &line, true), Side::Far);
        assert_eq!(classify(&(99., 1000.), &line, false), Side::Near);
    }

    #[test]
    fn test_through_points_matches_horizontal() {
        let through = BoundaryLine::through((0., 300.), (640., 300.), 5.).unwrap();
        let horizontal = BoundaryLine::horizontal(300., 5.);
        for y in [250., 294., 296., 300., 350.] {
            assert_eq!(
                classify(&(17., y), &through, true),
                classify(&(17., y), &horizontal, true)
            );
        }
        assert!(BoundaryLine::through((1., 1.), (1., 1.), 5.).is_none());
    }

    #[test]
    fn test_from_fraction_truncates() {
        let line = BoundaryLine::from_fraction(LineOrientation::Horizontal, 0.6, 640, 481, 5.);
        // 481 * 0.6 = 288.6
        assert_eq!(line.signed_distance(&(0., 288.)), 0.);
    }

    #[test]
    fn test_negative_margin_clamped() {
        let line = BoundaryLine::horizontal(10., -3.);
        assert_eq!(line.margin(), 0.);
    }
}
