// THEORY:
// The `geometry` module answers the single spatial question the rest of the
// system ever asks: "is this point inside the guarded zone?"
//
// The zone is a closed polygon in frame pixel coordinates, drawn once by an
// operator and loaded at startup. Detections are reduced to their box center
// before asking the question, so a person whose center lies on the painted
// border of the zone counts as inside. Coordinates are widened to `i128`, where
// the product of two `i32` differences cannot overflow, so the test is exact
// for any `i32` coordinates and never depends on float rounding.

use crate::error::GeometryError;
use serde::{Deserialize, Serialize};

/// A point in frame pixel coordinates. Serialized as `[x, y]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[i32; 2]", into = "[i32; 2]")]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl From<[i32; 2]> for Point {
    fn from([x, y]: [i32; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Point> for [i32; 2] {
    fn from(p: Point) -> Self {
        [p.x, p.y]
    }
}

/// A closed polygon with at least three vertices. The last vertex connects
/// back to the first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Polygon {
    vertices: Vec<Point>,
}

impl Polygon {
    pub fn new(vertices: Vec<Point>) -> Result<Self, GeometryError> {
        if vertices.len() < 3 {
            return Err(GeometryError::TooFewVertices { got: vertices.len() });
        }
        Ok(Self { vertices })
    }

    pub fn vertices(&self) -> &[Point] {
        &self.vertices
    }

    /// Boundary-inclusive containment test.
    pub fn contains(&self, point: Point) -> bool {
        contains(point, &self.vertices)
    }
}

/// Crossing-number containment test over an implicitly closed vertex ring.
///
/// Points on an edge or vertex are inside. A ring with fewer than three
/// vertices encloses nothing and always yields `false`.
pub fn contains(point: Point, vertices: &[Point]) -> bool {
    if vertices.len() < 3 {
        return false;
    }

    let (px, py) = (i128::from(point.x), i128::from(point.y));
    let mut inside = false;

    for (i, a) in vertices.iter().enumerate() {
        let b = vertices[(i + 1) % vertices.len()];
        let (ax, ay) = (i128::from(a.x), i128::from(a.y));
        let (bx, by) = (i128::from(b.x), i128::from(b.y));

        if on_segment(px, py, ax, ay, bx, by) {
            return true;
        }

        // Edge straddles the horizontal ray through the point.
        if (ay > py) != (by > py) {
            let dy = by - ay;
            let lhs = (px - ax) * dy;
            let rhs = (py - ay) * (bx - ax);
            let left_of_crossing = if dy > 0 { lhs < rhs } else { lhs > rhs };
            if left_of_crossing {
                inside = !inside;
            }
        }
    }

    inside
}

fn on_segment(px: i128, py: i128, ax: i128, ay: i128, bx: i128, by: i128) -> bool {
    let cross = (bx - ax) * (py - ay) - (by - ay) * (px - ax);
    cross == 0
        && px >= ax.min(bx)
        && px <= ax.max(bx)
        && py >= ay.min(by)
        && py <= ay.max(by)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Polygon {
        Polygon::new(vec![
            Point::new(0, 0),
            Point::new(0, 10),
            Point::new(10, 10),
            Point::new(10, 0),
        ])
        .unwrap()
    }

    #[test]
    fn center_is_inside() {
        assert!(square().contains(Point::new(5, 5)));
    }

    #[test]
    fn far_point_is_outside() {
        let zone = square();
        assert!(!zone.contains(Point::new(11, 5)));
        assert!(!zone.contains(Point::new(-1, 5)));
        assert!(!zone.contains(Point::new(5, 20)));
    }

    #[test]
    fn edges_and_vertices_count_as_inside() {
        let zone = square();
        assert!(zone.contains(Point::new(0, 5)));
        assert!(zone.contains(Point::new(10, 7)));
        assert!(zone.contains(Point::new(3, 0)));
        assert!(zone.contains(Point::new(10, 10)));
        assert!(zone.contains(Point::new(0, 0)));
    }

    #[test]
    fn concave_notch_is_outside() {
        // A "U" shape opening upwards; the notch spans x in (4, 6), y > 4.
        let zone = Polygon::new(vec![
            Point::new(0, 0),
            Point::new(10, 0),
            Point::new(10, 10),
            Point::new(6, 10),
            Point::new(6, 4),
            Point::new(4, 4),
            Point::new(4, 10),
            Point::new(0, 10),
        ])
        .unwrap();

        assert!(!zone.contains(Point::new(5, 8)));
        assert!(zone.contains(Point::new(2, 8)));
        assert!(zone.contains(Point::new(8, 8)));
        assert!(zone.contains(Point::new(5, 2)));
    }

    #[test]
    fn diagonal_edge_boundary() {
        let triangle = Polygon::new(vec![Point::new(0, 0), Point::new(10, 0), Point::new(0, 10)]).unwrap();
        assert!(triangle.contains(Point::new(5, 5)));
        assert!(triangle.contains(Point::new(2, 2)));
        assert!(!triangle.contains(Point::new(6, 5)));
    }

    #[test]
    fn degenerate_rings_contain_nothing() {
        assert!(!contains(Point::new(0, 0), &[]));
        assert!(!contains(Point::new(0, 0), &[Point::new(0, 0), Point::new(1, 1)]));
        assert_eq!(
            Polygon::new(vec![Point::new(0, 0), Point::new(1, 1)]),
            Err(GeometryError::TooFewVertices { got: 2 })
        );
    }

    #[test]
    fn extreme_coordinates_do_not_overflow() {
        let triangle = Polygon::new(vec![
            Point::new(i32::MIN, i32::MIN),
            Point::new(i32::MAX, i32::MAX),
            Point::new(i32::MIN, i32::MAX),
        ])
        .unwrap();

        assert!(!triangle.contains(Point::new(i32::MAX, i32::MIN)));
        assert!(triangle.contains(Point::new(i32::MIN, 0)));
        assert!(triangle.contains(Point::new(0, 0)));
        assert!(triangle.contains(Point::new(-1_000_000, 1_000_000)));
        assert!(!triangle.contains(Point::new(1_000_000, -1_000_000)));
    }

    #[test]
    fn point_deserializes_from_pair() {
        let p: Point = serde_json::from_str("[12, -3]").unwrap();
        assert_eq!(p, Point::new(12, -3));
    }
}
