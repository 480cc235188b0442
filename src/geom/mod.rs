//! Geometry primitives: points, rectangles, polylines and multi-polylines,
//! with the affine/polyline utilities the store and renderer build on
//! (crop, nearest point, convex hull, Ramer-Douglas-Peucker simplification).

pub mod line;
pub mod point;
pub mod rect;

pub use line::{convex_hull, Line, MultiLine};
pub use point::Point;
pub use rect::Rect;
