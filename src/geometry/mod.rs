//! Geometry kernel: bounded polygons, boxes and convex hulls.

pub mod hull;
pub mod polygon;
pub mod shoebox;

pub use hull::{ConvexHull, HullFace, icosahedron, subdivide_and_normalize};
pub use polygon::{NearestPoint, Polygon, edge_nearest};
pub use shoebox::Shoebox;
