//! Bounded planar polygons used as reflector, obstacle and door faces.

use crate::error::{AcousticsError, Result};
use crate::math::{Cartesian, DVec3, ZyxEuler};
use std::fmt;

/// Tolerance of the point-in-face test, in meters.
const INSIDE_TOLERANCE: f64 = 1e-9;

/// Result of [`Polygon::nearest`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearestPoint {
    /// Nearest point on the bounded face
    pub point: DVec3,
    /// True if the projection of the query point falls outside the face
    pub is_outside: bool,
    /// Nearest point on the face boundary
    pub on_edge: DVec3,
}

/// A convex planar polygon.
///
/// Vertices are stored in a local frame and placed in the world by a
/// position/orientation pair (see [`apply_rot_loc`](Self::apply_rot_loc)).
/// The face normal follows the right-hand rule over the vertex winding, so a
/// polygon wound counter-clockwise when seen from the front faces the viewer.
#[derive(Debug, Clone)]
pub struct Polygon {
    local_verts: Vec<DVec3>,
    verts: Vec<DVec3>,
    edges: Vec<DVec3>,
    vert_normals: Vec<DVec3>,
    edge_normals: Vec<DVec3>,
    orientation: ZyxEuler,
    delta: DVec3,
    normal: DVec3,
    local_normal: DVec3,
    area: f64,
    aperture: f64,
}

impl Polygon {
    /// Creates a polygon from at least three coplanar, convex vertices.
    ///
    /// # Errors
    ///
    /// Returns [`AcousticsError::Geometry`] for fewer than three vertices, a
    /// zero-area face, non-coplanar vertices or a non-convex outline.
    pub fn new(verts: Vec<DVec3>) -> Result<Self> {
        if verts.len() < 3 {
            return Err(AcousticsError::Geometry(format!(
                "a polygon needs at least 3 vertices, got {}",
                verts.len()
            )));
        }
        let n = verts.len();
        let newell = (0..n).fold(DVec3::ZERO, |acc, k| acc + verts[k].cross(verts[(k + 1) % n]));
        let twice_area = newell.length();
        if twice_area < 1e-12 {
            return Err(AcousticsError::Geometry("polygon has zero area".into()));
        }
        let local_normal = newell / twice_area;

        let scale = verts
            .iter()
            .map(|v| (*v - verts[0]).length())
            .fold(0.0, f64::max);
        for v in &verts {
            if (*v - verts[0]).dot(local_normal).abs() > 1e-6 * scale.max(1.0) {
                return Err(AcousticsError::Geometry(
                    "polygon vertices are not coplanar".into(),
                ));
            }
        }
        for k in 0..n {
            let e0 = verts[(k + 1) % n] - verts[k];
            let e1 = verts[(k + 2) % n] - verts[(k + 1) % n];
            if e0.cross(e1).dot(local_normal) < -1e-9 * scale.max(1.0) {
                return Err(AcousticsError::Geometry("polygon is not convex".into()));
            }
        }

        Ok(Self::assemble(verts, local_normal, 0.5 * twice_area))
    }

    fn assemble(verts: Vec<DVec3>, local_normal: DVec3, area: f64) -> Self {
        let n = verts.len();
        let mut polygon = Self {
            verts: verts.clone(),
            edges: vec![DVec3::ZERO; n],
            vert_normals: vec![DVec3::ZERO; n],
            edge_normals: vec![DVec3::ZERO; n],
            local_verts: verts,
            orientation: ZyxEuler::IDENTITY,
            delta: DVec3::ZERO,
            normal: local_normal,
            local_normal,
            area,
            aperture: (area / std::f64::consts::PI).sqrt(),
        };
        polygon.update();
        polygon
    }

    /// Rectangle in the local y-z plane with vertices (0,0,0), (0,w,0),
    /// (0,w,h), (0,0,h). The face normal points along +x.
    pub fn rectangle(width: f64, height: f64) -> Result<Self> {
        Self::new(vec![
            DVec3::ZERO,
            DVec3::new(0.0, width, 0.0),
            DVec3::new(0.0, width, height),
            DVec3::new(0.0, 0.0, height),
        ])
    }

    /// Places the polygon: local vertices are rotated by `o`, then moved by `p0`.
    pub fn apply_rot_loc(&mut self, p0: DVec3, o: ZyxEuler) {
        self.delta = p0;
        self.orientation = o;
        self.update();
    }

    pub fn translate(&mut self, offset: DVec3) {
        self.delta += offset;
        self.update();
    }

    fn update(&mut self) {
        let n = self.local_verts.len();
        for (v, l) in self.verts.iter_mut().zip(&self.local_verts) {
            *v = self.orientation.rotate(*l) + self.delta;
        }
        self.normal = self.orientation.rotate(self.local_normal);
        for k in 0..n {
            self.edges[k] = self.verts[(k + 1) % n] - self.verts[k];
            self.edge_normals[k] = self.edges[k].cross(self.normal).normal();
        }
        for k in 0..n {
            let prev = (k + n - 1) % n;
            self.vert_normals[k] = (self.edge_normals[prev] + self.edge_normals[k]).normal();
        }
    }

    /// Signed distance of `p0` from the plane, positive on the normal side.
    #[inline]
    pub fn signed_distance(&self, p0: DVec3) -> f64 {
        (p0 - self.verts[0]).dot(self.normal)
    }

    #[inline]
    pub fn is_infront(&self, p0: DVec3) -> bool {
        self.signed_distance(p0) > 0.0
    }

    #[inline]
    pub fn is_behind(&self, p0: DVec3) -> bool {
        self.signed_distance(p0) < 0.0
    }

    /// Nearest point on the infinite plane.
    #[inline]
    pub fn nearest_on_plane(&self, p0: DVec3) -> DVec3 {
        p0 - self.normal * self.signed_distance(p0)
    }

    /// Geometric reflection of `p0` across the infinite plane.
    #[inline]
    pub fn mirror(&self, p0: DVec3) -> DVec3 {
        self.nearest_on_plane(p0) * 2.0 - p0
    }

    /// True if the orthogonal projection of `p0` lies on the bounded face.
    pub fn contains_projection(&self, p0: DVec3) -> bool {
        let q = self.nearest_on_plane(p0);
        self.verts
            .iter()
            .zip(&self.edge_normals)
            .all(|(v, en)| (q - *v).dot(*en) <= INSIDE_TOLERANCE)
    }

    /// Nearest point on the face boundary and the index of its edge.
    pub fn nearest_on_boundary(&self, p0: DVec3) -> (DVec3, usize) {
        let mut best = edge_nearest(self.verts[0], self.edges[0], p0);
        let mut best_dist = (best - p0).length_squared();
        let mut best_edge = 0;
        for k in 1..self.verts.len() {
            let candidate = edge_nearest(self.verts[k], self.edges[k], p0);
            let d = (candidate - p0).length_squared();
            if d < best_dist {
                best = candidate;
                best_dist = d;
                best_edge = k;
            }
        }
        (best, best_edge)
    }

    /// Nearest point on the face boundary.
    ///
    /// If the projection of `p0` falls inside the face, the center of the first
    /// edge is returned instead (with edge index 0). Use
    /// [`nearest_on_boundary`](Self::nearest_on_boundary) for the true minimum.
    pub fn nearest_on_edge(&self, p0: DVec3) -> (DVec3, usize) {
        if self.contains_projection(p0) {
            (self.verts[0] + self.edges[0] * 0.5, 0)
        } else {
            self.nearest_on_boundary(p0)
        }
    }

    /// Nearest point on the bounded face.
    pub fn nearest(&self, p0: DVec3) -> NearestPoint {
        let (on_edge, _) = self.nearest_on_boundary(p0);
        if self.contains_projection(p0) {
            NearestPoint {
                point: self.nearest_on_plane(p0),
                is_outside: false,
                on_edge,
            }
        } else {
            NearestPoint {
                point: on_edge,
                is_outside: true,
                on_edge,
            }
        }
    }

    /// Intersection of the line through `p0` and `p1` with the infinite plane.
    ///
    /// Returns the intersection point and its weight along the segment: 0 at
    /// `p0`, 1 at `p1`. `None` if the line is parallel to the plane.
    pub fn intersection(&self, p0: DVec3, p1: DVec3) -> Option<(DVec3, f64)> {
        let d = p1 - p0;
        let denom = d.dot(self.normal);
        if denom.abs() < 1e-12 {
            return None;
        }
        let w = (self.verts[0] - p0).dot(self.normal) / denom;
        Some((p0 + d * w, w))
    }

    pub fn verts(&self) -> &[DVec3] {
        &self.verts
    }

    pub fn edges(&self) -> &[DVec3] {
        &self.edges
    }

    pub fn vert_normals(&self) -> &[DVec3] {
        &self.vert_normals
    }

    pub fn edge_normals(&self) -> &[DVec3] {
        &self.edge_normals
    }

    pub fn normal(&self) -> DVec3 {
        self.normal
    }

    pub fn area(&self) -> f64 {
        self.area
    }

    /// Radius of the disc with the same area as the face.
    pub fn aperture(&self) -> f64 {
        self.aperture
    }

    pub fn centroid(&self) -> DVec3 {
        self.verts.iter().copied().sum::<DVec3>() / self.verts.len() as f64
    }

    pub fn position(&self) -> DVec3 {
        self.delta
    }

    pub fn orientation(&self) -> ZyxEuler {
        self.orientation
    }
}

impl Default for Polygon {
    /// A 1 m x 2 m rectangle facing +x.
    fn default() -> Self {
        let verts = vec![
            DVec3::ZERO,
            DVec3::new(0.0, 1.0, 0.0),
            DVec3::new(0.0, 1.0, 2.0),
            DVec3::new(0.0, 0.0, 2.0),
        ];
        Self::assemble(verts, DVec3::X, 2.0)
    }
}

impl fmt::Display for Polygon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (k, v) in self.verts.iter().enumerate() {
            if k > 0 {
                write!(f, ", ")?;
            }
            write!(f, "({}, {}, {})", v.x, v.y, v.z)?;
        }
        Ok(())
    }
}

/// Nearest point to `p0` on the edge starting at `v` with direction `d`.
pub fn edge_nearest(v: DVec3, d: DVec3, p0: DVec3) -> DVec3 {
    let l = d.length();
    if l < 1e-12 {
        return v;
    }
    let n = d / l;
    let r = n.dot(p0 - v);
    if r < 0.0 {
        return v;
    }
    if r > l {
        return v + d;
    }
    v + n * r
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: DVec3, b: DVec3) -> bool {
        (a - b).length() < 1e-9
    }

    /// 2 x 2 m wall in the plane x = 4, centered on the x axis, facing -x.
    fn wall() -> Polygon {
        let mut p = Polygon::rectangle(2.0, 2.0).unwrap();
        p.apply_rot_loc(
            DVec3::new(4.0, 1.0, -1.0),
            ZyxEuler::new(std::f64::consts::PI, 0.0, 0.0),
        );
        p
    }

    #[test]
    fn test_rectangle_normal_and_area() {
        let p = Polygon::rectangle(2.0, 3.0).unwrap();
        assert!(approx(p.normal(), DVec3::X));
        assert!((p.area() - 6.0).abs() < 1e-12);
        assert!((p.aperture() - (6.0 / std::f64::consts::PI).sqrt()).abs() < 1e-12);
        assert_eq!(p.verts().len(), 4);
        assert!(approx(p.edge_normals()[0], -DVec3::Z));
    }

    #[test]
    fn test_degenerate_polygons_are_rejected() {
        assert!(Polygon::new(vec![DVec3::ZERO, DVec3::X]).is_err());
        assert!(Polygon::new(vec![DVec3::ZERO, DVec3::X, DVec3::X * 2.0]).is_err());
        let non_convex = vec![
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(0.0, 2.0, 0.0),
            DVec3::new(0.0, 1.0, 0.5),
            DVec3::new(0.0, 2.0, 2.0),
            DVec3::new(0.0, 0.0, 2.0),
        ];
        assert!(Polygon::new(non_convex).is_err());
    }

    #[test]
    fn test_placement_and_classification() {
        let w = wall();
        assert!(approx(w.normal(), -DVec3::X));
        assert!(w.is_infront(DVec3::new(2.0, 0.0, 0.0)));
        assert!(w.is_behind(DVec3::new(5.0, 0.0, 0.0)));
        assert!(!w.is_infront(DVec3::new(4.0, 0.3, 0.2)));
        assert!(approx(w.centroid(), DVec3::new(4.0, 0.0, 0.0)));
    }

    #[test]
    fn test_nearest_queries() {
        let w = wall();
        let p = DVec3::new(1.0, 0.5, 0.2);
        assert!(approx(w.nearest_on_plane(p), DVec3::new(4.0, 0.5, 0.2)));

        let inside = w.nearest(p);
        assert!(!inside.is_outside);
        assert!(approx(inside.point, DVec3::new(4.0, 0.5, 0.2)));

        let outside = w.nearest(DVec3::new(1.0, 3.0, 0.0));
        assert!(outside.is_outside);
        assert!(approx(outside.point, DVec3::new(4.0, 1.0, 0.0)));

        // interior projection: midpoint of the first edge
        let (mid, k) = w.nearest_on_edge(p);
        assert_eq!(k, 0);
        assert!(approx(mid, w.verts()[0] + w.edges()[0] * 0.5));
        let (b, _) = w.nearest_on_boundary(p);
        assert!(approx(b, DVec3::new(4.0, 1.0, 0.2)));
    }

    #[test]
    fn test_intersection_weight() {
        let w = wall();
        let (p, weight) = w
            .intersection(DVec3::new(2.0, 0.0, 0.0), DVec3::new(6.0, 0.0, 0.0))
            .unwrap();
        assert!(approx(p, DVec3::new(4.0, 0.0, 0.0)));
        assert!((weight - 0.5).abs() < 1e-12);
        assert!(w
            .intersection(DVec3::new(2.0, 0.0, 0.0), DVec3::new(2.0, 1.0, 0.0))
            .is_none());
    }

    #[test]
    fn test_mirror_is_an_involution() {
        let w = wall();
        for p in [
            DVec3::new(2.0, 0.0, 0.0),
            DVec3::new(-1.0, 3.5, 7.0),
            DVec3::new(4.0, 0.2, 0.1),
        ] {
            assert!(approx(w.mirror(w.mirror(p)), p));
        }
        assert!(approx(w.mirror(DVec3::new(2.0, 0.0, 0.0)), DVec3::new(6.0, 0.0, 0.0)));
    }

    #[test]
    fn test_edge_nearest_clamps() {
        let v = DVec3::ZERO;
        let d = DVec3::new(2.0, 0.0, 0.0);
        assert!(approx(edge_nearest(v, d, DVec3::new(-1.0, 1.0, 0.0)), v));
        assert!(approx(edge_nearest(v, d, DVec3::new(3.0, 1.0, 0.0)), d));
        assert!(approx(
            edge_nearest(v, d, DVec3::new(1.0, 1.0, 0.0)),
            DVec3::new(1.0, 0.0, 0.0)
        ));
    }
}
