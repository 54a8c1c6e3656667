//! Convex hulls of point sets and sphere tessellation.

use crate::error::{AcousticsError, Result};
use crate::math::DVec3;

/// Triangle of a hull, as indices into the input point list.
///
/// Vertices are wound so that the right-hand normal points outward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HullFace {
    pub a: usize,
    pub b: usize,
    pub c: usize,
}

impl HullFace {
    fn edges(&self) -> [(usize, usize); 3] {
        [(self.a, self.b), (self.b, self.c), (self.c, self.a)]
    }
}

/// Triangulated convex hull built incrementally.
#[derive(Debug, Clone)]
pub struct ConvexHull {
    pub faces: Vec<HullFace>,
}

fn face_normal(points: &[DVec3], f: &HullFace) -> DVec3 {
    (points[f.b] - points[f.a])
        .cross(points[f.c] - points[f.a])
        .normalize_or_zero()
}

impl ConvexHull {
    /// # Errors
    ///
    /// Returns [`AcousticsError::Geometry`] if fewer than four points are given
    /// or all points are coplanar.
    pub fn new(points: &[DVec3]) -> Result<Self> {
        if points.len() < 4 {
            return Err(AcousticsError::Geometry(format!(
                "a convex hull needs at least 4 points, got {}",
                points.len()
            )));
        }
        let scale = points
            .iter()
            .map(|p| (*p - points[0]).length())
            .fold(0.0, f64::max)
            .max(1e-12);
        let eps = 1e-9 * scale;

        let i0 = 0;
        let i1 = argmax(points, |p| (*p - points[i0]).length());
        let axis = (points[i1] - points[i0]).normalize_or_zero();
        let i2 = argmax(points, |p| {
            let d = *p - points[i0];
            (d - axis * d.dot(axis)).length()
        });
        let plane_n = (points[i1] - points[i0])
            .cross(points[i2] - points[i0])
            .normalize_or_zero();
        let i3 = argmax(points, |p| (*p - points[i0]).dot(plane_n).abs());
        if (points[i3] - points[i0]).dot(plane_n).abs() <= eps || plane_n == DVec3::ZERO {
            return Err(AcousticsError::Geometry("hull points are coplanar".into()));
        }

        let center = (points[i0] + points[i1] + points[i2] + points[i3]) * 0.25;
        let mut faces = Vec::with_capacity(2 * points.len());
        for (a, b, c) in [(i0, i1, i2), (i0, i2, i3), (i0, i3, i1), (i1, i3, i2)] {
            let mut f = HullFace { a, b, c };
            if face_normal(points, &f).dot(center - points[a]) > 0.0 {
                std::mem::swap(&mut f.b, &mut f.c);
            }
            faces.push(f);
        }

        let mut visible = Vec::new();
        let mut horizon = Vec::new();
        for (k, p) in points.iter().enumerate() {
            if k == i0 || k == i1 || k == i2 || k == i3 {
                continue;
            }
            visible.clear();
            visible.extend(
                faces
                    .iter()
                    .map(|f| face_normal(points, f).dot(*p - points[f.a]) > eps),
            );
            if !visible.iter().any(|v| *v) {
                continue;
            }
            horizon.clear();
            for (f, _) in faces.iter().zip(&visible).filter(|(_, v)| **v) {
                for (u, v) in f.edges() {
                    let shared = faces
                        .iter()
                        .zip(&visible)
                        .filter(|(_, vis)| **vis)
                        .any(|(g, _)| g.edges().contains(&(v, u)));
                    if !shared {
                        horizon.push((u, v));
                    }
                }
            }
            let mut idx = 0;
            faces.retain(|_| {
                let keep = !visible[idx];
                idx += 1;
                keep
            });
            faces.extend(horizon.iter().map(|&(u, v)| HullFace { a: u, b: v, c: k }));
        }
        Ok(Self { faces })
    }
}

fn argmax(points: &[DVec3], f: impl Fn(&DVec3) -> f64) -> usize {
    let mut best = 0;
    let mut best_val = f64::NEG_INFINITY;
    for (k, p) in points.iter().enumerate() {
        let v = f(p);
        if v > best_val {
            best = k;
            best_val = v;
        }
    }
    best
}

/// Vertices of a regular icosahedron on the unit sphere.
pub fn icosahedron() -> Vec<DVec3> {
    let phi = 0.5 * (1.0 + 5f64.sqrt());
    let mut verts = Vec::with_capacity(12);
    for s1 in [-1.0, 1.0] {
        for s2 in [-1.0, 1.0] {
            verts.push(DVec3::new(0.0, s1, s2 * phi));
            verts.push(DVec3::new(s1, s2 * phi, 0.0));
            verts.push(DVec3::new(s2 * phi, 0.0, s1));
        }
    }
    verts.iter().map(|v| v.normalize()).collect()
}

/// Adds the normalised edge midpoints of the hull of `mesh`, `iterations` times.
pub fn subdivide_and_normalize(mut mesh: Vec<DVec3>, iterations: u32) -> Result<Vec<DVec3>> {
    for _ in 0..iterations {
        let hull = ConvexHull::new(&mesh)?;
        let mut added = Vec::new();
        for f in &hull.faces {
            for (u, v) in f.edges() {
                let mid = ((mesh[u] + mesh[v]) * 0.5).normalize();
                if !added.iter().any(|p: &DVec3| (*p - mid).length() < 1e-9) {
                    added.push(mid);
                }
            }
        }
        mesh.extend(added);
    }
    Ok(mesh)
}
