//! Incremental 3-D convex hull.
//!
//! Starts from a maximal tetrahedron and inserts the remaining points one at a
//! time: faces visible from the new point are removed and the hole bounded by
//! the horizon edges is closed with a fan of triangles to the point. Faces are
//! kept counter-clockwise when viewed from outside.

use std::collections::{HashMap, HashSet};

use glam::DVec3;

use super::{Mesh, MeshKind, SynthesisError};
use crate::pointcloud::MIN_POINTS;

/// Relative tolerance for visibility and degeneracy tests.
const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone)]
struct Face {
    v: [usize; 3],
    /// Unnormalized outward normal.
    normal: DVec3,
    alive: bool,
}

impl Face {
    fn new(points: &[DVec3], v: [usize; 3]) -> Self {
        let normal = (points[v[1]] - points[v[0]]).cross(points[v[2]] - points[v[0]]);
        Self {
            v,
            normal,
            alive: true,
        }
    }

    fn edges(&self) -> [(usize, usize); 3] {
        [(self.v[0], self.v[1]), (self.v[1], self.v[2]), (self.v[2], self.v[0])]
    }

    fn signed_distance_scaled(&self, points: &[DVec3], p: DVec3) -> f64 {
        self.normal.dot(p - points[self.v[0]])
    }

    fn sees(&self, points: &[DVec3], p: DVec3, eps: f64) -> bool {
        self.signed_distance_scaled(points, p) > eps * self.normal.length()
    }
}

/// Computes the convex hull of `points` as a triangle mesh.
///
/// Returned vertices are the hull's extreme points in first-use order; faces
/// index into them. Fails with `DegenerateGeometry` when the points do not
/// span three dimensions.
pub fn convex_hull(points: &[DVec3]) -> Result<Mesh, SynthesisError> {
    if points.len() < MIN_POINTS {
        return Err(SynthesisError::InsufficientPoints {
            found: points.len(),
        });
    }
    if points.iter().any(|p| !p.is_finite()) {
        return Err(SynthesisError::DegenerateGeometry(
            "point set contains non-finite coordinates".to_string(),
        ));
    }

    let scale = points
        .iter()
        .map(|p| p.abs().max_element())
        .fold(0.0_f64, f64::max)
        .max(f64::MIN_POSITIVE);
    let eps = EPSILON * scale;

    let simplex = initial_simplex(points, eps)?;
    let mut faces = simplex_faces(points, simplex);

    let in_simplex: HashSet<usize> = simplex.iter().copied().collect();
    let mut dead = 0usize;
    for (index, &p) in points.iter().enumerate() {
        if in_simplex.contains(&index) {
            continue;
        }

        let visible: Vec<usize> = faces
            .iter()
            .enumerate()
            .filter(|(_, f)| f.alive && f.sees(points, p, eps))
            .map(|(i, _)| i)
            .collect();
        if visible.is_empty() {
            continue;
        }

        let visible_edges: HashSet<(usize, usize)> = visible
            .iter()
            .flat_map(|&i| faces[i].edges())
            .collect();
        let horizon: Vec<(usize, usize)> = visible
            .iter()
            .flat_map(|&i| faces[i].edges())
            .filter(|&(a, b)| !visible_edges.contains(&(b, a)))
            .collect();

        for &i in &visible {
            faces[i].alive = false;
        }
        dead += visible.len();
        for (a, b) in horizon {
            faces.push(Face::new(points, [a, b, index]));
        }

        if dead > 64 && dead * 2 > faces.len() {
            faces.retain(|f| f.alive);
            dead = 0;
        }
    }

    Ok(compact(points, &faces))
}

fn initial_simplex(points: &[DVec3], eps: f64) -> Result<[usize; 4], SynthesisError> {
    let a = points
        .iter()
        .enumerate()
        .min_by(|(_, p), (_, q)| p.x.total_cmp(&q.x))
        .map(|(i, _)| i)
        .unwrap_or(0);

    let (b, spread) = farthest(points, |p| p.distance(points[a]));
    if spread <= eps {
        return Err(SynthesisError::DegenerateGeometry(
            "all points coincide".to_string(),
        ));
    }

    let axis = points[b] - points[a];
    let (c, off_line) = farthest(points, |p| (p - points[a]).cross(axis).length() / axis.length());
    if off_line <= eps {
        return Err(SynthesisError::DegenerateGeometry(
            "points are collinear".to_string(),
        ));
    }

    let normal = axis.cross(points[c] - points[a]);
    let (d, off_plane) = farthest(points, |p| normal.dot(p - points[a]).abs() / normal.length());
    if off_plane <= eps {
        return Err(SynthesisError::DegenerateGeometry(
            "points are coplanar".to_string(),
        ));
    }

    Ok([a, b, c, d])
}

fn farthest(points: &[DVec3], metric: impl Fn(DVec3) -> f64) -> (usize, f64) {
    points
        .iter()
        .enumerate()
        .map(|(i, &p)| (i, metric(p)))
        .fold((0, f64::NEG_INFINITY), |best, cur| {
            if cur.1 > best.1 {
                cur
            } else {
                best
            }
        })
}

fn simplex_faces(points: &[DVec3], [a, b, c, d]: [usize; 4]) -> Vec<Face> {
    let inside = (points[a] + points[b] + points[c] + points[d]) / 4.0;
    [[a, b, c], [a, c, d], [a, d, b], [b, d, c]]
        .into_iter()
        .map(|v| {
            let face = Face::new(points, v);
            if face.signed_distance_scaled(points, inside) > 0.0 {
                Face::new(points, [v[0], v[2], v[1]])
            } else {
                face
            }
        })
        .collect()
}

/// Drops dead faces and renumbers the referenced vertices densely.
fn compact(points: &[DVec3], faces: &[Face]) -> Mesh {
    let mut remap: HashMap<usize, usize> = HashMap::new();
    let mut vertices = Vec::new();
    let mut out_faces = Vec::new();

    for face in faces.iter().filter(|f| f.alive) {
        let indices = face
            .v
            .iter()
            .map(|&original| {
                *remap.entry(original).or_insert_with(|| {
                    vertices.push(points[original]);
                    vertices.len() - 1
                })
            })
            .collect();
        out_faces.push(indices);
    }

    Mesh {
        kind: MeshKind::ConvexHull,
        vertices,
        faces: out_faces,
    }
}
