use glam::DVec3;

use super::{Mesh, MeshKind};

/// Quad faces of the box, 0-based, wound outward.
const BOX_FACES: [[usize; 4]; 6] = [
    [0, 3, 2, 1],
    [4, 5, 6, 7],
    [0, 1, 5, 4],
    [2, 3, 7, 6],
    [0, 4, 7, 3],
    [1, 2, 6, 5],
];

/// Builds an axis-aligned box centered at the origin.
///
/// `extent` is the full size in meters along x (length), y (height) and
/// z (width).
pub fn box_mesh(extent: DVec3) -> Mesh {
    let h = extent / 2.0;
    let vertices = vec![
        DVec3::new(-h.x, -h.y, -h.z),
        DVec3::new(h.x, -h.y, -h.z),
        DVec3::new(h.x, h.y, -h.z),
        DVec3::new(-h.x, h.y, -h.z),
        DVec3::new(-h.x, -h.y, h.z),
        DVec3::new(h.x, -h.y, h.z),
        DVec3::new(h.x, h.y, h.z),
        DVec3::new(-h.x, h.y, h.z),
    ];

    Mesh {
        kind: MeshKind::FallbackBox,
        vertices,
        faces: BOX_FACES.iter().map(|f| f.to_vec()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_has_eight_vertices_and_six_quads() {
        let mesh = box_mesh(DVec3::new(0.5, 1.0, 0.5));
        assert_eq!(mesh.kind, MeshKind::FallbackBox);
        assert_eq!(mesh.vertex_count(), 8);
        assert_eq!(mesh.face_count(), 6);
        assert!(mesh.faces.iter().all(|f| f.len() == 4));
        assert!(mesh.indices_valid());
    }

    #[test]
    fn test_box_is_centered_with_requested_extent() {
        let extent = DVec3::new(0.3, 0.2, 0.1);
        let mesh = box_mesh(extent);

        let min = mesh.vertices.iter().copied().fold(DVec3::INFINITY, DVec3::min);
        let max = mesh.vertices.iter().copied().fold(DVec3::NEG_INFINITY, DVec3::max);
        assert!((max - min - extent).abs().max_element() < 1e-12);
        assert!((max + min).abs().max_element() < 1e-12);
    }

    #[test]
    fn test_box_faces_point_outward() {
        let mesh = box_mesh(DVec3::new(2.0, 3.0, 4.0));
        for face in &mesh.faces {
            let p: Vec<DVec3> = face.iter().map(|&i| mesh.vertices[i]).collect();
            let normal = (p[1] - p[0]).cross(p[2] - p[0]);
            let center = p.iter().copied().sum::<DVec3>() / 4.0;
            assert!(normal.dot(center) > 0.0, "face {face:?} faces inward");
        }
    }

    #[test]
    fn test_each_vertex_used_by_three_faces() {
        let mesh = box_mesh(DVec3::ONE);
        for v in 0..8 {
            let uses = mesh.faces.iter().filter(|f| f.contains(&v)).count();
            assert_eq!(uses, 3);
        }
    }
}
