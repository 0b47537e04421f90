//! Fixture builders for point cloud files.

#![allow(dead_code)]

/// Binary little-endian PLY with float positions and trailing RGB bytes.
pub fn ply_binary(points: &[[f32; 3]]) -> Vec<u8> {
    let mut bytes = format!(
        "ply\nformat binary_little_endian 1.0\nelement vertex {}\n\
         property float x\nproperty float y\nproperty float z\n\
         property uchar red\nproperty uchar green\nproperty uchar blue\nend_header\n",
        points.len()
    )
    .into_bytes();
    for point in points {
        for value in point {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        bytes.extend_from_slice(&[200, 120, 40]);
    }
    bytes
}

/// A `points3D.txt` body in the reconstruction program's column layout.
pub fn points3d_text(points: &[[f64; 3]]) -> String {
    let mut text = String::from(
        "# 3D point list with one line of data per point:\n\
         #   POINT3D_ID, X, Y, Z, R, G, B, ERROR, TRACK[] as (IMAGE_ID, POINT2D_IDX)\n",
    );
    text.push_str(&format!("# Number of points: {}\n", points.len()));
    for (i, [x, y, z]) in points.iter().enumerate() {
        text.push_str(&format!(
            "{} {} {} {} 128 128 128 0.5 1 {} 2 {}\n",
            i + 1,
            x,
            y,
            z,
            i,
            i + 1
        ));
    }
    text
}

/// Corners of a cube spanning `[-half, half]` plus its center.
pub fn cube_points(half: f32) -> Vec<[f32; 3]> {
    let mut points = Vec::new();
    for x in [-half, half] {
        for y in [-half, half] {
            for z in [-half, half] {
                points.push([x, y, z]);
            }
        }
    }
    points.push([0.0, 0.0, 0.0]);
    points
}

pub fn to_f64(points: &[[f32; 3]]) -> Vec<[f64; 3]> {
    points
        .iter()
        .map(|p| [p[0] as f64, p[1] as f64, p[2] as f64])
        .collect()
}
