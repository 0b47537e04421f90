use glam::DVec3;

use super::SynthesisError;

/// Centers `points` on their centroid and scales uniformly so the largest
/// absolute coordinate equals `bound`.
pub fn normalize(points: &[DVec3], bound: f64) -> Result<Vec<DVec3>, SynthesisError> {
    if points.is_empty() {
        return Ok(Vec::new());
    }

    let centroid = centroid(points);
    let extent = points
        .iter()
        .map(|p| (*p - centroid).abs().max_element())
        .fold(0.0_f64, f64::max);

    if !extent.is_finite() || extent <= f64::EPSILON * centroid.abs().max_element().max(1.0) {
        return Err(SynthesisError::DegenerateGeometry(
            "all points coincide".to_string(),
        ));
    }

    let scale = bound / extent;
    Ok(points.iter().map(|p| (*p - centroid) * scale).collect())
}

pub fn centroid(points: &[DVec3]) -> DVec3 {
    if points.is_empty() {
        return DVec3::ZERO;
    }
    points.iter().copied().sum::<DVec3>() / points.len() as f64
}
