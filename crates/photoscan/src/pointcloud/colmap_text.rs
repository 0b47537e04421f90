//! Decoder for the text model's point list (`points3D.txt`).
//!
//! ```text
//! # comment
//! POINT3D_ID X Y Z R G B ERROR TRACK[]...
//! ```
//!
//! Only the coordinates are read; identifier, color, error and track columns
//! are ignored.

use glam::DVec3;

use super::error::DecodeError;
use super::PointSet;

const COMMENT_MARKER: char = '#';
const COORDINATE_COLUMNS: std::ops::Range<usize> = 1..4;

pub fn decode(bytes: &[u8]) -> Result<PointSet, DecodeError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| DecodeError::malformed(format!("text model is not UTF-8: {}", e)))?;

    let mut points = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(COMMENT_MARKER) {
            continue;
        }
        points.push(parse_line(line, index + 1)?);
    }

    Ok(PointSet::new(points))
}

fn parse_line(line: &str, line_number: usize) -> Result<DVec3, DecodeError> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < COORDINATE_COLUMNS.end {
        return Err(DecodeError::malformed(format!(
            "line {}: expected at least {} columns, found {}",
            line_number,
            COORDINATE_COLUMNS.end,
            fields.len()
        )));
    }

    let mut xyz = [0.0_f64; 3];
    for (slot, column) in xyz.iter_mut().zip(COORDINATE_COLUMNS) {
        let value: f64 = fields[column].parse().map_err(|_| {
            DecodeError::malformed(format!(
                "line {}: column {} is not a number: '{}'",
                line_number, column, fields[column]
            ))
        })?;
        if !value.is_finite() {
            return Err(DecodeError::malformed(format!(
                "line {}: non-finite coordinate",
                line_number
            )));
        }
        *slot = value;
    }

    Ok(DVec3::from_array(xyz))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_coordinates_and_skips_comments() {
        let model = "\
# 3D point list with one line of data per point:
#   POINT3D_ID, X, Y, Z, R, G, B, ERROR, TRACK[] as (IMAGE_ID, POINT2D_IDX)
# Number of points: 2, mean track length: 3.0

12 1.5 -2.25 3.0 128 64 32 0.71 1 10 2 20 3 30
13 -0.5 0.5 9.75 10 20 30 1.2 4 7
";
        let points = decode(model.as_bytes()).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points.as_slice()[0], DVec3::new(1.5, -2.25, 3.0));
        assert_eq!(points.as_slice()[1], DVec3::new(-0.5, 0.5, 9.75));
    }

    #[test]
    fn test_only_comments_is_empty() {
        let points = decode(b"# nothing here\n# at all\n").unwrap();
        assert!(points.is_empty());
    }

    #[test]
    fn test_short_line_is_malformed() {
        let err = decode(b"1 0.5 0.5\n").unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(ref m) if m.contains("line 1")));
    }

    #[test]
    fn test_non_numeric_coordinate_is_malformed() {
        let err = decode(b"# ok\n1 0.5 abc 0.5 1 2 3 0.1\n").unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(ref m) if m.contains("line 2")));
    }

    #[test]
    fn test_non_finite_coordinate_is_malformed() {
        assert!(decode(b"1 NaN 0 0 1 2 3 0.1\n").is_err());
        assert!(decode(b"1 inf 0 0 1 2 3 0.1\n").is_err());
    }

    #[test]
    fn test_invalid_utf8_is_malformed() {
        let err = decode(&[0xff, 0xfe, b'\n']).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }
}
