//! PLY point file decoder.
//!
//! Header layout:
//!
//! ```text
//! ply
//! format binary_little_endian 1.0
//! comment anything
//! element vertex 779966
//! property float x
//! property float y
//! property float z
//! property uchar red
//! end_header
//! ```
//!
//! Only the `vertex` element's `x`, `y` and `z` properties are read. Every other
//! property still counts toward the record width so trailing bytes such as
//! normals and colors are skipped.

use glam::DVec3;

use super::error::DecodeError;
use super::PointSet;

const END_HEADER: &str = "end_header";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Ascii,
    BinaryLittleEndian,
    BinaryBigEndian,
}

impl Encoding {
    fn parse(token: &str) -> Option<Self> {
        match token {
            "ascii" => Some(Encoding::Ascii),
            "binary_little_endian" => Some(Encoding::BinaryLittleEndian),
            "binary_big_endian" => Some(Encoding::BinaryBigEndian),
            _ => None,
        }
    }
}

/// Scalar property types.
///
/// "The type can be specified with one of
///   char uchar short ushort int uint float double,
/// or one of
///   int8 uint8 int16 uint16 int32 uint32 float32 float64"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Float32,
    Float64,
}

impl ScalarType {
    fn parse(token: &str) -> Option<Self> {
        match token {
            "char" | "int8" => Some(ScalarType::Int8),
            "uchar" | "uint8" => Some(ScalarType::Uint8),
            "short" | "int16" => Some(ScalarType::Int16),
            "ushort" | "uint16" => Some(ScalarType::Uint16),
            "int" | "int32" => Some(ScalarType::Int32),
            "uint" | "uint32" => Some(ScalarType::Uint32),
            "float" | "float32" => Some(ScalarType::Float32),
            "double" | "float64" => Some(ScalarType::Float64),
            _ => None,
        }
    }

    pub fn size(&self) -> usize {
        match self {
            ScalarType::Int8 | ScalarType::Uint8 => 1,
            ScalarType::Int16 | ScalarType::Uint16 => 2,
            ScalarType::Int32 | ScalarType::Uint32 | ScalarType::Float32 => 4,
            ScalarType::Float64 => 8,
        }
    }

    fn read(&self, bytes: &[u8], encoding: Encoding) -> f64 {
        macro_rules! read_as {
            ($ty:ty, $n:expr) => {{
                let mut buf = [0u8; $n];
                buf.copy_from_slice(&bytes[..$n]);
                match encoding {
                    Encoding::BinaryBigEndian => <$ty>::from_be_bytes(buf) as f64,
                    _ => <$ty>::from_le_bytes(buf) as f64,
                }
            }};
        }

        match self {
            ScalarType::Int8 => read_as!(i8, 1),
            ScalarType::Uint8 => read_as!(u8, 1),
            ScalarType::Int16 => read_as!(i16, 2),
            ScalarType::Uint16 => read_as!(u16, 2),
            ScalarType::Int32 => read_as!(i32, 4),
            ScalarType::Uint32 => read_as!(u32, 4),
            ScalarType::Float32 => read_as!(f32, 4),
            ScalarType::Float64 => read_as!(f64, 8),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Property {
    pub name: String,
    pub ty: ScalarType,
}

#[derive(Debug, Clone)]
pub struct Element {
    pub name: String,
    pub count: usize,
    pub properties: Vec<Property>,
    /// Set when the element declares a `property list`; such records have no fixed width.
    pub has_list: bool,
}

impl Element {
    fn record_size(&self) -> usize {
        self.properties.iter().map(|p| p.ty.size()).sum()
    }

    fn position_of(&self, name: &str) -> Option<usize> {
        self.properties.iter().position(|p| p.name == name)
    }
}

#[derive(Debug, Clone)]
pub struct Header {
    pub encoding: Encoding,
    pub elements: Vec<Element>,
    /// Byte offset of the body within the file.
    pub body_offset: usize,
}

impl Header {
    fn vertex_index(&self) -> Result<usize, DecodeError> {
        self.elements
            .iter()
            .position(|e| e.name == "vertex")
            .ok_or_else(|| DecodeError::malformed("header declares no vertex element"))
    }
}

pub fn parse_header(bytes: &[u8]) -> Result<Header, DecodeError> {
    let mut offset = 0;
    let mut lines = 0;
    let mut encoding: Option<Encoding> = None;
    let mut elements: Vec<Element> = Vec::new();

    loop {
        let rest = &bytes[offset..];
        let newline = rest
            .iter()
            .position(|b| *b == b'\n')
            .ok_or_else(|| DecodeError::malformed("header is not terminated by end_header"))?;
        let raw = &rest[..newline];
        offset += newline + 1;
        lines += 1;

        let line = std::str::from_utf8(raw)
            .map_err(|_| DecodeError::malformed(format!("header line {} is not text", lines)))?
            .trim();

        if lines == 1 {
            if line != "ply" {
                return Err(DecodeError::malformed("missing 'ply' magic line"));
            }
            continue;
        }

        let mut tokens = line.split_whitespace();
        match tokens.next() {
            None | Some("comment") | Some("obj_info") => {}
            Some("format") => {
                let token = tokens.next().unwrap_or_default();
                encoding = Some(Encoding::parse(token).ok_or_else(|| {
                    DecodeError::malformed(format!("unknown format '{}'", token))
                })?);
            }
            Some("element") => {
                let name = tokens
                    .next()
                    .ok_or_else(|| DecodeError::malformed("element without a name"))?;
                let count = tokens
                    .next()
                    .and_then(|c| c.parse::<usize>().ok())
                    .ok_or_else(|| {
                        DecodeError::malformed(format!("element '{}' has no valid count", name))
                    })?;
                elements.push(Element {
                    name: name.to_string(),
                    count,
                    properties: Vec::new(),
                    has_list: false,
                });
            }
            Some("property") => {
                let element = elements
                    .last_mut()
                    .ok_or_else(|| DecodeError::malformed("property declared before any element"))?;
                let ty = tokens.next().unwrap_or_default();
                if ty == "list" {
                    element.has_list = true;
                    continue;
                }
                let ty = ScalarType::parse(ty).ok_or_else(|| {
                    DecodeError::malformed(format!("unknown property type '{}'", ty))
                })?;
                let name = tokens
                    .next()
                    .ok_or_else(|| DecodeError::malformed("property without a name"))?;
                element.properties.push(Property {
                    name: name.to_string(),
                    ty,
                });
            }
            Some(END_HEADER) => break,
            Some(other) => {
                return Err(DecodeError::malformed(format!(
                    "unexpected header keyword '{}'",
                    other
                )));
            }
        }
    }

    let encoding = encoding.ok_or_else(|| DecodeError::malformed("header declares no format"))?;

    Ok(Header {
        encoding,
        elements,
        body_offset: offset,
    })
}

pub fn decode(bytes: &[u8]) -> Result<PointSet, DecodeError> {
    let header = parse_header(bytes)?;
    let vertex_index = header.vertex_index()?;
    let vertex = &header.elements[vertex_index];

    if vertex.has_list {
        return Err(DecodeError::malformed(
            "vertex element declares a list property",
        ));
    }

    let axes = ["x", "y", "z"].map(|axis| vertex.position_of(axis));
    let [Some(x), Some(y), Some(z)] = axes else {
        return Err(DecodeError::malformed(
            "vertex element must declare x, y and z properties",
        ));
    };

    let body = &bytes[header.body_offset..];
    let points = match header.encoding {
        Encoding::Ascii => decode_ascii(body, &header, vertex_index, [x, y, z])?,
        Encoding::BinaryLittleEndian | Encoding::BinaryBigEndian => {
            decode_binary(body, &header, vertex_index, [x, y, z])?
        }
    };

    Ok(PointSet::new(points))
}

fn decode_binary(
    body: &[u8],
    header: &Header,
    vertex_index: usize,
    axes: [usize; 3],
) -> Result<Vec<DVec3>, DecodeError> {
    let mut start = 0usize;
    for element in &header.elements[..vertex_index] {
        if element.count > 0 && element.has_list {
            return Err(DecodeError::malformed(format!(
                "cannot skip variable-width element '{}' before vertices",
                element.name
            )));
        }
        start = element
            .count
            .checked_mul(element.record_size())
            .and_then(|n| n.checked_add(start))
            .ok_or_else(|| DecodeError::malformed("element size overflows"))?;
    }

    let vertex = &header.elements[vertex_index];
    let stride = vertex.record_size();
    let needed = vertex
        .count
        .checked_mul(stride)
        .and_then(|n| n.checked_add(start))
        .ok_or_else(|| DecodeError::malformed("vertex data size overflows"))?;
    if needed > body.len() {
        return Err(DecodeError::malformed(format!(
            "header declares {} vertices ({} bytes) but only {} bytes follow",
            vertex.count,
            needed - start,
            body.len().saturating_sub(start)
        )));
    }

    let offsets: Vec<usize> = vertex
        .properties
        .iter()
        .scan(0usize, |acc, p| {
            let at = *acc;
            *acc += p.ty.size();
            Some(at)
        })
        .collect();

    let mut points = Vec::with_capacity(vertex.count);
    for record in body[start..needed].chunks_exact(stride) {
        let mut xyz = [0.0_f64; 3];
        for (slot, &prop) in xyz.iter_mut().zip(axes.iter()) {
            let ty = vertex.properties[prop].ty;
            *slot = ty.read(&record[offsets[prop]..], header.encoding);
        }
        points.push(finite_point(xyz, points.len())?);
    }

    Ok(points)
}

fn decode_ascii(
    body: &[u8],
    header: &Header,
    vertex_index: usize,
    axes: [usize; 3],
) -> Result<Vec<DVec3>, DecodeError> {
    let text = std::str::from_utf8(body)
        .map_err(|_| DecodeError::malformed("ascii body is not text"))?;
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());

    let skip = header.elements[..vertex_index]
        .iter()
        .try_fold(0usize, |acc, e| acc.checked_add(e.count))
        .ok_or_else(|| DecodeError::malformed("element size overflows"))?;
    for _ in 0..skip {
        lines
            .next()
            .ok_or_else(|| DecodeError::malformed("body ends before vertex data"))?;
    }

    let vertex = &header.elements[vertex_index];
    let columns = vertex.properties.len();
    // Each vertex line needs at least one value and a separator.
    let mut points = Vec::with_capacity(vertex.count.min(body.len() / 2));

    for index in 0..vertex.count {
        let line = lines.next().ok_or_else(|| {
            DecodeError::malformed(format!(
                "header declares {} vertices but body has {}",
                vertex.count, index
            ))
        })?;
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < columns {
            return Err(DecodeError::malformed(format!(
                "vertex {} has {} values, expected {}",
                index,
                fields.len(),
                columns
            )));
        }

        let mut xyz = [0.0_f64; 3];
        for (slot, &prop) in xyz.iter_mut().zip(axes.iter()) {
            *slot = fields[prop].parse().map_err(|_| {
                DecodeError::malformed(format!(
                    "vertex {}: '{}' is not a number",
                    index, fields[prop]
                ))
            })?;
        }
        points.push(finite_point(xyz, index)?);
    }

    Ok(points)
}

fn finite_point(xyz: [f64; 3], index: usize) -> Result<DVec3, DecodeError> {
    if xyz.iter().all(|v| v.is_finite()) {
        Ok(DVec3::from_array(xyz))
    } else {
        Err(DecodeError::malformed(format!(
            "vertex {} has a non-finite coordinate",
            index
        )))
    }
}
