//! Plain-text mesh writer.
//!
//! ```text
//! # photoscan mesh
//! # kind: convex_hull
//! # vertices: 4
//! # faces: 4
//! v 0.000000 1.000000 -2.000000
//! f 1 3 2
//! ```
//!
//! Face indices are 1-based and refer to the vertex block in file order.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use super::{Mesh, SynthesisError};

pub const DEFAULT_PRECISION: usize = 6;

pub fn write_obj<W: Write>(mesh: &Mesh, precision: usize, out: &mut W) -> io::Result<()> {
    writeln!(out, "# photoscan mesh")?;
    writeln!(out, "# kind: {}", mesh.kind.as_str())?;
    writeln!(out, "# vertices: {}", mesh.vertex_count())?;
    writeln!(out, "# faces: {}", mesh.face_count())?;

    for v in &mesh.vertices {
        writeln!(out, "v {:.p$} {:.p$} {:.p$}", v.x, v.y, v.z, p = precision)?;
    }
    for face in &mesh.faces {
        write!(out, "f")?;
        for index in face {
            write!(out, " {}", index + 1)?;
        }
        writeln!(out)?;
    }
    Ok(())
}

/// Writes the mesh next to `path` and renames it into place, so readers never
/// see a partially written file.
pub fn write_mesh(mesh: &Mesh, path: &Path, precision: usize) -> Result<(), SynthesisError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| SynthesisError::Write { path, source }
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
    }

    let tmp = path.with_extension("obj.partial");
    let file = fs::File::create(&tmp).map_err(io_err(&tmp))?;
    let mut writer = BufWriter::new(file);
    write_obj(mesh, precision, &mut writer).map_err(io_err(&tmp))?;
    let file = writer
        .into_inner()
        .map_err(|e| e.into_error())
        .map_err(io_err(&tmp))?;
    file.sync_all().map_err(io_err(&tmp))?;
    drop(file);

    fs::rename(&tmp, path).map_err(io_err(path))?;
    Ok(())
}
