use std::io::{BufWriter, Write};
use std::path::Path;

use super::PlyError;
use crate::mesh::TriangleMesh;

/// Options for [`write_ply_mesh`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlyWriteOptions {
    /// Write the per-vertex scalar field as a `quality` property.
    pub write_scalar_field: bool,
}

impl Default for PlyWriteOptions {
    fn default() -> Self {
        Self {
            write_scalar_field: true,
        }
    }
}

/// Write a triangle mesh as a binary little-endian PLY file.
///
/// When `options.write_scalar_field` is set the mesh must carry a scalar field, otherwise
/// [`PlyError::MissingProperty`] is returned before anything is written.
pub fn write_ply_mesh(
    path: impl AsRef<Path>,
    mesh: &TriangleMesh,
    options: PlyWriteOptions,
) -> Result<(), PlyError> {
    let scalars = match (options.write_scalar_field, mesh.scalars()) {
        (true, Some(scalars)) => Some(scalars),
        (true, None) => return Err(PlyError::MissingProperty("quality")),
        (false, _) => None,
    };

    let file = std::fs::File::create(path.as_ref())?;
    let mut writer = BufWriter::new(file);

    writeln!(writer, "ply")?;
    writeln!(writer, "format binary_little_endian 1.0")?;
    writeln!(writer, "comment written by viewscore")?;
    writeln!(writer, "element vertex {}", mesh.num_vertices())?;
    writeln!(writer, "property float x")?;
    writeln!(writer, "property float y")?;
    writeln!(writer, "property float z")?;
    if scalars.is_some() {
        writeln!(writer, "property float quality")?;
    }
    writeln!(writer, "element face {}", mesh.num_faces())?;
    writeln!(writer, "property list uchar int vertex_indices")?;
    writeln!(writer, "end_header")?;

    for (i, vertex) in mesh.vertices().iter().enumerate() {
        for c in vertex {
            writer.write_all(&(*c as f32).to_le_bytes())?;
        }
        if let Some(scalars) = scalars {
            writer.write_all(&scalars[i].to_le_bytes())?;
        }
    }

    for face in mesh.faces() {
        writer.write_all(&[3u8])?;
        for &index in face {
            writer.write_all(&(index as i32).to_le_bytes())?;
        }
    }

    writer.flush()?;

    log::debug!(
        "wrote mesh {} with {} vertices",
        path.as_ref().display(),
        mesh.num_vertices()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::ply::read_ply_mesh;

    #[test]
    fn test_write_read_mesh() -> Result<(), Box<dyn std::error::Error>> {
        let mut mesh = TriangleMesh::icosphere(1);
        let scalars = (0..mesh.num_vertices())
            .map(|i| i as f32 * 0.25)
            .collect::<Vec<_>>();
        mesh.set_scalars(scalars.clone())?;

        let file = tempfile::NamedTempFile::new()?;
        write_ply_mesh(file.path(), &mesh, PlyWriteOptions::default())?;

        let read = read_ply_mesh(file.path())?;
        assert_eq!(read.num_vertices(), mesh.num_vertices());
        assert_eq!(read.faces(), mesh.faces());
        assert_eq!(read.scalars(), Some(scalars.as_slice()));
        for (a, b) in read.vertices().iter().zip(mesh.vertices()) {
            for k in 0..3 {
                approx::assert_relative_eq!(a[k], b[k], epsilon = 1e-6);
            }
        }
        Ok(())
    }

    #[test]
    fn test_write_without_scalar_field() -> Result<(), Box<dyn std::error::Error>> {
        let mesh = TriangleMesh::icosphere(0);
        let file = tempfile::NamedTempFile::new()?;

        assert!(matches!(
            write_ply_mesh(file.path(), &mesh, PlyWriteOptions::default()),
            Err(PlyError::MissingProperty("quality"))
        ));

        write_ply_mesh(
            file.path(),
            &mesh,
            PlyWriteOptions {
                write_scalar_field: false,
            },
        )?;
        let read = read_ply_mesh(file.path())?;
        assert_eq!(read.num_faces(), 20);
        assert!(read.scalars().is_none());
        Ok(())
    }
}
