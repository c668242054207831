use std::collections::HashMap;

use glam::DVec3;

use crate::aabb::Aabb;

/// Error types for the mesh module.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum MeshError {
    /// A face references a vertex that does not exist.
    #[error("Face {face} references vertex {index} but the mesh has {num_vertices} vertices")]
    FaceIndexOutOfBounds {
        /// The face index.
        face: usize,
        /// The offending vertex index.
        index: u32,
        /// The number of vertices in the mesh.
        num_vertices: usize,
    },

    /// The scalar field does not have one value per vertex.
    #[error("Scalar field length ({0}) does not match the number of vertices ({1})")]
    ScalarLengthMismatch(usize, usize),
}

/// A triangle mesh with an optional per-vertex scalar field.
#[derive(Debug, Clone, PartialEq)]
pub struct TriangleMesh {
    // The vertex positions.
    vertices: Vec<[f64; 3]>,
    // The triangle vertex indices.
    faces: Vec<[u32; 3]>,
    // The per-vertex scalar field.
    scalars: Option<Vec<f32>>,
}

impl TriangleMesh {
    /// Create a new mesh from vertices and triangle faces.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::FaceIndexOutOfBounds`] if a face references a missing vertex.
    pub fn new(vertices: Vec<[f64; 3]>, faces: Vec<[u32; 3]>) -> Result<Self, MeshError> {
        let num_vertices = vertices.len();
        for (face, tri) in faces.iter().enumerate() {
            if let Some(&index) = tri.iter().find(|&&i| i as usize >= num_vertices) {
                return Err(MeshError::FaceIndexOutOfBounds {
                    face,
                    index,
                    num_vertices,
                });
            }
        }
        Ok(Self {
            vertices,
            faces,
            scalars: None,
        })
    }

    /// Create a unit icosphere centered at the origin.
    ///
    /// Level 0 is the icosahedron; every level splits each triangle in four and
    /// projects the new vertices back onto the unit sphere.
    pub fn icosphere(subdivisions: u32) -> Self {
        let t = (1.0 + 5f64.sqrt()) / 2.0;
        let mut vertices: Vec<[f64; 3]> = [
            [-1.0, t, 0.0],
            [1.0, t, 0.0],
            [-1.0, -t, 0.0],
            [1.0, -t, 0.0],
            [0.0, -1.0, t],
            [0.0, 1.0, t],
            [0.0, -1.0, -t],
            [0.0, 1.0, -t],
            [t, 0.0, -1.0],
            [t, 0.0, 1.0],
            [-t, 0.0, -1.0],
            [-t, 0.0, 1.0],
        ]
        .iter()
        .map(|v| DVec3::from_array(*v).normalize().to_array())
        .collect();

        let mut faces: Vec<[u32; 3]> = vec![
            [0, 11, 5],
            [0, 5, 1],
            [0, 1, 7],
            [0, 7, 10],
            [0, 10, 11],
            [1, 5, 9],
            [5, 11, 4],
            [11, 10, 2],
            [10, 7, 6],
            [7, 1, 8],
            [3, 9, 4],
            [3, 4, 2],
            [3, 2, 6],
            [3, 6, 8],
            [3, 8, 9],
            [4, 9, 5],
            [2, 4, 11],
            [6, 2, 10],
            [8, 6, 7],
            [9, 8, 1],
        ];

        for _ in 0..subdivisions {
            let mut midpoints: HashMap<(u32, u32), u32> = HashMap::new();
            let mut midpoint = |a: u32, b: u32, vertices: &mut Vec<[f64; 3]>| -> u32 {
                let key = (a.min(b), a.max(b));
                *midpoints.entry(key).or_insert_with(|| {
                    let va = DVec3::from_array(vertices[a as usize]);
                    let vb = DVec3::from_array(vertices[b as usize]);
                    vertices.push(((va + vb) * 0.5).normalize().to_array());
                    (vertices.len() - 1) as u32
                })
            };

            let mut next = Vec::with_capacity(faces.len() * 4);
            for [a, b, c] in faces {
                let ab = midpoint(a, b, &mut vertices);
                let bc = midpoint(b, c, &mut vertices);
                let ca = midpoint(c, a, &mut vertices);
                next.push([a, ab, ca]);
                next.push([b, bc, ab]);
                next.push([c, ca, bc]);
                next.push([ab, bc, ca]);
            }
            faces = next;
        }

        Self {
            vertices,
            faces,
            scalars: None,
        }
    }

    /// Get the number of vertices.
    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    /// Get the number of triangles.
    #[inline]
    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }

    /// Check if the mesh has no vertices.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Get as reference the vertex positions.
    pub fn vertices(&self) -> &[[f64; 3]] {
        &self.vertices
    }

    /// Get as reference the triangle indices.
    pub fn faces(&self) -> &[[u32; 3]] {
        &self.faces
    }

    /// Get as reference the per-vertex scalar field, if any.
    pub fn scalars(&self) -> Option<&[f32]> {
        self.scalars.as_deref()
    }

    /// Get the three corners of a triangle.
    ///
    /// PRECONDITION: `face < self.num_faces()`.
    pub fn triangle(&self, face: usize) -> [[f64; 3]; 3] {
        let [a, b, c] = self.faces[face];
        [
            self.vertices[a as usize],
            self.vertices[b as usize],
            self.vertices[c as usize],
        ]
    }

    /// Attach a per-vertex scalar field, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::ScalarLengthMismatch`] if there is not exactly one value per vertex.
    pub fn set_scalars(&mut self, scalars: Vec<f32>) -> Result<(), MeshError> {
        if scalars.len() != self.vertices.len() {
            return Err(MeshError::ScalarLengthMismatch(
                scalars.len(),
                self.vertices.len(),
            ));
        }
        self.scalars = Some(scalars);
        Ok(())
    }

    /// Translate every vertex by `offset`.
    pub fn translate(&mut self, offset: &[f64; 3]) {
        let offset = DVec3::from_array(*offset);
        self.vertices
            .iter_mut()
            .for_each(|v| *v = (DVec3::from_array(*v) + offset).to_array());
    }

    /// Mean of the vertex positions, or the origin for an empty mesh.
    pub fn centroid(&self) -> [f64; 3] {
        if self.vertices.is_empty() {
            return [0.0; 3];
        }
        let sum = self
            .vertices
            .iter()
            .fold(DVec3::ZERO, |acc, v| acc + DVec3::from_array(*v));
        (sum / self.vertices.len() as f64).to_array()
    }

    /// The axis-aligned bounding box of the vertices.
    pub fn bounds(&self) -> Aabb {
        Aabb::from_points(self.vertices.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_mesh_new() -> Result<(), MeshError> {
        let mesh = TriangleMesh::new(
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            vec![[0, 1, 2]],
        )?;
        assert_eq!(mesh.num_vertices(), 3);
        assert_eq!(mesh.num_faces(), 1);
        assert_eq!(mesh.triangle(0)[1], [1.0, 0.0, 0.0]);
        assert!(mesh.scalars().is_none());
        Ok(())
    }

    #[test]
    fn test_mesh_out_of_bounds() {
        let res = TriangleMesh::new(vec![[0.0; 3]; 2], vec![[0, 1, 2]]);
        assert_eq!(
            res,
            Err(MeshError::FaceIndexOutOfBounds {
                face: 0,
                index: 2,
                num_vertices: 2
            })
        );
    }

    #[test]
    fn test_set_scalars() -> Result<(), MeshError> {
        let mut mesh = TriangleMesh::icosphere(0);
        assert!(mesh.set_scalars(vec![0.0; 3]).is_err());
        mesh.set_scalars(vec![1.0; 12])?;
        assert_eq!(mesh.scalars().map(|s| s.len()), Some(12));
        Ok(())
    }

    #[test]
    fn test_icosphere() {
        let level0 = TriangleMesh::icosphere(0);
        assert_eq!(level0.num_vertices(), 12);
        assert_eq!(level0.num_faces(), 20);

        let level2 = TriangleMesh::icosphere(2);
        assert_eq!(level2.num_vertices(), 162);
        assert_eq!(level2.num_faces(), 320);
        for v in level2.vertices() {
            assert_relative_eq!(DVec3::from_array(*v).length(), 1.0, epsilon = 1e-12);
        }
        let c = level2.centroid();
        assert_relative_eq!(c[0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(c[1], 0.0, epsilon = 1e-12);
        assert_relative_eq!(c[2], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_translate() {
        let mut mesh = TriangleMesh::icosphere(0);
        mesh.translate(&[0.0, 0.0, 10.0]);
        let bounds = mesh.bounds();
        assert_relative_eq!(bounds.center()[2], 10.0, epsilon = 1e-12);
    }
}
