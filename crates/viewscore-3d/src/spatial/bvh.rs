use glam::DVec3;

use super::{Ray, SpatialError};
use crate::aabb::Aabb;
use crate::mesh::TriangleMesh;

const MAX_LEAF_TRIANGLES: usize = 4;

// hits closer than this to the ray origin are ignored
const MIN_HIT_DISTANCE: f64 = 1e-9;

// determinant threshold under which a ray is treated as parallel to a triangle
const PARALLEL_EPSILON: f64 = 1e-12;

/// Ray hit information.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    /// Distance along the ray.
    pub distance: f64,
    /// The hit position.
    pub point: [f64; 3],
    /// Index of the hit face in the source mesh.
    pub triangle: usize,
    /// Barycentric coordinates `(u, v)` of the hit with respect to the second and third corner.
    pub barycentric: (f64, f64),
}

#[derive(Debug, Clone, Copy, bincode::Encode, bincode::Decode)]
struct BvhNode {
    bounds: Aabb,
    // first triangle for leaves, left child for interior nodes (right child is left + 1)
    left_or_first: u32,
    // number of triangles, zero for interior nodes
    count: u32,
}

impl BvhNode {
    #[inline]
    fn is_leaf(&self) -> bool {
        self.count > 0
    }
}

/// Read-only ray intersection index over the triangles of a mesh.
///
/// A bounding volume hierarchy stored as a flat node array. Back-face culling is disabled:
/// triangles are hit regardless of their winding.
#[derive(Debug, Clone, bincode::Encode, bincode::Decode)]
pub struct RayIntersectionIndex {
    nodes: Vec<BvhNode>,
    // triangle corners in leaf order
    triangles: Vec<[[f64; 3]; 3]>,
    // source face index of each entry in `triangles`
    face_ids: Vec<u32>,
}

impl RayIntersectionIndex {
    /// Build the index over the faces of `mesh`.
    ///
    /// Degenerate faces (zero area or non-finite corners) are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::EmptyGeometry`] if the mesh has no usable triangle.
    pub fn build(mesh: &TriangleMesh) -> Result<Self, SpatialError> {
        let mut triangles = Vec::with_capacity(mesh.num_faces());
        let mut face_ids = Vec::with_capacity(mesh.num_faces());
        for face in 0..mesh.num_faces() {
            let tri = mesh.triangle(face);
            if is_degenerate(&tri) {
                continue;
            }
            triangles.push(tri);
            face_ids.push(face as u32);
        }

        if triangles.is_empty() {
            return Err(SpatialError::EmptyGeometry);
        }

        if triangles.len() < mesh.num_faces() {
            log::warn!(
                "dropped {} degenerate faces while building the ray index",
                mesh.num_faces() - triangles.len()
            );
        }

        let centroids = triangles
            .iter()
            .map(|[a, b, c]| {
                ((DVec3::from_array(*a) + DVec3::from_array(*b) + DVec3::from_array(*c)) / 3.0)
                    .to_array()
            })
            .collect::<Vec<_>>();

        let mut order = (0..triangles.len()).collect::<Vec<_>>();
        let mut nodes = Vec::with_capacity(2 * triangles.len() / MAX_LEAF_TRIANGLES + 1);
        nodes.push(BvhNode {
            bounds: Aabb::EMPTY,
            left_or_first: 0,
            count: triangles.len() as u32,
        });

        let mut stack = vec![0usize];
        while let Some(node_idx) = stack.pop() {
            let first = nodes[node_idx].left_or_first as usize;
            let count = nodes[node_idx].count as usize;
            let items = &mut order[first..first + count];

            nodes[node_idx].bounds = items
                .iter()
                .flat_map(|&i| triangles[i].iter())
                .fold(Aabb::EMPTY, |aabb, p| aabb.grow(p));

            if count <= MAX_LEAF_TRIANGLES {
                continue;
            }

            let centroid_bounds = Aabb::from_points(items.iter().map(|&i| &centroids[i]));
            let axis = centroid_bounds.longest_axis();
            if centroid_bounds.extent()[axis] <= 0.0 {
                // every centroid coincides, splitting cannot separate them
                continue;
            }

            let mid = count / 2;
            items.select_nth_unstable_by(mid, |&a, &b| {
                centroids[a][axis].total_cmp(&centroids[b][axis])
            });

            let left = nodes.len();
            nodes.push(BvhNode {
                bounds: Aabb::EMPTY,
                left_or_first: first as u32,
                count: mid as u32,
            });
            nodes.push(BvhNode {
                bounds: Aabb::EMPTY,
                left_or_first: (first + mid) as u32,
                count: (count - mid) as u32,
            });
            nodes[node_idx].left_or_first = left as u32;
            nodes[node_idx].count = 0;

            stack.push(left);
            stack.push(left + 1);
        }

        let triangles_ordered = order.iter().map(|&i| triangles[i]).collect();
        let face_ids_ordered = order.iter().map(|&i| face_ids[i]).collect();

        Ok(Self {
            nodes,
            triangles: triangles_ordered,
            face_ids: face_ids_ordered,
        })
    }

    /// Number of indexed triangles.
    pub fn num_triangles(&self) -> usize {
        self.triangles.len()
    }

    /// Bounds of the whole indexed geometry.
    pub fn bounds(&self) -> Aabb {
        self.nodes.first().map(|n| n.bounds).unwrap_or(Aabb::EMPTY)
    }

    /// Find the nearest intersection along `ray` closer than `t_max`.
    pub fn intersect(&self, ray: &Ray, t_max: f64) -> Option<RayHit> {
        let mut best: Option<RayHit> = None;
        self.traverse(ray, t_max, |hit| {
            best = Some(hit);
            false
        });
        best
    }

    /// Check if any triangle intersects `ray` closer than `t_max`.
    pub fn occluded(&self, ray: &Ray, t_max: f64) -> bool {
        let mut found = false;
        self.traverse(ray, t_max, |_| {
            found = true;
            true
        });
        found
    }

    // Visits hits in an order that only ever shrinks the search distance. `on_hit` returns
    // true to stop the traversal.
    fn traverse(&self, ray: &Ray, t_max: f64, mut on_hit: impl FnMut(RayHit) -> bool) {
        if !ray.is_finite() || t_max.is_nan() || t_max <= 0.0 {
            return;
        }
        let inv_dir = ray.inv_direction();
        let mut closest = t_max;
        let mut stack = Vec::with_capacity(64);
        stack.push(0usize);

        while let Some(node_idx) = stack.pop() {
            let node = &self.nodes[node_idx];
            if node
                .bounds
                .intersect_ray(&ray.origin, &inv_dir, closest)
                .is_none()
            {
                continue;
            }

            if !node.is_leaf() {
                stack.push(node.left_or_first as usize);
                stack.push(node.left_or_first as usize + 1);
                continue;
            }

            let first = node.left_or_first as usize;
            for i in first..first + node.count as usize {
                let Some((t, u, v)) = intersect_triangle(ray, &self.triangles[i]) else {
                    continue;
                };
                if t >= closest {
                    continue;
                }
                closest = t;
                let hit = RayHit {
                    distance: t,
                    point: ray.point_at(t),
                    triangle: self.face_ids[i] as usize,
                    barycentric: (u, v),
                };
                if on_hit(hit) {
                    return;
                }
            }
        }
    }
}

fn is_degenerate(tri: &[[f64; 3]; 3]) -> bool {
    let [a, b, c] = tri.map(DVec3::from_array);
    if !(a.is_finite() && b.is_finite() && c.is_finite()) {
        return true;
    }
    (b - a).cross(c - a).length_squared() <= f64::EPSILON * f64::EPSILON
}

/// Ray-triangle intersection using the Möller-Trumbore algorithm, without culling.
///
/// Returns the distance and the barycentric coordinates `(u, v)` of the hit.
fn intersect_triangle(ray: &Ray, tri: &[[f64; 3]; 3]) -> Option<(f64, f64, f64)> {
    let [v0, v1, v2] = tri.map(DVec3::from_array);
    let origin = DVec3::from_array(ray.origin);
    let direction = DVec3::from_array(ray.direction);

    let edge1 = v1 - v0;
    let edge2 = v2 - v0;
    let h = direction.cross(edge2);
    let a = edge1.dot(h);

    if a.abs() < PARALLEL_EPSILON {
        return None;
    }

    let f = 1.0 / a;
    let s = origin - v0;
    let u = f * s.dot(h);
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let q = s.cross(edge1);
    let v = f * direction.dot(q);
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = f * edge2.dot(q);
    (t > MIN_HIT_DISTANCE).then_some((t, u, v))
}
