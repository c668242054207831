use std::num::NonZeroUsize;

use kiddo::immutable::float::kdtree::ImmutableKdTree;
use kiddo::SquaredEuclidean;

use super::SpatialError;

/// A neighbor returned by a [`NearestNeighborIndex`] query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Index of the point in the slice the index was built from.
    pub index: usize,
    /// Euclidean distance to the query.
    pub distance: f64,
}

/// Read-only nearest-neighbor index over a point set.
///
/// Backed by an immutable kd-tree. Points with non-finite coordinates are left out of the
/// tree; every returned [`Neighbor::index`] refers to the original input order.
pub struct NearestNeighborIndex {
    // the points as given, kept to rebuild the tree on the device side
    points: Vec<[f64; 3]>,
    // maps tree items back to input indices
    ids: Vec<u32>,
    tree: ImmutableKdTree<f64, u32, 3, 32>,
}

impl NearestNeighborIndex {
    /// Build the index over `points`.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::EmptyGeometry`] if there is no point with finite coordinates.
    pub fn build(points: &[[f64; 3]]) -> Result<Self, SpatialError> {
        let (ids, finite): (Vec<u32>, Vec<[f64; 3]>) = points
            .iter()
            .enumerate()
            .filter(|(_, p)| p.iter().all(|c| c.is_finite()))
            .map(|(i, p)| (i as u32, *p))
            .unzip();

        if finite.is_empty() {
            return Err(SpatialError::EmptyGeometry);
        }

        if finite.len() < points.len() {
            log::warn!(
                "skipped {} non-finite points while building the nearest-neighbor index",
                points.len() - finite.len()
            );
        }

        let tree = ImmutableKdTree::new_from_slice(&finite);

        Ok(Self {
            points: points.to_vec(),
            ids,
            tree,
        })
    }

    /// Number of points stored in the tree.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Check if the index holds no point. Never true for a successfully built index.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// The points the index was built from, in input order.
    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    /// Find the exact nearest point to `query`.
    ///
    /// Points at exactly the same distance resolve to the lowest input index.
    /// Returns `None` for a non-finite query.
    pub fn nearest(&self, query: &[f64; 3]) -> Option<Neighbor> {
        if !query.iter().all(|c| c.is_finite()) {
            return None;
        }
        let best = self.tree.nearest_one::<SquaredEuclidean>(query);

        // collect every point tied with the best one and keep the first in input order
        let radius = best.distance * (1.0 + 1e-12) + f64::MIN_POSITIVE;
        self.tree
            .within_unsorted::<SquaredEuclidean>(query, radius)
            .into_iter()
            .filter(|n| n.distance <= best.distance)
            .map(|n| self.ids[n.item as usize] as usize)
            .chain(std::iter::once(self.ids[best.item as usize] as usize))
            .min()
            .map(|index| Neighbor {
                index,
                distance: best.distance.sqrt(),
            })
    }

    /// Find the `k` nearest points to `query`, sorted by distance then index.
    ///
    /// Points tied with the `k`-th distance are resolved to the lowest input indices.
    pub fn nearest_k(&self, query: &[f64; 3], k: usize) -> Vec<Neighbor> {
        let Some(count) = NonZeroUsize::new(k) else {
            return Vec::new();
        };
        if !query.iter().all(|c| c.is_finite()) {
            return Vec::new();
        }
        let farthest = self
            .tree
            .nearest_n::<SquaredEuclidean>(query, count)
            .into_iter()
            .map(|n| n.distance)
            .fold(0.0f64, f64::max);

        // widen to everything up to the k-th distance, ties included, then trim
        let radius = farthest * (1.0 + 1e-12) + f64::MIN_POSITIVE;
        let mut neighbors = self
            .tree
            .within_unsorted::<SquaredEuclidean>(query, radius)
            .into_iter()
            .filter(|n| n.distance <= farthest)
            .map(|n| Neighbor {
                index: self.ids[n.item as usize] as usize,
                distance: n.distance.sqrt(),
            })
            .collect::<Vec<_>>();
        sort_neighbors(&mut neighbors);
        neighbors.truncate(k);
        neighbors
    }

    /// Find every point within `radius` of `query`, sorted by distance then index.
    pub fn within_radius(&self, query: &[f64; 3], radius: f64) -> Vec<Neighbor> {
        if !query.iter().all(|c| c.is_finite()) || radius.is_nan() || radius <= 0.0 {
            return Vec::new();
        }
        let mut neighbors = self
            .tree
            .within_unsorted::<SquaredEuclidean>(query, radius * radius)
            .into_iter()
            .map(|n| Neighbor {
                index: self.ids[n.item as usize] as usize,
                distance: n.distance.sqrt(),
            })
            .filter(|n| n.distance <= radius)
            .collect::<Vec<_>>();
        sort_neighbors(&mut neighbors);
        neighbors
    }
}

fn sort_neighbors(neighbors: &mut [Neighbor]) {
    neighbors.sort_by(|a, b| {
        a.distance
            .total_cmp(&b.distance)
            .then(a.index.cmp(&b.index))
    });
}

impl std::fmt::Debug for NearestNeighborIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NearestNeighborIndex")
            .field("num_points", &self.points.len())
            .field("num_indexed", &self.ids.len())
            .finish()
    }
}

// NOTE: the tree itself is not serialized, the decoding side rebuilds it from the points.
impl bincode::enc::Encode for NearestNeighborIndex {
    fn encode<E: bincode::enc::Encoder>(
        &self,
        encoder: &mut E,
    ) -> Result<(), bincode::error::EncodeError> {
        bincode::Encode::encode(&self.points, encoder)
    }
}

impl<C> bincode::de::Decode<C> for NearestNeighborIndex {
    fn decode<D: bincode::de::Decoder<Context = C>>(
        decoder: &mut D,
    ) -> Result<Self, bincode::error::DecodeError> {
        let points: Vec<[f64; 3]> = bincode::Decode::decode(decoder)?;
        Self::build(&points)
            .map_err(|e| bincode::error::DecodeError::OtherString(format!("Index error: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn grid_points() -> Vec<[f64; 3]> {
        let mut points = Vec::new();
        for x in 0..5 {
            for y in 0..5 {
                points.push([x as f64, y as f64, 0.0]);
            }
        }
        points
    }

    #[test]
    fn test_build_empty() {
        assert_eq!(
            NearestNeighborIndex::build(&[]).err(),
            Some(SpatialError::EmptyGeometry)
        );
        assert_eq!(
            NearestNeighborIndex::build(&[[f64::NAN, 0.0, 0.0]]).err(),
            Some(SpatialError::EmptyGeometry)
        );
    }

    #[test]
    fn test_nearest() -> Result<(), SpatialError> {
        let index = NearestNeighborIndex::build(&grid_points())?;
        assert_eq!(index.len(), 25);
        let nn = index.nearest(&[3.1, 1.9, 0.2]);
        assert_eq!(nn.map(|n| n.index), Some(3 * 5 + 2));
        assert!(index.nearest(&[f64::NAN, 0.0, 0.0]).is_none());
        Ok(())
    }

    #[test]
    fn test_nearest_tie_breaks_by_input_order() -> Result<(), SpatialError> {
        let points = vec![[1.0, 0.0, 0.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        let index = NearestNeighborIndex::build(&points)?;
        let nn = index.nearest(&[0.0, 0.0, 0.0]);
        assert_eq!(nn.map(|n| n.index), Some(0));
        assert_relative_eq!(nn.map(|n| n.distance).unwrap_or(f64::NAN), 1.0);
        Ok(())
    }

    #[test]
    fn test_skips_non_finite_points() -> Result<(), SpatialError> {
        let points = vec![[f64::NAN, 0.0, 0.0], [2.0, 0.0, 0.0]];
        let index = NearestNeighborIndex::build(&points)?;
        assert_eq!(index.len(), 1);
        assert_eq!(index.nearest(&[0.0, 0.0, 0.0]).map(|n| n.index), Some(1));
        Ok(())
    }

    #[test]
    fn test_nearest_k() -> Result<(), SpatialError> {
        let index = NearestNeighborIndex::build(&grid_points())?;
        let knn = index.nearest_k(&[0.0, 0.0, 0.0], 3);
        assert_eq!(knn.len(), 3);
        assert_eq!(knn[0].index, 0);
        // (0, 1) and (1, 0) are tied, lower index first
        assert_eq!(knn[1].index, 1);
        assert_eq!(knn[2].index, 5);
        assert!(index.nearest_k(&[0.0, 0.0, 0.0], 0).is_empty());
        Ok(())
    }

    #[test]
    fn test_nearest_k_ties_at_boundary() -> Result<(), SpatialError> {
        let points = vec![
            [0.0, 0.0, -1.0],
            [-1.0, 0.0, 0.0],
            [0.0, -1.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 0.5],
            [0.0, 0.0, 1.0],
        ];
        let index = NearestNeighborIndex::build(&points)?;
        let query = [0.0, 0.0, 0.0];
        for k in 1..=points.len() {
            let knn = index.nearest_k(&query, k);
            let indices = knn.iter().map(|n| n.index).collect::<Vec<_>>();
            let expected = std::iter::once(5)
                .chain((0..points.len()).filter(|&i| i != 5).take(k - 1))
                .collect::<Vec<_>>();
            assert_eq!(indices, expected, "k = {k}");
        }
        assert_eq!(index.nearest_k(&query, 20).len(), points.len());
        Ok(())
    }

    #[test]
    fn test_within_radius() -> Result<(), SpatialError> {
        let index = NearestNeighborIndex::build(&grid_points())?;
        let found = index.within_radius(&[2.0, 2.0, 0.0], 1.01);
        let indices = found.iter().map(|n| n.index).collect::<Vec<_>>();
        assert_eq!(indices, vec![12, 7, 11, 13, 17]);
        assert!(index.within_radius(&[2.0, 2.0, 0.0], 0.0).is_empty());
        Ok(())
    }

    #[test]
    fn test_bincode_roundtrip() -> Result<(), Box<dyn std::error::Error>> {
        let index = NearestNeighborIndex::build(&grid_points())?;
        let config = bincode::config::standard();
        let bytes = bincode::encode_to_vec(&index, config)?;
        let (decoded, _): (NearestNeighborIndex, usize) =
            bincode::decode_from_slice(&bytes, config)?;
        assert_eq!(decoded.points(), index.points());
        assert_eq!(
            decoded.nearest(&[4.0, 4.0, 0.0]).map(|n| n.index),
            Some(24)
        );
        Ok(())
    }
}
