//! Structures cross the host/device boundary as opaque byte blobs.
//!
//! A structure is fully built on one side, encoded, copied and decoded read-only on the
//! other side. Indexes that hold derived data (the kd-tree) rebuild it while decoding.

/// Error types for the transfer module.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// Failed to encode a structure into a blob
    #[error("Failed to encode blob: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    /// Failed to decode a structure from a blob
    #[error("Failed to decode blob: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    /// The blob holds more bytes than the decoded structure
    #[error("Blob has {0} trailing bytes")]
    TrailingBytes(usize),
}

/// Encode `value` into a blob.
pub fn to_device_blob<T: bincode::Encode>(value: &T) -> Result<Vec<u8>, TransferError> {
    let blob = bincode::encode_to_vec(value, bincode::config::standard())?;
    log::trace!("encoded blob of {} bytes", blob.len());
    Ok(blob)
}

/// Decode a structure from a blob produced by [`to_device_blob`].
pub fn from_device_blob<T: bincode::Decode<()>>(blob: &[u8]) -> Result<T, TransferError> {
    let (value, read) = bincode::decode_from_slice(blob, bincode::config::standard())?;
    if read != blob.len() {
        return Err(TransferError::TrailingBytes(blob.len() - read));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        mesh::TriangleMesh,
        pointcloud::PointCloud,
        spatial::{NearestNeighborIndex, Ray, RayIntersectionIndex},
    };

    #[test]
    fn test_pointcloud_blob() -> Result<(), Box<dyn std::error::Error>> {
        let cloud = PointCloud::new(
            vec![[0.0, 0.0, 1.0], [0.5, 0.5, 0.5]],
            vec![[0.0, 0.0, 1.0], [0.0, 1.0, 0.0]],
        )?;
        let blob = to_device_blob(&cloud)?;
        let device: PointCloud = from_device_blob(&blob)?;
        assert_eq!(device, cloud);
        Ok(())
    }

    #[test]
    fn test_index_blobs() -> Result<(), Box<dyn std::error::Error>> {
        let sphere = TriangleMesh::icosphere(2);
        let rays = RayIntersectionIndex::build(&sphere)?;
        let nn = NearestNeighborIndex::build(sphere.vertices())?;

        let rays_device: RayIntersectionIndex = from_device_blob(&to_device_blob(&rays)?)?;
        let nn_device: NearestNeighborIndex = from_device_blob(&to_device_blob(&nn)?)?;

        let ray = Ray::new([0.0, 0.0, 3.0], [0.0, 0.0, -1.0]);
        assert_eq!(rays_device.intersect(&ray, f64::INFINITY), rays.intersect(&ray, f64::INFINITY));
        assert_eq!(nn_device.nearest(&[0.1, 0.2, 0.9]), nn.nearest(&[0.1, 0.2, 0.9]));
        Ok(())
    }

    #[test]
    fn test_trailing_bytes() -> Result<(), Box<dyn std::error::Error>> {
        let mut blob = to_device_blob(&7u32)?;
        blob.push(0);
        assert!(matches!(
            from_device_blob::<u32>(&blob),
            Err(TransferError::TrailingBytes(1))
        ));
        Ok(())
    }
}
