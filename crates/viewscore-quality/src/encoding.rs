//! Quality values are stored as `u32` keys whose unsigned order matches the float order,
//! so a concurrent maximum reduces to an integer compare-and-swap.

use std::sync::atomic::{AtomicU32, Ordering};

const SIGN_BIT: u32 = 0x8000_0000;

/// Encode a quality value into its order-preserving key.
///
/// For any two non-NaN floats `a < b` the keys satisfy `encode_quality(a) < encode_quality(b)`.
#[inline]
pub fn encode_quality(quality: f32) -> u32 {
    let bits = quality.to_bits();
    if bits & SIGN_BIT != 0 {
        !bits
    } else {
        bits | SIGN_BIT
    }
}

/// Decode a key produced by [`encode_quality`].
#[inline]
pub fn decode_quality(key: u32) -> f32 {
    let bits = if key & SIGN_BIT != 0 {
        key & !SIGN_BIT
    } else {
        !key
    };
    f32::from_bits(bits)
}

/// Map NaN, infinite and negative values to `0.0`.
#[inline]
pub fn sanitize_quality(quality: f32) -> f32 {
    if quality.is_finite() && quality > 0.0 {
        quality
    } else {
        0.0
    }
}

/// A buffer of encoded quality values supporting concurrent monotonic updates.
///
/// Every slot starts at the key of `0.0`. All writes go through [`sanitize_quality`], so a
/// slot always decodes to a finite non-negative value.
pub struct PackedQualityBuffer {
    slots: Vec<AtomicU32>,
}

impl PackedQualityBuffer {
    /// Create a buffer of `len` zero-quality slots.
    pub fn new(len: usize) -> Self {
        let zero = encode_quality(0.0);
        Self {
            slots: (0..len).map(|_| AtomicU32::new(zero)).collect(),
        }
    }

    /// Number of slots.
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Check if the buffer has no slots.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Read the decoded value of slot `index`.
    ///
    /// PRECONDITION: `index < self.len()`.
    pub fn load(&self, index: usize) -> f32 {
        decode_quality(self.slots[index].load(Ordering::Acquire))
    }

    /// Read the raw key of slot `index`.
    pub fn load_key(&self, index: usize) -> u32 {
        self.slots[index].load(Ordering::Acquire)
    }

    /// Overwrite slot `index`.
    pub fn store(&self, index: usize, quality: f32) {
        self.slots[index].store(encode_quality(sanitize_quality(quality)), Ordering::Release);
    }

    /// Raise slot `index` to `quality` if it is larger than the stored value.
    ///
    /// Returns the value stored before the update.
    pub fn fetch_max(&self, index: usize, quality: f32) -> f32 {
        let key = encode_quality(sanitize_quality(quality));
        let slot = &self.slots[index];
        let mut current = slot.load(Ordering::Acquire);
        while key > current {
            match slot.compare_exchange_weak(current, key, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
        decode_quality(current)
    }

    /// Decode every slot.
    pub fn decode_all(&self) -> Vec<f32> {
        self.slots
            .iter()
            .map(|s| decode_quality(s.load(Ordering::Acquire)))
            .collect()
    }
}

impl std::fmt::Debug for PackedQualityBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackedQualityBuffer")
            .field("len", &self.slots.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_roundtrip_is_bit_exact() {
        let values = [
            0.0f32,
            -0.0,
            f32::MIN_POSITIVE,
            1e-42,
            0.5,
            1.0,
            123.456,
            f32::MAX,
            -1.0,
            f32::INFINITY,
        ];
        for v in values {
            assert_eq!(decode_quality(encode_quality(v)).to_bits(), v.to_bits());
        }
    }

    #[test]
    fn test_order_preserving() {
        let sorted = [
            f32::NEG_INFINITY,
            -2.0f32,
            -1e-30,
            -0.0,
            0.0,
            1e-40,
            0.25,
            1.0,
            f32::MAX,
            f32::INFINITY,
        ];
        for pair in sorted.windows(2) {
            assert!(encode_quality(pair[0]) < encode_quality(pair[1]));
        }
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize_quality(f32::NAN), 0.0);
        assert_eq!(sanitize_quality(-1.0), 0.0);
        assert_eq!(sanitize_quality(f32::INFINITY), 0.0);
        assert_eq!(sanitize_quality(-0.0).to_bits(), 0.0f32.to_bits());
        assert_eq!(sanitize_quality(0.75), 0.75);
    }

    #[test]
    fn test_fetch_max() {
        let buffer = PackedQualityBuffer::new(2);
        assert_eq!(buffer.load(0), 0.0);
        assert_eq!(buffer.fetch_max(0, 0.5), 0.0);
        assert_eq!(buffer.fetch_max(0, 0.25), 0.5);
        assert_eq!(buffer.load(0), 0.5);
        buffer.fetch_max(1, f32::NAN);
        assert_eq!(buffer.load(1), 0.0);
        buffer.store(1, 2.0);
        assert_eq!(buffer.decode_all(), vec![0.5, 2.0]);
    }

    #[test]
    fn test_concurrent_fetch_max() {
        let buffer = Arc::new(PackedQualityBuffer::new(1));
        let handles = (0..8)
            .map(|t| {
                let buffer = Arc::clone(&buffer);
                std::thread::spawn(move || {
                    for i in 0..1000 {
                        buffer.fetch_max(0, (t * 1000 + i) as f32);
                    }
                })
            })
            .collect::<Vec<_>>();
        for h in handles {
            assert!(h.join().is_ok());
        }
        assert_eq!(buffer.load(0), 7999.0);
    }
}
