//! Fixed, little-endian wire records for the surface gather.
//!
//! Everything that crosses a rank boundary is one of these `Pod` structs, so
//! buffers can be reinterpreted as bytes without copying.

use bytemuck::{Pod, Zeroable};

pub fn cast_slice<T: Pod>(v: &[T]) -> &[u8] {
    bytemuck::cast_slice(v)
}

pub fn cast_slice_mut<T: Pod>(v: &mut [T]) -> &mut [u8] {
    bytemuck::cast_slice_mut(v)
}

pub fn expect_exact_len(actual: usize, expected: usize) -> Result<(), String> {
    if actual == expected {
        Ok(())
    } else {
        Err(format!("expected {expected} bytes, got {actual}"))
    }
}

/// A point or row count (u64) carried on the wire.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct WireCount {
    pub n_le: u64,
}

impl WireCount {
    pub fn new(n: u64) -> Self {
        Self { n_le: n.to_le() }
    }
    pub fn get(&self) -> u64 {
        u64::from_le(self.n_le)
    }
}

/// A global point id carried on the wire.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct WireId {
    pub id_le: u64,
}

impl WireId {
    pub fn of(id: u64) -> Self {
        Self { id_le: id.to_le() }
    }
    pub fn get(&self) -> u64 {
        u64::from_le(self.id_le)
    }
}

/// One `f64` field value, stored as little-endian IEEE-754 bits.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct WireScalar {
    pub bits_le: u64,
}

impl WireScalar {
    pub fn of(v: f64) -> Self {
        Self {
            bits_le: v.to_bits().to_le(),
        }
    }
    pub fn get(&self) -> f64 {
        f64::from_bits(u64::from_le(self.bits_le))
    }
}

#[cfg(test)]
mod layout_tests {
    use super::*;
    use static_assertions::{assert_eq_align, assert_eq_size};

    assert_eq_size!(WireCount, u64);
    assert_eq_size!(WireId, u64);
    assert_eq_size!(WireScalar, u64);
    assert_eq_align!(WireScalar, u64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_preserves_sign_and_tiny_magnitudes() {
        for v in [-0.0, -3.25, 1e-20, f64::MIN_POSITIVE, f64::MAX] {
            let w = WireScalar::of(v);
            assert_eq!(w.get().to_bits(), v.to_bits());
        }
        assert!(WireScalar::of(f64::NAN).get().is_nan());
    }

    #[test]
    fn byte_view_is_little_endian() {
        let ids = [WireId::of(0x0102)];
        assert_eq!(&cast_slice(&ids)[..2], &[0x02, 0x01]);
    }

    #[test]
    fn exact_len() {
        assert!(expect_exact_len(3, 4).is_err());
        assert!(expect_exact_len(4, 4).is_ok());
    }
}
