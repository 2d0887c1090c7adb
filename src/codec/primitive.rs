//! Fixed-width little-endian encodings for the registered primitive types

use crate::types::Timestamp;
use crate::{Result, StorageError};
use rust_decimal::Decimal;

/// A type with a fixed-width, injective binary layout
pub trait Primitive: Sized + 'static {
    /// Encoded width in bytes
    const WIDTH: usize;

    /// Write exactly `WIDTH` bytes to the start of `out`
    fn write_to(&self, out: &mut [u8]);

    /// Read a value back from the first `WIDTH` bytes of `bytes`
    fn read_from(bytes: &[u8]) -> Result<Self>;
}

/// Copy the first `N` bytes of a slice into an array
#[inline]
fn fixed<const N: usize>(bytes: &[u8]) -> Result<[u8; N]> {
    bytes
        .get(..N)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| {
            StorageError::Serialization(format!(
                "expected {} bytes, got {}",
                N,
                bytes.len()
            ))
        })
}

macro_rules! le_primitive {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Primitive for $ty {
                const WIDTH: usize = std::mem::size_of::<$ty>();

                #[inline]
                fn write_to(&self, out: &mut [u8]) {
                    out[..Self::WIDTH].copy_from_slice(&self.to_le_bytes());
                }

                #[inline]
                fn read_from(bytes: &[u8]) -> Result<Self> {
                    Ok(<$ty>::from_le_bytes(fixed(bytes)?))
                }
            }
        )*
    };
}

// Floats go through to_le_bytes too, which is the raw IEEE-754 bit pattern.
le_primitive!(u8, i8, u16, i16, u32, i32, u64, i64, u128, i128, f32, f64);

impl Primitive for bool {
    const WIDTH: usize = 1;

    fn write_to(&self, out: &mut [u8]) {
        out[0] = u8::from(*self);
    }

    fn read_from(bytes: &[u8]) -> Result<Self> {
        match fixed::<1>(bytes)?[0] {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(StorageError::Serialization(format!(
                "invalid bool byte {}",
                other
            ))),
        }
    }
}

impl Primitive for char {
    const WIDTH: usize = 4;

    fn write_to(&self, out: &mut [u8]) {
        out[..4].copy_from_slice(&u32::from(*self).to_le_bytes());
    }

    fn read_from(bytes: &[u8]) -> Result<Self> {
        let scalar = u32::from_le_bytes(fixed(bytes)?);
        char::from_u32(scalar).ok_or_else(|| {
            StorageError::Serialization(format!("invalid char scalar 0x{:X}", scalar))
        })
    }
}

/// Largest scale a `Decimal` can carry
const MAX_DECIMAL_SCALE: u8 = 28;

/// 128-bit decimal as two consecutive 64-bit words
///
/// The first four bytes are the flags word: bytes 0 and 1 unused, byte 2
/// the scale, the top bit of byte 3 the sign.
impl Primitive for Decimal {
    const WIDTH: usize = 16;

    fn write_to(&self, out: &mut [u8]) {
        out[..16].copy_from_slice(&self.serialize());
    }

    fn read_from(bytes: &[u8]) -> Result<Self> {
        let raw: [u8; 16] = fixed(bytes)?;
        if raw[2] > MAX_DECIMAL_SCALE {
            return Err(StorageError::Serialization(format!(
                "invalid decimal scale {}",
                raw[2]
            )));
        }
        if raw[0] != 0 || raw[1] != 0 || raw[3] & 0x7F != 0 {
            return Err(StorageError::Serialization(
                "invalid decimal flag bits".to_string(),
            ));
        }
        Ok(Decimal::deserialize(raw))
    }
}

impl Primitive for Timestamp {
    const WIDTH: usize = 8;

    fn write_to(&self, out: &mut [u8]) {
        self.as_micros().write_to(out);
    }

    fn read_from(bytes: &[u8]) -> Result<Self> {
        i64::read_from(bytes).map(Timestamp::from_micros)
    }
}

/// Raw 16-byte identifiers (UUIDs, hashes), stored verbatim
impl Primitive for [u8; 16] {
    const WIDTH: usize = 16;

    fn write_to(&self, out: &mut [u8]) {
        out[..16].copy_from_slice(self);
    }

    fn read_from(bytes: &[u8]) -> Result<Self> {
        fixed(bytes)
    }
}
