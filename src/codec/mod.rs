//! Item codecs: fixed-width encode/decode per element type
//!
//! ## Design
//! - **Fixed width**: every item of a tree occupies `max_encoded_len()` bytes
//!   on a page, which is what makes page sizes computable from `t` alone.
//! - **Explicit registry**: the built-in types are listed once in a
//!   compile-time table and looked up by `TypeId` when a disk tree is built.
//! - **Pluggable**: any other type implements [`ItemCodec`] itself.

mod primitive;

pub use primitive::Primitive;

use crate::types::Timestamp;
use crate::{Result, StorageError};
use rust_decimal::Decimal;
use std::any::{type_name, Any, TypeId};
use std::marker::PhantomData;

/// Fixed-width binary codec for one element type
pub trait ItemCodec<T>: Send + Sync {
    /// Number of bytes every encoded item occupies
    fn max_encoded_len(&self) -> usize;

    /// Encode `item` into the first `max_encoded_len()` bytes of `out`
    fn encode(&self, item: &T, out: &mut [u8]);

    /// Decode an item from the first `max_encoded_len()` bytes of `bytes`
    fn decode(&self, bytes: &[u8]) -> Result<T>;
}

impl<T, C: ItemCodec<T> + ?Sized> ItemCodec<T> for Box<C> {
    fn max_encoded_len(&self) -> usize {
        (**self).max_encoded_len()
    }

    fn encode(&self, item: &T, out: &mut [u8]) {
        (**self).encode(item, out)
    }

    fn decode(&self, bytes: &[u8]) -> Result<T> {
        (**self).decode(bytes)
    }
}

/// Codec for a registered [`Primitive`]
pub struct PrimitiveCodec<T>(PhantomData<fn() -> T>);

impl<T> PrimitiveCodec<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for PrimitiveCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Primitive> ItemCodec<T> for PrimitiveCodec<T> {
    fn max_encoded_len(&self) -> usize {
        T::WIDTH
    }

    fn encode(&self, item: &T, out: &mut [u8]) {
        item.write_to(out)
    }

    fn decode(&self, bytes: &[u8]) -> Result<T> {
        T::read_from(bytes)
    }
}

/// Produces a `Box<Box<dyn ItemCodec<X>>>` erased behind `Any`
type Factory = fn() -> Box<dyn Any>;

macro_rules! registry {
    ($($ty:ty),* $(,)?) => {
        fn lookup(type_id: TypeId) -> Option<Factory> {
            $(
                if type_id == TypeId::of::<$ty>() {
                    let factory: Factory = || {
                        let codec: Box<dyn ItemCodec<$ty>> = Box::new(PrimitiveCodec::<$ty>::new());
                        Box::new(codec)
                    };
                    return Some(factory);
                }
            )*
            None
        }

        /// Names of the types with a built-in codec
        pub fn registered_types() -> &'static [&'static str] {
            &[$(stringify!($ty)),*]
        }
    };
}

registry!(
    u8, i8, u16, i16, u32, i32, u64, i64, u128, i128, f32, f64, bool, char,
    Decimal, Timestamp, [u8; 16],
);

/// Look up the built-in codec for `T`
///
/// Fails with [`StorageError::UnsupportedType`] naming `T` when the type is
/// not registered; such types need a hand-written [`ItemCodec`].
pub fn default_codec<T: 'static>() -> Result<Box<dyn ItemCodec<T>>> {
    let factory =
        lookup(TypeId::of::<T>()).ok_or(StorageError::UnsupportedType(type_name::<T>()))?;
    factory()
        .downcast::<Box<dyn ItemCodec<T>>>()
        .map(|codec| *codec)
        .map_err(|_| StorageError::UnsupportedType(type_name::<T>()))
}

/// Whether `T` has a built-in codec
pub fn is_registered<T: 'static>() -> bool {
    lookup(TypeId::of::<T>()).is_some()
}
