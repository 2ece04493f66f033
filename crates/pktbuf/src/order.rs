// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Pure encode/decode functions for fixed-width primitives.

use std::fmt::Debug;

use num_traits::{FromBytes, ToBytes};

/// Selects the physical byte order used by the natural accessors of a buffer.
///
/// The reversed accessors (`*_re`) always use the opposite order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    /// Most significant byte first. This is network byte order and the default.
    #[default]
    BigEndian,

    /// Least significant byte first.
    LittleEndian,
}

impl ByteOrder {
    /// The byte order of the current target.
    #[cfg(target_endian = "big")]
    pub const NATIVE: Self = Self::BigEndian;

    /// The byte order of the current target.
    #[cfg(target_endian = "little")]
    pub const NATIVE: Self = Self::LittleEndian;

    /// Returns the opposite byte order.
    #[must_use]
    pub const fn reversed(self) -> Self {
        match self {
            Self::BigEndian => Self::LittleEndian,
            Self::LittleEndian => Self::BigEndian,
        }
    }
}

/// A fixed-width primitive that can be read from and written to a packet buffer.
///
/// Implemented for `i8`, `u8`, `i16`, `u16`, `i32`, `u32`, `i64`, `u64`, `f32` and `f64`.
/// This trait is sealed.
pub trait Primitive: Copy + Debug + sealed::Sealed {
    /// The number of bytes the primitive occupies in a buffer.
    const SIZE: usize;

    /// Decodes a value from the first [`SIZE`][Self::SIZE] bytes of `bytes`.
    ///
    /// # Panics
    ///
    /// Panics if `bytes` is shorter than [`SIZE`][Self::SIZE].
    #[must_use]
    fn decode(bytes: &[u8], order: ByteOrder) -> Self;

    /// Encodes the value into the first [`SIZE`][Self::SIZE] bytes of `out`.
    ///
    /// # Panics
    ///
    /// Panics if `out` is shorter than [`SIZE`][Self::SIZE].
    fn encode(self, order: ByteOrder, out: &mut [u8]);
}

impl<T> Primitive for T
where
    T: Copy + Debug + sealed::Sealed + FromBytes + ToBytes,
    <T as FromBytes>::Bytes: Sized + Default,
{
    const SIZE: usize = size_of::<T>();

    #[inline]
    fn decode(bytes: &[u8], order: ByteOrder) -> Self {
        let mut raw = <T as FromBytes>::Bytes::default();
        AsMut::<[u8]>::as_mut(&mut raw).copy_from_slice(&bytes[..Self::SIZE]);

        match order {
            ByteOrder::BigEndian => T::from_be_bytes(&raw),
            ByteOrder::LittleEndian => T::from_le_bytes(&raw),
        }
    }

    #[inline]
    fn encode(self, order: ByteOrder, out: &mut [u8]) {
        let raw = match order {
            ByteOrder::BigEndian => self.to_be_bytes(),
            ByteOrder::LittleEndian => self.to_le_bytes(),
        };

        out[..Self::SIZE].copy_from_slice(AsRef::<[u8]>::as_ref(&raw));
    }
}

mod sealed {
    pub trait Sealed {}

    impl Sealed for i8 {}
    impl Sealed for u8 {}
    impl Sealed for i16 {}
    impl Sealed for u16 {}
    impl Sealed for i32 {}
    impl Sealed for u32 {}
    impl Sealed for i64 {}
    impl Sealed for u64 {}
    impl Sealed for f32 {}
    impl Sealed for f64 {}
}
