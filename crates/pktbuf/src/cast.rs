// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::{BoxedError, Error, PacketView, Result};

/// A typed overlay on the first bytes of a packet buffer, such as a protocol header.
///
/// Typed views are created via [`PacketBuffer::cast()`][crate::PacketBuffer::cast] or
/// [`PacketView::cast()`], which check that enough bytes have been written and hand the
/// implementation a slice covering exactly the bytes it overlays.
///
/// # Example
///
/// ```
/// use pktbuf::{BoxedError, BufferAccess, PacketBuffer, PacketView, TypedView};
///
/// struct EtherType<'a>(PacketView<'a>);
///
/// impl<'a> TypedView<'a> for EtherType<'a> {
///     const SIZE: usize = 2;
///
///     fn wrap(view: PacketView<'a>) -> Result<Self, BoxedError> {
///         Ok(Self(view))
///     }
/// }
///
/// let buffer = PacketBuffer::copied_from_slice(&[0x86, 0xDD, 0x60])?;
/// let ether_type = buffer.cast::<EtherType>()?;
///
/// assert_eq!(ether_type.0.get_num::<u16>(0)?, 0x86DD);
/// # buffer.close()?;
/// # Ok::<(), pktbuf::Error>(())
/// ```
pub trait TypedView<'a>: Sized {
    /// The number of bytes the view overlays.
    ///
    /// Zero marks a variable-size view, which overlays the whole buffer and can only be cast
    /// from a completely written buffer.
    const SIZE: usize;

    /// Builds the view over `view`, which is a slice of [`SIZE`][Self::SIZE] bytes (or of the
    /// whole buffer for variable-size views) with all of them readable.
    ///
    /// # Errors
    ///
    /// Returns any error that makes the bytes unacceptable for the view. The caller receives it
    /// as the source of an [`Error::Cast`].
    fn wrap(view: PacketView<'a>) -> std::result::Result<Self, BoxedError>;
}

/// The length of the overlay for `T`, given the population of the source handle.
pub(crate) fn overlay_len<'a, T: TypedView<'a>>(writer_index: usize, capacity: usize) -> Result<usize> {
    if T::SIZE == 0 {
        if writer_index != capacity {
            return Err(Error::IllegalArgument(
                format!(
                    "cannot cast to variable-size {}: only {writer_index} of {capacity} bytes written",
                    short_type_name::<T>()
                )
                .into(),
            ));
        }

        Ok(capacity)
    } else {
        if writer_index < T::SIZE {
            return Err(Error::IllegalArgument(
                format!(
                    "cannot cast to {}: it needs {} bytes but only {writer_index} are written",
                    short_type_name::<T>(),
                    T::SIZE
                )
                .into(),
            ));
        }

        Ok(T::SIZE)
    }
}

pub(crate) fn wrap<'a, T: TypedView<'a>>(view: PacketView<'a>) -> Result<T> {
    T::wrap(view).map_err(|source| Error::Cast {
        view: short_type_name::<T>(),
        source,
    })
}

fn short_type_name<T>() -> &'static str {
    let name = std::any::type_name::<T>();
    let path = name.split('<').next().unwrap_or(name);
    let start = path.rfind("::").map_or(0, |i| i + 2);
    let short = &name[start..];

    // Lifetime-only argument lists such as `<'_>` carry nothing useful in an error message.
    match short.split_once('<') {
        Some((base, args)) if args.strip_suffix('>').is_some_and(only_lifetimes) => base,
        _ => short,
    }
}

fn only_lifetimes(args: &str) -> bool {
    args.split(',').all(|arg| arg.trim_start().starts_with('\''))
}
