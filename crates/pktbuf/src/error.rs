// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;

use crate::LeakReport;

/// A boxed error raised by a collaborator (a text codec or a typed view constructor).
pub type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A specialized `Result` for packet buffer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Any error raised by a packet buffer operation.
///
/// None of these errors are retried or recovered from internally. A failed operation leaves the
/// buffer exactly as it was before the call.
///
/// Use [`kind()`][Self::kind] for a coarse classification that is stable across variants.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A call-site argument was invalid, e.g. a zero capacity or a zero-length copy.
    #[error("illegal argument: {0}")]
    IllegalArgument(Cow<'static, str>),

    /// An index or length does not fit the capacity, readable bytes or writable bytes of the buffer.
    #[error("index out of bounds: {0}")]
    IndexOutOfBounds(String),

    /// The buffer memory has already been released.
    #[error("buffer memory has been released")]
    MemoryAccess,

    /// An owned allocation became unreachable without being released.
    #[error("memory leak: {0}")]
    MemoryLeak(LeakReport),

    /// The operation is not permitted for this kind of handle, e.g. `close()` on a slice.
    #[error("illegal state: {0}")]
    IllegalState(Cow<'static, str>),

    /// A typed view could not be constructed over the buffer.
    #[error("cannot cast buffer to {view}: {source}")]
    Cast {
        /// The type name of the requested view.
        view: &'static str,

        /// The error raised by the view constructor.
        #[source]
        source: BoxedError,
    },

    /// The text codec failed to encode or decode a character sequence.
    #[error("text codec '{codec}' failed: {source}")]
    Codec {
        /// The name of the codec, as reported by [`TextCodec::name()`][crate::TextCodec::name].
        codec: String,

        /// The error raised by the codec.
        #[source]
        source: BoxedError,
    },
}

/// The coarse classification of an [`Error`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Invalid call-site argument, including failed casts and codec failures.
    IllegalArgument,

    /// Bounds violation.
    IndexOutOfBounds,

    /// Use after release.
    MemoryAccess,

    /// Leak diagnostic.
    MemoryLeak,

    /// Operation not valid for the handle kind.
    IllegalState,
}

impl Error {
    /// Returns the coarse classification of the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::IllegalArgument(_) | Self::Cast { .. } | Self::Codec { .. } => ErrorKind::IllegalArgument,
            Self::IndexOutOfBounds(_) => ErrorKind::IndexOutOfBounds,
            Self::MemoryAccess => ErrorKind::MemoryAccess,
            Self::MemoryLeak(_) => ErrorKind::MemoryLeak,
            Self::IllegalState(_) => ErrorKind::IllegalState,
        }
    }

    pub(crate) fn illegal_argument(message: impl Into<Cow<'static, str>>) -> Self {
        Self::IllegalArgument(message.into())
    }

    pub(crate) fn illegal_state(message: impl Into<Cow<'static, str>>) -> Self {
        Self::IllegalState(message.into())
    }

    /// A window of `len` bytes starting at `index` does not fit into `limit` bytes.
    pub(crate) fn out_of_bounds(index: usize, len: usize, limit: usize) -> Self {
        Self::IndexOutOfBounds(format!("index {index} with length {len} exceeds limit {limit}"))
    }
}
