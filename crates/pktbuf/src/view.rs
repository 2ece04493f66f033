// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::ptr::NonNull;

use crate::access::{readable_windows_equal, sealed};
use crate::access::sealed::Backing as _;
use crate::buffer::check_window;
use crate::cursor::Cursor;
use crate::{Allocator, BufferAccess, ByteOrder, Error, PacketBuffer, Result, TypedView, cast};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ViewKind {
    /// Aliases a window of the parent without any ownership.
    Slice,

    /// Aliases the whole parent and shares its ownership.
    Duplicate,
}

/// A handle that aliases the memory of a [`PacketBuffer`].
///
/// Views are created by [`PacketBuffer::slice()`] (a window without ownership) and
/// [`PacketBuffer::duplicate()`] (the whole buffer, sharing ownership). A view has its own reader
/// and writer index, marks and byte order. Writes through a view are visible through every other
/// handle of the same memory.
///
/// A view borrows its parent buffer, which therefore outlives it.
///
/// # Example
///
/// ```
/// use pktbuf::{BufferAccess, PacketBuffer};
///
/// let buffer = PacketBuffer::copied_from_slice(&[0x45, 0x00, 0x00, 0x54])?;
///
/// let mut header = buffer.slice(0, 4)?;
/// assert_eq!(header.read_byte()? >> 4, 4);
///
/// header.set_num(2, 0x0028_u16)?;
/// assert_eq!(buffer.get_num::<u16>(2)?, 0x0028);
///
/// assert!(std::ptr::eq(header.unslice(), &buffer));
/// # buffer.close()?;
/// # Ok::<(), pktbuf::Error>(())
/// ```
pub struct PacketView<'a> {
    parent: &'a PacketBuffer,
    offset: usize,
    capacity: usize,
    cursor: Cursor,
    byte_order: ByteOrder,
    kind: ViewKind,
}

impl<'a> PacketView<'a> {
    pub(crate) const fn new(
        parent: &'a PacketBuffer,
        offset: usize,
        capacity: usize,
        cursor: Cursor,
        byte_order: ByteOrder,
        kind: ViewKind,
    ) -> Self {
        Self {
            parent,
            offset,
            capacity,
            cursor,
            byte_order,
            kind,
        }
    }

    /// The buffer that owns the memory of this view.
    #[must_use]
    pub const fn unslice(&self) -> &'a PacketBuffer {
        self.parent
    }

    /// The index in the parent buffer that index 0 of this view corresponds to.
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Whether this view shares ownership of the memory.
    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        self.kind == ViewKind::Duplicate
    }

    /// Creates another view of the same window with a copy of the indices, marks and byte order
    /// of this one.
    ///
    /// The new view is of the same kind: a duplicate of a slice is a slice.
    #[must_use]
    pub const fn duplicate(&self) -> Self {
        Self::new(self.parent, self.offset, self.capacity, self.cursor, self.byte_order, self.kind)
    }

    /// Creates a view of `len` bytes starting at `offset` of this view.
    ///
    /// The result is a slice of the parent buffer with the offsets composed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfBounds`] if `offset + len > capacity` and
    /// [`Error::MemoryAccess`] if the memory has been released.
    pub fn slice(&self, offset: usize, len: usize) -> Result<Self> {
        self.memory_base()?;
        check_window(offset, len, self.capacity)?;

        Ok(Self::new(
            self.parent,
            self.offset + offset,
            len,
            Cursor::filled(len),
            self.byte_order,
            ViewKind::Slice,
        ))
    }

    /// Creates a slice of the readable bytes, see [`slice()`][Self::slice].
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemoryAccess`] if the memory has been released.
    #[cfg_attr(test, mutants::skip)] // Trivial forwarder.
    pub fn slice_readable(&self) -> Result<Self> {
        self.slice(self.cursor.reader_index(), self.cursor.readable_bytes())
    }

    /// Overlays a typed view on the start of this view, see [`PacketBuffer::cast()`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalArgument`] if too few bytes have been written and [`Error::Cast`]
    /// if the view rejects the bytes.
    pub fn cast<T: TypedView<'a>>(&self) -> Result<T> {
        let len = cast::overlay_len::<T>(self.cursor.writer_index(), self.capacity)?;
        cast::wrap(self.slice(0, len)?)
    }

    /// Releases the shared memory if this view is a duplicate, returning `true` if this call
    /// released it.
    ///
    /// Every handle of the memory reports [`Error::MemoryAccess`] afterwards. The memory itself
    /// returns to the allocator when the parent buffer is released or dropped.
    ///
    /// Releasing a slice does nothing and returns `false`.
    pub fn release(&mut self) -> bool {
        match self.kind {
            ViewKind::Slice => false,
            ViewKind::Duplicate => self.parent.mark_released(),
        }
    }

    /// Releases the shared memory of a duplicate and consumes the view.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalState`] for a slice, which does not own its memory.
    pub fn close(mut self) -> Result<()> {
        match self.kind {
            ViewKind::Slice => Err(Error::illegal_state("a slice does not own its memory and cannot be closed")),
            ViewKind::Duplicate => {
                self.release();
                Ok(())
            }
        }
    }
}

impl sealed::Backing for PacketView<'_> {
    fn memory_base(&self) -> Result<NonNull<u8>> {
        let base = self.parent.memory_base()?;

        // SAFETY: The view window was checked against the parent capacity on creation and the
        // parent cannot change its capacity while borrowed.
        Ok(unsafe { base.add(self.offset) })
    }

    fn window_capacity(&self) -> usize {
        self.capacity
    }

    fn index_cursor(&self) -> &Cursor {
        &self.cursor
    }

    fn index_cursor_mut(&mut self) -> &mut Cursor {
        &mut self.cursor
    }

    fn order(&self) -> ByteOrder {
        self.byte_order
    }

    fn set_order(&mut self, order: ByteOrder) {
        self.byte_order = order;
    }

    fn source_allocator(&self) -> &Allocator {
        self.parent.allocator()
    }
}

impl fmt::Debug for PacketView<'_> {
    #[cfg_attr(test, mutants::skip)] // We have no API contract here.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketView")
            .field("kind", &self.kind)
            .field("offset", &self.offset)
            .field("capacity", &self.capacity)
            .field("reader_index", &self.cursor.reader_index())
            .field("writer_index", &self.cursor.writer_index())
            .field("byte_order", &self.byte_order)
            .field("released", &self.is_released())
            .finish_non_exhaustive()
    }
}

impl PartialEq for PacketView<'_> {
    fn eq(&self, other: &Self) -> bool {
        readable_windows_equal(self, other)
    }
}

impl PartialEq<PacketBuffer> for PacketView<'_> {
    fn eq(&self, other: &PacketBuffer) -> bool {
        readable_windows_equal(self, other)
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use static_assertions::assert_not_impl_any;

    use super::*;
    use crate::ErrorKind;

    assert_not_impl_any!(PacketView<'static>: Send, Sync, Clone);

    #[test]
    fn slice_aliases_parent() {
        let buffer = PacketBuffer::copied_from_slice(&[0; 8]).unwrap();
        let slice = buffer.slice(2, 4).unwrap();

        slice.set_num(0, 0xAABB_CCDD_u32).unwrap();

        assert_eq!(buffer.get_num::<u32>(2).unwrap(), 0xAABB_CCDD);
        assert_eq!(slice.capacity(), 4);
        assert_eq!(slice.reader_index(), 0);
        assert_eq!(slice.writer_index(), 4);
        assert_eq!(slice.offset(), 2);

        buffer.close().unwrap();
    }

    #[test]
    fn slice_is_bounded_by_its_window() {
        let buffer = PacketBuffer::copied_from_slice(&[0; 8]).unwrap();
        let slice = buffer.slice(2, 4).unwrap();

        assert_eq!(slice.get_num::<u16>(3).unwrap_err().kind(), ErrorKind::IndexOutOfBounds);
        assert_eq!(slice.slice(3, 2).unwrap_err().kind(), ErrorKind::IndexOutOfBounds);

        buffer.close().unwrap();
    }

    #[test]
    fn nested_slices_compose_offsets() {
        let buffer = PacketBuffer::copied_from_slice(&[0, 1, 2, 3, 4, 5, 6, 7]).unwrap();
        let outer = buffer.slice(2, 6).unwrap();
        let inner = outer.slice(1, 3).unwrap();

        assert_eq!(inner.offset(), 3);
        assert_eq!(inner.to_vec().unwrap(), [3, 4, 5]);
        assert!(std::ptr::eq(inner.unslice(), &buffer));
        assert!(!inner.is_duplicate());

        buffer.close().unwrap();
    }

    #[test]
    fn slice_release_is_noop() {
        let buffer = PacketBuffer::copied_from_slice(&[1, 2, 3]).unwrap();
        let mut slice = buffer.slice_readable().unwrap();

        assert!(!slice.release());
        assert_eq!(slice.get_byte(0).unwrap(), 1);

        let error = slice.close().unwrap_err();
        assert_eq!(error.kind(), ErrorKind::IllegalState);
        assert!(!buffer.is_released());

        buffer.close().unwrap();
    }

    #[test]
    fn duplicate_starts_with_source_indices() {
        let mut buffer = PacketBuffer::copied_from_slice(&[1, 2, 3, 4]).unwrap();
        buffer.skip_bytes(1).unwrap();
        buffer.mark_reader_index().unwrap();
        buffer.set_byte_order(ByteOrder::LittleEndian);

        let mut duplicate = buffer.duplicate();
        assert_eq!(duplicate.reader_index(), 1);
        assert_eq!(duplicate.writer_index(), 4);
        assert_eq!(duplicate.marked_reader_index(), 1);
        assert_eq!(duplicate.byte_order(), ByteOrder::LittleEndian);

        duplicate.skip_bytes(2).unwrap();
        assert_eq!(buffer.reader_index(), 1);

        drop(duplicate);
        buffer.close().unwrap();
    }

    #[test]
    fn duplicate_release_is_shared_once() {
        let buffer = PacketBuffer::copied_from_slice(&[1, 2, 3, 4]).unwrap();
        let mut first = buffer.duplicate();
        let mut second = first.duplicate();
        let slice = buffer.slice(0, 2).unwrap();

        assert!(second.is_duplicate());
        assert!(first.release());
        assert!(!second.release());
        assert!(!first.release());

        assert_eq!(second.get_byte(0).unwrap_err().kind(), ErrorKind::MemoryAccess);
        assert_eq!(slice.get_byte(0).unwrap_err().kind(), ErrorKind::MemoryAccess);
        assert_eq!(buffer.get_byte(0).unwrap_err().kind(), ErrorKind::MemoryAccess);
        assert_eq!(second.set_writer_index(0).unwrap_err().kind(), ErrorKind::MemoryAccess);

        assert_eq!(second.capacity(), 4);
    }

    #[test]
    fn duplicate_of_slice_is_slice() {
        let buffer = PacketBuffer::copied_from_slice(&[1, 2, 3, 4]).unwrap();
        let slice = buffer.slice(1, 2).unwrap();

        let mut copy = slice.duplicate();
        assert!(!copy.is_duplicate());
        assert!(!copy.release());
        assert_eq!(copy.to_vec().unwrap(), [2, 3]);

        buffer.close().unwrap();
    }

    #[test]
    fn copy_of_view_is_independent() {
        let buffer = PacketBuffer::copied_from_slice(&[1, 2, 3, 4]).unwrap();
        let slice = buffer.slice(1, 2).unwrap();

        let mut copy = slice.copy_readable().unwrap();
        copy.set_byte(0, 9).unwrap();

        assert_eq!(slice.get_byte(0).unwrap(), 2);
        assert_eq!(copy.to_vec().unwrap(), [9, 3]);

        copy.release();
        assert_eq!(slice.get_byte(0).unwrap(), 2);

        buffer.close().unwrap();
    }

    #[test]
    fn views_compare_with_buffers() {
        let buffer = PacketBuffer::copied_from_slice(b"abab").unwrap();
        let first = buffer.slice(0, 2).unwrap();
        let second = buffer.slice(2, 2).unwrap();
        let other = PacketBuffer::copied_from_slice(b"ab").unwrap();

        assert_eq!(first, second);
        assert_eq!(first, other);
        assert_eq!(other, second);
        assert_ne!(first, buffer);

        other.close().unwrap();
        buffer.close().unwrap();
    }

    #[test]
    fn debug_names_kind() {
        let buffer = PacketBuffer::copied_from_slice(b"ab").unwrap();

        let debug = format!("{:?}", buffer.duplicate());
        assert!(debug.starts_with("PacketView {"));
        assert!(debug.contains("kind: Duplicate"));

        buffer.close().unwrap();
    }
}
