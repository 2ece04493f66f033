// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::num::NonZero;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::access::{readable_windows_equal, sealed};
use crate::access::sealed::Backing as _;
use crate::cursor::Cursor;
use crate::leak::LeakTracker;
use crate::mem::RawBlock;
use crate::view::ViewKind;
use crate::{Allocator, BufferAccess, ByteOrder, Error, PacketView, Result, TypedView, cast};

/// An owned packet buffer backed by memory outside of any Rust value.
///
/// The buffer has a fixed capacity chosen at allocation time (changeable via
/// [`set_capacity()`][Self::set_capacity]), a reader and a writer index dividing the capacity into
/// discardable, readable and writable bytes, and a byte order used by the numeric accessors of
/// [`BufferAccess`].
///
/// ```text
/// +-------------------+------------------+------------------+
/// | discardable bytes |  readable bytes  |  writable bytes  |
/// +-------------------+------------------+------------------+
/// 0          <=  reader_index  <=  writer_index   <=   capacity
/// ```
///
/// # Ownership
///
/// The buffer owns its memory. Views created via [`slice()`][Self::slice] and
/// [`duplicate()`][Self::duplicate] borrow the buffer, so the memory cannot be freed or moved
/// while any view exists. A duplicate shares ownership: releasing it releases the memory for
/// every handle.
///
/// Every buffer should be explicitly released via [`release()`][Self::release] or
/// [`close()`][Self::close]. Dropping an unreleased buffer still frees the memory but counts as a
/// leak, which the [`LeakDetector`][crate::LeakDetector] of its allocator reports.
///
/// # Thread safety
///
/// The buffer can be sent to another thread but not shared between threads.
///
/// # Example
///
/// ```
/// use pktbuf::{BufferAccess, PacketBuffer};
///
/// let mut buffer = PacketBuffer::allocate(64)?;
/// buffer.write_num(0x0800_u16)?;
/// buffer.write_bytes(b"payload")?;
///
/// let payload = buffer.slice(2, 7)?;
/// assert_eq!(payload.to_vec()?, b"payload");
///
/// assert!(buffer.release());
/// assert!(!buffer.release());
/// # Ok::<(), pktbuf::Error>(())
/// ```
pub struct PacketBuffer {
    block: Option<RawBlock>,
    capacity: usize,
    cursor: Cursor,
    byte_order: ByteOrder,

    // Set once the memory has been released through this buffer or through a duplicate.
    released: AtomicBool,

    allocator: Allocator,
    leak_tracker: Option<LeakTracker>,
}

impl PacketBuffer {
    pub(crate) fn from_block(block: RawBlock, allocator: Allocator, leak_tracker: Option<LeakTracker>) -> Self {
        Self {
            capacity: block.len().get(),
            block: Some(block),
            cursor: Cursor::default(),
            byte_order: ByteOrder::default(),
            released: AtomicBool::new(false),
            allocator,
            leak_tracker,
        }
    }

    /// Allocates a buffer of exactly `capacity` bytes from [`Allocator::global()`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalArgument`] if `capacity` is zero or exceeds the maximum allocation
    /// size.
    pub fn allocate(capacity: usize) -> Result<Self> {
        Allocator::global().allocate(capacity)
    }

    /// Allocates a buffer from [`Allocator::global()`] holding a copy of `bytes`, all of them
    /// readable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalArgument`] if `bytes` is empty.
    pub fn copied_from_slice(bytes: &[u8]) -> Result<Self> {
        Self::copied_from_slice_in(bytes, &Allocator::global())
    }

    /// Allocates a buffer from `allocator` holding a copy of `bytes`, all of them readable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalArgument`] if `bytes` is empty.
    pub fn copied_from_slice_in(bytes: &[u8], allocator: &Allocator) -> Result<Self> {
        let mut buffer = allocator.allocate(bytes.len())?;
        buffer.write_bytes(bytes)?;
        Ok(buffer)
    }

    /// The allocator this buffer came from. Copies come from the same allocator.
    #[must_use]
    pub fn allocator(&self) -> &Allocator {
        &self.allocator
    }

    /// Changes the capacity to `new_capacity` bytes.
    ///
    /// The memory moves to a new block holding the first `min(old, new)` bytes of the old one.
    /// Added bytes are zero. All indices and marks are clamped to the new capacity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalArgument`] if `new_capacity` is zero or exceeds the maximum
    /// allocation size, and [`Error::MemoryAccess`] if the memory has been released. The buffer is
    /// unchanged on error.
    pub fn set_capacity(&mut self, new_capacity: usize) -> Result<()> {
        let new_capacity =
            NonZero::new(new_capacity).ok_or_else(|| Error::illegal_argument("capacity must be greater than zero"))?;

        if self.released.load(Ordering::Acquire) {
            return Err(Error::MemoryAccess);
        }

        let block = self.block.as_mut().ok_or(Error::MemoryAccess)?;
        let old_capacity = self.capacity;

        block.resize(new_capacity)?;

        if let Some(tracker) = &self.leak_tracker {
            self.allocator
                .leak_detector()
                .relocate(tracker, block.address(), new_capacity.get());
        }

        self.capacity = new_capacity.get();
        self.cursor.clamp(self.capacity);

        tracing::event!(
            name: "pktbuf.reallocated",
            tracing::Level::DEBUG,
            buffer.old_capacity = old_capacity,
            buffer.new_capacity = self.capacity,
        );

        Ok(())
    }

    /// Releases the memory, returning `true` if this call released it.
    ///
    /// The memory is returned to the allocator immediately and the allocation is no longer
    /// tracked for leaks. Every later memory access through this buffer fails with
    /// [`Error::MemoryAccess`].
    ///
    /// Returns `false` if the memory had already been released, either through this buffer or
    /// through a duplicate.
    pub fn release(&mut self) -> bool {
        let was_released = self.released.swap(true, Ordering::AcqRel);

        // A duplicate may have released the memory already, in which case it is freed here.
        let had_memory = self.block.take().is_some();

        if let Some(tracker) = self.leak_tracker.take() {
            self.allocator.leak_detector().untrack(tracker);
        }

        !was_released && had_memory
    }

    /// Releases the memory and consumes the buffer.
    ///
    /// Closing an already released buffer is permitted and does nothing.
    ///
    /// # Errors
    ///
    /// Never fails for an owned buffer. The signature matches [`PacketView::close()`], which
    /// fails for slices.
    pub fn close(mut self) -> Result<()> {
        self.release();
        Ok(())
    }

    /// Creates a view of the same memory that shares ownership of it.
    ///
    /// The duplicate starts with a copy of the indices, marks and byte order of this buffer and
    /// moves them independently afterwards. Releasing the duplicate releases the memory for every
    /// handle.
    #[must_use]
    pub fn duplicate(&self) -> PacketView<'_> {
        PacketView::new(self, 0, self.capacity, self.cursor, self.byte_order, ViewKind::Duplicate)
    }

    /// Creates a view of `len` bytes starting at `offset`.
    ///
    /// The view aliases the memory of this buffer, has its own indices (reader 0, writer `len`)
    /// and inherits the byte order. Releasing or closing a slice never frees anything.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfBounds`] if `offset + len > capacity` and
    /// [`Error::MemoryAccess`] if the memory has been released.
    pub fn slice(&self, offset: usize, len: usize) -> Result<PacketView<'_>> {
        self.memory_base()?;
        check_window(offset, len, self.capacity)?;

        Ok(PacketView::new(self, offset, len, Cursor::filled(len), self.byte_order, ViewKind::Slice))
    }

    /// Creates a slice of the readable bytes, see [`slice()`][Self::slice].
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemoryAccess`] if the memory has been released.
    #[cfg_attr(test, mutants::skip)] // Trivial forwarder.
    pub fn slice_readable(&self) -> Result<PacketView<'_>> {
        self.slice(self.cursor.reader_index(), self.cursor.readable_bytes())
    }

    /// Overlays a typed view on the start of the buffer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalArgument`] if fewer than [`T::SIZE`][TypedView::SIZE] bytes have
    /// been written (or, for variable-size views, if the buffer is not completely written) and
    /// [`Error::Cast`] if the view rejects the bytes.
    pub fn cast<'a, T: TypedView<'a>>(&'a self) -> Result<T> {
        let len = cast::overlay_len::<T>(self.cursor.writer_index(), self.capacity)?;
        cast::wrap(self.slice(0, len)?)
    }

    /// Marks the memory released on behalf of a duplicate, returning `true` if this call did so.
    ///
    /// The block itself is freed when this buffer is released or dropped.
    pub(crate) fn mark_released(&self) -> bool {
        !self.released.swap(true, Ordering::AcqRel) && self.block.is_some()
    }
}

pub(crate) fn check_window(offset: usize, len: usize, capacity: usize) -> Result<()> {
    if offset.checked_add(len).is_none_or(|end| end > capacity) {
        Err(Error::out_of_bounds(offset, len, capacity))
    } else {
        Ok(())
    }
}

impl sealed::Backing for PacketBuffer {
    fn memory_base(&self) -> Result<NonNull<u8>> {
        if self.released.load(Ordering::Acquire) {
            return Err(Error::MemoryAccess);
        }

        self.block
            .as_ref()
            .and_then(|block| NonNull::new(block.as_ptr()))
            .ok_or(Error::MemoryAccess)
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
        &self.allocator
    }
}

impl Drop for PacketBuffer {
    fn drop(&mut self) {
        if let Some(tracker) = self.leak_tracker.take()
            && *self.released.get_mut()
        {
            // Released through a duplicate, so not a leak.
            self.allocator.leak_detector().untrack(tracker);
        }
    }
}

impl fmt::Debug for PacketBuffer {
    #[cfg_attr(test, mutants::skip)] // We have no API contract here.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketBuffer")
            .field("capacity", &self.capacity)
            .field("reader_index", &self.cursor.reader_index())
            .field("writer_index", &self.cursor.writer_index())
            .field("byte_order", &self.byte_order)
            .field("released", &self.is_released())
            .finish_non_exhaustive()
    }
}

impl PartialEq for PacketBuffer {
    fn eq(&self, other: &Self) -> bool {
        readable_windows_equal(self, other)
    }
}

impl PartialEq<PacketView<'_>> for PacketBuffer {
    fn eq(&self, other: &PacketView<'_>) -> bool {
        readable_windows_equal(self, other)
    }
}
