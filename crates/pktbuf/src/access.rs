// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Accessors shared by every kind of buffer handle.

use std::ptr::{self, NonNull};
use std::slice;

use crate::{ByteOrder, Error, PacketBuffer, Primitive, Result, TextCodec};

/// The widest primitive handled by the codec.
const MAX_PRIMITIVE_SIZE: usize = 8;

pub(crate) mod sealed {
    use std::ptr::NonNull;

    use crate::cursor::Cursor;
    use crate::{Allocator, ByteOrder, Result};

    /// The state every buffer handle exposes to the shared accessors.
    pub trait Backing {
        /// Start of the memory window of the handle, or `MemoryAccess` once it has been released.
        fn memory_base(&self) -> Result<NonNull<u8>>;

        /// Remains valid after release.
        fn window_capacity(&self) -> usize;

        fn index_cursor(&self) -> &Cursor;

        fn index_cursor_mut(&mut self) -> &mut Cursor;

        fn order(&self) -> ByteOrder;

        fn set_order(&mut self, order: ByteOrder);

        fn source_allocator(&self) -> &Allocator;
    }
}

/// Bounds-checked access to the memory of a [`PacketBuffer`] or [`PacketView`][crate::PacketView].
///
/// Accessors come in two flavors:
///
/// * **Indexed** accessors (`get_*`/`set_*`) take an absolute index into the handle and validate
///   that the accessed bytes lie within the capacity. They ignore and never move the reader and
///   writer indices. Indexed writes take `&self`: several handles may alias the same memory and
///   all of them can write to it.
/// * **Relative** accessors (`read_*`/`write_*`) act at the reader or writer index and advance it.
///   Reads are limited to the readable bytes and writes to the writable bytes.
///
/// Numbers are encoded in the byte order of the handle, the `*_re` variants use the opposite
/// byte order.
///
/// Every failed operation leaves the handle unchanged. After the memory has been released, every
/// memory access and every index mutation fails with [`Error::MemoryAccess`], while the plain
/// index queries keep reporting the last known state.
///
/// This trait is sealed.
///
/// # Example
///
/// ```
/// use pktbuf::{BufferAccess, ByteOrder, PacketBuffer};
///
/// let mut buffer = PacketBuffer::allocate(8)?;
///
/// buffer.write_num(0x1234_u16)?;
/// buffer.write_num_re(0x1234_u16)?;
///
/// assert_eq!(buffer.get_byte(0)?, 0x12);
/// assert_eq!(buffer.get_byte(2)?, 0x34);
///
/// assert_eq!(buffer.read_num::<u16>()?, 0x1234);
/// assert_eq!(buffer.readable_bytes(), 2);
///
/// buffer.set_byte_order(ByteOrder::LittleEndian);
/// assert_eq!(buffer.read_num::<u16>()?, 0x1234);
/// # buffer.close()?;
/// # Ok::<(), pktbuf::Error>(())
/// ```
pub trait BufferAccess: sealed::Backing + Sized {
    /// The number of bytes the handle can address.
    #[must_use]
    fn capacity(&self) -> usize {
        self.window_capacity()
    }

    /// The index of the next byte to read.
    #[must_use]
    fn reader_index(&self) -> usize {
        self.index_cursor().reader_index()
    }

    /// The index of the next byte to write.
    #[must_use]
    fn writer_index(&self) -> usize {
        self.index_cursor().writer_index()
    }

    /// The reader index saved by [`mark_reader_index()`][Self::mark_reader_index].
    #[must_use]
    fn marked_reader_index(&self) -> usize {
        self.index_cursor().marked_reader_index()
    }

    /// The writer index saved by [`mark_writer_index()`][Self::mark_writer_index].
    #[must_use]
    fn marked_writer_index(&self) -> usize {
        self.index_cursor().marked_writer_index()
    }

    /// `writer_index - reader_index`
    #[must_use]
    fn readable_bytes(&self) -> usize {
        self.index_cursor().readable_bytes()
    }

    /// `capacity - writer_index`
    #[must_use]
    fn writable_bytes(&self) -> usize {
        self.index_cursor().writable_bytes(self.window_capacity())
    }

    /// Whether at least `len` bytes are readable.
    #[must_use]
    fn is_readable(&self, len: usize) -> bool {
        self.index_cursor().is_readable(len)
    }

    /// Whether at least `len` bytes are writable.
    #[must_use]
    fn is_writable(&self, len: usize) -> bool {
        self.index_cursor().is_writable(len, self.window_capacity())
    }

    /// Whether the memory behind the handle has been released.
    #[must_use]
    fn is_released(&self) -> bool {
        self.memory_base().is_err()
    }

    /// The byte order of the natural accessors.
    #[must_use]
    fn byte_order(&self) -> ByteOrder {
        self.order()
    }

    /// Changes the byte order of the natural accessors of this handle.
    ///
    /// Handles derived from this one afterwards inherit the new byte order. Existing handles keep
    /// their own.
    fn set_byte_order(&mut self, order: ByteOrder) {
        self.set_order(order);
    }

    /// # Errors
    ///
    /// [`Error::IndexOutOfBounds`] if `index > writer_index`.
    fn set_reader_index(&mut self, index: usize) -> Result<()> {
        self.memory_base()?;
        self.index_cursor_mut().set_reader_index(index)
    }

    /// # Errors
    ///
    /// [`Error::IndexOutOfBounds`] unless `reader_index <= index <= capacity`.
    fn set_writer_index(&mut self, index: usize) -> Result<()> {
        self.memory_base()?;
        let capacity = self.window_capacity();
        self.index_cursor_mut().set_writer_index(index, capacity)
    }

    /// Sets both indices at once, which allows moving the window in either direction.
    ///
    /// # Errors
    ///
    /// [`Error::IndexOutOfBounds`] unless `reader <= writer <= capacity`. Neither index is changed
    /// on failure.
    fn set_index(&mut self, reader: usize, writer: usize) -> Result<()> {
        self.memory_base()?;
        let capacity = self.window_capacity();
        self.index_cursor_mut().set_index(reader, writer, capacity)
    }

    /// Sets both indices to zero. Neither the capacity nor the content change.
    ///
    /// # Errors
    ///
    /// [`Error::MemoryAccess`] if the memory has been released.
    fn clear(&mut self) -> Result<()> {
        self.memory_base()?;
        self.index_cursor_mut().clear();
        Ok(())
    }

    /// Saves the current reader index.
    ///
    /// # Errors
    ///
    /// [`Error::MemoryAccess`] if the memory has been released.
    fn mark_reader_index(&mut self) -> Result<()> {
        self.memory_base()?;
        self.index_cursor_mut().mark_reader_index();
        Ok(())
    }

    /// Restores the reader index saved by [`mark_reader_index()`][Self::mark_reader_index].
    ///
    /// # Errors
    ///
    /// [`Error::IndexOutOfBounds`] if the mark lies beyond the current writer index.
    fn reset_reader_index(&mut self) -> Result<()> {
        self.memory_base()?;
        self.index_cursor_mut().reset_reader_index()
    }

    /// Saves the current writer index.
    ///
    /// # Errors
    ///
    /// [`Error::MemoryAccess`] if the memory has been released.
    fn mark_writer_index(&mut self) -> Result<()> {
        self.memory_base()?;
        self.index_cursor_mut().mark_writer_index();
        Ok(())
    }

    /// Restores the writer index saved by [`mark_writer_index()`][Self::mark_writer_index].
    ///
    /// # Errors
    ///
    /// [`Error::IndexOutOfBounds`] if the mark lies before the current reader index.
    fn reset_writer_index(&mut self) -> Result<()> {
        self.memory_base()?;
        let capacity = self.window_capacity();
        self.index_cursor_mut().reset_writer_index(capacity)
    }

    /// Verifies that `len` more bytes can be written. The buffer never grows.
    ///
    /// # Errors
    ///
    /// [`Error::IndexOutOfBounds`] if `writer_index + len > capacity`.
    fn ensure_writable(&self, len: usize) -> Result<()> {
        self.memory_base()?;
        self.index_cursor().ensure_writable(len, self.window_capacity())
    }

    /// Advances the reader index by `len` without reading.
    ///
    /// # Errors
    ///
    /// [`Error::IndexOutOfBounds`] if fewer than `len` bytes are readable.
    fn skip_bytes(&mut self, len: usize) -> Result<()> {
        self.memory_base()?;
        self.index_cursor_mut().skip_bytes(len)
    }

    /// Moves the readable bytes to the start of the handle and shifts all indices and marks down
    /// by the old reader index.
    ///
    /// # Errors
    ///
    /// [`Error::MemoryAccess`] if the memory has been released.
    fn discard_read_bytes(&mut self) -> Result<()> {
        let base = self.memory_base()?;
        let reader = self.reader_index();

        if reader > 0 {
            let readable = self.readable_bytes();

            // SAFETY: The reader index lies within the capacity of the handle.
            let src = unsafe { base.add(reader) };

            // SAFETY: Both windows lie within the handle. They may overlap, which `copy` permits.
            unsafe { ptr::copy(src.as_ptr(), base.as_ptr(), readable) };
        }

        self.index_cursor_mut().discard_read();
        Ok(())
    }

    /// Reads a number at `index` in the byte order of the handle.
    ///
    /// # Errors
    ///
    /// [`Error::IndexOutOfBounds`] if `index + size_of::<T>() > capacity`.
    fn get_num<T: Primitive>(&self, index: usize) -> Result<T> {
        load(self, index, self.order())
    }

    /// Writes a number at `index` in the byte order of the handle.
    ///
    /// # Errors
    ///
    /// [`Error::IndexOutOfBounds`] if `index + size_of::<T>() > capacity`.
    fn set_num<T: Primitive>(&self, index: usize, value: T) -> Result<()> {
        store(self, index, value, self.order())
    }

    /// Reads a number at `index` in the opposite of the byte order of the handle.
    ///
    /// # Errors
    ///
    /// [`Error::IndexOutOfBounds`] if `index + size_of::<T>() > capacity`.
    fn get_num_re<T: Primitive>(&self, index: usize) -> Result<T> {
        load(self, index, self.order().reversed())
    }

    /// Writes a number at `index` in the opposite of the byte order of the handle.
    ///
    /// # Errors
    ///
    /// [`Error::IndexOutOfBounds`] if `index + size_of::<T>() > capacity`.
    fn set_num_re<T: Primitive>(&self, index: usize, value: T) -> Result<()> {
        store(self, index, value, self.order().reversed())
    }

    /// # Errors
    ///
    /// [`Error::IndexOutOfBounds`] if `index >= capacity`.
    #[cfg_attr(test, mutants::skip)] // Trivial forwarder.
    fn get_byte(&self, index: usize) -> Result<u8> {
        self.get_num(index)
    }

    /// # Errors
    ///
    /// [`Error::IndexOutOfBounds`] if `index >= capacity`.
    #[cfg_attr(test, mutants::skip)] // Trivial forwarder.
    fn set_byte(&self, index: usize, value: u8) -> Result<()> {
        self.set_num(index, value)
    }

    /// Reads the byte at `index` as a boolean. Any non-zero byte is `true`.
    ///
    /// # Errors
    ///
    /// [`Error::IndexOutOfBounds`] if `index >= capacity`.
    fn get_bool(&self, index: usize) -> Result<bool> {
        Ok(self.get_byte(index)? != 0)
    }

    /// Writes a boolean as the byte `1` or `0` at `index`.
    ///
    /// # Errors
    ///
    /// [`Error::IndexOutOfBounds`] if `index >= capacity`.
    fn set_bool(&self, index: usize, value: bool) -> Result<()> {
        self.set_byte(index, u8::from(value))
    }

    /// Fills `dst` with the bytes starting at `index`.
    ///
    /// # Errors
    ///
    /// [`Error::IndexOutOfBounds`] if `index + dst.len() > capacity`.
    fn get_bytes(&self, index: usize, dst: &mut [u8]) -> Result<()> {
        let src = window(self, index, dst.len())?;

        // SAFETY: The window is valid for reads of `dst.len()` bytes and `dst` is a distinct
        // exclusive borrow, so the two cannot overlap.
        unsafe { ptr::copy_nonoverlapping(src.as_ptr(), dst.as_mut_ptr(), dst.len()) };
        Ok(())
    }

    /// Copies `src` to the bytes starting at `index`.
    ///
    /// # Errors
    ///
    /// [`Error::IndexOutOfBounds`] if `index + src.len() > capacity`.
    fn set_bytes(&self, index: usize, src: &[u8]) -> Result<()> {
        let dst = window(self, index, src.len())?;

        // SAFETY: The window is valid for writes of `src.len()` bytes. The source may be a
        // temporary copy of the same memory, which `copy` permits.
        unsafe { ptr::copy(src.as_ptr(), dst.as_ptr(), src.len()) };
        Ok(())
    }

    /// Copies `len` bytes starting at `index` into `dst` starting at `dst_index`.
    ///
    /// Neither handle's indices change. Both handles may alias the same memory, in which case the
    /// copy behaves as if the source bytes were first copied to a temporary buffer.
    ///
    /// # Errors
    ///
    /// [`Error::IndexOutOfBounds`] if either window exceeds the capacity of its handle.
    fn get_bytes_to<B: BufferAccess>(&self, index: usize, dst: &B, dst_index: usize, len: usize) -> Result<()> {
        let src = window(self, index, len)?;
        let dst = window(dst, dst_index, len)?;

        // SAFETY: Both windows are valid for `len` bytes. They may overlap, which `copy` permits.
        unsafe { ptr::copy(src.as_ptr(), dst.as_ptr(), len) };
        Ok(())
    }

    /// Copies `len` bytes of `src` starting at `src_index` to this handle starting at `index`.
    ///
    /// # Errors
    ///
    /// [`Error::IndexOutOfBounds`] if either window exceeds the capacity of its handle.
    #[cfg_attr(test, mutants::skip)] // Trivial forwarder.
    fn set_bytes_from<B: BufferAccess>(&self, index: usize, src: &B, src_index: usize, len: usize) -> Result<()> {
        src.get_bytes_to(src_index, self, index, len)
    }

    /// Sets `len` bytes starting at `index` to zero.
    ///
    /// # Errors
    ///
    /// [`Error::IndexOutOfBounds`] if `index + len > capacity`.
    fn set_zero(&self, index: usize, len: usize) -> Result<()> {
        let dst = window(self, index, len)?;

        // SAFETY: The window is valid for writes of `len` bytes.
        unsafe { ptr::write_bytes(dst.as_ptr(), 0, len) };
        Ok(())
    }

    /// Finds the first occurrence of `value` between `from` (inclusive) and `to` (exclusive).
    ///
    /// If `from > to`, the range is searched backwards, starting at `from - 1` down to `to`.
    ///
    /// # Errors
    ///
    /// [`Error::IndexOutOfBounds`] if either bound exceeds the capacity.
    fn index_of(&self, from: usize, to: usize, value: u8) -> Result<Option<usize>> {
        let start = from.min(to);
        let len = from.max(to) - start;
        let src = window(self, start, len)?;

        // SAFETY: The window is valid for reads of `len` bytes and nothing writes to it while
        // the slice lives.
        let haystack = unsafe { slice::from_raw_parts(src.as_ptr(), len) };

        let position = if from <= to {
            haystack.iter().position(|b| *b == value)
        } else {
            haystack.iter().rposition(|b| *b == value)
        };

        Ok(position.map(|p| p + start))
    }

    /// Decodes `len` bytes starting at `index` as text.
    ///
    /// # Errors
    ///
    /// [`Error::IndexOutOfBounds`] if `index + len > capacity` and [`Error::Codec`] if the codec
    /// rejects the bytes.
    fn get_char_sequence(&self, index: usize, len: usize, codec: &dyn TextCodec) -> Result<String> {
        let mut bytes = vec![0; len];
        self.get_bytes(index, &mut bytes)?;

        codec.decode(&bytes).map_err(|source| Error::Codec {
            codec: codec.name().to_string(),
            source,
        })
    }

    /// Encodes `text` and writes it starting at `index`, returning the number of bytes written.
    ///
    /// # Errors
    ///
    /// [`Error::Codec`] if the codec cannot encode the text and [`Error::IndexOutOfBounds`] if
    /// the encoded bytes do not fit.
    fn set_char_sequence(&self, index: usize, text: &str, codec: &dyn TextCodec) -> Result<usize> {
        let bytes = encode(text, codec)?;
        self.set_bytes(index, &bytes)?;
        Ok(bytes.len())
    }

    /// Reads a number at the reader index in the byte order of the handle.
    ///
    /// # Errors
    ///
    /// [`Error::IndexOutOfBounds`] if fewer than `size_of::<T>()` bytes are readable.
    fn read_num<T: Primitive>(&mut self) -> Result<T> {
        let value = self.get_num(readable_at(self, T::SIZE)?)?;
        self.index_cursor_mut().advance_reader(T::SIZE);
        Ok(value)
    }

    /// Writes a number at the writer index in the byte order of the handle.
    ///
    /// # Errors
    ///
    /// [`Error::IndexOutOfBounds`] if fewer than `size_of::<T>()` bytes are writable.
    fn write_num<T: Primitive>(&mut self, value: T) -> Result<()> {
        self.set_num(writable_at(self, T::SIZE)?, value)?;
        self.index_cursor_mut().advance_writer(T::SIZE);
        Ok(())
    }

    /// Reads a number at the reader index in the opposite of the byte order of the handle.
    ///
    /// # Errors
    ///
    /// [`Error::IndexOutOfBounds`] if fewer than `size_of::<T>()` bytes are readable.
    fn read_num_re<T: Primitive>(&mut self) -> Result<T> {
        let value = self.get_num_re(readable_at(self, T::SIZE)?)?;
        self.index_cursor_mut().advance_reader(T::SIZE);
        Ok(value)
    }

    /// Writes a number at the writer index in the opposite of the byte order of the handle.
    ///
    /// # Errors
    ///
    /// [`Error::IndexOutOfBounds`] if fewer than `size_of::<T>()` bytes are writable.
    fn write_num_re<T: Primitive>(&mut self, value: T) -> Result<()> {
        self.set_num_re(writable_at(self, T::SIZE)?, value)?;
        self.index_cursor_mut().advance_writer(T::SIZE);
        Ok(())
    }

    /// # Errors
    ///
    /// [`Error::IndexOutOfBounds`] if no byte is readable.
    #[cfg_attr(test, mutants::skip)] // Trivial forwarder.
    fn read_byte(&mut self) -> Result<u8> {
        self.read_num()
    }

    /// # Errors
    ///
    /// [`Error::IndexOutOfBounds`] if no byte is writable.
    #[cfg_attr(test, mutants::skip)] // Trivial forwarder.
    fn write_byte(&mut self, value: u8) -> Result<()> {
        self.write_num(value)
    }

    /// # Errors
    ///
    /// [`Error::IndexOutOfBounds`] if no byte is readable.
    fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_byte()? != 0)
    }

    /// # Errors
    ///
    /// [`Error::IndexOutOfBounds`] if no byte is writable.
    fn write_bool(&mut self, value: bool) -> Result<()> {
        self.write_byte(u8::from(value))
    }

    /// Fills `dst` with readable bytes.
    ///
    /// # Errors
    ///
    /// [`Error::IndexOutOfBounds`] if fewer than `dst.len()` bytes are readable.
    fn read_bytes(&mut self, dst: &mut [u8]) -> Result<()> {
        self.get_bytes(readable_at(self, dst.len())?, dst)?;
        self.index_cursor_mut().advance_reader(dst.len());
        Ok(())
    }

    /// Appends `src` at the writer index.
    ///
    /// # Errors
    ///
    /// [`Error::IndexOutOfBounds`] if fewer than `src.len()` bytes are writable.
    fn write_bytes(&mut self, src: &[u8]) -> Result<()> {
        self.set_bytes(writable_at(self, src.len())?, src)?;
        self.index_cursor_mut().advance_writer(src.len());
        Ok(())
    }

    /// Transfers `len` readable bytes of this handle to the writable bytes of `dst`, advancing the
    /// reader index of this handle and the writer index of `dst`.
    ///
    /// # Errors
    ///
    /// [`Error::IndexOutOfBounds`] if this handle has fewer than `len` readable bytes or `dst` has
    /// fewer than `len` writable bytes.
    fn read_bytes_to<B: BufferAccess>(&mut self, dst: &mut B, len: usize) -> Result<()> {
        let src_index = readable_at(self, len)?;
        let dst_index = writable_at(dst, len)?;

        self.get_bytes_to(src_index, dst, dst_index, len)?;

        self.index_cursor_mut().advance_reader(len);
        dst.index_cursor_mut().advance_writer(len);
        Ok(())
    }

    /// Transfers `len` readable bytes of `src` to the writable bytes of this handle, advancing the
    /// reader index of `src` and the writer index of this handle.
    ///
    /// # Errors
    ///
    /// [`Error::IndexOutOfBounds`] if `src` has fewer than `len` readable bytes or this handle has
    /// fewer than `len` writable bytes.
    #[cfg_attr(test, mutants::skip)] // Trivial forwarder.
    fn write_bytes_from<B: BufferAccess>(&mut self, src: &mut B, len: usize) -> Result<()> {
        src.read_bytes_to(self, len)
    }

    /// Appends `len` zero bytes at the writer index.
    ///
    /// # Errors
    ///
    /// [`Error::IndexOutOfBounds`] if fewer than `len` bytes are writable.
    fn write_zero(&mut self, len: usize) -> Result<()> {
        self.set_zero(writable_at(self, len)?, len)?;
        self.index_cursor_mut().advance_writer(len);
        Ok(())
    }

    /// Decodes `len` readable bytes as text.
    ///
    /// # Errors
    ///
    /// [`Error::IndexOutOfBounds`] if fewer than `len` bytes are readable and [`Error::Codec`] if
    /// the codec rejects the bytes. The reader index only advances on success.
    fn read_char_sequence(&mut self, len: usize, codec: &dyn TextCodec) -> Result<String> {
        let text = self.get_char_sequence(readable_at(self, len)?, len, codec)?;
        self.index_cursor_mut().advance_reader(len);
        Ok(text)
    }

    /// Encodes `text` and appends it at the writer index, returning the number of bytes written.
    ///
    /// # Errors
    ///
    /// [`Error::Codec`] if the codec cannot encode the text and [`Error::IndexOutOfBounds`] if
    /// the encoded bytes do not fit.
    fn write_char_sequence(&mut self, text: &str, codec: &dyn TextCodec) -> Result<usize> {
        let bytes = encode(text, codec)?;
        self.write_bytes(&bytes)?;
        Ok(bytes.len())
    }

    /// Copies the readable bytes into a new vector without moving the reader index.
    ///
    /// # Errors
    ///
    /// [`Error::MemoryAccess`] if the memory has been released.
    fn to_vec(&self) -> Result<Vec<u8>> {
        let mut bytes = vec![0; self.readable_bytes()];
        self.get_bytes(self.reader_index(), &mut bytes)?;
        Ok(bytes)
    }

    /// Copies `len` bytes starting at `offset` into a new owned buffer.
    ///
    /// The copy comes from the same [`Allocator`][crate::Allocator], has the same byte order and its writer index
    /// is `len`. It is fully independent of this handle.
    ///
    /// # Errors
    ///
    /// [`Error::MemoryAccess`] if the memory has been released, [`Error::IllegalArgument`] if
    /// `len` is zero and [`Error::IndexOutOfBounds`] if `offset + len > capacity`.
    fn copy(&self, offset: usize, len: usize) -> Result<PacketBuffer> {
        self.memory_base()?;

        if len == 0 {
            return Err(Error::illegal_argument("cannot copy zero bytes"));
        }

        window(self, offset, len)?;

        let mut copy = self.source_allocator().allocate(len)?;
        copy.set_byte_order(self.order());
        copy.set_bytes_from(0, self, offset, len)?;
        copy.set_writer_index(len)?;

        Ok(copy)
    }

    /// Copies the readable bytes into a new owned buffer, see [`copy()`][Self::copy].
    ///
    /// # Errors
    ///
    /// [`Error::IllegalArgument`] if no bytes are readable.
    #[cfg_attr(test, mutants::skip)] // Trivial forwarder.
    fn copy_readable(&self) -> Result<PacketBuffer> {
        self.copy(self.reader_index(), self.readable_bytes())
    }
}

/// Resolves a window of `len` bytes at `index`, checking for release before bounds.
fn window<B: sealed::Backing + ?Sized>(handle: &B, index: usize, len: usize) -> Result<NonNull<u8>> {
    let base = handle.memory_base()?;
    let capacity = handle.window_capacity();

    if index.checked_add(len).is_none_or(|end| end > capacity) {
        return Err(Error::out_of_bounds(index, len, capacity));
    }

    // SAFETY: `index <= capacity`, so the result is at most one past the end of the memory.
    Ok(unsafe { base.add(index) })
}

/// The reader index, if `len` bytes are readable.
fn readable_at<B: sealed::Backing + ?Sized>(handle: &B, len: usize) -> Result<usize> {
    handle.memory_base()?;
    let cursor = handle.index_cursor();
    cursor.ensure_readable(len)?;
    Ok(cursor.reader_index())
}

/// The writer index, if `len` bytes are writable.
fn writable_at<B: sealed::Backing + ?Sized>(handle: &B, len: usize) -> Result<usize> {
    handle.memory_base()?;
    let cursor = handle.index_cursor();
    cursor.ensure_writable(len, handle.window_capacity())?;
    Ok(cursor.writer_index())
}

fn load<T: Primitive, B: sealed::Backing + ?Sized>(handle: &B, index: usize, order: ByteOrder) -> Result<T> {
    let src = window(handle, index, T::SIZE)?;
    let mut raw = [0_u8; MAX_PRIMITIVE_SIZE];

    // SAFETY: The window is valid for reads of `T::SIZE <= MAX_PRIMITIVE_SIZE` bytes.
    unsafe { ptr::copy_nonoverlapping(src.as_ptr(), raw.as_mut_ptr(), T::SIZE) };

    Ok(T::decode(&raw, order))
}

fn store<T: Primitive, B: sealed::Backing + ?Sized>(handle: &B, index: usize, value: T, order: ByteOrder) -> Result<()> {
    let dst = window(handle, index, T::SIZE)?;
    let mut raw = [0_u8; MAX_PRIMITIVE_SIZE];
    value.encode(order, &mut raw);

    // SAFETY: The window is valid for writes of `T::SIZE <= MAX_PRIMITIVE_SIZE` bytes.
    unsafe { ptr::copy_nonoverlapping(raw.as_ptr(), dst.as_ptr(), T::SIZE) };

    Ok(())
}

fn encode(text: &str, codec: &dyn TextCodec) -> Result<Vec<u8>> {
    codec.encode(text).map_err(|source| Error::Codec {
        codec: codec.name().to_string(),
        source,
    })
}

/// Equality of the readable windows of two handles.
///
/// Empty windows are never equal and neither are released handles.
pub(crate) fn readable_windows_equal<A, B>(a: &A, b: &B) -> bool
where
    A: sealed::Backing + ?Sized,
    B: sealed::Backing + ?Sized,
{
    let len = a.index_cursor().readable_bytes();

    if len == 0 || len != b.index_cursor().readable_bytes() {
        return false;
    }

    let (Ok(a_start), Ok(b_start)) = (
        window(a, a.index_cursor().reader_index(), len),
        window(b, b.index_cursor().reader_index(), len),
    ) else {
        return false;
    };

    // SAFETY: Both windows are valid for reads of `len` bytes and nothing writes to them while
    // the slices live.
    let a_bytes = unsafe { slice::from_raw_parts(a_start.as_ptr(), len) };
    // SAFETY: As above.
    let b_bytes = unsafe { slice::from_raw_parts(b_start.as_ptr(), len) };

    a_bytes == b_bytes
}

impl<T: sealed::Backing> BufferAccess for T {}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{Allocator, ErrorKind, LeakDetectionConfig, LeakDetector, Utf8};

    fn allocator() -> Allocator {
        Allocator::with_leak_detector(Arc::new(LeakDetector::new(LeakDetectionConfig::disabled().with_enabled(true))))
    }

    fn filled(bytes: &[u8]) -> PacketBuffer {
        let mut buffer = allocator().allocate(bytes.len()).unwrap();
        buffer.write_bytes(bytes).unwrap();
        buffer
    }

    #[test]
    fn indexed_access_ignores_cursor() {
        let buffer = allocator().allocate(8).unwrap();

        buffer.set_num(4, 0xDEAD_BEEF_u32).unwrap();

        assert_eq!(buffer.get_num::<u32>(4).unwrap(), 0xDEAD_BEEF);
        assert_eq!(buffer.reader_index(), 0);
        assert_eq!(buffer.writer_index(), 0);
    }

    #[test]
    fn indexed_access_is_bounded_by_capacity() {
        let buffer = allocator().allocate(8).unwrap();

        assert_eq!(buffer.get_num::<u32>(5).unwrap_err().kind(), ErrorKind::IndexOutOfBounds);
        assert_eq!(buffer.set_num(7, 1_u16).unwrap_err().kind(), ErrorKind::IndexOutOfBounds);
        assert_eq!(buffer.get_byte(usize::MAX).unwrap_err().kind(), ErrorKind::IndexOutOfBounds);

        buffer.set_num(0, u64::MAX).unwrap();
    }

    #[test]
    fn reversed_accessors_use_opposite_order() {
        let buffer = allocator().allocate(4).unwrap();

        buffer.set_num_re(0, 0x0102_0304_i32).unwrap();

        assert_eq!(buffer.get_byte(0).unwrap(), 0x04);
        assert_eq!(buffer.get_num::<i32>(0).unwrap(), 0x0403_0201);
        assert_eq!(buffer.get_num_re::<i32>(0).unwrap(), 0x0102_0304);
    }

    #[test]
    fn unsigned_values_use_full_range() {
        let buffer = allocator().allocate(8).unwrap();

        buffer.set_num(0, u32::MAX).unwrap();
        buffer.set_num(4, 0xFFFF_u16).unwrap();

        assert_eq!(buffer.get_num::<u32>(0).unwrap(), u32::MAX);
        assert_eq!(buffer.get_num::<u16>(4).unwrap(), 0xFFFF);
        assert_eq!(buffer.get_num::<i16>(4).unwrap(), -1);
    }

    #[test]
    fn bool_accepts_any_nonzero() {
        let buffer = allocator().allocate(2).unwrap();

        buffer.set_byte(0, 0x80).unwrap();
        buffer.set_bool(1, true).unwrap();

        assert!(buffer.get_bool(0).unwrap());
        assert_eq!(buffer.get_byte(1).unwrap(), 1);

        buffer.set_bool(1, false).unwrap();
        assert!(!buffer.get_bool(1).unwrap());
    }

    #[test]
    fn relative_reads_stop_at_writer() {
        let mut buffer = filled(&[1, 2, 3]);

        assert_eq!(buffer.read_num::<u16>().unwrap(), 0x0102);

        let error = buffer.read_num::<u16>().unwrap_err();
        assert_eq!(error.kind(), ErrorKind::IndexOutOfBounds);
        assert_eq!(buffer.reader_index(), 2);

        assert_eq!(buffer.read_byte().unwrap(), 3);
    }

    #[test]
    fn relative_writes_stop_at_capacity() {
        let mut buffer = allocator().allocate(3).unwrap();

        buffer.write_num(0x0102_u16).unwrap();

        assert!(buffer.write_num(1_u16).is_err());
        assert_eq!(buffer.writer_index(), 2);

        buffer.write_bool(true).unwrap();
        assert_eq!(buffer.to_vec().unwrap(), [1, 2, 1]);
    }

    #[test]
    fn bulk_copies_between_handles() {
        let src = filled(&[1, 2, 3, 4, 5]);
        let dst = allocator().allocate(8).unwrap();

        src.get_bytes_to(1, &dst, 4, 3).unwrap();

        let mut out = [0; 8];
        dst.get_bytes(0, &mut out).unwrap();
        assert_eq!(out, [0, 0, 0, 0, 2, 3, 4, 0]);

        assert!(src.get_bytes_to(3, &dst, 0, 3).is_err());
        assert!(src.get_bytes_to(0, &dst, 6, 3).is_err());
    }

    #[test]
    fn overlapping_copy_within_one_buffer() {
        let buffer = filled(&[1, 2, 3, 4, 5, 6]);

        buffer.get_bytes_to(0, &buffer, 2, 4).unwrap();

        assert_eq!(buffer.to_vec().unwrap(), [1, 2, 1, 2, 3, 4]);
    }

    #[test]
    fn transfer_advances_both_handles() {
        let mut src = filled(&[9, 8, 7, 6]);
        let mut dst = allocator().allocate(3).unwrap();

        src.read_bytes_to(&mut dst, 3).unwrap();

        assert_eq!(src.reader_index(), 3);
        assert_eq!(dst.writer_index(), 3);
        assert_eq!(dst.to_vec().unwrap(), [9, 8, 7]);

        let error = dst.write_bytes_from(&mut src, 1).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::IndexOutOfBounds);
        assert_eq!(src.reader_index(), 3);
    }

    #[test]
    fn zero_fill() {
        let mut buffer = filled(&[0xFF; 4]);

        buffer.set_zero(1, 2).unwrap();
        assert_eq!(buffer.to_vec().unwrap(), [0xFF, 0, 0, 0xFF]);

        buffer.clear().unwrap();
        buffer.write_zero(4).unwrap();
        assert_eq!(buffer.to_vec().unwrap(), [0; 4]);
        assert!(buffer.write_zero(1).is_err());
    }

    #[test]
    fn index_of_searches_both_directions() {
        let buffer = filled(&[1, 2, 3, 2, 1]);

        assert_eq!(buffer.index_of(0, 5, 2).unwrap(), Some(1));
        assert_eq!(buffer.index_of(5, 0, 2).unwrap(), Some(3));
        assert_eq!(buffer.index_of(2, 3, 1).unwrap(), None);
        assert_eq!(buffer.index_of(0, 6, 1).unwrap_err().kind(), ErrorKind::IndexOutOfBounds);
    }

    #[test]
    fn discard_read_bytes_compacts() {
        let mut buffer = filled(&[1, 2, 3, 4]);
        buffer.skip_bytes(3).unwrap();

        buffer.discard_read_bytes().unwrap();

        assert_eq!(buffer.reader_index(), 0);
        assert_eq!(buffer.writer_index(), 1);
        assert_eq!(buffer.get_byte(0).unwrap(), 4);
        assert_eq!(buffer.writable_bytes(), 3);
    }

    #[test]
    fn char_sequences_round_trip_through_codec() {
        let mut buffer = allocator().allocate(16).unwrap();

        let written = buffer.write_char_sequence("héllo", &Utf8).unwrap();
        assert_eq!(written, 6);

        assert_eq!(buffer.get_char_sequence(0, 6, &Utf8).unwrap(), "héllo");
        assert_eq!(buffer.read_char_sequence(6, &Utf8).unwrap(), "héllo");
        assert_eq!(buffer.reader_index(), 6);
    }

    #[test]
    fn codec_failure_leaves_reader_unchanged() {
        let mut buffer = filled(&[0xFF, 0xFE]);

        let error = buffer.read_char_sequence(2, &Utf8).unwrap_err();

        assert_eq!(error.kind(), ErrorKind::IllegalArgument);
        assert!(matches!(error, Error::Codec { ref codec, .. } if codec == "UTF-8"));
        assert_eq!(buffer.reader_index(), 0);
    }

    #[test]
    fn oversized_text_is_rejected() {
        let buffer = allocator().allocate(2).unwrap();

        let error = buffer.set_char_sequence(0, "abc", &Utf8).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::IndexOutOfBounds);
    }

    #[test]
    fn copy_keeps_order_and_allocator() {
        let mut buffer = filled(&[1, 2, 3, 4]);
        buffer.set_byte_order(ByteOrder::LittleEndian);

        let copy = buffer.copy(1, 2).unwrap();

        assert_eq!(copy.capacity(), 2);
        assert_eq!(copy.writer_index(), 2);
        assert_eq!(copy.byte_order(), ByteOrder::LittleEndian);
        assert_eq!(copy.get_num::<u16>(0).unwrap(), 0x0302);
        assert!(Arc::ptr_eq(copy.allocator().leak_detector(), buffer.allocator().leak_detector()));

        assert_eq!(buffer.copy(0, 0).unwrap_err().kind(), ErrorKind::IllegalArgument);
        assert_eq!(buffer.copy(3, 2).unwrap_err().kind(), ErrorKind::IndexOutOfBounds);
    }

    #[test]
    fn empty_readable_copy_is_rejected() {
        let mut buffer = filled(&[1]);
        buffer.skip_bytes(1).unwrap();

        assert_eq!(buffer.copy_readable().unwrap_err().kind(), ErrorKind::IllegalArgument);
    }

    #[test]
    fn readable_window_equality() {
        let a = filled(&[1, 2, 3]);
        let mut b = filled(&[0, 1, 2, 3]);
        b.skip_bytes(1).unwrap();

        assert!(readable_windows_equal(&a, &b));

        b.set_byte(3, 9).unwrap();
        assert!(!readable_windows_equal(&a, &b));
    }

    #[test]
    fn empty_windows_are_never_equal() {
        let a = allocator().allocate(1).unwrap();
        let b = allocator().allocate(1).unwrap();

        assert!(!readable_windows_equal(&a, &b));
        assert!(!readable_windows_equal(&a, &a));
    }
}
