// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::{Error, Result};

/// The reader/writer indices of a buffer handle and their marks.
///
/// Every mutation preserves `reader_index <= writer_index <= capacity`. The capacity itself is
/// owned by the handle, so each operation that depends on it takes the capacity as a parameter.
/// An invalid mutation returns an error and leaves the cursor unchanged.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Cursor {
    reader: usize,
    writer: usize,
    marked_reader: usize,
    marked_writer: usize,
}

impl Cursor {
    /// A cursor with a readable window of `len` bytes starting at index zero.
    pub(crate) const fn filled(len: usize) -> Self {
        Self {
            reader: 0,
            writer: len,
            marked_reader: 0,
            marked_writer: 0,
        }
    }

    pub(crate) const fn reader_index(&self) -> usize {
        self.reader
    }

    pub(crate) const fn writer_index(&self) -> usize {
        self.writer
    }

    pub(crate) const fn marked_reader_index(&self) -> usize {
        self.marked_reader
    }

    pub(crate) const fn marked_writer_index(&self) -> usize {
        self.marked_writer
    }

    pub(crate) const fn readable_bytes(&self) -> usize {
        self.writer - self.reader
    }

    pub(crate) const fn writable_bytes(&self, capacity: usize) -> usize {
        capacity - self.writer
    }

    pub(crate) fn set_reader_index(&mut self, index: usize) -> Result<()> {
        if index > self.writer {
            return Err(Error::IndexOutOfBounds(format!(
                "reader index {index} exceeds writer index {}",
                self.writer
            )));
        }

        self.reader = index;
        Ok(())
    }

    pub(crate) fn set_writer_index(&mut self, index: usize, capacity: usize) -> Result<()> {
        if index < self.reader || index > capacity {
            return Err(Error::IndexOutOfBounds(format!(
                "writer index {index} is outside of {}..={capacity}",
                self.reader
            )));
        }

        self.writer = index;
        Ok(())
    }

    pub(crate) fn set_index(&mut self, reader: usize, writer: usize, capacity: usize) -> Result<()> {
        if reader > writer || writer > capacity {
            return Err(Error::IndexOutOfBounds(format!(
                "reader index {reader} and writer index {writer} violate 0 <= reader <= writer <= {capacity}"
            )));
        }

        self.reader = reader;
        self.writer = writer;
        Ok(())
    }

    pub(crate) fn clear(&mut self) {
        self.reader = 0;
        self.writer = 0;
    }

    pub(crate) fn mark_reader_index(&mut self) {
        self.marked_reader = self.reader;
    }

    pub(crate) fn reset_reader_index(&mut self) -> Result<()> {
        self.set_reader_index(self.marked_reader)
    }

    pub(crate) fn mark_writer_index(&mut self) {
        self.marked_writer = self.writer;
    }

    pub(crate) fn reset_writer_index(&mut self, capacity: usize) -> Result<()> {
        self.set_writer_index(self.marked_writer, capacity)
    }

    pub(crate) const fn is_readable(&self, len: usize) -> bool {
        len <= self.readable_bytes()
    }

    pub(crate) const fn is_writable(&self, len: usize, capacity: usize) -> bool {
        len <= self.writable_bytes(capacity)
    }

    pub(crate) fn ensure_readable(&self, len: usize) -> Result<()> {
        if self.is_readable(len) {
            Ok(())
        } else {
            Err(Error::IndexOutOfBounds(format!(
                "reader index {} with length {len} exceeds writer index {}",
                self.reader, self.writer
            )))
        }
    }

    pub(crate) fn ensure_writable(&self, len: usize, capacity: usize) -> Result<()> {
        if self.is_writable(len, capacity) {
            Ok(())
        } else {
            Err(Error::IndexOutOfBounds(format!(
                "writer index {} with length {len} exceeds capacity {capacity}",
                self.writer
            )))
        }
    }

    /// Advances the reader index by `len` after the caller validated the readable window.
    pub(crate) fn advance_reader(&mut self, len: usize) {
        debug_assert!(self.is_readable(len));
        self.reader += len;
    }

    /// Advances the writer index by `len` after the caller validated the writable window.
    pub(crate) fn advance_writer(&mut self, len: usize) {
        self.writer += len;
    }

    pub(crate) fn skip_bytes(&mut self, len: usize) -> Result<()> {
        self.ensure_readable(len)?;
        self.advance_reader(len);
        Ok(())
    }

    /// Clamps all indices and marks to a new capacity.
    pub(crate) fn clamp(&mut self, capacity: usize) {
        self.reader = self.reader.min(capacity);
        self.writer = self.writer.min(capacity);
        self.marked_reader = self.marked_reader.min(capacity);
        self.marked_writer = self.marked_writer.min(capacity);
    }

    /// Shifts every index down by the current reader index, as if the read bytes were removed.
    pub(crate) fn discard_read(&mut self) -> usize {
        let discarded = self.reader;

        self.reader = 0;
        self.writer -= discarded;
        self.marked_reader = self.marked_reader.saturating_sub(discarded);
        self.marked_writer = self.marked_writer.saturating_sub(discarded);

        discarded
    }
}
