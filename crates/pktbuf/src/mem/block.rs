// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::alloc::{Layout, alloc_zeroed, dealloc, handle_alloc_error, realloc};
use std::num::NonZero;
use std::ptr::{self, NonNull};

use crate::{Error, Result};

/// A zero-initialized byte array obtained from the Rust global allocator.
///
/// The block exclusively owns its memory and returns it to the allocator when dropped.
#[derive(Debug)]
pub(crate) struct RawBlock {
    ptr: NonNull<u8>,
    len: NonZero<usize>,
    layout: Layout,
}

// SAFETY: The block exclusively owns its memory, so moving it to another thread moves the
// memory along with it.
unsafe impl Send for RawBlock {}

impl RawBlock {
    /// # Errors
    ///
    /// Returns [`Error::IllegalArgument`] if `len` exceeds the maximum allocation size.
    pub(crate) fn allocate(len: NonZero<usize>) -> Result<Self> {
        let layout = byte_array_layout(len)?;

        // SAFETY: The layout has a non-zero size.
        let ptr = NonNull::new(unsafe { alloc_zeroed(layout) }).unwrap_or_else(|| handle_alloc_error(layout));

        Ok(Self { ptr, len, layout })
    }

    pub(crate) const fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    pub(crate) const fn len(&self) -> NonZero<usize> {
        self.len
    }

    pub(crate) fn address(&self) -> usize {
        self.ptr.addr().get()
    }

    /// Moves the memory into a block of `new_len` bytes, preserving the common prefix.
    ///
    /// Bytes beyond the old length are zero-initialized. An oversized `new_len` leaves the
    /// block untouched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalArgument`] if `new_len` exceeds the maximum allocation size.
    #[cfg_attr(test, mutants::skip)] // Mutations can violate memory safety and cause UB.
    pub(crate) fn resize(&mut self, new_len: NonZero<usize>) -> Result<()> {
        let old_len = self.len;
        let new_layout = byte_array_layout(new_len)?;

        // SAFETY: The pointer was allocated by the global allocator with the stored layout and
        // the new size is non-zero and fits the layout constraints.
        let new_ptr = unsafe { realloc(self.ptr.as_ptr(), self.layout, new_len.get()) };
        let new_ptr = NonNull::new(new_ptr).unwrap_or_else(|| handle_alloc_error(new_layout));

        if new_len > old_len {
            // SAFETY: The old length is within the new allocation.
            let tail = unsafe { new_ptr.as_ptr().add(old_len.get()) };

            // SAFETY: The tail lies within the new allocation and is valid for writes.
            unsafe { ptr::write_bytes(tail, 0, new_len.get() - old_len.get()) };
        }

        self.ptr = new_ptr;
        self.len = new_len;
        self.layout = new_layout;

        Ok(())
    }
}

impl Drop for RawBlock {
    #[cfg_attr(test, mutants::skip)] // Mutations can violate memory safety and cause UB.
    fn drop(&mut self) {
        // SAFETY: Layout must match between allocation and deallocation. It does.
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

fn byte_array_layout(len: NonZero<usize>) -> Result<Layout> {
    Layout::array::<u8>(len.get()).map_err(|_| {
        Error::illegal_argument(format!(
            "a packet buffer of {len} bytes exceeds the maximum allocation size"
        ))
    })
}
