// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Compatibility with types from the `bytes` package.

use bytes::Bytes;
use nm::Event;

use crate::{BufferAccess, PacketBuffer, PacketView, Result};

impl PacketBuffer {
    /// Returns a `bytes::Bytes` holding a copy of the readable bytes.
    ///
    /// The reader index does not move.
    ///
    /// # Example
    ///
    /// ```
    /// use bytes::Buf;
    /// use pktbuf::PacketBuffer;
    ///
    /// let buffer = PacketBuffer::copied_from_slice(b"\x12\x34\x56\x78")?;
    ///
    /// let mut bytes = buffer.to_bytes()?;
    /// assert_eq!(bytes.get_u16(), 0x1234);
    /// assert_eq!(bytes.get_u16(), 0x5678);
    /// # buffer.close()?;
    /// # Ok::<(), pktbuf::Error>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemoryAccess`][crate::Error::MemoryAccess] if the memory has been released.
    pub fn to_bytes(&self) -> Result<Bytes> {
        copy_to_bytes(self)
    }
}

impl PacketView<'_> {
    /// Returns a `bytes::Bytes` holding a copy of the readable bytes of the view.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemoryAccess`][crate::Error::MemoryAccess] if the memory has been released.
    pub fn to_bytes(&self) -> Result<Bytes> {
        copy_to_bytes(self)
    }
}

// Packet memory can be released while a `Bytes` still exists, so the data is always copied.
fn copy_to_bytes<B: BufferAccess>(handle: &B) -> Result<Bytes> {
    let bytes = Bytes::from(handle.to_vec()?);

    TO_BYTES_COPIED.with(|x| x.observe(bytes.len()));

    Ok(bytes)
}

thread_local! {
    static TO_BYTES_COPIED: Event = Event::builder()
        .name("pktbuf_to_bytes_copied")
        .build();
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn copies_readable_window() {
        let mut buffer = PacketBuffer::copied_from_slice(&[1, 2, 3, 4]).unwrap();
        buffer.skip_bytes(1).unwrap();

        let bytes = buffer.to_bytes().unwrap();
        assert_eq!(bytes.as_ref(), [2, 3, 4]);
        assert_eq!(buffer.reader_index(), 1);

        buffer.set_byte(1, 9).unwrap();
        assert_eq!(bytes.as_ref(), [2, 3, 4]);

        assert_eq!(buffer.slice(2, 2).unwrap().to_bytes().unwrap().as_ref(), [3, 4]);

        buffer.close().unwrap();
    }

    #[test]
    fn released_buffer_has_no_bytes() {
        let mut buffer = PacketBuffer::copied_from_slice(&[1]).unwrap();
        buffer.release();

        assert_eq!(buffer.to_bytes().unwrap_err().kind(), ErrorKind::MemoryAccess);
    }
}
