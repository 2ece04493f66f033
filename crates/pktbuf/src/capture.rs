// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Contracts between packet buffers and the capture and dump machinery that produces and
//! persists them.
//!
//! The capture engine itself lives outside of this crate. It lends every captured packet to a
//! [`PacketHandler`] together with a [`PacketHeader`]. The handler receives a shared reference, so
//! it cannot release the buffer. To keep the bytes beyond the callback, it copies them via
//! [`copy_readable()`][crate::BufferAccess::copy_readable].
//!
//! # Example
//!
//! ```
//! use std::time::SystemTime;
//!
//! use pktbuf::capture::{CaptureHeader, PacketHandler, PacketHeader, ensure_dumpable};
//! use pktbuf::{BufferAccess, PacketBuffer};
//!
//! let mut kept = Vec::new();
//! let mut handler = |header: &dyn PacketHeader, packet: &PacketBuffer| {
//!     if ensure_dumpable(header, packet).is_ok() {
//!         kept.push(packet.copy_readable());
//!     }
//! };
//!
//! let packet = PacketBuffer::copied_from_slice(b"\x45\x00\x00\x14")?;
//! let header = CaptureHeader::new(SystemTime::now(), 4, 60);
//! handler.handle(&header, &packet);
//! packet.close()?;
//!
//! assert_eq!(kept.len(), 1);
//! # for copy in kept { copy?.close()?; }
//! # Ok::<(), pktbuf::Error>(())
//! ```

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::{BoxedError, BufferAccess, Error, PacketBuffer, PacketView, Result, TypedView};

/// Metadata the capture engine records for every packet.
pub trait PacketHeader {
    /// When the packet was captured.
    fn timestamp(&self) -> SystemTime;

    /// The number of bytes captured, which is the number of readable bytes handed to the
    /// handler.
    fn capture_length(&self) -> u32;

    /// The length of the packet on the wire, which exceeds the capture length if the packet was
    /// truncated by the snapshot length.
    fn original_length(&self) -> u32;
}

/// Receives packets from the capture engine.
///
/// The buffer is owned by the capture engine and only valid for the duration of the call.
pub trait PacketHandler {
    /// Handles one captured packet.
    fn handle(&mut self, header: &dyn PacketHeader, packet: &PacketBuffer);
}

impl<F> PacketHandler for F
where
    F: FnMut(&dyn PacketHeader, &PacketBuffer),
{
    #[cfg_attr(test, mutants::skip)] // Trivial forwarder.
    fn handle(&mut self, header: &dyn PacketHeader, packet: &PacketBuffer) {
        self(header, packet);
    }
}

/// Checks the precondition of the dump collaborator: the buffer must hold exactly the captured
/// bytes, i.e. its writer index must equal the capture length of the header.
///
/// # Errors
///
/// Returns [`Error::IllegalArgument`] if the writer index differs from the capture length.
pub fn ensure_dumpable<B: BufferAccess>(header: &dyn PacketHeader, buffer: &B) -> Result<()> {
    let capture_length = header.capture_length();

    if usize::try_from(capture_length).is_ok_and(|len| len == buffer.writer_index()) {
        Ok(())
    } else {
        Err(Error::IllegalArgument(
            format!(
                "writer index {} does not match capture length {capture_length}",
                buffer.writer_index()
            )
            .into(),
        ))
    }
}

/// A packet header held by value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CaptureHeader {
    timestamp: SystemTime,
    capture_length: u32,
    original_length: u32,
}

impl CaptureHeader {
    /// Creates a header.
    #[must_use]
    pub const fn new(timestamp: SystemTime, capture_length: u32, original_length: u32) -> Self {
        Self {
            timestamp,
            capture_length,
            original_length,
        }
    }

    /// Appends the header as a capture record header at the writer index of `buffer`, in the byte
    /// order of the buffer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfBounds`] if fewer than [`RecordHeader::SIZE`] bytes are
    /// writable and [`Error::IllegalArgument`] if the timestamp cannot be represented as
    /// 32-bit seconds since the Unix epoch. Nothing is written on failure.
    pub fn write_record<B: BufferAccess>(&self, buffer: &mut B) -> Result<()> {
        let (seconds, micros) = split_timestamp(self.timestamp)?;
        buffer.ensure_writable(RecordHeader::SIZE)?;

        buffer.write_num(seconds)?;
        buffer.write_num(micros)?;
        buffer.write_num(self.capture_length)?;
        buffer.write_num(self.original_length)
    }
}

impl PacketHeader for CaptureHeader {
    fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    fn capture_length(&self) -> u32 {
        self.capture_length
    }

    fn original_length(&self) -> u32 {
        self.original_length
    }
}

/// The 16-byte record header that precedes every packet in a capture file.
///
/// | Offset | Field |
/// |---|---|
/// | 0 | timestamp seconds since the Unix epoch |
/// | 4 | timestamp microseconds |
/// | 8 | capture length |
/// | 12 | original length |
///
/// All fields are 32-bit unsigned integers in the byte order of the buffer the header was cast
/// from.
#[derive(Debug)]
pub struct RecordHeader<'a> {
    view: PacketView<'a>,
}

impl<'a> TypedView<'a> for RecordHeader<'a> {
    const SIZE: usize = 16;

    fn wrap(view: PacketView<'a>) -> std::result::Result<Self, BoxedError> {
        let micros: u32 = view.get_num(MICROS)?;

        if micros >= MICROS_PER_SECOND {
            return Err(format!("timestamp microseconds {micros} exceed one second").into());
        }

        Ok(Self { view })
    }
}

const SECONDS: usize = 0;
const MICROS: usize = 4;
const CAPTURE_LENGTH: usize = 8;
const ORIGINAL_LENGTH: usize = 12;

const MICROS_PER_SECOND: u32 = 1_000_000;

impl RecordHeader<'_> {
    /// # Errors
    ///
    /// Returns [`Error::MemoryAccess`] if the memory has been released.
    pub fn timestamp(&self) -> Result<SystemTime> {
        let seconds: u32 = self.view.get_num(SECONDS)?;
        let micros: u32 = self.view.get_num(MICROS)?;

        Ok(UNIX_EPOCH + Duration::from_secs(seconds.into()) + Duration::from_micros(micros.into()))
    }

    /// # Errors
    ///
    /// Returns [`Error::MemoryAccess`] if the memory has been released.
    pub fn capture_length(&self) -> Result<u32> {
        self.view.get_num(CAPTURE_LENGTH)
    }

    /// # Errors
    ///
    /// Returns [`Error::MemoryAccess`] if the memory has been released.
    pub fn original_length(&self) -> Result<u32> {
        self.view.get_num(ORIGINAL_LENGTH)
    }

    /// Overwrites the timestamp fields.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalArgument`] if the timestamp cannot be represented as 32-bit
    /// seconds since the Unix epoch and [`Error::MemoryAccess`] if the memory has been released.
    pub fn set_timestamp(&self, timestamp: SystemTime) -> Result<()> {
        let (seconds, micros) = split_timestamp(timestamp)?;

        self.view.set_num(SECONDS, seconds)?;
        self.view.set_num(MICROS, micros)
    }

    /// # Errors
    ///
    /// Returns [`Error::MemoryAccess`] if the memory has been released.
    pub fn set_capture_length(&self, len: u32) -> Result<()> {
        self.view.set_num(CAPTURE_LENGTH, len)
    }

    /// # Errors
    ///
    /// Returns [`Error::MemoryAccess`] if the memory has been released.
    pub fn set_original_length(&self, len: u32) -> Result<()> {
        self.view.set_num(ORIGINAL_LENGTH, len)
    }

    /// Reads all fields into a header held by value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemoryAccess`] if the memory has been released.
    pub fn to_header(&self) -> Result<CaptureHeader> {
        Ok(CaptureHeader::new(self.timestamp()?, self.capture_length()?, self.original_length()?))
    }
}

fn split_timestamp(timestamp: SystemTime) -> Result<(u32, u32)> {
    let since_epoch = timestamp
        .duration_since(UNIX_EPOCH)
        .map_err(|e| Error::IllegalArgument(format!("timestamp precedes the Unix epoch by {:?}", e.duration()).into()))?;

    let seconds = u32::try_from(since_epoch.as_secs())
        .map_err(|e| Error::IllegalArgument(format!("timestamp exceeds the range of 32-bit seconds: {e}").into()))?;

    Ok((seconds, since_epoch.subsec_micros()))
}
