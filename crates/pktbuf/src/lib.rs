// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Off-heap packet buffers with bounds-checked access, byte-order codecs and leak detection.
//!
//! A packet buffer is a fixed-capacity block of raw memory obtained from the system allocator,
//! outside the lifecycle of ordinary Rust values. Code that exchanges packets with a capture
//! engine reads and writes the bytes through a handle that checks every access against the
//! capacity of the block and against the reader and writer indices of the handle.
//!
//! # Handles
//!
//! * [`PacketBuffer`] owns a block of memory. Its memory is returned to the allocator by
//!   [`release()`][PacketBuffer::release] or [`close()`][PacketBuffer::close].
//! * [`PacketView`] borrows a [`PacketBuffer`] and aliases all or part of its memory. A view is
//!   either a slice, which never frees anything, or a duplicate, which shares ownership of the
//!   memory and can release it on behalf of every handle.
//!
//! Both handle kinds implement [`BufferAccess`], which carries every accessor:
//!
//! * Indexed accessors such as [`get_num()`][BufferAccess::get_num] and
//!   [`set_num()`][BufferAccess::set_num] work at an absolute index and leave the reader and
//!   writer indices alone.
//! * Relative accessors such as [`read_num()`][BufferAccess::read_num] and
//!   [`write_num()`][BufferAccess::write_num] work at the reader or writer index and advance it.
//!
//! The natural accessors use the [`ByteOrder`] of the handle (big-endian unless changed), while
//! the `*_re` accessors use the opposite order.
//!
//! ```
//! use pktbuf::{BufferAccess, ByteOrder, PacketBuffer};
//!
//! let mut buffer = PacketBuffer::allocate(8)?;
//!
//! buffer.write_num(0x0800_u16)?;
//! buffer.write_num_re(0x1234_u16)?;
//!
//! assert_eq!(buffer.readable_bytes(), 4);
//! assert_eq!(buffer.get_byte(2)?, 0x34);
//! assert_eq!(buffer.read_num::<u16>()?, 0x0800);
//!
//! buffer.set_byte_order(ByteOrder::LittleEndian);
//! assert_eq!(buffer.read_num::<u16>()?, 0x1234);
//!
//! buffer.close()?;
//! # Ok::<(), pktbuf::Error>(())
//! ```
//!
//! # Release and Leak Detection
//!
//! Every owned buffer must be released. Dropping a buffer frees its memory, but a buffer dropped
//! without being released is reported as a leak by the [`LeakDetector`] its allocator is bound
//! to. Leak detection is enabled by default in debug builds and can be configured via
//! [`LeakDetectionConfig`], either in code or through the `PKTBUF_LEAK_DETECTION*` environment
//! variables.
//!
//! After release, every memory access through any handle of the buffer fails with
//! [`Error::MemoryAccess`].
//!
//! # Capture Collaborators
//!
//! The [`capture`] module defines the contracts between packet buffers and a capture engine:
//! packet headers, packet handlers and the 16-byte capture record header.

mod access;
mod buffer;
#[cfg(feature = "bytes-compat")]
mod bytes_compat;
pub mod capture;
mod cast;
mod cursor;
mod error;
mod leak;
mod mem;
mod order;
mod text;
mod view;

pub use access::BufferAccess;
pub use buffer::PacketBuffer;
pub use cast::TypedView;
pub use error::{BoxedError, Error, ErrorKind, Result};
pub use leak::{
    ENV_LEAK_DETECTION, ENV_LEAK_DETECTION_MODE, ENV_LEAK_DETECTION_SITES, LeakDetectionConfig, LeakDetector, LeakReport,
    LeakReportMode, SWEEP_INTERVAL,
};
pub use mem::Allocator;
pub use order::{ByteOrder, Primitive};
pub use text::{TextCodec, Utf8};
pub use view::PacketView;
