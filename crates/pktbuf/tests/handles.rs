// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![allow(missing_docs, reason = "test code")]

//! Ownership, aliasing and release behavior of owned buffers and their views.

use pktbuf::{BoxedError, BufferAccess, ErrorKind, PacketBuffer, PacketView, TextCodec, Utf8};
use static_assertions::{assert_impl_all, assert_not_impl_any};

assert_impl_all!(PacketBuffer: Send, std::fmt::Debug);
assert_not_impl_any!(PacketBuffer: Sync, Clone);
assert_not_impl_any!(PacketView<'static>: Send, Sync);

#[test]
fn release_succeeds_exactly_once() {
    let mut buffer = PacketBuffer::allocate(16).unwrap();

    assert!(buffer.release());
    assert!(!buffer.release());
    assert!(!buffer.release());
    assert!(buffer.is_released());
}

#[test]
fn released_buffer_rejects_memory_access() {
    let mut buffer = PacketBuffer::allocate(16).unwrap();
    buffer.write_num(7_u32).unwrap();
    buffer.release();

    assert_eq!(buffer.get_byte(0).unwrap_err().kind(), ErrorKind::MemoryAccess);
    assert_eq!(buffer.set_byte(0, 1).unwrap_err().kind(), ErrorKind::MemoryAccess);
    assert_eq!(buffer.read_num::<u32>().unwrap_err().kind(), ErrorKind::MemoryAccess);
    assert_eq!(buffer.set_reader_index(0).unwrap_err().kind(), ErrorKind::MemoryAccess);
    assert_eq!(buffer.set_capacity(32).unwrap_err().kind(), ErrorKind::MemoryAccess);
    assert_eq!(buffer.slice(0, 1).map(|_| ()).unwrap_err().kind(), ErrorKind::MemoryAccess);

    // Out of bounds too, but release is checked first.
    assert_eq!(buffer.get_byte(1000).unwrap_err().kind(), ErrorKind::MemoryAccess);
    assert_eq!(buffer.copy(0, 0).map(|_| ()).unwrap_err().kind(), ErrorKind::MemoryAccess);

    assert_eq!(buffer.capacity(), 16);
    assert_eq!(buffer.writer_index(), 4);
}

#[test]
fn slice_aliases_parent_memory() {
    let buffer = PacketBuffer::copied_from_slice(&[0; 10]).unwrap();
    let offset = 3;
    let slice = buffer.slice(offset, 5).unwrap();

    for i in 0..slice.capacity() {
        let from_parent = u8::try_from(i).unwrap() + 1;
        buffer.set_byte(offset + i, from_parent).unwrap();
        assert_eq!(slice.get_byte(i).unwrap(), from_parent);

        let from_slice = from_parent + 100;
        slice.set_byte(i, from_slice).unwrap();
        assert_eq!(buffer.get_byte(offset + i).unwrap(), from_slice);
    }

    assert_eq!(slice.get_byte(5).unwrap_err().kind(), ErrorKind::IndexOutOfBounds);
    assert!(std::ptr::eq(slice.unslice(), &buffer));

    buffer.close().unwrap();
}

#[test]
fn slice_release_frees_nothing() {
    let buffer = PacketBuffer::copied_from_slice(b"abcdef").unwrap();

    let mut slice = buffer.slice(1, 3).unwrap();
    assert!(!slice.release());
    assert!(!slice.release());

    assert_eq!(slice.to_vec().unwrap(), b"bcd");
    assert_eq!(buffer.to_vec().unwrap(), b"abcdef");
    assert!(!buffer.is_released());

    assert_eq!(slice.close().unwrap_err().kind(), ErrorKind::IllegalState);

    buffer.close().unwrap();
}

#[test]
fn slices_of_slices_compose_offsets() {
    let buffer = PacketBuffer::copied_from_slice(&[0, 1, 2, 3, 4, 5, 6, 7]).unwrap();

    let outer = buffer.slice(2, 5).unwrap();
    let inner = outer.slice(1, 3).unwrap();

    assert_eq!(inner.offset(), 3);
    assert_eq!(inner.to_vec().unwrap(), [3, 4, 5]);
    assert_eq!(outer.slice(3, 3).map(|_| ()).unwrap_err().kind(), ErrorKind::IndexOutOfBounds);

    buffer.close().unwrap();
}

#[test]
fn duplicate_shares_ownership() {
    let mut buffer = PacketBuffer::copied_from_slice(&[1, 2, 3]).unwrap();

    let mut duplicate = buffer.duplicate();
    assert!(duplicate.is_duplicate());
    assert_eq!(duplicate.readable_bytes(), 3);

    duplicate.skip_bytes(2).unwrap();
    assert_eq!(buffer.reader_index(), 0);

    assert!(duplicate.release());
    assert!(!duplicate.release());

    assert_eq!(buffer.get_byte(0).unwrap_err().kind(), ErrorKind::MemoryAccess);
    assert!(!buffer.release());
}

#[test]
fn closing_a_duplicate_releases_the_owner() {
    let buffer = PacketBuffer::copied_from_slice(&[1]).unwrap();

    buffer.duplicate().close().unwrap();

    assert!(buffer.is_released());
    buffer.close().unwrap();
}

#[test]
fn copy_is_independent() {
    let mut buffer = PacketBuffer::copied_from_slice(&[10, 20, 30, 40]).unwrap();
    buffer.skip_bytes(1).unwrap();

    let mut copy = buffer.copy_readable().unwrap();
    assert_eq!(copy.capacity(), 3);
    assert_eq!(copy.writer_index(), 3);

    copy.set_byte(0, 99).unwrap();
    assert_eq!(buffer.get_byte(1).unwrap(), 20);

    buffer.set_byte(2, 77).unwrap();
    assert_eq!(copy.get_byte(1).unwrap(), 30);

    // The copy outlives the release of its source.
    buffer.close().unwrap();
    assert_eq!(copy.to_vec().unwrap(), [99, 30, 40]);
    assert!(copy.release());
}

#[test]
fn copy_rejects_empty_and_oversized_windows() {
    let buffer = PacketBuffer::allocate(4).unwrap();

    assert_eq!(buffer.copy(0, 0).unwrap_err().kind(), ErrorKind::IllegalArgument);
    assert_eq!(buffer.copy(2, 3).unwrap_err().kind(), ErrorKind::IndexOutOfBounds);

    buffer.close().unwrap();
}

#[test]
fn capacity_changes_preserve_prefix() {
    let mut buffer = PacketBuffer::copied_from_slice(&[1, 2, 3, 4]).unwrap();
    buffer.set_reader_index(1).unwrap();

    buffer.set_capacity(8).unwrap();
    assert_eq!(buffer.capacity(), 8);
    assert_eq!(buffer.to_vec().unwrap(), [2, 3, 4]);
    assert_eq!(buffer.get_num::<u32>(4).unwrap(), 0);

    buffer.set_capacity(2).unwrap();
    assert_eq!(buffer.reader_index(), 1);
    assert_eq!(buffer.writer_index(), 2);
    assert_eq!(buffer.to_vec().unwrap(), [2]);

    assert_eq!(buffer.set_capacity(0).unwrap_err().kind(), ErrorKind::IllegalArgument);

    buffer.close().unwrap();
}

#[test]
fn equality_compares_readable_windows() {
    let a = PacketBuffer::copied_from_slice(&[9, 1, 2]).unwrap();
    let mut b = PacketBuffer::copied_from_slice(&[1, 2]).unwrap();

    assert_ne!(a, b);
    assert_eq!(a.slice(1, 2).unwrap(), b);

    let empty = PacketBuffer::allocate(1).unwrap();
    let also_empty = PacketBuffer::allocate(1).unwrap();
    assert_ne!(empty, also_empty);

    b.release();
    assert_ne!(a.slice(1, 2).unwrap(), b);

    a.close().unwrap();
    empty.close().unwrap();
    also_empty.close().unwrap();
}

#[test]
fn index_moves_are_validated() {
    let mut buffer = PacketBuffer::allocate(8).unwrap();

    assert_eq!(buffer.set_reader_index(1).unwrap_err().kind(), ErrorKind::IndexOutOfBounds);
    assert_eq!(buffer.set_writer_index(9).unwrap_err().kind(), ErrorKind::IndexOutOfBounds);
    assert_eq!(buffer.set_index(5, 4).unwrap_err().kind(), ErrorKind::IndexOutOfBounds);

    buffer.set_index(2, 6).unwrap();
    assert_eq!(buffer.set_writer_index(1).unwrap_err().kind(), ErrorKind::IndexOutOfBounds);
    assert_eq!((buffer.reader_index(), buffer.writer_index()), (2, 6));

    assert!(buffer.is_readable(4));
    assert!(!buffer.is_readable(5));
    assert!(buffer.is_writable(2));
    assert!(!buffer.is_writable(3));
    assert_eq!(buffer.ensure_writable(3).unwrap_err().kind(), ErrorKind::IndexOutOfBounds);

    buffer.mark_reader_index().unwrap();
    buffer.skip_bytes(4).unwrap();
    assert_eq!(buffer.skip_bytes(1).unwrap_err().kind(), ErrorKind::IndexOutOfBounds);
    buffer.reset_reader_index().unwrap();
    assert_eq!(buffer.reader_index(), 2);

    buffer.clear().unwrap();
    assert_eq!((buffer.reader_index(), buffer.writer_index()), (0, 0));
    assert_eq!(buffer.capacity(), 8);

    buffer.close().unwrap();
}

#[derive(Debug)]
struct AsciiOnly;

impl TextCodec for AsciiOnly {
    fn name(&self) -> &'static str {
        "US-ASCII"
    }

    fn encode(&self, text: &str) -> Result<Vec<u8>, BoxedError> {
        if text.is_ascii() {
            Ok(text.as_bytes().to_vec())
        } else {
            Err("text is not ASCII".into())
        }
    }

    fn decode(&self, bytes: &[u8]) -> Result<String, BoxedError> {
        Utf8.decode(bytes)
    }
}

#[test]
fn text_goes_through_the_codec() {
    let mut buffer = PacketBuffer::allocate(16).unwrap();

    assert_eq!(buffer.write_char_sequence("GET /", &Utf8).unwrap(), 5);
    assert_eq!(buffer.read_char_sequence(5, &AsciiOnly).unwrap(), "GET /");

    let error = buffer.write_char_sequence("grüße", &AsciiOnly).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::IllegalArgument);
    assert!(error.to_string().contains("US-ASCII"));
    assert_eq!(buffer.writer_index(), 5);

    buffer.close().unwrap();
}
