// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! A simulated capture loop that lends packets to a handler.
//!
//! 1. A fake capture engine produces Ethernet frames into owned packet buffers.
//! 2. The handler inspects each frame through a slice and keeps a copy of the IPv4 ones.
//! 3. The engine releases every buffer it lent out. The kept copies are released at the end and
//!    the leak detector confirms that nothing was leaked.

use std::sync::Arc;
use std::time::SystemTime;

use pktbuf::capture::{CaptureHeader, PacketHandler, PacketHeader, RecordHeader, ensure_dumpable};
use pktbuf::{Allocator, BufferAccess, LeakDetectionConfig, LeakDetector, LeakReportMode, PacketBuffer, TypedView};

const ETHER_TYPE_IPV4: u16 = 0x0800;
const ETHER_TYPE_IPV6: u16 = 0x86DD;

// Destination and source MAC addresses precede the EtherType.
const ETHER_TYPE_OFFSET: usize = 12;

fn main() -> pktbuf::Result<()> {
    let detector = Arc::new(LeakDetector::new(
        LeakDetectionConfig::disabled()
            .with_enabled(true)
            .with_mode(LeakReportMode::Strict),
    ));
    let allocator = Allocator::with_leak_detector(Arc::clone(&detector));

    let mut kept = Vec::new();
    let mut handler = |header: &dyn PacketHeader, packet: &PacketBuffer| {
        if let Err(e) = keep_ipv4(header, packet, &mut kept) {
            println!("Dropping malformed packet: {e}");
        }
    };

    for ether_type in [ETHER_TYPE_IPV4, ETHER_TYPE_IPV6, ETHER_TYPE_IPV4] {
        capture_one(&allocator, ether_type, &mut handler)?;
    }

    println!("Kept {} of 3 captured packets.", kept.len());

    for record in kept {
        let header = record.cast::<RecordHeader>()?.to_header()?;
        println!(
            "Kept packet: {} bytes captured of {} on the wire.",
            header.capture_length(),
            header.original_length()
        );

        record.close()?;
    }

    let leaks = detector.check()?;
    println!("Leak check found {leaks} leaked buffers.");

    Ok(())
}

/// Plays the role of the capture engine for one frame.
fn capture_one(allocator: &Allocator, ether_type: u16, handler: &mut impl PacketHandler) -> pktbuf::Result<()> {
    let mut frame = allocator.allocate(64)?;
    frame.write_zero(ETHER_TYPE_OFFSET)?;
    frame.write_num(ether_type)?;
    frame.write_bytes(b"\x45\x00\x00\x14")?;

    let captured = u32::try_from(frame.writer_index()).unwrap_or(u32::MAX);
    let header = CaptureHeader::new(SystemTime::now(), captured, 60);

    handler.handle(&header, &frame);

    frame.close()
}

/// Keeps a capture record (record header followed by the frame) of every IPv4 frame.
fn keep_ipv4(header: &dyn PacketHeader, packet: &PacketBuffer, kept: &mut Vec<PacketBuffer>) -> pktbuf::Result<()> {
    ensure_dumpable(header, packet)?;

    let ether_type = packet.slice(ETHER_TYPE_OFFSET, 2)?.read_num::<u16>()?;
    if ether_type != ETHER_TYPE_IPV4 {
        return Ok(());
    }

    let mut record = packet.allocator().allocate(RecordHeader::SIZE + packet.readable_bytes())?;
    CaptureHeader::new(header.timestamp(), header.capture_length(), header.original_length()).write_record(&mut record)?;

    let mut frame = packet.slice_readable()?;
    record.write_bytes_from(&mut frame, packet.readable_bytes())?;

    kept.push(record);
    Ok(())
}
