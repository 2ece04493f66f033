// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Memory for owned packet buffers.

mod block;

use std::num::NonZero;
use std::sync::Arc;

use nm::{Event, Magnitude};

pub(crate) use block::RawBlock;

use crate::{Error, LeakDetector, PacketBuffer, Result};

/// Obtains the memory of owned [`PacketBuffer`]s from the Rust global allocator and registers
/// every allocation with a [`LeakDetector`].
///
/// Cloning an allocator is cheap. Every clone shares the same leak detector.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use pktbuf::{Allocator, BufferAccess, LeakDetectionConfig, LeakDetector};
///
/// let detector = Arc::new(LeakDetector::new(LeakDetectionConfig::disabled().with_enabled(true)));
/// let allocator = Allocator::with_leak_detector(Arc::clone(&detector));
///
/// let mut buffer = allocator.allocate(64)?;
/// assert_eq!(buffer.capacity(), 64);
/// assert_eq!(detector.outstanding(), 1);
///
/// assert!(buffer.release());
/// assert_eq!(detector.outstanding(), 0);
/// # Ok::<(), pktbuf::Error>(())
/// ```
#[derive(Clone, Debug)]
pub struct Allocator {
    leak_detector: Arc<LeakDetector>,
}

impl Allocator {
    /// The allocator used by [`PacketBuffer::allocate()`], bound to [`LeakDetector::global()`].
    #[must_use]
    pub fn global() -> Self {
        Self::with_leak_detector(LeakDetector::global())
    }

    /// Creates an allocator that registers its allocations with the given detector.
    #[must_use]
    pub const fn with_leak_detector(leak_detector: Arc<LeakDetector>) -> Self {
        Self { leak_detector }
    }

    /// The detector that tracks allocations made by this allocator.
    #[must_use]
    pub fn leak_detector(&self) -> &Arc<LeakDetector> {
        &self.leak_detector
    }

    /// Allocates an owned buffer of exactly `capacity` bytes.
    ///
    /// The new buffer has reader and writer index 0 and uses big-endian byte order.
    /// The memory is zero-initialized.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalArgument`] if `capacity` is zero or exceeds the maximum allocation
    /// size.
    pub fn allocate(&self, capacity: usize) -> Result<PacketBuffer> {
        let capacity = NonZero::new(capacity).ok_or_else(|| Error::illegal_argument("capacity must be greater than zero"))?;

        let block = RawBlock::allocate(capacity)?;
        ALLOCATED_CAPACITY.with(|e| e.observe(capacity.get()));

        let leak_tracker = self.leak_detector.track(block.address(), capacity.get());

        Ok(PacketBuffer::from_block(block, self.clone(), leak_tracker))
    }
}

impl Default for Allocator {
    fn default() -> Self {
        Self::global()
    }
}

const CAPACITY_BUCKETS: &[Magnitude] = &[64, 128, 256, 512, 1024, 1514, 4096, 9000, 16_384, 65_536];

thread_local! {
    static ALLOCATED_CAPACITY: Event = Event::builder()
        .name("pktbuf_allocated_capacity")
        .histogram(CAPACITY_BUCKETS)
        .build();
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BufferAccess, ErrorKind, LeakDetectionConfig};

    #[test]
    fn zero_capacity_is_rejected() {
        let allocator = Allocator::with_leak_detector(Arc::new(LeakDetector::new(LeakDetectionConfig::disabled())));

        let error = allocator.allocate(0).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::IllegalArgument);
    }

    #[test]
    fn oversized_capacity_is_rejected() {
        let detector = Arc::new(LeakDetector::new(LeakDetectionConfig::disabled().with_enabled(true)));
        let allocator = Allocator::with_leak_detector(Arc::clone(&detector));

        let error = allocator.allocate(usize::MAX).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::IllegalArgument);
        assert_eq!(detector.outstanding(), 0);
    }

    #[test]
    fn allocation_is_tracked_by_bound_detector() {
        let detector = Arc::new(LeakDetector::new(LeakDetectionConfig::disabled().with_enabled(true)));
        let allocator = Allocator::with_leak_detector(Arc::clone(&detector));

        let mut buffer = allocator.allocate(16).unwrap();
        assert_eq!(detector.outstanding(), 1);
        assert!(Arc::ptr_eq(buffer.allocator().leak_detector(), &detector));

        assert!(buffer.release());
        assert_eq!(detector.outstanding(), 0);
    }

    #[test]
    fn new_buffer_is_empty() {
        let buffer = Allocator::global().allocate(32).unwrap();

        assert_eq!(buffer.capacity(), 32);
        assert_eq!(buffer.reader_index(), 0);
        assert_eq!(buffer.writer_index(), 0);

        buffer.close().unwrap();
    }

    #[test]
    fn default_uses_global_detector() {
        assert!(Arc::ptr_eq(Allocator::default().leak_detector(), &LeakDetector::global()));
    }
}
