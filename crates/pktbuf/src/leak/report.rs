// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::backtrace::Backtrace;
use std::fmt;
use std::sync::Arc;

/// Describes an owned buffer that became unreachable without being released.
///
/// The memory itself has already been returned to the allocator when the buffer was dropped,
/// so the address is only meaningful for correlating the report with earlier diagnostics.
#[derive(Clone, Debug)]
pub struct LeakReport {
    address: usize,
    capacity: usize,
    allocation_site: Option<Arc<Backtrace>>,
}

impl LeakReport {
    pub(crate) const fn new(address: usize, capacity: usize, allocation_site: Option<Arc<Backtrace>>) -> Self {
        Self {
            address,
            capacity,
            allocation_site,
        }
    }

    /// The address of the leaked memory block at the time it was last tracked.
    #[must_use]
    pub const fn address(&self) -> usize {
        self.address
    }

    /// The capacity of the leaked buffer in bytes.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// The backtrace captured when the buffer was allocated, if allocation sites were being
    /// captured at the time.
    #[must_use]
    pub fn allocation_site(&self) -> Option<&Backtrace> {
        self.allocation_site.as_deref()
    }

    /// The one-line description, without the allocation site.
    pub(crate) fn summary(&self) -> String {
        format!(
            "buffer of {} bytes at {:#x} was dropped without being released",
            self.capacity, self.address
        )
    }
}

impl fmt::Display for LeakReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())?;

        if let Some(site) = &self.allocation_site {
            write!(f, "; allocated at:\n{site}")?;
        }

        Ok(())
    }
}
