// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::backtrace::Backtrace;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use nm::Event;
use parking_lot::Mutex;

use crate::leak::{LeakDetectionConfig, LeakReport, LeakReportMode};
use crate::{Error, Result};

/// Every this many tracked allocations, the allocating thread sweeps the record table.
pub const SWEEP_INTERVAL: usize = 256;

/// Tracks outstanding owned allocations and reports those dropped without being released.
///
/// Every owned buffer allocated while detection is enabled registers an allocation record that
/// weakly observes a liveness token held by the buffer. Releasing the buffer discards the record.
/// A sweep reports every record whose token is gone - the buffer was dropped without ever being
/// released - and discards it.
///
/// Sweeps run synchronously on the calling thread: opportunistically during allocation (every
/// [`SWEEP_INTERVAL`] tracked allocations) and on demand via [`sweep()`][Self::sweep] or
/// [`check()`][Self::check]. Every detected leak is logged as a `pktbuf.leak` event at
/// ERROR level. Detection is a diagnostic aid with no timing guarantees and never panics.
///
/// A process-wide instance configured from the environment is available via
/// [`global()`][Self::global]. Separate instances can be bound to an
/// [`Allocator`][crate::Allocator] to isolate their bookkeeping.
#[derive(Debug)]
pub struct LeakDetector {
    enabled: AtomicBool,
    allocation_sites: AtomicBool,
    strict: AtomicBool,

    next_id: AtomicU64,
    tracked_since_sweep: AtomicUsize,

    records: Mutex<HashMap<u64, AllocationRecord>>,

    // Leaks found by periodic sweeps in strict mode, surfaced by the next `check()`.
    pending: Mutex<Vec<LeakReport>>,
}

#[derive(Debug)]
struct AllocationRecord {
    address: usize,
    capacity: usize,
    allocation_site: Option<Arc<Backtrace>>,
    owner: Weak<()>,
}

/// The buffer-side half of an allocation record.
///
/// Dropping it without calling [`LeakDetector::untrack()`] is what makes the record a leak.
#[derive(Debug)]
pub(crate) struct LeakTracker {
    id: u64,
    _liveness: Arc<()>,
}

impl LeakDetector {
    /// Creates a detector with its own empty record table.
    #[must_use]
    pub fn new(config: LeakDetectionConfig) -> Self {
        let detector = Self {
            enabled: AtomicBool::new(false),
            allocation_sites: AtomicBool::new(false),
            strict: AtomicBool::new(false),
            next_id: AtomicU64::new(0),
            tracked_since_sweep: AtomicUsize::new(0),
            records: Mutex::new(HashMap::new()),
            pending: Mutex::new(Vec::new()),
        };

        detector.store_config(config);
        detector
    }

    /// The process-wide detector used by [`PacketBuffer::allocate()`][crate::PacketBuffer::allocate].
    ///
    /// It is configured from the environment on first use, see
    /// [`LeakDetectionConfig::from_env()`].
    #[must_use]
    pub fn global() -> Arc<Self> {
        static GLOBAL: OnceLock<Arc<LeakDetector>> = OnceLock::new();

        Arc::clone(GLOBAL.get_or_init(|| Arc::new(Self::new(LeakDetectionConfig::from_env()))))
    }

    /// The current settings.
    #[must_use]
    pub fn config(&self) -> LeakDetectionConfig {
        let mode = if self.strict.load(Ordering::Relaxed) {
            LeakReportMode::Strict
        } else {
            LeakReportMode::Log
        };

        LeakDetectionConfig::disabled()
            .with_enabled(self.enabled.load(Ordering::Relaxed))
            .with_allocation_sites(self.allocation_sites.load(Ordering::Relaxed))
            .with_mode(mode)
    }

    /// Replaces the settings. Already tracked allocations stay tracked.
    pub fn set_config(&self, config: LeakDetectionConfig) {
        self.store_config(config);

        tracing::event!(
            name: "pktbuf.leak_detection.configured",
            tracing::Level::DEBUG,
            leak_detection.enabled = config.is_enabled(),
            leak_detection.allocation_sites = config.captures_allocation_sites(),
            leak_detection.strict = config.mode() == LeakReportMode::Strict,
        );
    }

    fn store_config(&self, config: LeakDetectionConfig) {
        self.enabled.store(config.is_enabled(), Ordering::Relaxed);
        self.allocation_sites
            .store(config.captures_allocation_sites(), Ordering::Relaxed);
        self.strict
            .store(config.mode() == LeakReportMode::Strict, Ordering::Relaxed);
    }

    /// The number of tracked allocations that have not yet been released or swept.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.records.lock().len()
    }

    /// Reports and forgets every tracked allocation whose buffer was dropped without release.
    ///
    /// Each report is also logged.
    pub fn sweep(&self) -> Vec<LeakReport> {
        let leaks: Vec<LeakReport> = {
            let mut records = self.records.lock();

            let leaked_ids: Vec<u64> = records
                .iter()
                .filter(|(_, record)| record.owner.strong_count() == 0)
                .map(|(id, _)| *id)
                .collect();

            leaked_ids
                .into_iter()
                .filter_map(|id| records.remove(&id))
                .map(|record| LeakReport::new(record.address, record.capacity, record.allocation_site))
                .collect()
        };

        leaks.iter().for_each(emit_leak);
        leaks
    }

    /// Sweeps for leaks and surfaces them according to the configured [`LeakReportMode`].
    ///
    /// Returns the number of leaks found. In strict mode this includes the leaks found by
    /// periodic sweeps during allocation since the previous check.
    ///
    /// # Errors
    ///
    /// In [`LeakReportMode::Strict`], returns [`Error::MemoryLeak`] describing the first leak
    /// found. All leaks found are discarded from the record table either way.
    pub fn check(&self) -> Result<usize> {
        let mut leaks = std::mem::take(&mut *self.pending.lock());
        leaks.extend(self.sweep());
        let count = leaks.len();

        if self.strict.load(Ordering::Relaxed) && count > 0 {
            return Err(Error::MemoryLeak(leaks.swap_remove(0)));
        }

        Ok(count)
    }

    /// Registers a new owned allocation, if detection is enabled.
    pub(crate) fn track(&self, address: usize, capacity: usize) -> Option<LeakTracker> {
        if !self.enabled.load(Ordering::Relaxed) {
            return None;
        }

        if self.tracked_since_sweep.fetch_add(1, Ordering::Relaxed) + 1 >= SWEEP_INTERVAL {
            self.tracked_since_sweep.store(0, Ordering::Relaxed);
            let leaks = self.sweep();

            if self.strict.load(Ordering::Relaxed) && !leaks.is_empty() {
                self.pending.lock().extend(leaks);
            }
        }

        let allocation_site = self
            .allocation_sites
            .load(Ordering::Relaxed)
            .then(|| Arc::new(Backtrace::force_capture()));

        let liveness = Arc::new(());
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        self.records.lock().insert(
            id,
            AllocationRecord {
                address,
                capacity,
                allocation_site,
                owner: Arc::downgrade(&liveness),
            },
        );

        Some(LeakTracker {
            id,
            _liveness: liveness,
        })
    }

    /// Updates the record after the buffer memory moved to a new block.
    pub(crate) fn relocate(&self, tracker: &LeakTracker, address: usize, capacity: usize) {
        if let Some(record) = self.records.lock().get_mut(&tracker.id) {
            record.address = address;
            record.capacity = capacity;
        }
    }

    /// Marks the allocation as released, discarding its record.
    pub(crate) fn untrack(&self, tracker: LeakTracker) {
        self.records.lock().remove(&tracker.id);
    }
}

fn emit_leak(report: &LeakReport) {
    LEAKS_DETECTED.with(|e| e.observe(report.capacity()));

    tracing::event!(
        name: "pktbuf.leak",
        tracing::Level::ERROR,
        leak.address = report.address(),
        leak.capacity = report.capacity(),
        leak.allocation_site = report.allocation_site().map(tracing::field::display),
        "{}",
        report.summary(),
    );
}

thread_local! {
    static LEAKS_DETECTED: Event = Event::builder()
        .name("pktbuf_leaks_detected")
        .build();
}
