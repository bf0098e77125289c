//! Statistics for a mounted mailbox.
//!
//! All counters are lock-free atomics with relaxed ordering; values read
//! while the mount is busy may be slightly stale.
//!
//! # Usage
//!
//! ```
//! use mailfs_mount::stats::MountStats;
//! use std::sync::Arc;
//!
//! let stats = Arc::new(MountStats::new());
//! stats.record_cycle();
//! stats.record_added(3);
//! stats.record_read(4096);
//!
//! let snap = stats.snapshot();
//! assert_eq!(snap.cycles_run, 1);
//! assert_eq!(snap.bytes_read, 4096);
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

/// Counters for the reconciliation loop, the controller and removals.
#[derive(Debug)]
pub struct MountStats {
    // === Reconciliation ===
    /// Cycles that completed their listing and diff.
    pub cycles_run: AtomicU64,
    /// Cycles whose listing failed or timed out.
    pub cycles_failed: AtomicU64,
    /// Cycles cut short by channel backpressure.
    pub cycles_abandoned: AtomicU64,
    /// `Added` events sent by the loop.
    pub events_added: AtomicU64,
    /// `Removed` events sent by the loop.
    pub events_removed: AtomicU64,
    /// Events drained and applied by the controller.
    pub events_applied: AtomicU64,

    // === File access ===
    pub bodies_fetched: AtomicU64,
    pub fetch_failures: AtomicU64,
    pub total_reads: AtomicU64,
    pub bytes_read: AtomicU64,
    pub open_files: AtomicU64,
    pub listings: AtomicU64,

    // === Removal ===
    pub removals_ok: AtomicU64,
    /// Flagged but not purged.
    pub removals_partial: AtomicU64,
    pub removals_failed: AtomicU64,

    pub total_errors: AtomicU64,

    session_start: SystemTime,
}

impl Default for MountStats {
    fn default() -> Self {
        Self::new()
    }
}

impl MountStats {
    pub fn new() -> Self {
        Self {
            cycles_run: AtomicU64::new(0),
            cycles_failed: AtomicU64::new(0),
            cycles_abandoned: AtomicU64::new(0),
            events_added: AtomicU64::new(0),
            events_removed: AtomicU64::new(0),
            events_applied: AtomicU64::new(0),
            bodies_fetched: AtomicU64::new(0),
            fetch_failures: AtomicU64::new(0),
            total_reads: AtomicU64::new(0),
            bytes_read: AtomicU64::new(0),
            open_files: AtomicU64::new(0),
            listings: AtomicU64::new(0),
            removals_ok: AtomicU64::new(0),
            removals_partial: AtomicU64::new(0),
            removals_failed: AtomicU64::new(0),
            total_errors: AtomicU64::new(0),
            session_start: SystemTime::now(),
        }
    }

    // === Recording ===

    #[inline]
    pub fn record_cycle(&self) {
        self.cycles_run.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_cycle_failed(&self) {
        self.cycles_failed.fetch_add(1, Ordering::Relaxed);
        self.total_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_cycle_abandoned(&self) {
        self.cycles_abandoned.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_added(&self, count: u64) {
        self.events_added.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_removed(&self, count: u64) {
        self.events_removed.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_applied(&self, count: u64) {
        self.events_applied.fetch_add(count, Ordering::Relaxed);
    }

    /// Record a successful body fetch, which also opens a file.
    #[inline]
    pub fn record_fetch(&self) {
        self.bodies_fetched.fetch_add(1, Ordering::Relaxed);
        self.open_files.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_fetch_failure(&self) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
        self.total_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_close(&self) {
        // Saturate at zero; a stray release must not wrap the gauge.
        let _ = self
            .open_files
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    #[inline]
    pub fn record_read(&self, bytes: u64) {
        self.total_reads.fetch_add(1, Ordering::Relaxed);
        self.bytes_read.fetch_add(bytes, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_listing(&self) {
        self.listings.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_removal_ok(&self) {
        self.removals_ok.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_removal_partial(&self) {
        self.removals_partial.fetch_add(1, Ordering::Relaxed);
        self.total_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_removal_failed(&self) {
        self.removals_failed.fetch_add(1, Ordering::Relaxed);
        self.total_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_error(&self) {
        self.total_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.session_start.elapsed().unwrap_or_default()
    }

    pub fn snapshot(&self) -> MountStatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MountStatsSnapshot {
            cycles_run: load(&self.cycles_run),
            cycles_failed: load(&self.cycles_failed),
            cycles_abandoned: load(&self.cycles_abandoned),
            events_added: load(&self.events_added),
            events_removed: load(&self.events_removed),
            events_applied: load(&self.events_applied),
            bodies_fetched: load(&self.bodies_fetched),
            fetch_failures: load(&self.fetch_failures),
            total_reads: load(&self.total_reads),
            bytes_read: load(&self.bytes_read),
            open_files: load(&self.open_files),
            listings: load(&self.listings),
            removals_ok: load(&self.removals_ok),
            removals_partial: load(&self.removals_partial),
            removals_failed: load(&self.removals_failed),
            total_errors: load(&self.total_errors),
            uptime: self.uptime(),
        }
    }
}

/// Point-in-time copy of [`MountStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountStatsSnapshot {
    pub cycles_run: u64,
    pub cycles_failed: u64,
    pub cycles_abandoned: u64,
    pub events_added: u64,
    pub events_removed: u64,
    pub events_applied: u64,
    pub bodies_fetched: u64,
    pub fetch_failures: u64,
    pub total_reads: u64,
    pub bytes_read: u64,
    pub open_files: u64,
    pub listings: u64,
    pub removals_ok: u64,
    pub removals_partial: u64,
    pub removals_failed: u64,
    pub total_errors: u64,
    pub uptime: Duration,
}

impl fmt::Display for MountStatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cycles {} ({} failed, {} abandoned), events +{}/-{} ({} applied), \
             fetched {} ({} failed), read {} in {} reads, removed {} ({} partial, {} failed), \
             errors {}, up {}s",
            self.cycles_run,
            self.cycles_failed,
            self.cycles_abandoned,
            self.events_added,
            self.events_removed,
            self.events_applied,
            self.bodies_fetched,
            self.fetch_failures,
            format_bytes(self.bytes_read),
            self.total_reads,
            self.removals_ok,
            self.removals_partial,
            self.removals_failed,
            self.total_errors,
            self.uptime.as_secs(),
        )
    }
}

/// Human-readable byte count (`1.50 KB`, `3.00 MB`).
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}
