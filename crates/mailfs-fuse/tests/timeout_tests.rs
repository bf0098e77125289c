//! Remote calls against a slow store: every call is cut off at its timeout,
//! the failure is transient and the view stays as it was.
//!
//! Run: `cargo nextest run -p mailfs-fuse timeout_tests`

mod common;

use common::*;
use mailfs_core::MemoryStore;
use mailfs_fuse::{CycleOutcome, MailboxView, MountConfig};
use mailfs_mount::MountStats;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const SHORT: Duration = Duration::from_millis(100);
const STALL: Duration = Duration::from_millis(500);

#[test]
fn test_open_times_out_on_slow_fetch() {
    let mb = TestMailbox::with_config(MountConfig::fast().io_timeout(SHORT));
    mb.seed(1, 1);
    mb.sync();

    mb.store.set_latency(STALL);
    let started = Instant::now();
    let err = mb.view.open("/Subject 1").unwrap_err();
    assert!(started.elapsed() < STALL, "open waited for the store");
    assert!(err.is_transient());
    assert_eq!(err.to_errno(), libc::ETIMEDOUT);
    assert_eq!(mb.view.open_handle_count(), 0);
    assert_eq!(mb.names(), ["Subject 1"]);

    mb.store.set_latency(Duration::ZERO);
    let data = mb.read_all("/Subject 1").unwrap();
    assert_bytes_equal(&data, tagged_body(1).as_bytes(), "read after recovery");
}

#[test]
fn test_stalled_listing_fails_cycle_without_removals() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap();
    let store = Arc::new(MemoryStore::new());
    for id in 1..=3 {
        store.insert_text(id, format!("Subject {id}"), &tagged_body(id));
    }
    let stats = Arc::new(MountStats::new());
    let (view, reconciler) = MailboxView::with_reconciler(
        store.clone(),
        runtime.handle().clone(),
        MountConfig::fast().io_timeout(SHORT),
        Arc::clone(&stats),
    );

    let outcome = runtime.block_on(reconciler.run_cycle());
    assert!(matches!(outcome, CycleOutcome::Completed { added: 3, removed: 0 }));
    assert_eq!(view.list().len(), 3);

    // The server drops a message but stops answering in time.
    store.delete(2);
    store.set_latency(STALL);
    match runtime.block_on(reconciler.run_cycle()) {
        CycleOutcome::ListingFailed(e) => {
            assert!(e.is_transient());
            assert_eq!(e.to_errno(), libc::ETIMEDOUT);
        }
        other => panic!("expected a failed listing, got {other:?}"),
    }
    assert_eq!(view.list().len(), 3, "a timed-out listing must not remove entries");
    assert_eq!(stats.snapshot().events_removed, 0);
    assert_eq!(stats.snapshot().cycles_failed, 1);

    store.set_latency(Duration::ZERO);
    let outcome = runtime.block_on(reconciler.run_cycle());
    assert!(matches!(outcome, CycleOutcome::Completed { added: 0, removed: 1 }));
    let names: Vec<String> = view.list().names().map(str::to_string).collect();
    assert_eq!(names, ["Subject 1", "Subject 3"]);
}

#[test]
fn test_unlink_times_out_and_keeps_entry() {
    let mb = TestMailbox::with_config(MountConfig::fast().removal_timeout(SHORT));
    mb.seed(1, 2);
    mb.sync();

    mb.store.set_latency(STALL);
    let err = mb.view.unlink("/Subject 1").unwrap_err();
    assert!(err.is_transient());
    assert_eq!(err.to_errno(), libc::ETIMEDOUT);
    assert_eq!(mb.names(), ["Subject 1", "Subject 2"]);
    assert_eq!(mb.stats().removals_failed, 1);

    // The abandoned removal still finishes remotely; the next cycle catches up.
    let deadline = Instant::now() + Duration::from_secs(5);
    while mb.store.contains(1) {
        assert!(Instant::now() < deadline, "background removal never finished");
        thread::sleep(Duration::from_millis(10));
    }
    mb.store.set_latency(Duration::ZERO);
    assert_eq!(mb.sync(), ["Subject 2"]);
}
