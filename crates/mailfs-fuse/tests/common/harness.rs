//! Test harness driving a [`MailboxView`] and its reconciliation loop.
//!
//! No kernel FUSE is involved: the harness owns a runtime, an in-memory
//! store and a manually triggered loop, and calls the view the way the
//! filesystem adapter does.

// Not all tests use all TestMailbox methods
#![allow(dead_code)]

use mailfs_core::MemoryStore;
use mailfs_fuse::{
    FuseError, MailboxView, ManualTrigger, MountConfig, ReconcilerHandle, TickSource,
};
use mailfs_mount::{MountStats, MountStatsSnapshot};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;

/// How long to wait for a reconciliation cycle to finish.
const CYCLE_TIMEOUT: Duration = Duration::from_secs(10);

/// How long to sleep between checks while waiting.
const CYCLE_CHECK_INTERVAL: Duration = Duration::from_millis(5);

/// A mailbox view backed by [`MemoryStore`], with a manual tick.
pub struct TestMailbox {
    pub store: Arc<MemoryStore>,
    pub view: Arc<MailboxView>,
    trigger: ManualTrigger,
    reconciler: ReconcilerHandle,
    // Dropped last so the loop and blocking calls can finish.
    _runtime: Runtime,
}

impl TestMailbox {
    pub fn new() -> Self {
        Self::with_config(MountConfig::fast())
    }

    pub fn with_config(config: MountConfig) -> Self {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .expect("failed to build runtime");
        let store = Arc::new(MemoryStore::new());
        let (trigger, ticks) = TickSource::manual();
        let (view, reconciler) = MailboxView::spawn(
            store.clone(),
            runtime.handle().clone(),
            config,
            Arc::new(MountStats::new()),
            ticks,
        );
        Self {
            store,
            view,
            trigger,
            reconciler,
            _runtime: runtime,
        }
    }

    pub fn stats(&self) -> MountStatsSnapshot {
        self.view.stats().snapshot()
    }

    fn cycles_finished(&self) -> u64 {
        let s = self.stats();
        s.cycles_run + s.cycles_failed + s.cycles_abandoned
    }

    /// Runs one reconciliation cycle and waits for it to finish.
    pub fn cycle(&self) {
        let before = self.cycles_finished();
        assert!(self.trigger.tick(), "reconciliation loop has stopped");
        let deadline = Instant::now() + CYCLE_TIMEOUT;
        while self.cycles_finished() == before {
            assert!(
                Instant::now() < deadline,
                "reconciliation cycle did not finish within {CYCLE_TIMEOUT:?}"
            );
            thread::sleep(CYCLE_CHECK_INTERVAL);
        }
    }

    /// Runs a cycle and returns the resulting listing's names.
    pub fn sync(&self) -> Vec<String> {
        self.cycle();
        self.names()
    }

    /// Names in the current listing (applies pending events).
    pub fn names(&self) -> Vec<String> {
        self.view.list().names().map(str::to_string).collect()
    }

    /// Adds `n` plain-text messages with ids `first..first + n`.
    pub fn seed(&self, first: u64, n: u64) {
        for id in first..first + n {
            self.store
                .insert_text(id, format!("Subject {id}"), &mailfs_mount::testing::tagged_body(id));
        }
    }

    /// Opens, reads fully and releases `path`.
    pub fn read_all(&self, path: &str) -> Result<Vec<u8>, FuseError> {
        let fh = self.view.open(path)?;
        let mut out = Vec::new();
        loop {
            let chunk = self.view.read(fh, out.len() as u64, 7)?;
            if chunk.is_empty() {
                break;
            }
            out.extend_from_slice(&chunk);
        }
        self.view.release(fh);
        Ok(out)
    }

    /// Maps a view result to an errno result for `assert_errno`.
    pub fn errno<T>(result: Result<T, FuseError>) -> Result<T, i32> {
        result.map_err(|e| e.to_errno())
    }
}

impl Drop for TestMailbox {
    fn drop(&mut self) {
        self.reconciler.shutdown();
    }
}
