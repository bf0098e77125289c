//! Background reconciliation between the remote mailbox and the view.
//!
//! Each tick the [`Reconciler`] lists the most recent window of messages,
//! diffs it against the snapshot the controller currently holds, and sends
//! the difference as `Added`/`Removed` events over two bounded channels.
//! The loop never touches the path table itself; the controller drains the
//! channels when it is next asked for a listing.
//!
//! Failure handling:
//! - a failed or timed-out listing skips the cycle; the next tick retries
//! - a channel that stays full for `send_timeout` abandons the rest of the
//!   cycle; events are idempotent, so the next cycle resends what is missing
//! - closed channels (the controller is gone) end the loop

use crate::async_bridge::{BridgeStats, blocking_with_timeout};
use crate::config::MountConfig;
use crate::error::FuseError;
use mailfs_core::{MailStore, MessageMetadata};
use mailfs_mount::MountStats;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Sending halves of the event channels, owned by the loop.
#[derive(Debug, Clone)]
pub struct EventSenders {
    pub(crate) added: mpsc::Sender<MessageMetadata>,
    pub(crate) removed: mpsc::Sender<MessageMetadata>,
}

/// Receiving halves, owned by the controller.
#[derive(Debug)]
pub struct EventReceivers {
    pub(crate) added: mpsc::Receiver<MessageMetadata>,
    pub(crate) removed: mpsc::Receiver<MessageMetadata>,
}

/// Creates the `Added` and `Removed` channels, each holding `capacity` events.
pub fn event_channels(capacity: usize) -> (EventSenders, EventReceivers) {
    let (added_tx, added_rx) = mpsc::channel(capacity.max(1));
    let (removed_tx, removed_rx) = mpsc::channel(capacity.max(1));
    (
        EventSenders {
            added: added_tx,
            removed: removed_tx,
        },
        EventReceivers {
            added: added_rx,
            removed: removed_rx,
        },
    )
}

/// Result of diffing a snapshot against a remote listing.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Delta {
    /// Remote and ready, not known locally. In listing order.
    pub added: Vec<MessageMetadata>,
    /// Known locally, not among the ready remote messages.
    pub removed: Vec<MessageMetadata>,
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Diffs `known` against `remote` by message id.
///
/// Remote items with zero size are placeholders that are not yet
/// synchronized and count as absent. Duplicate remote ids are reported once.
pub fn diff(known: &[MessageMetadata], remote: &[MessageMetadata]) -> Delta {
    let known_ids: HashSet<u64> = known.iter().map(|m| m.id).collect();

    let mut ready: HashMap<u64, &MessageMetadata> = HashMap::with_capacity(remote.len());
    let mut added = Vec::new();
    for item in remote.iter().filter(|m| m.is_ready()) {
        if ready.insert(item.id, item).is_none() && !known_ids.contains(&item.id) {
            added.push(item.clone());
        }
    }

    let removed = known
        .iter()
        .filter(|m| !ready.contains_key(&m.id))
        .cloned()
        .collect();

    Delta { added, removed }
}

/// Source of the metadata the controller currently holds.
pub trait SnapshotSource: Send + Sync {
    fn snapshot(&self) -> Vec<MessageMetadata>;
}

impl<F> SnapshotSource for F
where
    F: Fn() -> Vec<MessageMetadata> + Send + Sync,
{
    fn snapshot(&self) -> Vec<MessageMetadata> {
        self()
    }
}

/// What drives reconciliation cycles.
#[derive(Debug)]
pub enum TickSource {
    /// Cycle immediately, then every interval. A zero interval never cycles.
    Interval(Duration),
    /// Cycle once per trigger received.
    Manual(mpsc::UnboundedReceiver<()>),
    /// Never cycle.
    Never,
}

impl TickSource {
    /// Periodic ticks, or [`TickSource::Never`] for a zero period.
    pub fn every(period: Duration) -> TickSource {
        if period.is_zero() {
            TickSource::Never
        } else {
            TickSource::Interval(period)
        }
    }

    /// A manual tick source and the trigger that drives it.
    pub fn manual() -> (ManualTrigger, TickSource) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ManualTrigger { tx }, TickSource::Manual(rx))
    }
}

/// Fires cycles on a [`TickSource::Manual`]. Usable from any thread.
#[derive(Debug, Clone)]
pub struct ManualTrigger {
    tx: mpsc::UnboundedSender<()>,
}

impl ManualTrigger {
    /// Requests one cycle. Returns false if the loop has stopped.
    pub fn tick(&self) -> bool {
        self.tx.send(()).is_ok()
    }
}

/// How a single cycle ended.
#[derive(Debug)]
pub enum CycleOutcome {
    Completed { added: usize, removed: usize },
    /// Listing failed; nothing was sent.
    ListingFailed(FuseError),
    /// A channel stayed full; `sent` events went out before giving up.
    Abandoned { sent: usize },
    /// The controller dropped its receivers.
    Closed,
}

/// Settings the loop needs from [`MountConfig`].
#[derive(Debug, Clone, Copy)]
pub struct ReconcileSettings {
    pub window_size: u32,
    pub io_timeout: Duration,
    pub send_timeout: Duration,
}

impl From<&MountConfig> for ReconcileSettings {
    fn from(config: &MountConfig) -> Self {
        Self {
            window_size: config.window_size,
            io_timeout: config.io_timeout,
            send_timeout: config.send_timeout,
        }
    }
}

/// The reconciliation loop.
pub struct Reconciler {
    store: Arc<dyn MailStore>,
    snapshot: Arc<dyn SnapshotSource>,
    senders: EventSenders,
    settings: ReconcileSettings,
    stats: Arc<MountStats>,
    bridge_stats: Option<Arc<BridgeStats>>,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn MailStore>,
        snapshot: Arc<dyn SnapshotSource>,
        senders: EventSenders,
        settings: ReconcileSettings,
        stats: Arc<MountStats>,
    ) -> Self {
        Self {
            store,
            snapshot,
            senders,
            settings,
            stats,
            bridge_stats: None,
        }
    }

    #[must_use]
    pub fn with_bridge_stats(mut self, stats: Arc<BridgeStats>) -> Self {
        self.bridge_stats = Some(stats);
        self
    }

    /// Runs one list-diff-send cycle.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let known = self.snapshot.snapshot();

        let store = Arc::clone(&self.store);
        let window = self.settings.window_size;
        let listing = blocking_with_timeout(
            self.settings.io_timeout,
            self.bridge_stats.as_deref(),
            move || store.list_recent_vec(window),
        )
        .await;

        let remote = match listing {
            Ok(Ok(items)) => items,
            Ok(Err(e)) => return self.listing_failed(e.into()),
            Err(e) => return self.listing_failed(e.into()),
        };

        let delta = diff(&known, &remote);
        trace!(
            known = known.len(),
            remote = remote.len(),
            added = delta.added.len(),
            removed = delta.removed.len(),
            "Reconciliation diff"
        );

        let (added, removed) = (delta.added.len(), delta.removed.len());
        let mut sent = 0;
        let outgoing = delta
            .added
            .into_iter()
            .map(|m| (&self.senders.added, m))
            .chain(delta.removed.into_iter().map(|m| (&self.senders.removed, m)));

        for (channel, message) in outgoing {
            let id = message.id;
            match channel.send_timeout(message, self.settings.send_timeout).await {
                Ok(()) => sent += 1,
                Err(SendTimeoutError::Timeout(_)) => {
                    warn!(
                        id,
                        sent,
                        pending = added + removed - sent,
                        "Event channel full, abandoning cycle"
                    );
                    self.stats.record_cycle_abandoned();
                    return CycleOutcome::Abandoned { sent };
                }
                Err(SendTimeoutError::Closed(_)) => return CycleOutcome::Closed,
            }
        }

        self.stats.record_added(added as u64);
        self.stats.record_removed(removed as u64);
        self.stats.record_cycle();
        if added + removed > 0 {
            debug!(added, removed, "Reconciliation cycle sent events");
        }
        CycleOutcome::Completed { added, removed }
    }

    fn listing_failed(&self, error: FuseError) -> CycleOutcome {
        warn!(error = %error, "Listing recent messages failed, retrying next tick");
        self.stats.record_cycle_failed();
        CycleOutcome::ListingFailed(error)
    }

    /// Runs cycles on every tick until the tick source ends or the
    /// controller goes away.
    pub async fn run(self, ticks: TickSource) {
        info!(
            window = self.settings.window_size,
            "Reconciliation loop started"
        );
        match ticks {
            TickSource::Interval(period) if period.is_zero() => {
                warn!("Poll interval is zero, background refresh disabled");
            }
            TickSource::Interval(period) => {
                let mut interval = tokio::time::interval(period);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    interval.tick().await;
                    if matches!(self.run_cycle().await, CycleOutcome::Closed) {
                        break;
                    }
                }
            }
            TickSource::Manual(mut rx) => {
                while rx.recv().await.is_some() {
                    if matches!(self.run_cycle().await, CycleOutcome::Closed) {
                        break;
                    }
                }
            }
            TickSource::Never => {}
        }
        info!("Reconciliation loop stopped");
    }

    /// Spawns [`run`](Self::run) on `handle`.
    pub fn spawn(self, handle: &Handle, ticks: TickSource) -> ReconcilerHandle {
        ReconcilerHandle {
            task: handle.spawn(self.run(ticks)),
        }
    }
}

/// Running reconciliation loop. Dropping it leaves the loop running.
#[derive(Debug)]
pub struct ReconcilerHandle {
    task: JoinHandle<()>,
}

impl ReconcilerHandle {
    /// Stops the loop at its next await point.
    pub fn shutdown(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}


#[cfg(test)]
mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    fn metas(ids: &[(u64, bool)]) -> Vec<MessageMetadata> {
        ids.iter()
            .map(|&(id, ready)| MessageMetadata::new(id, format!("m{id}"), i64::from(ready)))
            .collect()
    }

    proptest! {
        #[test]
        fn diff_matches_set_difference(
            known in proptest::collection::hash_set(0u64..50, 0..30),
            remote in proptest::collection::vec((0u64..50, any::<bool>()), 0..40),
        ) {
            let known: Vec<MessageMetadata> = known
                .into_iter()
                .map(|id| MessageMetadata::new(id, format!("m{id}"), 1))
                .collect();
            let remote = metas(&remote);
            let delta = diff(&known, &remote);

            let k: HashSet<u64> = known.iter().map(|m| m.id).collect();
            let r: HashSet<u64> = remote.iter().filter(|m| m.is_ready()).map(|m| m.id).collect();

            let added: HashSet<u64> = delta.added.iter().map(|m| m.id).collect();
            let removed: HashSet<u64> = delta.removed.iter().map(|m| m.id).collect();

            prop_assert_eq!(added.len(), delta.added.len());
            prop_assert_eq!(&added, &r.difference(&k).copied().collect());
            prop_assert_eq!(&removed, &k.difference(&r).copied().collect());
            prop_assert!(delta.added.iter().all(MessageMetadata::is_ready));
        }
    }
}
