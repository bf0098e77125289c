//! The mailbox view: everything the filesystem shows, behind one lock.
//!
//! [`MailboxView`] owns the path table, the open-handle table, the unlink
//! tombstones and the receiving ends of the reconciliation channels. All of
//! it sits in a single [`Mutex`]. Remote calls (body fetches, removals) are
//! made with the lock released and their results are applied afterwards.
//!
//! The view is independent of FUSE. The [`crate::filesystem`] adapter maps
//! kernel callbacks onto it, and the integration tests drive it directly.

use crate::async_bridge::{BridgeStats, execute_blocking};
use crate::config::MountConfig;
use crate::error::{FuseError, FuseResult};
use crate::reconcile::{
    EventReceivers, ReconcileSettings, Reconciler, ReconcilerHandle, SnapshotSource, TickSource,
    event_channels,
};
use mailfs_core::{MailStore, MessageMetadata, RemovalOutcome, RemovalPolicy};
use mailfs_mount::{HandleTable, MountStats, PathTable};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Handle;
use tracing::{debug, info, trace, warn};

/// Path of the mount root.
pub const ROOT_PATH: &str = "/";

/// Attributes of a path in the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attributes {
    Root,
    File { id: u64, size: u64 },
}

/// One row of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    /// File name without the leading `/`.
    pub name: String,
    pub id: u64,
    pub size: u64,
}

/// A point-in-time copy of the directory, sorted by name.
///
/// Later changes to the view do not affect it, so a consumer can walk it
/// again from any position.
#[derive(Debug, Clone, Default)]
pub struct Listing {
    entries: Vec<ListingEntry>,
}

impl Listing {
    pub fn entries(&self) -> &[ListingEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    /// Feeds entries starting at `start` to `accept` until it returns false.
    ///
    /// Returns how many entries were accepted, or
    /// [`FuseError::ListingTruncated`] if `accept` refused one.
    pub fn fill<F>(&self, start: usize, accept: F) -> FuseResult<usize>
    where
        F: FnMut(&ListingEntry) -> bool,
    {
        fill_from(&self.entries, start, accept)
    }
}

/// Feeds `items[start..]` to `accept` until it returns false.
pub(crate) fn fill_from<T, F>(items: &[T], start: usize, mut accept: F) -> FuseResult<usize>
where
    F: FnMut(&T) -> bool,
{
    let mut delivered = 0;
    for item in items.iter().skip(start) {
        if !accept(item) {
            return Err(FuseError::ListingTruncated { delivered });
        }
        delivered += 1;
    }
    Ok(delivered)
}

/// A decoded body held for one open handle.
#[derive(Debug)]
struct OpenHandle {
    id: u64,
    body: Vec<u8>,
}

#[derive(Debug)]
struct ViewState {
    paths: PathTable,
    handles: HandleTable<OpenHandle>,
    /// Unlinked ids and when they were removed.
    tombstones: HashMap<u64, Instant>,
    events: Option<EventReceivers>,
}

/// The mailbox as a flat directory of plain-text files.
pub struct MailboxView {
    store: Arc<dyn MailStore>,
    handle: Handle,
    config: MountConfig,
    policy: RemovalPolicy,
    state: Mutex<ViewState>,
    stats: Arc<MountStats>,
    bridge_stats: Arc<BridgeStats>,
}

impl std::fmt::Debug for MailboxView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MailboxView")
            .field("entries", &state.paths.len())
            .field("open_handles", &state.handles.len())
            .field("tombstones", &state.tombstones.len())
            .finish_non_exhaustive()
    }
}

impl MailboxView {
    /// Creates an empty view with no event source.
    ///
    /// `handle` must belong to a multi-threaded runtime; remote calls run on
    /// its blocking pool.
    pub fn new(
        store: Arc<dyn MailStore>,
        handle: Handle,
        config: MountConfig,
        stats: Arc<MountStats>,
    ) -> Self {
        let policy = config.removal_policy();
        Self {
            store,
            handle,
            config,
            policy,
            state: Mutex::new(ViewState {
                paths: PathTable::new(),
                handles: HandleTable::new(),
                tombstones: HashMap::new(),
                events: None,
            }),
            stats,
            bridge_stats: BridgeStats::new(),
        }
    }

    /// Attaches the receiving ends of the reconciliation channels.
    #[must_use]
    pub fn with_events(self, events: EventReceivers) -> Self {
        self.state.lock().events = Some(events);
        self
    }

    /// Builds a view and the reconciliation loop that feeds it. The loop is
    /// not started.
    pub fn with_reconciler(
        store: Arc<dyn MailStore>,
        handle: Handle,
        config: MountConfig,
        stats: Arc<MountStats>,
    ) -> (Arc<Self>, Reconciler) {
        let (senders, receivers) = event_channels(config.channel_capacity);
        let settings = ReconcileSettings::from(&config);
        let view = Arc::new(
            Self::new(Arc::clone(&store), handle, config, Arc::clone(&stats))
                .with_events(receivers),
        );
        let snapshot: Arc<dyn SnapshotSource> = view.clone();
        let reconciler = Reconciler::new(store, snapshot, senders, settings, stats)
            .with_bridge_stats(Arc::clone(&view.bridge_stats));
        (view, reconciler)
    }

    /// Builds a view wired to a running reconciliation loop.
    pub fn spawn(
        store: Arc<dyn MailStore>,
        handle: Handle,
        config: MountConfig,
        stats: Arc<MountStats>,
        ticks: TickSource,
    ) -> (Arc<Self>, ReconcilerHandle) {
        let (view, reconciler) = Self::with_reconciler(store, handle.clone(), config, stats);
        let running = reconciler.spawn(&handle, ticks);
        (view, running)
    }

    pub fn config(&self) -> &MountConfig {
        &self.config
    }

    pub fn stats(&self) -> &Arc<MountStats> {
        &self.stats
    }

    pub fn bridge_stats(&self) -> &Arc<BridgeStats> {
        &self.bridge_stats
    }

    /// Drains both event channels without blocking. Returns how many events
    /// were applied.
    pub fn apply_pending_events(&self) -> usize {
        let mut state = self.state.lock();
        self.apply_locked(&mut state)
    }

    fn apply_locked(&self, state: &mut ViewState) -> usize {
        let ttl = self.config.effective_tombstone_ttl();
        state.tombstones.retain(|_, at| at.elapsed() < ttl);

        let ViewState {
            paths,
            tombstones,
            events,
            ..
        } = state;
        let Some(events) = events.as_mut() else {
            return 0;
        };

        let mut applied = 0;
        while let Ok(meta) = events.added.try_recv() {
            if tombstones.contains_key(&meta.id) {
                trace!(id = meta.id, "Ignoring add for recently unlinked message");
                continue;
            }
            if !meta.is_ready() {
                continue;
            }
            let path = paths.insert(meta);
            trace!(path, "Added entry");
            applied += 1;
        }
        while let Ok(meta) = events.removed.try_recv() {
            if let Some(entry) = paths.remove_by_id(meta.id) {
                trace!(path = %entry.path, "Removed entry");
                applied += 1;
            }
        }

        if applied > 0 {
            debug!(applied, entries = paths.len(), "Applied reconciliation events");
            self.stats.record_applied(applied as u64);
        }
        applied
    }

    /// Applies pending events, then copies the directory.
    pub fn list(&self) -> Listing {
        let mut state = self.state.lock();
        self.apply_locked(&mut state);
        self.stats.record_listing();
        Listing {
            entries: state
                .paths
                .iter()
                .map(|e| ListingEntry {
                    name: e.name().to_string(),
                    id: e.id(),
                    size: e.metadata.file_size(),
                })
                .collect(),
        }
    }

    /// Attributes for `path`.
    ///
    /// While a message has open handles its size is the decoded body length
    /// rather than the raw message size.
    pub fn attributes(&self, path: &str) -> FuseResult<Attributes> {
        if path == ROOT_PATH {
            return Ok(Attributes::Root);
        }
        let state = self.state.lock();
        let entry = state
            .paths
            .get(path)
            .ok_or_else(|| FuseError::NotFound(path.to_string()))?;
        Ok(self.file_attributes(&state, entry.id(), entry.metadata.file_size()))
    }

    /// Attributes for message `id`, if it is in the view.
    pub fn attributes_by_id(&self, id: u64) -> Option<Attributes> {
        let state = self.state.lock();
        let size = state.paths.get_by_id(id)?.metadata.file_size();
        Some(self.file_attributes(&state, id, size))
    }

    fn file_attributes(&self, state: &ViewState, id: u64, listed: u64) -> Attributes {
        let size = state
            .handles
            .values()
            .find(|h| h.id == id)
            .map_or(listed, |h| h.body.len() as u64);
        Attributes::File { id, size }
    }

    /// Path of message `id`, if it is in the view.
    pub fn path_of(&self, id: u64) -> Option<String> {
        self.state.lock().paths.path_of(id).map(str::to_string)
    }

    /// True if message `id` is in the view.
    pub fn contains(&self, id: u64) -> bool {
        self.state.lock().paths.contains_id(id)
    }

    /// Opens `path`: fetches and decodes the body, returns a new handle.
    pub fn open(&self, path: &str) -> FuseResult<u64> {
        let id = self
            .state
            .lock()
            .paths
            .get(path)
            .map(|e| e.id())
            .ok_or_else(|| FuseError::NotFound(path.to_string()))?;
        self.open_id(id)
    }

    /// Opens message `id` directly.
    pub fn open_id(&self, id: u64) -> FuseResult<u64> {
        let store = Arc::clone(&self.store);
        let fetched = execute_blocking(
            &self.handle,
            self.config.io_timeout,
            Some(&self.bridge_stats),
            move || store.fetch_body(id),
        );

        let raw = match fetched {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => return Err(self.fetch_failed(id, e.into())),
            Err(e) => return Err(self.fetch_failed(id, e.into())),
        };

        let body = mailfs_core::decode::plain_text(&raw).into_bytes();
        let size = body.len();
        let fh = self.state.lock().handles.insert_auto(OpenHandle { id, body });
        self.stats.record_fetch();
        debug!(id, fh, size, "Opened message");
        Ok(fh)
    }

    fn fetch_failed(&self, id: u64, error: FuseError) -> FuseError {
        warn!(id, error = %error, "Fetching message body failed");
        self.stats.record_fetch_failure();
        error
    }

    /// Reads up to `len` bytes at `offset`. Past the end reads empty.
    pub fn read(&self, fh: u64, offset: u64, len: usize) -> FuseResult<Vec<u8>> {
        let state = self.state.lock();
        let handle = state
            .handles
            .get(fh)
            .ok_or(FuseError::InvalidHandle(fh))?;
        let body = &handle.body;
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(body.len());
        let end = start.saturating_add(len).min(body.len());
        let data = body[start..end].to_vec();
        drop(state);
        self.stats.record_read(data.len() as u64);
        Ok(data)
    }

    /// Drops handle `fh`. Unknown handles are ignored.
    pub fn release(&self, fh: u64) {
        if self.state.lock().handles.remove(fh).is_some() {
            self.stats.record_close();
            trace!(fh, "Released handle");
        }
    }

    pub fn open_handle_count(&self) -> usize {
        self.state.lock().handles.len()
    }

    /// Removes the message at `path` from the remote mailbox.
    ///
    /// On success the entry disappears immediately. On failure it stays and
    /// the call can be retried.
    pub fn unlink(&self, path: &str) -> FuseResult<RemovalOutcome> {
        let id = self
            .state
            .lock()
            .paths
            .get(path)
            .map(|e| e.id())
            .ok_or_else(|| FuseError::NotFound(path.to_string()))?;

        let store = Arc::clone(&self.store);
        let policy = self.policy.clone();
        let result = execute_blocking(
            &self.handle,
            self.config.removal_timeout,
            Some(&self.bridge_stats),
            move || mailfs_core::remove_message(store.as_ref(), id, &policy),
        );

        match result {
            Ok(Ok(outcome)) => {
                let mut state = self.state.lock();
                state.paths.remove_by_id(id);
                state.tombstones.insert(id, Instant::now());
                drop(state);
                self.stats.record_removal_ok();
                info!(path, id, outcome = ?outcome, "Message removed");
                Ok(outcome)
            }
            Ok(Err(e)) => {
                if e.is_partial() {
                    self.stats.record_removal_partial();
                } else {
                    self.stats.record_removal_failed();
                }
                warn!(path, id, error = %e, "Removal failed, entry kept");
                Err(e.into())
            }
            Err(e) => {
                self.stats.record_removal_failed();
                warn!(path, id, error = %e, "Removal did not finish, entry kept");
                Err(e.into())
            }
        }
    }

    /// Number of entries currently visible, without applying events.
    pub fn len(&self) -> usize {
        self.state.lock().paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SnapshotSource for MailboxView {
    /// Applies pending events first so the loop diffs against everything it
    /// has already sent.
    fn snapshot(&self) -> Vec<MessageMetadata> {
        let mut state = self.state.lock();
        self.apply_locked(&mut state);
        state.paths.metadata()
    }
}
