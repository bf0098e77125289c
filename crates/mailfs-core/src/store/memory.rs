//! In-memory mail store for tests.
//!
//! Behaves like a single selected mailbox: messages are ordered by id, a
//! move takes the message out of the mailbox, and `purge` drops everything
//! flagged. Individual operations can be made to fail so callers can
//! exercise their fallback paths.

use super::{MailStore, MetadataStream};
use crate::error::{StoreError, StoreResult};
use crate::message::MessageMetadata;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::time::Duration;

/// A call recorded by [`MemoryStore`], in the order it was made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    ListRecent(u32),
    FetchBody(u64),
    Move(u64, String),
    FlagDeleted(u64),
    Purge,
}

#[derive(Debug, Clone)]
struct StoredMessage {
    subject: String,
    raw: Vec<u8>,
    /// Reported size; zero marks a not-yet-synchronized placeholder.
    reported_size: i64,
}

#[derive(Debug, Default)]
struct State {
    messages: BTreeMap<u64, StoredMessage>,
    flagged: BTreeSet<u64>,
    /// Folder name -> ids moved there.
    folders: BTreeMap<String, Vec<u64>>,
    calls: Vec<StoreCall>,
    fail_listing: bool,
    fail_fetch: bool,
    failing_folders: HashSet<String>,
    fail_flag: bool,
    fail_purge: bool,
    latency: Duration,
}

/// Thread-safe in-memory [`MailStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    /// Creates an empty store in which every folder accepts moves.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a message whose raw content is `raw`; the reported size is its length.
    pub fn insert(&self, id: u64, subject: impl Into<String>, raw: impl Into<Vec<u8>>) {
        let raw = raw.into();
        let reported_size = i64::try_from(raw.len()).unwrap_or(i64::MAX);
        self.state.lock().messages.insert(
            id,
            StoredMessage {
                subject: subject.into(),
                raw,
                reported_size,
            },
        );
    }

    /// Adds a plain-text message built from `subject` and `body`.
    pub fn insert_text(&self, id: u64, subject: impl Into<String>, body: &str) {
        let subject = subject.into();
        let raw = format!(
            "Subject: {subject}\r\nContent-Type: text/plain; charset=utf-8\r\n\r\n{body}"
        );
        self.insert(id, subject, raw.into_bytes());
    }

    /// Adds a message that reports zero size, like one still being synchronized.
    pub fn insert_placeholder(&self, id: u64, subject: impl Into<String>) {
        self.state.lock().messages.insert(
            id,
            StoredMessage {
                subject: subject.into(),
                raw: Vec::new(),
                reported_size: 0,
            },
        );
    }

    /// Removes a message as if another client deleted it.
    pub fn delete(&self, id: u64) -> bool {
        self.state.lock().messages.remove(&id).is_some()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.state.lock().messages.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.state.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().messages.is_empty()
    }

    /// Ids currently flagged deleted but not yet purged.
    pub fn flagged(&self) -> Vec<u64> {
        self.state.lock().flagged.iter().copied().collect()
    }

    /// Ids moved into `folder`, in move order.
    pub fn folder_contents(&self, folder: &str) -> Vec<u64> {
        self.state
            .lock()
            .folders
            .get(folder)
            .cloned()
            .unwrap_or_default()
    }

    /// All calls made so far.
    pub fn calls(&self) -> Vec<StoreCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn set_fail_listing(&self, fail: bool) {
        self.state.lock().fail_listing = fail;
    }

    pub fn set_fail_fetch(&self, fail: bool) {
        self.state.lock().fail_fetch = fail;
    }

    /// Makes moves into `folder` fail as if the folder did not exist.
    pub fn fail_folder(&self, folder: impl Into<String>) {
        self.state.lock().failing_folders.insert(folder.into());
    }

    pub fn set_fail_flag(&self, fail: bool) {
        self.state.lock().fail_flag = fail;
    }

    pub fn set_fail_purge(&self, fail: bool) {
        self.state.lock().fail_purge = fail;
    }

    /// Delays every call by `latency`, to simulate a slow server.
    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = latency;
    }

    /// Records the call and returns the configured latency.
    fn begin(&self, call: StoreCall) -> Duration {
        let mut state = self.state.lock();
        state.calls.push(call);
        state.latency
    }

    fn stall(latency: Duration) {
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }
    }
}

impl MailStore for MemoryStore {
    fn list_recent(&self, window: u32) -> StoreResult<MetadataStream> {
        Self::stall(self.begin(StoreCall::ListRecent(window)));
        let state = self.state.lock();
        if state.fail_listing {
            return Err(StoreError::Connection("listing unavailable".to_string()));
        }
        let window = usize::try_from(window).unwrap_or(usize::MAX);
        let skip = state.messages.len().saturating_sub(window);
        let items: Vec<_> = state
            .messages
            .iter()
            .skip(skip)
            .map(|(id, msg)| Ok(MessageMetadata::new(*id, msg.subject.clone(), msg.reported_size)))
            .collect();
        Ok(Box::new(items.into_iter()))
    }

    fn fetch_body(&self, id: u64) -> StoreResult<Vec<u8>> {
        Self::stall(self.begin(StoreCall::FetchBody(id)));
        let state = self.state.lock();
        if state.fail_fetch {
            return Err(StoreError::Connection("fetch unavailable".to_string()));
        }
        state
            .messages
            .get(&id)
            .map(|msg| msg.raw.clone())
            .ok_or(StoreError::NotFound(id))
    }

    fn move_to_folder(&self, id: u64, folder: &str) -> StoreResult<()> {
        Self::stall(self.begin(StoreCall::Move(id, folder.to_string())));
        let mut state = self.state.lock();
        if state.failing_folders.contains(folder) {
            return Err(StoreError::Protocol(format!("[TRYCREATE] no folder {folder}")));
        }
        if state.messages.remove(&id).is_none() {
            return Err(StoreError::NotFound(id));
        }
        state.flagged.remove(&id);
        state.folders.entry(folder.to_string()).or_default().push(id);
        Ok(())
    }

    fn flag_deleted(&self, id: u64) -> StoreResult<()> {
        Self::stall(self.begin(StoreCall::FlagDeleted(id)));
        let mut state = self.state.lock();
        if state.fail_flag {
            return Err(StoreError::Protocol("STORE refused".to_string()));
        }
        if !state.messages.contains_key(&id) {
            return Err(StoreError::NotFound(id));
        }
        state.flagged.insert(id);
        Ok(())
    }

    fn purge(&self) -> StoreResult<()> {
        Self::stall(self.begin(StoreCall::Purge));
        let mut state = self.state.lock();
        if state.fail_purge {
            return Err(StoreError::Protocol("EXPUNGE refused".to_string()));
        }
        let flagged = std::mem::take(&mut state.flagged);
        for id in flagged {
            state.messages.remove(&id);
        }
        Ok(())
    }
}
