//! The mail store capability and its implementations.
//!
//! The filesystem never talks to a protocol client directly. It depends on
//! [`MailStore`], which has one production implementation ([`ImapStore`])
//! and one in-memory implementation ([`MemoryStore`]) used by tests.
//!
//! All methods are blocking. Callers that must not stall (the FUSE dispatch
//! thread, the reconciliation task) wrap them in a timeout on a blocking
//! worker thread.

#[cfg(feature = "imap")]
mod imap;
mod memory;

#[cfg(feature = "imap")]
pub use self::imap::{Credentials, ImapConfig, ImapStore};
pub use memory::{MemoryStore, StoreCall};

use crate::error::StoreResult;
use crate::message::MessageMetadata;

/// Lazily produced listing of message metadata.
///
/// Finite. An `Err` item means the listing broke off and the items already
/// yielded are not the complete window.
pub type MetadataStream = Box<dyn Iterator<Item = StoreResult<MessageMetadata>> + Send>;

/// Operations the filesystem needs from a remote mailbox.
pub trait MailStore: Send + Sync {
    /// Lists metadata for the `window` most recent messages, oldest first.
    ///
    /// Only metadata is transferred; bodies are never fetched here.
    fn list_recent(&self, window: u32) -> StoreResult<MetadataStream>;

    /// Fetches the raw RFC 822 bytes of a single message.
    fn fetch_body(&self, id: u64) -> StoreResult<Vec<u8>>;

    /// Moves a message into `folder`.
    fn move_to_folder(&self, id: u64, folder: &str) -> StoreResult<()>;

    /// Marks a message deleted without removing it.
    fn flag_deleted(&self, id: u64) -> StoreResult<()>;

    /// Permanently removes every message marked deleted.
    fn purge(&self) -> StoreResult<()>;

    /// Collects [`list_recent`](Self::list_recent) into a vector, failing on
    /// the first broken item.
    fn list_recent_vec(&self, window: u32) -> StoreResult<Vec<MessageMetadata>> {
        self.list_recent(window)?.collect()
    }
}
