//! Mail store access for mailfs.
//!
//! This crate holds everything that talks to (or stands in for) the remote
//! mailbox:
//!
//! - [`MessageMetadata`] - the immutable identity/subject/size triple
//! - [`store::MailStore`] - the capability trait the filesystem depends on
//! - [`store::ImapStore`] - the production IMAP implementation
//! - [`store::MemoryStore`] - an in-memory store for tests
//! - [`decode`] - raw RFC 822 bytes to plain text
//! - [`removal`] - trash-folder moves with flag-and-purge fallback
//!
//! # Usage
//!
//! ```ignore
//! use mailfs_core::store::{Credentials, ImapConfig, ImapStore, MailStore};
//!
//! let store = ImapStore::connect(&ImapConfig::new("imap.gmail.com", "me@gmail.com"), &creds)?;
//! for meta in store.list_recent(100)? {
//!     println!("{:?}", meta?);
//! }
//! ```

pub mod decode;
pub mod error;
pub mod message;
pub mod removal;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use message::MessageMetadata;
pub use removal::{remove_message, RemovalError, RemovalOutcome, RemovalPolicy};
pub use store::{MailStore, MemoryStore, MetadataStream, StoreCall};

#[cfg(feature = "imap")]
pub use store::{Credentials, ImapConfig, ImapStore};
