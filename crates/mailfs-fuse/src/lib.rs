//! FUSE filesystem for IMAP mailboxes.
//!
//! Mounts the most recent messages of one mailbox as a flat directory. Each
//! message is a read-only file named after its sanitized subject, holding
//! the decoded plain-text body. Deleting a file removes the message on the
//! server.
//!
//! # Features
//!
//! - Background reconciliation with the server on a configurable interval
//! - Bodies fetched on open, never prefetched
//! - Every remote call bounded by a timeout
//! - Trash-folder removal with a flag-and-purge fallback
//!
//! # Usage
//!
//! ```ignore
//! use mailfs_fuse::{FuseBackend, MailFs, MountConfig, MountOptions};
//!
//! let fs = MailFs::with_config(store, MountConfig::default())?;
//! let handle = FuseBackend::new().mount(fs, mountpoint, &MountOptions::default())?;
//! ```

pub mod async_bridge;
pub mod backend;
pub mod config;
pub mod error;
pub mod filesystem;
pub mod inode;
pub mod reconcile;
pub mod view;

pub use async_bridge::{BridgeError, BridgeStats};
pub use backend::{FuseBackend, MailMountHandle, MountError, MountOptions};
pub use config::MountConfig;
pub use error::{FuseError, FuseResult};
pub use filesystem::MailFs;
pub use inode::ROOT_INODE;
pub use reconcile::{
    CycleOutcome, Delta, EventReceivers, EventSenders, ManualTrigger, ReconcileSettings,
    Reconciler, ReconcilerHandle, SnapshotSource, TickSource, diff, event_channels,
};
pub use view::{Attributes, Listing, ListingEntry, MailboxView, ROOT_PATH};
