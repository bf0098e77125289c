//! Error handling and mapping for the FUSE filesystem.
//!
//! Store and removal errors are folded into [`FuseError`], which knows the
//! POSIX error code FUSE hands back to the kernel.

use crate::async_bridge::BridgeError;
use mailfs_core::{RemovalError, StoreError};
use std::io;
use thiserror::Error;

/// Errors from filesystem operations.
#[derive(Debug, Error)]
pub enum FuseError {
    /// No entry at this path, or the remote no longer has the message.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Inode that maps to neither the root nor a known message.
    #[error("Invalid inode: {0}")]
    InvalidInode(u64),

    /// Handle that was never issued or was already released.
    #[error("Invalid file handle: {0}")]
    InvalidHandle(u64),

    /// The remote store failed. Transient; the next attempt may succeed.
    #[error("Remote unavailable: {0}")]
    RemoteUnavailable(String),

    /// Async bridge error (timeout, cancelled).
    #[error("Async bridge error: {0}")]
    Bridge(#[from] BridgeError),

    /// Message was flagged deleted but not purged.
    #[error("Partial removal: {0}")]
    PartialRemoval(#[source] RemovalError),

    /// The listing consumer stopped before the end. `delivered` entries
    /// were accepted.
    #[error("Listing truncated after {delivered} entries")]
    ListingTruncated { delivered: usize },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl FuseError {
    /// Converts this error to a libc error code for FUSE.
    pub fn to_errno(&self) -> i32 {
        match self {
            FuseError::NotFound(_) | FuseError::InvalidInode(_) => libc::ENOENT,
            FuseError::InvalidHandle(_) => libc::EBADF,
            FuseError::RemoteUnavailable(_) | FuseError::PartialRemoval(_) => libc::EIO,
            FuseError::Bridge(e) => e.to_errno(),
            FuseError::ListingTruncated { .. } => libc::ENOBUFS,
            FuseError::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
        }
    }

    /// True for failures that may go away on their own (remote outages,
    /// timeouts). `NotFound` and partial removals are never transient.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FuseError::RemoteUnavailable(_) | FuseError::Bridge(BridgeError::Timeout(_))
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FuseError::NotFound(_) | FuseError::InvalidInode(_))
    }
}

impl From<StoreError> for FuseError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => FuseError::NotFound(format!("message {id}")),
            other => FuseError::RemoteUnavailable(other.to_string()),
        }
    }
}

impl From<RemovalError> for FuseError {
    fn from(e: RemovalError) -> Self {
        match e {
            RemovalError::NotFound(id) => FuseError::NotFound(format!("message {id}")),
            partial @ RemovalError::PurgeFailed { .. } => FuseError::PartialRemoval(partial),
            RemovalError::FlagFailed { source, .. } => {
                FuseError::RemoteUnavailable(source.to_string())
            }
        }
    }
}

/// Result type for FUSE operations.
pub type FuseResult<T> = Result<T, FuseError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_errno_mapping() {
        assert_eq!(FuseError::NotFound("/x".into()).to_errno(), libc::ENOENT);
        assert_eq!(FuseError::InvalidInode(9).to_errno(), libc::ENOENT);
        assert_eq!(FuseError::InvalidHandle(1).to_errno(), libc::EBADF);
        assert_eq!(FuseError::RemoteUnavailable("down".into()).to_errno(), libc::EIO);
        assert_eq!(
            FuseError::ListingTruncated { delivered: 3 }.to_errno(),
            libc::ENOBUFS
        );
        assert_eq!(
            FuseError::Bridge(BridgeError::Timeout(Duration::from_secs(1))).to_errno(),
            libc::ETIMEDOUT
        );
    }

    #[test]
    fn test_io_error_mapping() {
        let e = FuseError::Io(io::Error::from_raw_os_error(libc::EACCES));
        assert_eq!(e.to_errno(), libc::EACCES);

        let e = FuseError::Io(io::Error::other("custom error"));
        assert_eq!(e.to_errno(), libc::EIO);
    }

    #[test]
    fn test_store_error_conversion() {
        let e: FuseError = StoreError::NotFound(4).into();
        assert!(e.is_not_found());
        assert!(!e.is_transient());

        let e: FuseError = StoreError::Connection("reset".into()).into();
        assert!(matches!(e, FuseError::RemoteUnavailable(_)));
        assert!(e.is_transient());
    }

    #[test]
    fn test_removal_error_conversion() {
        let e: FuseError = RemovalError::NotFound(1).into();
        assert_eq!(e.to_errno(), libc::ENOENT);

        let e: FuseError = RemovalError::PurgeFailed {
            id: 1,
            source: StoreError::Protocol("NO".into()),
        }
        .into();
        assert!(matches!(e, FuseError::PartialRemoval(_)));
        assert!(!e.is_transient());

        let e: FuseError = RemovalError::FlagFailed {
            id: 1,
            source: StoreError::Protocol("NO".into()),
        }
        .into();
        assert!(e.is_transient());
    }

    #[test]
    fn test_cancelled_is_not_transient() {
        assert!(!FuseError::Bridge(BridgeError::Cancelled).is_transient());
    }
}
