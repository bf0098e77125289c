//! Best-effort remote deletion.
//!
//! Providers disagree on how "delete" should look over IMAP. Gmail, for
//! example, only archives a message that is flagged and expunged; moving it
//! into the trash folder is what actually deletes it. So the protocol is:
//!
//! 1. Move the message to the first trash folder that accepts it, trying
//!    [`RemovalPolicy::trash_folders`] in order.
//! 2. If no folder accepts it, flag it `\Deleted` and expunge.
//!
//! If the flag succeeds but the expunge fails the message is left flagged.
//! That state is reported as [`RemovalError::PurgeFailed`] and is not
//! retried here; the next expunge from any client finishes the job.

use crate::error::StoreError;
use crate::store::MailStore;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Trash folder names tried in order when no custom list is configured.
pub const DEFAULT_TRASH_FOLDERS: &[&str] = &[
    "[Gmail]/Trash",
    "[Google Mail]/Trash",
    "Trash",
    "[Gmail]/Bin",
    "[Google Mail]/Bin",
];

/// Which folders count as trash, in preference order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovalPolicy {
    pub trash_folders: Vec<String>,
}

impl Default for RemovalPolicy {
    fn default() -> Self {
        Self {
            trash_folders: DEFAULT_TRASH_FOLDERS.iter().map(ToString::to_string).collect(),
        }
    }
}

impl RemovalPolicy {
    /// A policy that skips the move step and always flags and purges.
    pub fn purge_only() -> Self {
        Self {
            trash_folders: Vec::new(),
        }
    }

    pub fn with_folders<I, S>(folders: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            trash_folders: folders.into_iter().map(Into::into).collect(),
        }
    }
}

/// How a successful removal was carried out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemovalOutcome {
    /// Moved into this trash folder.
    MovedTo(String),
    /// Flagged deleted and expunged.
    Purged,
}

/// Why a removal did not complete.
#[derive(Debug, Error)]
pub enum RemovalError {
    /// The store does not have the message (already removed).
    #[error("message {0} not found")]
    NotFound(u64),

    /// Every move failed and so did marking the message deleted.
    /// Nothing changed remotely.
    #[error("could not flag message {id} as deleted: {source}")]
    FlagFailed {
        id: u64,
        #[source]
        source: StoreError,
    },

    /// The message is flagged deleted but was not expunged.
    #[error("message {id} flagged deleted but purge failed: {source}")]
    PurgeFailed {
        id: u64,
        #[source]
        source: StoreError,
    },
}

impl RemovalError {
    /// True when the remote message was left flagged but not purged.
    pub fn is_partial(&self) -> bool {
        matches!(self, RemovalError::PurgeFailed { .. })
    }
}

/// Removes message `id` from the selected mailbox.
///
/// Each step is one blocking store call; the caller bounds the total time.
pub fn remove_message(
    store: &dyn MailStore,
    id: u64,
    policy: &RemovalPolicy,
) -> Result<RemovalOutcome, RemovalError> {
    for folder in &policy.trash_folders {
        debug!(id, folder = %folder, "Moving message to trash");
        match store.move_to_folder(id, folder) {
            Ok(()) => {
                info!(id, folder = %folder, "Message moved to trash");
                return Ok(RemovalOutcome::MovedTo(folder.clone()));
            }
            Err(StoreError::NotFound(_)) => return Err(RemovalError::NotFound(id)),
            Err(e) => {
                debug!(id, folder = %folder, error = %e, "Move failed, trying next folder");
            }
        }
    }

    if !policy.trash_folders.is_empty() {
        warn!(
            id,
            attempted = policy.trash_folders.len(),
            "No trash folder accepted the message, falling back to flag and purge"
        );
    }

    match store.flag_deleted(id) {
        Ok(()) => {}
        Err(StoreError::NotFound(_)) => return Err(RemovalError::NotFound(id)),
        Err(source) => return Err(RemovalError::FlagFailed { id, source }),
    }

    store
        .purge()
        .map_err(|source| RemovalError::PurgeFailed { id, source })?;

    info!(id, "Message flagged deleted and purged");
    Ok(RemovalOutcome::Purged)
}
