//! Message metadata as reported by the mail store.

/// Identity, subject and size of one remote message.
///
/// Produced by a [`MailStore`](crate::MailStore) listing and never mutated
/// afterwards. Two values describe the same message iff their `id`s match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageMetadata {
    /// Remote unique identifier (the IMAP UID).
    pub id: u64,
    /// Subject exactly as received, before any filename sanitization.
    pub subject: String,
    /// Size of the raw message in bytes. Zero means the store has not
    /// finished synchronizing the message yet.
    pub size_bytes: i64,
}

impl MessageMetadata {
    pub fn new(id: u64, subject: impl Into<String>, size_bytes: i64) -> Self {
        Self {
            id,
            subject: subject.into(),
            size_bytes,
        }
    }

    /// Returns false for placeholder entries the store reports with zero size.
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.size_bytes > 0
    }

    /// Size as an unsigned file length, clamping nonsense negative values to 0.
    #[inline]
    pub fn file_size(&self) -> u64 {
        u64::try_from(self.size_bytes).unwrap_or(0)
    }
}
