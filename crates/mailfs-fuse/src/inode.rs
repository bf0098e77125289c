//! Inode numbering for the FUSE filesystem.
//!
//! The directory is flat, so no table is needed: the root is inode 1 and
//! every message maps to `id + 2`. The mapping is stable for the lifetime
//! of a message and needs no lookup-count tracking.

/// The root inode number (FUSE convention).
pub const ROOT_INODE: u64 = 1;

const ID_OFFSET: u64 = 2;

/// Inode for message `id`.
///
/// Ids near `u64::MAX` saturate; IMAP UIDs are 32-bit so this never
/// happens with a real server.
#[inline]
pub fn inode_for(id: u64) -> u64 {
    id.saturating_add(ID_OFFSET)
}

/// Message id for inode `ino`, or `None` for the root and reserved inodes.
#[inline]
pub fn id_for(ino: u64) -> Option<u64> {
    ino.checked_sub(ID_OFFSET)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_is_not_a_message() {
        assert_eq!(id_for(ROOT_INODE), None);
        assert_eq!(id_for(0), None);
    }

    #[test]
    fn test_message_inodes() {
        assert_eq!(inode_for(0), 2);
        assert_eq!(id_for(inode_for(0)), Some(0));
        assert_eq!(id_for(inode_for(4321)), Some(4321));
        assert_ne!(inode_for(1), ROOT_INODE);
    }
}
