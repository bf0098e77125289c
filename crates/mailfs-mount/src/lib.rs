//! Backend-independent building blocks for the mail filesystem.
//!
//! # Components
//!
//! - [`path_mapper`] - subject sanitization and the path <-> message id
//!   table with collision naming
//! - [`HandleTable`] - open-file handles with auto-incrementing IDs
//! - [`stats`] - lock-free activity counters for a mount
//! - [`testing`] - generators and assertions for integration tests
//!
//! # Example
//!
//! ```
//! use mailfs_core::MessageMetadata;
//! use mailfs_mount::{HandleTable, PathTable, sanitize};
//!
//! assert_eq!(sanitize("Re: a/b"), "Re: a_b");
//!
//! let mut paths = PathTable::new();
//! paths.insert(MessageMetadata::new(1, "Hello", 120));
//! paths.insert(MessageMetadata::new(2, "Hello", 80));
//! assert_eq!(paths.path_of(2), Some("/Hello [2]"));
//!
//! let mut handles: HandleTable<Vec<u8>> = HandleTable::new();
//! let fh = handles.insert_auto(b"body".to_vec());
//! assert!(handles.contains(fh));
//! ```

#![warn(clippy::all)]

mod handle_table;
pub mod path_mapper;
pub mod stats;

pub use handle_table::HandleTable;
pub use path_mapper::{
    FilesystemEntry, MAX_NAME_BYTES, PathTable, UNNAMED, disambiguate, sanitize, to_path,
};
pub use stats::{MountStats, MountStatsSnapshot, format_bytes};

pub mod testing;
