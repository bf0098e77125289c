//! Testing utilities shared by the mount backend and its integration tests.
//!
//! - **Generators**: subjects that exercise the sanitizer, message bodies
//! - **Assertions**: byte and errno comparisons with useful messages
//!
//! # Usage
//!
//! ```ignore
//! use mailfs_mount::testing::{assert_bytes_equal, numbered_subjects, tagged_body};
//!
//! for (i, subject) in numbered_subjects(100).iter().enumerate() {
//!     store.insert_text(i as u64 + 1, subject.as_str(), &tagged_body(i as u64 + 1));
//! }
//! ```

pub mod assertions;
pub mod generators;

pub use assertions::{assert_bytes_equal, assert_errno, errno_name};
pub use generators::{
    blank_subject, control_subject, long_subject, numbered_subjects, random_body, slash_subject,
    tagged_body, unicode_subject,
};
