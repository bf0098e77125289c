//! Subject-to-path mapping for the flat message directory.
//!
//! Every message is exposed as `"/" + name`, where `name` is derived from
//! its subject by [`sanitize`]. Subjects are not unique, so [`PathTable`]
//! resolves collisions by giving later arrivals a name that carries the
//! message id (see [`disambiguate`]).
//!
//! # Design
//!
//! The table keeps two maps:
//! - `by_path`: path -> entry, ordered so listings are deterministic
//! - `by_id`: message id -> path, the secondary index used for removals
//!
//! Removal always goes through `by_id`. Recomputing a name from the subject
//! would find the wrong entry whenever a collision suffix was applied.
//!
//! The table is not synchronized. Callers keep it behind their own lock
//! together with the handle table.

use mailfs_core::MessageMetadata;
use std::collections::{BTreeMap, HashMap};

/// Longest file name, in bytes, most filesystems accept (`NAME_MAX`).
pub const MAX_NAME_BYTES: usize = 255;

/// Name used when nothing printable is left of a subject.
pub const UNNAMED: &str = "unnamed";

/// Turns an arbitrary subject line into a safe single-component file name.
///
/// Removes NUL and other control characters, replaces `/` with `_`, trims
/// surrounding whitespace and caps the result at [`MAX_NAME_BYTES`] by
/// dropping whole characters from the end. Names that come out empty, or as
/// `.`/`..`, become [`UNNAMED`].
///
/// Pure and total. `sanitize(sanitize(s)) == sanitize(s)` for every `s`.
pub fn sanitize(subject: &str) -> String {
    let cleaned: String = subject
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| if c == '/' { '_' } else { c })
        .collect();

    let mut name = cleaned.trim().to_string();
    truncate_to_bytes(&mut name, MAX_NAME_BYTES);
    // Truncation can expose trailing whitespace.
    let trimmed_len = name.trim_end().len();
    name.truncate(trimmed_len);

    if name.is_empty() || name == "." || name == ".." {
        return UNNAMED.to_string();
    }
    name
}

/// Drops characters from the end of `s` until it fits in `max` bytes.
fn truncate_to_bytes(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    s.truncate(cut);
}

/// Builds the collision name for message `id` whose plain name is taken.
///
/// The result is `"<name> [<id>]"`, with `name` shortened so the whole stays
/// within [`MAX_NAME_BYTES`]. `attempt` > 0 adds a counter for the unlikely
/// case where that name is itself already in use.
pub fn disambiguate(name: &str, id: u64, attempt: u32) -> String {
    let suffix = if attempt == 0 {
        format!(" [{id}]")
    } else {
        format!(" [{id}.{attempt}]")
    };
    let mut base = name.to_string();
    truncate_to_bytes(&mut base, MAX_NAME_BYTES.saturating_sub(suffix.len()));
    let trimmed_len = base.trim_end().len();
    base.truncate(trimmed_len);
    base.push_str(&suffix);
    base
}

/// Absolute path for a file name in the root directory.
#[inline]
pub fn to_path(name: &str) -> String {
    format!("/{name}")
}

/// One file in the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilesystemEntry {
    /// Absolute path, `"/" + name`.
    pub path: String,
    pub metadata: MessageMetadata,
}

impl FilesystemEntry {
    /// The file name without the leading `/`.
    pub fn name(&self) -> &str {
        self.path.strip_prefix('/').unwrap_or(&self.path)
    }

    pub fn id(&self) -> u64 {
        self.metadata.id
    }
}

/// Path <-> message id table. At most one entry per path and per id.
#[derive(Debug, Default)]
pub struct PathTable {
    by_path: BTreeMap<String, FilesystemEntry>,
    by_id: HashMap<u64, String>,
}

impl PathTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `metadata` and returns the path it is visible at.
    ///
    /// A message id that is already present keeps its path and has its
    /// metadata refreshed. A new id whose sanitized path belongs to another
    /// message gets a [`disambiguate`]d name instead.
    pub fn insert(&mut self, metadata: MessageMetadata) -> &str {
        let id = metadata.id;

        if let Some(path) = self.by_id.get(&id).cloned() {
            let entry = self
                .by_path
                .entry(path.clone())
                .or_insert_with(|| FilesystemEntry {
                    path,
                    metadata: metadata.clone(),
                });
            entry.metadata = metadata;
            return &entry.path;
        }

        let name = sanitize(&metadata.subject);
        let mut path = to_path(&name);
        let mut attempt = 0;
        while self.by_path.contains_key(&path) {
            path = to_path(&disambiguate(&name, id, attempt));
            attempt += 1;
        }

        self.by_id.insert(id, path.clone());
        let entry = self.by_path.entry(path.clone()).or_insert(FilesystemEntry {
            path,
            metadata,
        });
        &entry.path
    }

    /// Removes the entry for message `id`, wherever it lives.
    pub fn remove_by_id(&mut self, id: u64) -> Option<FilesystemEntry> {
        let path = self.by_id.remove(&id)?;
        self.by_path.remove(&path)
    }

    pub fn remove_by_path(&mut self, path: &str) -> Option<FilesystemEntry> {
        let entry = self.by_path.remove(path)?;
        self.by_id.remove(&entry.metadata.id);
        Some(entry)
    }

    pub fn get(&self, path: &str) -> Option<&FilesystemEntry> {
        self.by_path.get(path)
    }

    pub fn get_by_id(&self, id: u64) -> Option<&FilesystemEntry> {
        self.by_id.get(&id).and_then(|path| self.by_path.get(path))
    }

    pub fn path_of(&self, id: u64) -> Option<&str> {
        self.by_id.get(&id).map(String::as_str)
    }

    pub fn contains_id(&self, id: u64) -> bool {
        self.by_id.contains_key(&id)
    }

    /// Entries in path order.
    pub fn iter(&self) -> impl Iterator<Item = &FilesystemEntry> {
        self.by_path.values()
    }

    /// Copies out the metadata of every entry.
    pub fn metadata(&self) -> Vec<MessageMetadata> {
        self.by_path.values().map(|e| e.metadata.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_path.clear();
        self.by_id.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(id: u64, subject: &str) -> MessageMetadata {
        MessageMetadata::new(id, subject, 100)
    }

    #[test]
    fn test_sanitize_basic() {
        assert_eq!(sanitize("Hello World"), "Hello World");
        assert_eq!(sanitize("a/b/c"), "a_b_c");
        assert_eq!(sanitize("  padded  "), "padded");
        assert_eq!(sanitize("nul\0byte"), "nulbyte");
        assert_eq!(sanitize("tab\there\r\n"), "tabhere");
    }

    #[test]
    fn test_sanitize_empty_becomes_unnamed() {
        assert_eq!(sanitize(""), UNNAMED);
        assert_eq!(sanitize("   "), UNNAMED);
        assert_eq!(sanitize("\0\x01\x7f"), UNNAMED);
        assert_eq!(sanitize("."), UNNAMED);
        assert_eq!(sanitize(" .. "), UNNAMED);
    }

    #[test]
    fn test_sanitize_keeps_unicode() {
        assert_eq!(sanitize("Réunion 📅 demain"), "Réunion 📅 demain");
    }

    #[test]
    fn test_sanitize_truncates_on_char_boundary() {
        // 100 three-byte characters = 300 bytes.
        let subject = "€".repeat(100);
        let name = sanitize(&subject);
        assert!(name.len() <= MAX_NAME_BYTES);
        assert_eq!(name.len(), 255);
        assert!(name.chars().all(|c| c == '€'));

        let subject = format!("a{}", "€".repeat(100));
        let name = sanitize(&subject);
        assert_eq!(name.len(), 253);
    }

    #[test]
    fn test_sanitize_truncation_does_not_leave_trailing_space() {
        let subject = format!("{} tail", "x".repeat(254));
        let name = sanitize(&subject);
        assert_eq!(name, "x".repeat(254));
        assert_eq!(sanitize(&name), name);
    }

    #[test]
    fn test_disambiguate_fits_limit() {
        let long = "y".repeat(MAX_NAME_BYTES);
        let name = disambiguate(&long, 123_456, 0);
        assert!(name.len() <= MAX_NAME_BYTES);
        assert!(name.ends_with(" [123456]"));
        assert_eq!(disambiguate("Hi", 7, 2), "Hi [7.2]");
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut table = PathTable::new();
        let path = table.insert(meta(5, "Weekly report")).to_string();
        assert_eq!(path, "/Weekly report");
        assert_eq!(table.get("/Weekly report").map(FilesystemEntry::id), Some(5));
        assert_eq!(table.path_of(5), Some("/Weekly report"));
        assert_eq!(table.get_by_id(5).map(FilesystemEntry::name), Some("Weekly report"));
    }

    #[test]
    fn test_collision_gets_suffix() {
        let mut table = PathTable::new();
        table.insert(meta(1, "Hello"));
        let second = table.insert(meta(2, "Hello")).to_string();
        assert_eq!(second, "/Hello [2]");
        assert_eq!(table.len(), 2);
        assert_eq!(table.get("/Hello").map(FilesystemEntry::id), Some(1));
    }

    #[test]
    fn test_collision_with_suffix_shaped_subject() {
        let mut table = PathTable::new();
        table.insert(meta(1, "Hello"));
        table.insert(meta(9, "Hello [2]"));
        let third = table.insert(meta(2, "Hello")).to_string();
        assert_eq!(third, "/Hello [2.1]");
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_reinsert_same_id_keeps_path() {
        let mut table = PathTable::new();
        table.insert(meta(1, "Hello"));
        table.insert(meta(2, "Hello"));
        let again = table.insert(MessageMetadata::new(2, "Hello", 999)).to_string();
        assert_eq!(again, "/Hello [2]");
        assert_eq!(table.len(), 2);
        assert_eq!(table.get_by_id(2).map(|e| e.metadata.size_bytes), Some(999));
    }

    #[test]
    fn test_remove_by_id_uses_index() {
        let mut table = PathTable::new();
        table.insert(meta(1, "Same"));
        table.insert(meta(2, "Same"));

        let removed = table.remove_by_id(2).unwrap();
        assert_eq!(removed.path, "/Same [2]");
        assert_eq!(table.get("/Same").map(FilesystemEntry::id), Some(1));
        assert!(table.remove_by_id(2).is_none());
    }

    #[test]
    fn test_remove_by_path() {
        let mut table = PathTable::new();
        table.insert(meta(3, "x"));
        assert!(table.remove_by_path("/x").is_some());
        assert!(!table.contains_id(3));
        assert!(table.is_empty());
        assert!(table.remove_by_path("/x").is_none());
    }

    #[test]
    fn test_iter_is_path_ordered() {
        let mut table = PathTable::new();
        table.insert(meta(1, "charlie"));
        table.insert(meta(2, "alpha"));
        table.insert(meta(3, "bravo"));
        let names: Vec<&str> = table.iter().map(FilesystemEntry::name).collect();
        assert_eq!(names, vec!["alpha", "bravo", "charlie"]);
        assert_eq!(table.metadata().len(), 3);

        table.clear();
        assert!(table.is_empty());
        assert!(table.path_of(1).is_none());
    }
}
