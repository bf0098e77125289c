//! Subject and body generators for filesystem tests.
//!
//! Subjects here hit the sanitizer's edge cases: separators, control
//! characters, byte-length truncation and collisions.

use rand::Rng;

/// Random printable ASCII text of `len` bytes, with newlines every 72 columns.
pub fn random_body(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|i| {
            if i % 73 == 72 {
                '\n'
            } else {
                char::from(rng.random_range(b' '..=b'~'))
            }
        })
        .collect()
}

/// Body whose content identifies message `id`, so a read from the wrong
/// message is detectable.
pub fn tagged_body(id: u64) -> String {
    format!("message {id}\nThis is the body of message number {id}.\n")
}

/// `n` distinct subjects: `"Subject 1"` .. `"Subject n"`.
pub fn numbered_subjects(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("Subject {i}")).collect()
}

/// Subject containing path separators.
pub fn slash_subject() -> String {
    "Re: Q3/Q4 plan / budget".to_string()
}

/// Subject with NUL, tab and other control characters.
pub fn control_subject() -> String {
    "\0Invoice\t#42\r\n\x1b[1mdue\x7f".to_string()
}

/// Subject made only of whitespace and control characters.
pub fn blank_subject() -> String {
    " \t\r\n \0 ".to_string()
}

/// Multi-script subject.
pub fn unicode_subject() -> String {
    "Réunion \u{4f1a}\u{8b70} \u{1f4c5} Παρασκευή".to_string()
}

/// Subject well past the 255-byte name limit, made of 3-byte characters
/// so truncation has to respect char boundaries.
pub fn long_subject() -> String {
    "\u{20ac}".repeat(120)
}
