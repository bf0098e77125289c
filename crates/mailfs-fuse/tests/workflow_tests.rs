//! End-to-end workflow: a 100-message mailbox through its whole lifecycle.
//!
//! Run: `cargo nextest run -p mailfs-fuse workflow_tests`

mod common;

use common::*;
use mailfs_fuse::{Attributes, MountConfig};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;

const MESSAGES: u64 = 100;

fn expected_names(ids: impl IntoIterator<Item = u64>) -> BTreeSet<String> {
    ids.into_iter().map(|id| format!("Subject {id}")).collect()
}

#[test]
fn test_hundred_message_lifecycle() {
    let mb = TestMailbox::new();
    mb.seed(1, MESSAGES);

    // Initial sync shows every message, named by subject.
    let names: BTreeSet<String> = mb.sync().into_iter().collect();
    assert_eq!(names, expected_names(1..=MESSAGES));
    assert_eq!(mb.stats().events_added, MESSAGES);

    // Every file reads back its own body.
    for id in 1..=MESSAGES {
        let path = format!("/Subject {id}");
        let data = mb.read_all(&path).unwrap();
        assert_bytes_equal(&data, tagged_body(id).as_bytes(), &path);
    }
    assert_eq!(mb.view.open_handle_count(), 0);
    assert_eq!(mb.stats().bodies_fetched, MESSAGES);

    // Delete ten through the filesystem.
    for id in (10..=100).step_by(10) {
        mb.view.unlink(&format!("/Subject {id}")).unwrap();
    }
    let removed: BTreeSet<u64> = (10..=100).step_by(10).collect();
    let survivors: Vec<u64> = (1..=MESSAGES).filter(|id| !removed.contains(id)).collect();
    assert_eq!(
        mb.names().into_iter().collect::<BTreeSet<_>>(),
        expected_names(survivors.iter().copied())
    );
    for id in &removed {
        assert!(!mb.store.contains(*id), "message {id} still in the mailbox");
    }

    // Another client deletes five, and three new messages arrive.
    for id in 1..=5 {
        mb.store.delete(id);
    }
    mb.seed(101, 3);
    let after: BTreeSet<String> = mb.sync().into_iter().collect();
    let expected = expected_names(
        survivors
            .iter()
            .copied()
            .filter(|id| *id > 5)
            .chain(101..=103),
    );
    assert_eq!(after, expected);

    // Nothing resurfaces on later cycles.
    assert_eq!(mb.sync().into_iter().collect::<BTreeSet<_>>(), expected);
}

#[test]
fn test_concurrent_readers_during_reconciliation() {
    let mb = Arc::new(TestMailbox::with_config(MountConfig::fast()));
    mb.seed(1, MESSAGES);
    mb.sync();

    let readers: Vec<_> = (0..4u64)
        .map(|t| {
            let mb = Arc::clone(&mb);
            thread::spawn(move || {
                for id in (1..=MESSAGES).filter(|id| id % 4 == t) {
                    let path = format!("/Subject {id}");
                    let data = mb.read_all(&path).unwrap();
                    assert_bytes_equal(&data, tagged_body(id).as_bytes(), &path);
                }
            })
        })
        .collect();

    // Cycles keep running while the readers hold the view.
    for _ in 0..5 {
        mb.cycle();
    }
    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(mb.names().len(), MESSAGES as usize);
}

#[test]
fn test_attributes_for_every_entry() {
    let mb = TestMailbox::new();
    mb.seed(1, 20);
    let listing = {
        mb.cycle();
        mb.view.list()
    };
    assert_eq!(listing.len(), 20);
    for entry in listing.entries() {
        let attrs = mb.view.attributes(&format!("/{}", entry.name)).unwrap();
        assert_eq!(
            attrs,
            Attributes::File {
                id: entry.id,
                size: entry.size
            }
        );
    }
    assert_eq!(mb.view.attributes("/").unwrap(), Attributes::Root);
}
