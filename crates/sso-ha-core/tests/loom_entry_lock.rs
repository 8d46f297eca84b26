//! Loom model-checking tests for the SSO entry's live/snapshot lock pair.
//!
//! `SsoEntry` keeps its base state and its replicable snapshot behind one
//! `std::sync::Mutex`. This file models that pair with loom's mutex so loom
//! can permute every schedule of concurrent mutators and readers.

use std::collections::BTreeSet;

use loom::sync::{Arc, Mutex};
use loom::thread;

// ===========================================================================
// Simplified entry using loom primitives
// ===========================================================================

#[derive(Default)]
struct Pair {
    live: BTreeSet<u32>,
    live_version: u64,
    snap: BTreeSet<u32>,
    snap_version: u64,
}

struct LoomEntry {
    state: Mutex<Pair>,
}

impl LoomEntry {
    fn new() -> Self {
        Self {
            state: Mutex::new(Pair::default()),
        }
    }

    fn add(&self, id: u32) -> bool {
        let mut s = self.state.lock().unwrap();
        let added = s.live.insert(id);
        s.snap.insert(id);
        added
    }

    fn remove(&self, id: u32) -> bool {
        let mut s = self.state.lock().unwrap();
        let removed = s.live.remove(&id);
        s.snap.remove(&id);
        removed
    }

    fn increment(&self) -> u64 {
        let mut s = self.state.lock().unwrap();
        s.live_version += 1;
        s.snap_version = s.live_version;
        s.live_version
    }

    /// Snapshot clone plus a consistency check of the pair.
    fn snapshot(&self) -> (BTreeSet<u32>, u64) {
        let s = self.state.lock().unwrap();
        assert_eq!(s.live, s.snap, "reader saw torn binding sets");
        assert_eq!(s.live_version, s.snap_version, "reader saw torn version");
        (s.snap.clone(), s.snap_version)
    }
}

// ===========================================================================
// Loom tests
// ===========================================================================

/// Mutator and reader racing: the reader never observes a half-applied add.
#[test]
fn loom_reader_never_sees_torn_pair() {
    loom::model(|| {
        let entry = Arc::new(LoomEntry::new());

        let e1 = Arc::clone(&entry);
        let writer = thread::spawn(move || {
            e1.add(1);
            e1.add(2);
            e1.remove(1);
        });

        let e2 = Arc::clone(&entry);
        let reader = thread::spawn(move || {
            let (bindings, _) = e2.snapshot();
            assert!(bindings.len() <= 2);
        });

        writer.join().unwrap();
        reader.join().unwrap();

        let (bindings, _) = entry.snapshot();
        assert_eq!(bindings, BTreeSet::from([2]));
    });
}

/// Two concurrent incrementers get distinct versions and the final version
/// counts both.
#[test]
fn loom_concurrent_increments_are_unique() {
    loom::model(|| {
        let entry = Arc::new(LoomEntry::new());

        let e1 = Arc::clone(&entry);
        let t1 = thread::spawn(move || e1.increment());
        let e2 = Arc::clone(&entry);
        let t2 = thread::spawn(move || e2.increment());

        let a = t1.join().unwrap();
        let b = t2.join().unwrap();

        assert_ne!(a, b);
        assert_eq!(a.max(b), 2);
        assert_eq!(entry.snapshot().1, 2);
    });
}

/// Concurrent add of the same binding: exactly one caller reports it new.
#[test]
fn loom_duplicate_add_reports_once() {
    loom::model(|| {
        let entry = Arc::new(LoomEntry::new());

        let e1 = Arc::clone(&entry);
        let t1 = thread::spawn(move || e1.add(7));
        let e2 = Arc::clone(&entry);
        let t2 = thread::spawn(move || e2.add(7));

        let first = t1.join().unwrap();
        let second = t2.join().unwrap();
        assert!(first ^ second);
        assert_eq!(entry.snapshot().0.len(), 1);
    });
}
