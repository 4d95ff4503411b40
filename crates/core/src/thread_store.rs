//! Thread-keyed argument storage.
//!
//! Two kinds of reusable argument storage, made explicit so both are
//! inspectable: a map from thread identity to a private [`ThreadCache`],
//! and one shared argument slot handed to every thread that asks. The
//! private caches are private by construction; the shared slot is
//! deliberately aliased, and whoever writes last wins.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

use recalc_addin_protocol::{ThreadCache, Variant};

/// Per-thread caches, stable thread tokens, and the shared argument slot
/// of one simulated host process.
pub struct ThreadStore {
    caches: Mutex<HashMap<ThreadId, Arc<Mutex<ThreadCache>>>>,
    tokens: Mutex<HashMap<ThreadId, u64>>,
    shared: Arc<Mutex<Vec<Variant>>>,
}

impl ThreadStore {
    pub fn new() -> Self {
        Self {
            caches: Mutex::new(HashMap::new()),
            tokens: Mutex::new(HashMap::new()),
            shared: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// The calling thread's private cache, created on first use. The cache
    /// lives as long as the store, mirroring thread-local lifetime for the
    /// worker pool's threads.
    pub fn cache_for_current(&self) -> Arc<Mutex<ThreadCache>> {
        let mut caches = self.caches.lock().expect("thread store mutex poisoned");
        caches.entry(thread::current().id()).or_default().clone()
    }

    /// Stable numeric token for the calling thread, assigned in first-seen
    /// order starting at 1. Stands in for the OS thread id in payloads.
    pub fn token_for_current(&self) -> u64 {
        let mut tokens = self.tokens.lock().expect("thread store mutex poisoned");
        let next = tokens.len() as u64 + 1;
        *tokens.entry(thread::current().id()).or_insert(next)
    }

    /// The argument slot every worker thread aliases. Writes race with
    /// other threads' writes; readers may see stale or foreign values,
    /// never torn ones.
    pub fn shared_args(&self) -> Arc<Mutex<Vec<Variant>>> {
        self.shared.clone()
    }

    /// Distinct worker threads seen so far.
    pub fn threads_seen(&self) -> usize {
        self.tokens.lock().expect("thread store mutex poisoned").len()
    }
}

impl Default for ThreadStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_stable_per_thread() {
        let store = ThreadStore::new();
        let first = store.token_for_current();
        let again = store.token_for_current();
        assert_eq!(first, again);
    }

    #[test]
    fn each_thread_gets_a_private_cache() {
        let store = ThreadStore::new();
        let here = store.cache_for_current();
        here.lock().unwrap().arg_slots(2)[0] = Variant::num(7.0);

        thread::scope(|scope| {
            scope.spawn(|| {
                let there = store.cache_for_current();
                assert!(!Arc::ptr_eq(&here, &there));
                // A fresh cache: the other thread's writes are invisible.
                assert!(there.lock().unwrap().is_empty());
            });
        });

        assert_eq!(store.threads_seen(), 0); // caches alone assign no tokens
    }

    #[test]
    fn distinct_threads_get_distinct_tokens() {
        let store = ThreadStore::new();
        let main_token = store.token_for_current();
        thread::scope(|scope| {
            scope.spawn(|| {
                assert_ne!(store.token_for_current(), main_token);
            });
        });
        assert_eq!(store.threads_seen(), 2);
    }

    #[test]
    fn shared_slot_is_one_slot_for_everybody() {
        let store = ThreadStore::new();
        let mine = store.shared_args();
        thread::scope(|scope| {
            scope.spawn(|| {
                let theirs = store.shared_args();
                assert!(Arc::ptr_eq(&mine, &theirs));
                theirs.lock().unwrap().push(Variant::num(1.0));
            });
        });
        assert_eq!(mine.lock().unwrap().len(), 1);
    }
}
