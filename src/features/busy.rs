//! Guards for work that must not overlap.
//!
//! Both guards release on drop, so a caller that abandons a drain or sync
//! future (a timeout, a losing `select!` branch) never leaves the work
//! marked as running.

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

/// Holds a running flag until dropped.
pub(crate) struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    /// Set `flag`, or return `None` if it is already set.
    pub(crate) fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Keys with a remote call in progress.
#[derive(Debug)]
pub(crate) struct InFlight<K>(Mutex<HashSet<K>>);

impl<K> Default for InFlight<K> {
    fn default() -> Self {
        Self(Mutex::new(HashSet::new()))
    }
}

impl<K: Eq + Hash + Copy> InFlight<K> {
    /// Claim `key`, or return `None` while another claim holds it.
    pub(crate) fn try_claim(&self, key: K) -> Option<Claim<'_, K>> {
        let mut keys = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        keys.insert(key).then_some(Claim { owner: self, key })
    }

    pub(crate) fn contains(&self, key: &K) -> bool {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }
}

/// Releases its key when dropped.
pub(crate) struct Claim<'a, K: Eq + Hash + Copy> {
    owner: &'a InFlight<K>,
    key: K,
}

impl<K: Eq + Hash + Copy> Drop for Claim<'_, K> {
    fn drop(&mut self) {
        self.owner
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}
