use std::collections::HashSet;
use std::sync::{Condvar, Mutex, MutexGuard};

/// Keyed mutual exclusion: at most one holder per username, while holders
/// of different usernames never wait on each other.
#[derive(Default)]
pub struct UserLocks {
    held: Mutex<HashSet<String>>,
    released: Condvar,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until no other caller holds `username`.
    pub fn lock(&self, username: &str) -> UserGuard<'_> {
        let mut held = self.held_set();
        while held.contains(username) {
            held = self
                .released
                .wait(held)
                .unwrap_or_else(|e| e.into_inner());
        }
        held.insert(username.to_string());

        UserGuard {
            locks: self,
            username: username.to_string(),
        }
    }

    pub fn is_locked(&self, username: &str) -> bool {
        self.held_set().contains(username)
    }

    // The set only holds names, so a poisoned lock is still consistent.
    fn held_set(&self) -> MutexGuard<'_, HashSet<String>> {
        self.held.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub struct UserGuard<'a> {
    locks: &'a UserLocks,
    username: String,
}

impl Drop for UserGuard<'_> {
    fn drop(&mut self) {
        self.locks.held_set().remove(&self.username);
        self.locks.released.notify_all();
    }
}
