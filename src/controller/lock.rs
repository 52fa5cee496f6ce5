//! # Source Lock
//!
//! Serializes reconciliations that would touch the same external resource.
//!
//! Keys are source hashes (see [`super::hashing`]). Holders of different keys
//! never wait on each other; holders of the same key run one at a time.
//!
//! One instance is shared by every connector of the process. The lock is
//! in-process only. Several controller replicas do not see each
//! other's keys; across replicas the secret store's create-only
//! check-and-set is the remaining guard against double creation.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};
use tokio::sync::Notify;
use tracing::debug;

#[derive(Debug, Default)]
pub struct SourceLock {
    active: Mutex<HashSet<String>>,
    released: Notify,
}

impl SourceLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until `key` is free, then hold it until the guard is dropped
    pub async fn acquire(&self, key: impl Into<String>) -> SourceGuard<'_> {
        let key = key.into();
        loop {
            // Register for the wakeup before checking, so a release between
            // the check and the await is not missed.
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.try_insert(&key) {
                debug!(key = %key, "Source lock acquired");
                return SourceGuard { lock: self, key };
            }
            notified.await;
        }
    }

    /// Whether some reconciliation currently holds `key`
    pub fn is_held(&self, key: &str) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }

    fn try_insert(&self, key: &str) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string())
    }

    fn release(&self, key: &str) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        self.released.notify_waiters();
        debug!(key = %key, "Source lock released");
    }
}

/// Held source key; released on drop
#[derive(Debug)]
pub struct SourceGuard<'a> {
    lock: &'a SourceLock,
    key: String,
}

impl SourceGuard<'_> {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for SourceGuard<'_> {
    fn drop(&mut self) {
        self.lock.release(&self.key);
    }
}
