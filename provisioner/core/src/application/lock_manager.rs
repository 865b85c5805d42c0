// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Keyed Lock Manager
//!
//! Reference-counted, per-key mutual exclusion. Entries are created on first
//! use and removed as soon as nothing references them, so the table only
//! ever holds keys that are locked or being waited on.
//!
//! Both the lock and the reference are released by dropping the returned
//! [`LockGuard`]. Dropping an in-flight `acquire` future also gives back its
//! reference, so cancelled callers never leave entries behind.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Serialize operations that target the same remote resource

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

/// Attempts to attach to a live entry before giving up.
const MAX_ACQUIRE_RETRIES: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    #[error("Timed out after {timeout:?} waiting for lock on {key}")]
    Timeout { key: String, timeout: Duration },

    #[error("Lock entry for {key} was removed repeatedly while acquiring")]
    RetriesExhausted { key: String },
}

#[derive(Debug)]
struct LockEntry {
    mutex: Arc<Mutex<()>>,
    ref_count: AtomicI32,
    is_locked: AtomicBool,
}

impl LockEntry {
    fn new() -> Self {
        Self {
            mutex: Arc::new(Mutex::new(())),
            ref_count: AtomicI32::new(0),
            is_locked: AtomicBool::new(false),
        }
    }
}

type LockTable = DashMap<String, Arc<LockEntry>>;

/// Per-key lock table shared by every request.
#[derive(Debug, Clone, Default)]
pub struct LockManager {
    locks: Arc<LockTable>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock `key`, waiting at most `timeout` when one is given.
    pub async fn acquire(
        &self,
        key: &str,
        timeout: Option<Duration>,
    ) -> Result<LockGuard, LockError> {
        let reference = self.attach(key)?;
        let mutex = Arc::clone(&reference.entry.mutex);

        let guard = match timeout {
            Some(limit) => match tokio::time::timeout(limit, mutex.lock_owned()).await {
                Ok(guard) => guard,
                Err(_) => {
                    warn!(key = %key, timeout_ms = limit.as_millis() as u64, "Lock acquisition timed out");
                    return Err(LockError::Timeout {
                        key: key.to_string(),
                        timeout: limit,
                    });
                }
            },
            None => mutex.lock_owned().await,
        };

        reference.entry.is_locked.store(true, Ordering::SeqCst);
        debug!("Acquired lock on {}", key);
        Ok(LockGuard {
            guard: Some(guard),
            reference,
        })
    }

    /// Take a reference on the live entry for `key`, creating it if needed.
    ///
    /// A releaser may remove the entry between our lookup and our increment.
    /// In that case the reference is handed back and a fresh entry is tried.
    fn attach(&self, key: &str) -> Result<EntryRef, LockError> {
        for attempt in 1..=MAX_ACQUIRE_RETRIES {
            let entry = Arc::clone(
                self.locks
                    .entry(key.to_string())
                    .or_insert_with(|| Arc::new(LockEntry::new()))
                    .value(),
            );
            entry.ref_count.fetch_add(1, Ordering::SeqCst);

            let reference = EntryRef {
                locks: Arc::clone(&self.locks),
                key: key.to_string(),
                entry,
            };

            let live = self
                .locks
                .get(key)
                .map(|current| Arc::ptr_eq(current.value(), &reference.entry))
                .unwrap_or(false);
            if live {
                return Ok(reference);
            }

            debug!(key = %key, attempt, "Lock entry removed while attaching, retrying");
        }

        Err(LockError::RetriesExhausted {
            key: key.to_string(),
        })
    }

    /// Whether `key` is currently held.
    pub fn is_locked(&self, key: &str) -> bool {
        self.locks
            .get(key)
            .map(|entry| entry.is_locked.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Number of live entries and the reference count of each.
    pub fn lock_count(&self) -> (usize, HashMap<String, i32>) {
        let counts: HashMap<String, i32> = self
            .locks
            .iter()
            .map(|entry| (entry.key().clone(), entry.ref_count.load(Ordering::SeqCst)))
            .collect();
        (counts.len(), counts)
    }
}

/// One counted reference on a table entry.
struct EntryRef {
    locks: Arc<LockTable>,
    key: String,
    entry: Arc<LockEntry>,
}

impl Drop for EntryRef {
    fn drop(&mut self) {
        let remaining = self.entry.ref_count.fetch_sub(1, Ordering::SeqCst) - 1;
        if remaining < 0 {
            warn!(key = %self.key, "Lock reference count went negative");
        }
        if remaining <= 0 {
            self.locks.remove_if(&self.key, |_, current| {
                Arc::ptr_eq(current, &self.entry) && current.ref_count.load(Ordering::SeqCst) <= 0
            });
        }
    }
}

/// Held lock. Unlocks and drops its reference when dropped.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard {
    guard: Option<OwnedMutexGuard<()>>,
    reference: EntryRef,
}

impl LockGuard {
    pub fn key(&self) -> &str {
        &self.reference.key
    }

    /// Release explicitly. Equivalent to dropping the guard.
    pub fn release(self) {}
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.reference.entry.is_locked.store(false, Ordering::SeqCst);
        self.guard.take();
        debug!("Released lock on {}", self.reference.key);
    }
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard")
            .field("key", &self.reference.key)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_acquire_and_release() {
        let manager = LockManager::new();

        let guard = manager.acquire("fs-1", None).await.unwrap();
        assert!(manager.is_locked("fs-1"));
        assert_eq!(guard.key(), "fs-1");

        let (count, refs) = manager.lock_count();
        assert_eq!(count, 1);
        assert_eq!(refs["fs-1"], 1);

        guard.release();
        assert!(!manager.is_locked("fs-1"));
        assert_eq!(manager.lock_count().0, 0);
    }

    #[tokio::test]
    async fn test_timeout_cleans_up_reference() {
        let manager = LockManager::new();
        let held = manager.acquire("fsap-1", None).await.unwrap();

        let err = manager
            .acquire("fsap-1", Some(Duration::from_millis(20)))
            .await
            .unwrap_err();
        assert!(matches!(err, LockError::Timeout { .. }));

        let (_, refs) = manager.lock_count();
        assert_eq!(refs["fsap-1"], 1);

        drop(held);
        assert_eq!(manager.lock_count().0, 0);
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_block() {
        let manager = LockManager::new();
        let _a = manager.acquire("fs-a", None).await.unwrap();
        let b = manager
            .acquire("fs-b", Some(Duration::from_millis(50)))
            .await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_cancelled_waiter_leaves_no_entry() {
        let manager = LockManager::new();
        let held = manager.acquire("fs-1", None).await.unwrap();

        let waiter = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.acquire("fs-1", None).await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(manager.lock_count().1["fs-1"], 2);

        waiter.abort();
        let _ = waiter.await;
        assert_eq!(manager.lock_count().1["fs-1"], 1);

        drop(held);
        assert_eq!(manager.lock_count().0, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_cycles_leave_table_empty() {
        let manager = LockManager::new();
        let inside = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();

        for i in 0..64 {
            let manager = manager.clone();
            let inside = Arc::clone(&inside);
            handles.push(tokio::spawn(async move {
                let key = if i % 2 == 0 { "fs-even" } else { "fs-odd" };
                for _ in 0..10 {
                    let guard = manager.acquire(key, None).await.unwrap();
                    let before = inside.fetch_add(1, Ordering::SeqCst);
                    assert!(before < 2, "more than one holder per key");
                    tokio::task::yield_now().await;
                    inside.fetch_sub(1, Ordering::SeqCst);
                    drop(guard);
                }
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        let (count, refs) = manager.lock_count();
        assert_eq!(count, 0, "leftover entries: {:?}", refs);
    }
}
