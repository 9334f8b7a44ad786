//! A tiny owned-guard mutual-exclusion primitive used to back
//! `BlockProvider::root_scope` (spec.md §4.1, §5). `parking_lot::MutexGuard`
//! borrows its mutex, which makes it awkward to box as a trait object with
//! no lifetime parameter; this type trades that borrow for an `Arc` so the
//! guard can be returned as `Box<dyn RootScopeGuard>`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// An exclusive lock whose guard owns a clone of the `Arc`, so it can
/// outlive the stack frame that acquired it. Acquisition blocks with
/// exponential backoff (spec.md §4.1 "best-effort blocking with backoff").
#[derive(Debug, Default)]
pub struct SharedLock {
    locked: AtomicBool,
}

impl SharedLock {
    /// A fresh, unlocked instance.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            locked: AtomicBool::new(false),
        })
    }

    /// Block until the lock is acquired, then return an owned guard that
    /// releases it on drop.
    pub fn acquire(self: &Arc<Self>) -> SharedLockGuard {
        let mut backoff = Duration::from_micros(10);
        loop {
            if self
                .locked
                .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return SharedLockGuard {
                    owner: self.clone(),
                };
            }
            thread::sleep(backoff);
            backoff = (backoff * 2).min(Duration::from_millis(5));
        }
    }
}

/// RAII guard released on drop along every exit path.
pub struct SharedLockGuard {
    owner: Arc<SharedLock>,
}

impl Drop for SharedLockGuard {
    fn drop(&mut self) {
        self.owner.locked.store(false, Ordering::Release);
    }
}

impl crate::provider::RootScopeGuard for SharedLockGuard {}
