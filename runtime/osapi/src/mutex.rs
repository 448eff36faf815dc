//! Recursive Mutex - Single-owner lock over a binary wake signal
//!
//! # Purpose
//! Mutual exclusion for OS API internals (semaphore state, the sysclock
//! schedule) and for components that need a lock which the owning thread
//! may take again without deadlocking itself.
//!
//! # Architecture
//! One coalescing notification per mutex acts as the token. It is armed at
//! creation, so the first `lock` consumes it without blocking. `unlock`
//! re-arms it when the recursion count drops to zero, releasing exactly one
//! blocked waiter. Which waiter runs next is up to the kernel.
//!
//! ```text
//! lock (not owner) : wait(wake) -> owner = me -> held += 1
//! lock (owner)     : held += 1
//! unlock           : held -= 1 -> if 0 { owner = none; signal(wake) }
//! ```
//!
//! # Testing Strategy
//! - Unit tests: reentrancy, overflow, non-owner unlock, contention
//! - Integration tests: semaphore and sysclock built on top

use crate::{OsapiError, Result};
use core::cell::{RefCell, RefMut};
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use kaal_platform::{tcb, Notification, Tid};

const NO_OWNER: u64 = 0;

/// Recursive mutex
pub struct Mutex {
    wake: Notification<()>,
    owner: AtomicU64,
    held: AtomicU32,
    max_depth: u32,
}

impl Mutex {
    /// Create an unlocked mutex
    pub fn new() -> Self {
        Self::with_recursion_limit(u32::MAX)
    }

    /// Create an unlocked mutex that can be held at most `max_depth` times
    pub fn with_recursion_limit(max_depth: u32) -> Self {
        let wake = Notification::new();
        wake.signal(());
        Self {
            wake,
            owner: AtomicU64::new(NO_OWNER),
            held: AtomicU32::new(0),
            max_depth: max_depth.max(1),
        }
    }

    /// Acquire the mutex, blocking while another thread holds it
    ///
    /// # Errors
    /// Returns `RecursionOverflow` if the calling thread already holds the
    /// mutex at its maximum depth. The mutex is left unchanged.
    pub fn lock(&self) -> Result<()> {
        let me = tcb::current();

        if !self.is_owned_by(me) {
            self.wake.wait()?;
            self.owner.store(me.as_raw(), Ordering::Release);
        }

        let held = self.held.load(Ordering::Relaxed);
        if held >= self.max_depth {
            log::error!("[mutex] {} reached maximum recursion depth {}", me, held);
            return Err(OsapiError::RecursionOverflow);
        }
        self.held.store(held + 1, Ordering::Relaxed);

        Ok(())
    }

    /// Release one level of ownership
    ///
    /// # Panics
    /// Panics if the calling thread does not hold the mutex
    pub fn unlock(&self) -> Result<()> {
        let me = tcb::current();
        assert!(
            self.is_owned_by(me),
            "mutex unlocked by {} which does not hold it",
            me
        );

        let held = self.held.load(Ordering::Relaxed) - 1;
        self.held.store(held, Ordering::Relaxed);

        if held == 0 {
            self.owner.store(NO_OWNER, Ordering::Release);
            self.wake.signal(());
        }

        Ok(())
    }

    /// Acquire the mutex and release it when the guard drops
    pub fn guard(&self) -> Result<MutexGuard<'_>> {
        self.lock()?;
        Ok(MutexGuard { mutex: self })
    }

    /// Destroy the mutex
    pub fn delete(self) {
        if self.held.load(Ordering::Relaxed) > 0 {
            log::warn!(
                "[mutex] deleted while held by tid {}",
                self.owner.load(Ordering::Relaxed)
            );
        }
    }

    /// Whether the calling thread holds the mutex
    pub fn is_held_by_current(&self) -> bool {
        self.is_owned_by(tcb::current())
    }

    /// Current recursion depth
    pub fn depth(&self) -> u32 {
        self.held.load(Ordering::Relaxed)
    }

    fn is_owned_by(&self, tid: Tid) -> bool {
        self.owner.load(Ordering::Acquire) == tid.as_raw()
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for Mutex {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Mutex")
            .field("owner", &Tid::from_raw(self.owner.load(Ordering::Relaxed)))
            .field("held", &self.depth())
            .finish()
    }
}

/// Scoped hold on a `Mutex`
#[must_use = "the mutex is released as soon as the guard is dropped"]
pub struct MutexGuard<'a> {
    mutex: &'a Mutex,
}

impl Drop for MutexGuard<'_> {
    fn drop(&mut self) {
        let _ = self.mutex.unlock();
    }
}

/// Value protected by a recursive `Mutex`
///
/// A reentrant `lock` from the holding thread while a `GuardedRef` is still
/// alive panics instead of handing out a second mutable reference.
pub struct Guarded<T> {
    mutex: Mutex,
    value: RefCell<T>,
}

// SAFETY: the RefCell is only borrowed by the thread holding `mutex`, so
// its borrow flag is never touched concurrently.
unsafe impl<T: Send> Send for Guarded<T> {}
unsafe impl<T: Send> Sync for Guarded<T> {}

impl<T> Guarded<T> {
    pub fn new(value: T) -> Self {
        Self {
            mutex: Mutex::new(),
            value: RefCell::new(value),
        }
    }

    /// Lock the mutex and borrow the value
    pub fn lock(&self) -> Result<GuardedRef<'_, T>> {
        let guard = self.mutex.guard()?;
        Ok(GuardedRef {
            value: self.value.borrow_mut(),
            _guard: guard,
        })
    }

    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

/// Mutable borrow of a `Guarded` value
pub struct GuardedRef<'a, T> {
    // Declared first so the borrow ends before the mutex is released.
    value: RefMut<'a, T>,
    _guard: MutexGuard<'a>,
}

impl<T> Deref for GuardedRef<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for GuardedRef<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}
