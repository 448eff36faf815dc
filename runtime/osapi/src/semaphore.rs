//! Binary Semaphore - Gate with a bounded wait queue and optional timeouts
//!
//! # Purpose
//! Lets a thread block until another thread `give`s, optionally bounded by
//! a timeout served by the system clock.
//!
//! # Architecture
//! All state lives behind a recursive mutex. A blocked taker parks its own
//! wait notification in a free wait slot and, for bounded waits, schedules
//! a one-shot timeout tied to that same notification. Whichever arrives
//! first (a `give` broadcast or the timeout) wakes it:
//!
//! ```text
//! take:  lock -> reserve slot -> [schedule timeout] -> unlock -> wait
//!        lock -> clear slot -> [cancel timeout] -> drain -> check reason
//! give:  lock -> available = true -> signal every parked waiter -> unlock
//! ```
//!
//! Woken waiters race for the single unit under the mutex; the losers park
//! again. No ordering between waiters is guaranteed.

use crate::clock::{ClockClient, TimeoutId};
use crate::mutex::Guarded;
use crate::thread::{self, ThreadInfo, Wakeup};
use crate::{OsapiError, Result};
use kaal_platform::Signaller;

struct SemaphoreState {
    available: bool,
    wait_slots: Box<[Option<Signaller<Wakeup>>]>,
}

impl SemaphoreState {
    fn park(&mut self, waker: Signaller<Wakeup>) -> usize {
        let Some(slot) = self.wait_slots.iter().position(Option::is_none) else {
            panic!(
                "semaphore wait queue overflow ({} waiters)",
                self.wait_slots.len()
            );
        };
        self.wait_slots[slot] = Some(waker);
        slot
    }

    fn waiters(&self) -> usize {
        self.wait_slots.iter().filter(|slot| slot.is_some()).count()
    }
}

/// Binary semaphore
pub struct Semaphore {
    state: Guarded<SemaphoreState>,
    clock: Option<ClockClient>,
}

impl Semaphore {
    /// Create a semaphore
    ///
    /// # Arguments
    /// * `initial` - Whether the semaphore starts available
    /// * `max_waiters` - Number of threads that may block at once
    pub fn new(initial: bool, max_waiters: usize) -> Self {
        Self {
            state: Guarded::new(SemaphoreState {
                available: initial,
                wait_slots: (0..max_waiters).map(|_| None).collect(),
            }),
            clock: None,
        }
    }

    /// Enable bounded waits through `clock`
    pub fn with_clock(mut self, clock: ClockClient) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Take the semaphore
    ///
    /// # Arguments
    /// * `timeout_ms` - `0` fails immediately if unavailable, a positive
    ///   value bounds the wait in milliseconds, a negative value waits
    ///   indefinitely
    ///
    /// # Errors
    /// - `WouldBlock` if `timeout_ms == 0` and the semaphore is unavailable
    /// - `ClockUnavailable` for a bounded wait without a clock
    /// - `SchedulerFull` if the clock could not schedule the timeout
    /// - `TimedOut` if the timeout fired before the semaphore was given
    ///
    /// # Panics
    /// Panics if more threads block than the semaphore has wait slots
    pub fn take(&self, timeout_ms: i32) -> Result<()> {
        thread::with_current(|me| self.take_as(me, timeout_ms))
    }

    fn take_as(&self, me: &ThreadInfo, timeout_ms: i32) -> Result<()> {
        let mut state = self.state.lock()?;

        if !state.available {
            if timeout_ms == 0 {
                return Err(OsapiError::WouldBlock);
            }
            if timeout_ms > 0 && self.clock.is_none() {
                return Err(OsapiError::ClockUnavailable);
            }
        }

        while !state.available {
            let slot = state.park(me.waker());

            let timeout = match self.schedule_wakeup(me, timeout_ms) {
                Ok(timeout) => timeout,
                Err(e) => {
                    state.wait_slots[slot] = None;
                    return Err(e);
                }
            };

            drop(state);
            log::trace!("[semaphore] {} parked in slot {}", me.tid(), slot);
            let wake = me.wait_notification().wait()?;
            state = self.state.lock()?;

            state.wait_slots[slot] = None;
            let cancelled = match timeout {
                Some(id) => self.cancel_wakeup(id),
                None => Ok(()),
            };
            // A give and a fire may both have landed; neither may leak into
            // the next wait on this thread, even when the cancel failed.
            me.wait_notification().drain();
            cancelled?;

            if let Wakeup::Timeout { tick } = wake {
                log::trace!("[semaphore] {} timed out at tick {}", me.tid(), tick);
                return Err(OsapiError::TimedOut);
            }
        }

        state.available = false;
        Ok(())
    }

    fn schedule_wakeup(&self, me: &ThreadInfo, timeout_ms: i32) -> Result<Option<TimeoutId>> {
        let Some(clock) = &self.clock else {
            return Ok(None);
        };
        if timeout_ms <= 0 {
            return Ok(None);
        }
        let scheduled = clock.schedule_timeout(false, timeout_ms.unsigned_abs(), me.waker())?;
        Ok(Some(scheduled.id))
    }

    fn cancel_wakeup(&self, id: TimeoutId) -> Result<()> {
        let Some(clock) = &self.clock else {
            return Ok(());
        };
        match clock.cancel_timeout(id) {
            Ok(()) | Err(OsapiError::TimeoutNotFound { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Make the semaphore available and wake every blocked taker
    pub fn give(&self) -> Result<()> {
        let mut state = self.state.lock()?;
        state.available = true;

        for waker in state.wait_slots.iter().flatten() {
            waker.signal(Wakeup::Ok);
        }
        Ok(())
    }

    /// Whether a `take(0)` would currently succeed
    pub fn is_available(&self) -> bool {
        self.state.lock().map(|state| state.available).unwrap_or(false)
    }

    /// Number of threads currently blocked in `take`
    pub fn waiters(&self) -> usize {
        self.state.lock().map(|state| state.waiters()).unwrap_or(0)
    }

    /// Destroy the semaphore
    pub fn delete(self) {
        let waiters = self.waiters();
        if waiters > 0 {
            log::warn!("[semaphore] deleted with {} blocked waiters", waiters);
        }
    }
}

impl core::fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Semaphore")
            .field("available", &self.is_available())
            .field("waiters", &self.waiters())
            .field("has_clock", &self.clock.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::protocol::SYSCLOCK_CANCEL_TIMEOUT;
    use crate::clock::{Reply, Request, WakeCap};
    use kaal_platform::{Endpoint, PlatformError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread as std_thread;
    use std::time::Duration;

    fn wait_for_waiters(semaphore: &Semaphore, count: usize) {
        while semaphore.waiters() < count {
            std_thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_binary_semantics() {
        let semaphore = Semaphore::new(true, 2);
        assert_eq!(semaphore.take(0), Ok(()));
        assert_eq!(semaphore.take(0), Err(OsapiError::WouldBlock));

        semaphore.give().unwrap();
        assert_eq!(semaphore.take(0), Ok(()));
        assert_eq!(semaphore.take(0), Err(OsapiError::WouldBlock));
    }

    #[test]
    fn test_give_is_idempotent_for_binary() {
        let semaphore = Semaphore::new(false, 2);
        semaphore.give().unwrap();
        semaphore.give().unwrap();
        assert_eq!(semaphore.take(0), Ok(()));
        assert_eq!(semaphore.take(0), Err(OsapiError::WouldBlock));
    }

    #[test]
    fn test_bounded_wait_requires_clock() {
        let semaphore = Semaphore::new(false, 2);
        assert_eq!(semaphore.take(10), Err(OsapiError::ClockUnavailable));
        assert_eq!(semaphore.waiters(), 0);
    }

    #[test]
    fn test_bounded_wait_available_without_clock() {
        let semaphore = Semaphore::new(true, 2);
        assert_eq!(semaphore.take(10), Ok(()));
    }

    #[test]
    fn test_blocked_taker_released_by_give() {
        let semaphore = Arc::new(Semaphore::new(false, 2));

        let taker = {
            let semaphore = Arc::clone(&semaphore);
            std_thread::spawn(move || semaphore.take(-1))
        };

        wait_for_waiters(&semaphore, 1);
        semaphore.give().unwrap();

        assert_eq!(taker.join().unwrap(), Ok(()));
        assert_eq!(semaphore.waiters(), 0);
        assert!(!semaphore.is_available());
    }

    #[test]
    fn test_one_give_releases_one_taker() {
        let semaphore = Arc::new(Semaphore::new(false, 4));
        let done = Arc::new(AtomicUsize::new(0));

        let takers: Vec<_> = (0..3)
            .map(|_| {
                let semaphore = Arc::clone(&semaphore);
                let done = Arc::clone(&done);
                std_thread::spawn(move || {
                    semaphore.take(-1).unwrap();
                    done.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();

        wait_for_waiters(&semaphore, 3);
        for released in 1..=3 {
            semaphore.give().unwrap();
            while done.load(Ordering::SeqCst) < released {
                std_thread::sleep(Duration::from_millis(1));
            }
            std_thread::sleep(Duration::from_millis(10));
            assert_eq!(done.load(Ordering::SeqCst), released);
        }

        for taker in takers {
            taker.join().unwrap();
        }
    }

    #[test]
    fn test_wait_queue_overflow_panics() {
        let semaphore = Arc::new(Semaphore::new(false, 1));

        let first = {
            let semaphore = Arc::clone(&semaphore);
            std_thread::spawn(move || semaphore.take(-1))
        };
        wait_for_waiters(&semaphore, 1);

        let second = {
            let semaphore = Arc::clone(&semaphore);
            std_thread::spawn(move || semaphore.take(-1))
        };
        assert!(second.join().is_err());

        semaphore.give().unwrap();
        assert_eq!(first.join().unwrap(), Ok(()));
    }

    #[test]
    fn test_failed_cancel_still_drains_wakeups() {
        let endpoint: Endpoint<WakeCap> = Endpoint::new();
        let server = endpoint.server();
        let semaphore = Arc::new(
            Semaphore::new(false, 2).with_clock(ClockClient::new(endpoint.mint(1))),
        );

        let taker = {
            let semaphore = Arc::clone(&semaphore);
            std_thread::spawn(move || {
                let result = semaphore.take(1_000);
                let leaked = thread::with_current(|me| me.wait_notification().is_pending());
                (result, leaked)
            })
        };

        // Accept the timeout and keep its wake capability
        let mut call = server.recv().unwrap();
        let wake = match Request::from_message(call.message_mut()).unwrap() {
            Request::SetTimeout { wake, .. } => wake,
            other => panic!("unexpected request {:?}", other),
        };
        let id = TimeoutId::from_word(7).unwrap();
        call.reply(Reply::Scheduled { id, inserted_at: 0 }.into_message().unwrap())
            .unwrap();

        wait_for_waiters(&semaphore, 1);
        semaphore.give().unwrap();

        // The timeout fires while the cancel is in flight, then the cancel is
        // dropped without a reply
        let call = server.recv().unwrap();
        assert_eq!(call.message().label(), SYSCLOCK_CANCEL_TIMEOUT);
        wake.signal(Wakeup::Timeout { tick: 1_000 });
        drop(call);

        let (result, leaked) = taker.join().unwrap();
        assert_eq!(
            result,
            Err(OsapiError::Platform(PlatformError::CallerAbandoned))
        );
        assert!(!leaked);
    }
}
