//! Timeout schedule
//!
//! Pending timeouts live in a fixed-capacity `Pool`. The wake capability
//! each requester hands over is minted into a private `CSpace`; the minted
//! CPtr is the timeout's identity for its whole life and is revoked when
//! the entry leaves the schedule.
//!
//! Ticks are wrapping `u32` milliseconds. A deadline is reached when it is
//! not ahead of the current tick in wrapping order.

use super::protocol::WakeCap;
use crate::pool::{Pool, Sweep};
use crate::thread::Wakeup;
use crate::{OsapiError, Result};
use core::fmt;
use kaal_platform::{Badge, CPtr, CSpace, CapRights, Word, CAP_NULL};

/// Identity of a scheduled timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeoutId(CPtr);

impl TimeoutId {
    pub fn as_word(self) -> Word {
        self.0 as Word
    }

    /// # Errors
    /// Returns `Protocol` for the null id or a value wider than a CPtr
    pub fn from_word(word: Word) -> Result<Self> {
        match CPtr::try_from(word) {
            Ok(cptr) if cptr != CAP_NULL => Ok(Self(cptr)),
            _ => Err(OsapiError::Protocol(format!("invalid timeout id {}", word))),
        }
    }

    fn cptr(self) -> CPtr {
        self.0
    }
}

impl fmt::Display for TimeoutId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Whether `deadline` has been reached at `now`
#[inline]
pub fn tick_reached(now: u32, deadline: u32) -> bool {
    now.wrapping_sub(deadline) < u32::MAX / 2
}

/// Scheduled timeout
#[derive(Debug, Clone, PartialEq)]
pub struct TimeoutEntry {
    pub id: TimeoutId,
    /// Badge of the clock capability the request came through
    pub requester: Badge,
    pub periodic: bool,
    pub period_ms: u32,
    pub next_fire_tick: u32,
}

impl Default for TimeoutEntry {
    fn default() -> Self {
        Self {
            id: TimeoutId(CAP_NULL),
            requester: 0,
            periodic: false,
            period_ms: 0,
            next_fire_tick: 0,
        }
    }
}

/// Bounded set of pending timeouts
pub struct TimeoutSchedule {
    entries: Pool<TimeoutEntry>,
    wakes: CSpace<WakeCap>,
}

impl TimeoutSchedule {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Pool::new(capacity)
                .with_init(|entry: &mut TimeoutEntry| *entry = TimeoutEntry::default())
                .with_equality(|a: &TimeoutEntry, b: &TimeoutEntry| a.id == b.id),
            wakes: CSpace::new(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.entries.capacity()
    }

    /// Number of pending timeouts
    pub fn len(&self) -> usize {
        self.entries.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: TimeoutId) -> bool {
        self.find(id).is_some()
    }

    /// Pending entry with `id`
    pub fn get(&self, id: TimeoutId) -> Option<&TimeoutEntry> {
        self.find(id).map(|handle| self.entries.get(handle))
    }

    /// Insert a timeout firing `period_ms` after `now`
    ///
    /// # Arguments
    /// * `now` - Current tick
    /// * `requester` - Badge of the requesting client
    /// * `periodic` - Re-arm after every fire instead of being removed
    /// * `period_ms` - Delay until the first fire and between fires
    /// * `wake` - Where fires are delivered
    ///
    /// # Errors
    /// Returns `SchedulerFull` if the schedule is at capacity
    pub fn schedule(
        &mut self,
        now: u32,
        requester: Badge,
        periodic: bool,
        period_ms: u32,
        wake: WakeCap,
    ) -> Result<TimeoutId> {
        if self.entries.is_exhausted() {
            log::error!(
                "[sysclock] schedule full ({} entries), rejecting request from badge {}",
                self.capacity(),
                requester
            );
            return Err(OsapiError::SchedulerFull);
        }

        let id = match self.wakes.mint(wake, requester, CapRights::WRITE) {
            Ok(cptr) => TimeoutId(cptr),
            Err(e) => {
                log::error!("[sysclock] cannot mint wake capability: {}", e);
                return Err(OsapiError::SchedulerFull);
            }
        };

        let handle = match self.entries.allocate() {
            Ok(handle) => handle,
            Err(_) => {
                let _ = self.wakes.revoke(id.cptr());
                return Err(OsapiError::SchedulerFull);
            }
        };

        *self.entries.get_mut(handle) = TimeoutEntry {
            id,
            requester,
            periodic,
            period_ms,
            next_fire_tick: now.wrapping_add(period_ms),
        };

        log::debug!(
            "[sysclock] scheduled {} for badge {} at tick {} (periodic: {}, period: {}ms)",
            id,
            requester,
            now.wrapping_add(period_ms),
            periodic,
            period_ms
        );
        Ok(id)
    }

    /// Remove a pending timeout and revoke its wake capability
    ///
    /// # Errors
    /// Returns `TimeoutNotFound` if `id` is not pending, including when it
    /// already fired as a one-shot
    pub fn cancel(&mut self, id: TimeoutId) -> Result<()> {
        let handle = self.find(id).ok_or(OsapiError::TimeoutNotFound { id })?;
        self.entries.free(handle)?;
        self.wakes.revoke(id.cptr())?;

        log::debug!("[sysclock] cancelled {}", id);
        Ok(())
    }

    /// Deliver every timeout due at `now`
    ///
    /// One-shot entries are removed and their capability revoked; periodic
    /// entries advance by their period. A periodic entry that fell more than
    /// one period behind is re-armed relative to `now`.
    ///
    /// # Returns
    /// Number of timeouts that fired
    pub fn fire(&mut self, now: u32) -> usize {
        let wakes = &mut self.wakes;
        let mut fired = 0;

        self.entries.sweep(|_, entry| {
            if !tick_reached(now, entry.next_fire_tick) {
                return Sweep::Keep;
            }
            fired += 1;

            match wakes.lookup_with(entry.id.cptr(), CapRights::WRITE) {
                Ok(wake) => {
                    if !wake.signal(Wakeup::Timeout { tick: now }) {
                        log::trace!("[sysclock] wake for {} coalesced", entry.id);
                    }
                }
                Err(e) => log::warn!("[sysclock] cannot deliver {}: {}", entry.id, e),
            }

            if entry.periodic {
                entry.next_fire_tick = entry.next_fire_tick.wrapping_add(entry.period_ms);
                if tick_reached(now, entry.next_fire_tick) {
                    entry.next_fire_tick = now.wrapping_add(entry.period_ms);
                }
                Sweep::Keep
            } else {
                if let Err(e) = wakes.revoke(entry.id.cptr()) {
                    log::warn!("[sysclock] revoking {}: {}", entry.id, e);
                }
                Sweep::Release
            }
        });

        if fired > 0 {
            log::trace!("[sysclock] tick {}: {} timeouts fired", now, fired);
        }
        fired
    }

    fn find(&self, id: TimeoutId) -> Option<crate::pool::Handle> {
        self.entries.find(&TimeoutEntry {
            id,
            ..TimeoutEntry::default()
        })
    }
}

impl fmt::Debug for TimeoutSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeoutSchedule")
            .field("pending", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kaal_platform::Notification;

    fn schedule_one(
        schedule: &mut TimeoutSchedule,
        now: u32,
        periodic: bool,
        period_ms: u32,
    ) -> (TimeoutId, Notification<Wakeup>) {
        let wake = Notification::new();
        let id = schedule
            .schedule(now, 1, periodic, period_ms, wake.signaller())
            .unwrap();
        (id, wake)
    }

    #[test]
    fn test_tick_reached_wraps() {
        assert!(tick_reached(10, 10));
        assert!(tick_reached(11, 10));
        assert!(!tick_reached(9, 10));
        assert!(tick_reached(3, u32::MAX - 2));
        assert!(!tick_reached(u32::MAX - 2, 3));
    }

    #[test]
    fn test_one_shot_fires_once_and_is_removed() {
        let mut schedule = TimeoutSchedule::new(4);
        let (id, wake) = schedule_one(&mut schedule, 100, false, 30);

        assert_eq!(schedule.fire(120), 0);
        assert_eq!(wake.poll(), None);

        assert_eq!(schedule.fire(130), 1);
        assert_eq!(wake.poll(), Some(Wakeup::Timeout { tick: 130 }));
        assert!(schedule.is_empty());
        assert_eq!(schedule.cancel(id), Err(OsapiError::TimeoutNotFound { id }));
    }

    #[test]
    fn test_periodic_rearms() {
        let mut schedule = TimeoutSchedule::new(4);
        let (id, wake) = schedule_one(&mut schedule, 0, true, 10);

        for tick in [10, 20, 30] {
            assert_eq!(schedule.fire(tick), 1);
            assert_eq!(wake.poll(), Some(Wakeup::Timeout { tick }));
        }
        assert_eq!(schedule.get(id).map(|e| e.next_fire_tick), Some(40));
        schedule.cancel(id).unwrap();
        assert!(schedule.is_empty());
    }

    #[test]
    fn test_periodic_catches_up() {
        let mut schedule = TimeoutSchedule::new(1);
        let (id, _wake) = schedule_one(&mut schedule, 0, true, 10);

        assert_eq!(schedule.fire(55), 1);
        assert_eq!(schedule.get(id).map(|e| e.next_fire_tick), Some(65));
    }

    #[test]
    fn test_full_schedule_and_slot_reuse() {
        let mut schedule = TimeoutSchedule::new(2);
        let (first, _a) = schedule_one(&mut schedule, 0, false, 10);
        let (_second, _b) = schedule_one(&mut schedule, 0, false, 50);

        let extra = Notification::<Wakeup>::new();
        assert_eq!(
            schedule.schedule(0, 1, false, 10, extra.signaller()),
            Err(OsapiError::SchedulerFull)
        );

        assert_eq!(schedule.fire(10), 1);
        let third = schedule.schedule(10, 1, false, 10, extra.signaller()).unwrap();
        assert_ne!(third, first);
        assert_eq!(schedule.len(), 2);
    }

    #[test]
    fn test_cancel_unknown() {
        let mut schedule = TimeoutSchedule::new(2);
        let id = TimeoutId::from_word(77).unwrap();
        assert_eq!(schedule.cancel(id), Err(OsapiError::TimeoutNotFound { id }));
    }

    #[test]
    fn test_fire_with_wrapping_tick() {
        let mut schedule = TimeoutSchedule::new(1);
        let (_id, wake) = schedule_one(&mut schedule, u32::MAX - 5, false, 10);

        assert_eq!(schedule.fire(u32::MAX), 0);
        assert_eq!(schedule.fire(4), 1);
        assert_eq!(wake.poll(), Some(Wakeup::Timeout { tick: 4 }));
    }

    #[test]
    fn test_null_id_rejected() {
        assert!(TimeoutId::from_word(0).is_err());
        assert_eq!(TimeoutId::from_word(3).unwrap().to_string(), "#3");
    }
}
