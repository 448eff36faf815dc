//! Sysclock client capability

use super::protocol::{Reply, Request, Status, WakeCap};
use super::schedule::TimeoutId;
use crate::thread::{self, Wakeup};
use crate::{OsapiError, Result};
use kaal_platform::{Badge, EndpointCap, Notification};

/// Timeout accepted by the sysclock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledTimeout {
    pub id: TimeoutId,
    /// Tick at which the request was inserted
    pub inserted_at: u32,
}

/// Badged capability to the system clock server
///
/// Every call blocks the calling thread until the server replies.
#[derive(Clone)]
pub struct ClockClient {
    cap: EndpointCap<WakeCap>,
}

impl ClockClient {
    pub fn new(cap: EndpointCap<WakeCap>) -> Self {
        Self { cap }
    }

    pub fn badge(&self) -> Badge {
        self.cap.badge()
    }

    fn call(&self, request: Request) -> Result<Reply> {
        let opcode = request.opcode();
        let reply = self.cap.call(request.into_message()?)?;
        Reply::from_message(opcode, &reply)
    }

    /// Current system time in milliseconds
    pub fn get_time(&self) -> Result<u32> {
        match self.call(Request::GetTime)? {
            Reply::Time { tick } => Ok(tick),
            other => Err(unexpected(other)),
        }
    }

    /// Ask the clock to signal `wake` after `period_ms`
    ///
    /// # Arguments
    /// * `periodic` - Keep firing every `period_ms` until cancelled
    /// * `period_ms` - Delay in milliseconds
    /// * `wake` - Capability the fire is delivered to
    ///
    /// # Errors
    /// Returns `SchedulerFull` if the clock's schedule is at capacity
    pub fn schedule_timeout(
        &self,
        periodic: bool,
        period_ms: u32,
        wake: WakeCap,
    ) -> Result<ScheduledTimeout> {
        let request = Request::SetTimeout {
            periodic,
            period_ms,
            wake,
        };
        match self.call(request)? {
            Reply::Scheduled { id, inserted_at } => Ok(ScheduledTimeout { id, inserted_at }),
            Reply::Failed(Status::Failed) => Err(OsapiError::SchedulerFull),
            other => Err(unexpected(other)),
        }
    }

    /// Remove a pending timeout
    ///
    /// # Errors
    /// Returns `TimeoutNotFound` if `id` is not pending, which includes a
    /// one-shot timeout that already fired
    pub fn cancel_timeout(&self, id: TimeoutId) -> Result<()> {
        match self.call(Request::CancelTimeout { id })? {
            Reply::Cancelled => Ok(()),
            Reply::Failed(Status::Failed) => Err(OsapiError::TimeoutNotFound { id }),
            other => Err(unexpected(other)),
        }
    }

    /// Block on `wake` until a timeout fires and return the fire tick
    ///
    /// `Wakeup::Ok` signals on the same notification are skipped. With
    /// `cancel` set the timeout is cancelled afterwards, which stops a
    /// periodic timeout; a timeout that is already gone is not an error.
    pub fn wait_for_timeout(
        &self,
        id: TimeoutId,
        wake: &Notification<Wakeup>,
        cancel: bool,
    ) -> Result<u32> {
        let tick = loop {
            match wake.wait()? {
                Wakeup::Timeout { tick } => break tick,
                Wakeup::Ok => log::trace!("[sysclock] ignoring release while waiting for {}", id),
            }
        };

        if cancel {
            match self.cancel_timeout(id) {
                Ok(()) | Err(OsapiError::TimeoutNotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(tick)
    }

    /// Block the calling thread for `ms` milliseconds
    ///
    /// # Returns
    /// The tick at which the thread was woken
    pub fn sleep(&self, ms: u32) -> Result<u32> {
        thread::with_current(|me| {
            let timeout = self.schedule_timeout(false, ms, me.waker())?;
            self.wait_for_timeout(timeout.id, me.wait_notification(), false)
        })
    }
}

impl core::fmt::Debug for ClockClient {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ClockClient").field("badge", &self.badge()).finish()
    }
}

fn unexpected(reply: Reply) -> OsapiError {
    OsapiError::Protocol(format!("unexpected sysclock reply {:?}", reply))
}
