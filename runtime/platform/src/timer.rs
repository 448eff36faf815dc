//! Hardware timer abstraction
//!
//! The system clock is driven by exactly one periodic interrupt source.
//! `TimerDevice` is the contract it needs from the platform:
//! 1. `set_periodic` arms the timer
//! 2. `wait_irq` blocks until the next interrupt
//! 3. `handle_irq` acknowledges it so the next one can be delivered
//!
//! Two devices are provided:
//! - `IntervalTimer`: real time, backed by a periodic ticker
//! - `ManualTimer`: deterministic, each interrupt raised by
//!   `ManualTimerHandle::fire()`

use crate::{PlatformError, Result};
use crossbeam::channel::{self, Receiver, Sender};
use std::time::{Duration, Instant};

/// Periodic interrupt source
pub trait TimerDevice: Send {
    /// Arm the timer to interrupt every `period`
    fn set_periodic(&mut self, period: Duration) -> Result<()>;

    /// Block until the next interrupt
    ///
    /// # Errors
    /// - `TimerNotArmed` if `set_periodic` was never called
    /// - `TimerStopped` if the device will never interrupt again
    fn wait_irq(&mut self) -> Result<()>;

    /// Acknowledge the interrupt returned by the last `wait_irq`
    fn handle_irq(&mut self) -> Result<()>;
}

/// Real-time periodic timer
pub struct IntervalTimer {
    ticker: Option<Receiver<Instant>>,
    irqs_handled: u64,
}

impl IntervalTimer {
    /// Create an unarmed interval timer
    pub fn new() -> Self {
        Self {
            ticker: None,
            irqs_handled: 0,
        }
    }

    /// Number of interrupts acknowledged so far
    pub fn irqs_handled(&self) -> u64 {
        self.irqs_handled
    }
}

impl Default for IntervalTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerDevice for IntervalTimer {
    fn set_periodic(&mut self, period: Duration) -> Result<()> {
        if period.is_zero() {
            return Err(PlatformError::InvalidPeriod);
        }
        self.ticker = Some(channel::tick(period));
        Ok(())
    }

    fn wait_irq(&mut self) -> Result<()> {
        let ticker = self.ticker.as_ref().ok_or(PlatformError::TimerNotArmed)?;
        ticker.recv().map(|_| ()).map_err(|_| PlatformError::TimerStopped)
    }

    fn handle_irq(&mut self) -> Result<()> {
        self.irqs_handled += 1;
        Ok(())
    }
}

/// Deterministic timer driven by a `ManualTimerHandle`
pub struct ManualTimer {
    irq: Receiver<()>,
    ack: Sender<()>,
    period: Option<Duration>,
}

/// Test-side handle raising interrupts on a `ManualTimer`
///
/// Dropping the handle stops the device.
pub struct ManualTimerHandle {
    irq: Sender<()>,
    ack: Receiver<()>,
}

impl ManualTimer {
    /// Create a manual timer and the handle that drives it
    pub fn new() -> (Self, ManualTimerHandle) {
        let (irq_tx, irq_rx) = channel::unbounded();
        let (ack_tx, ack_rx) = channel::unbounded();
        (
            Self {
                irq: irq_rx,
                ack: ack_tx,
                period: None,
            },
            ManualTimerHandle {
                irq: irq_tx,
                ack: ack_rx,
            },
        )
    }

    /// Period configured by the last `set_periodic`
    pub fn period(&self) -> Option<Duration> {
        self.period
    }
}

impl TimerDevice for ManualTimer {
    fn set_periodic(&mut self, period: Duration) -> Result<()> {
        if period.is_zero() {
            return Err(PlatformError::InvalidPeriod);
        }
        self.period = Some(period);
        Ok(())
    }

    fn wait_irq(&mut self) -> Result<()> {
        if self.period.is_none() {
            return Err(PlatformError::TimerNotArmed);
        }
        self.irq.recv().map_err(|_| PlatformError::TimerStopped)
    }

    fn handle_irq(&mut self) -> Result<()> {
        // The handle may already be gone; nobody is waiting for the ack then.
        let _ = self.ack.send(());
        Ok(())
    }
}

impl ManualTimerHandle {
    /// Raise one interrupt and block until the device acknowledged it
    ///
    /// # Errors
    /// Returns `TimerStopped` if the device side is gone
    pub fn fire(&self) -> Result<()> {
        self.irq.send(()).map_err(|_| PlatformError::TimerStopped)?;
        self.ack.recv().map_err(|_| PlatformError::TimerStopped)
    }

    /// Raise `count` interrupts one after another
    pub fn fire_n(&self, count: usize) -> Result<()> {
        (0..count).try_for_each(|_| self.fire())
    }
}
