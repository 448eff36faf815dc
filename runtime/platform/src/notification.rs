//! Notification - Single-slot wake signal
//!
//! A notification is the minimal blocking primitive of the platform: one
//! thread waits on it, any holder of a `Signaller` can wake it with a small
//! payload.
//!
//! ## Semantics
//!
//! - **Signal**: never blocks. If a wake is already pending the new one is
//!   coalesced (dropped) and `signal` reports it was not delivered.
//! - **Wait**: blocks until a wake is pending, then consumes it.
//! - **Poll**: consumes a pending wake without blocking.
//!
//! A missed or coalesced signal is not an error; callers that care re-check
//! their own state after waking.

use crate::{PlatformError, Result};
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use std::time::Duration;

/// Notification object owned by the waiting side
pub struct Notification<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T: Send> Notification<T> {
    /// Create a new notification with no wake pending
    pub fn new() -> Self {
        let (tx, rx) = channel::bounded(1);
        Self { tx, rx }
    }

    /// Create a send-only capability to this notification
    pub fn signaller(&self) -> Signaller<T> {
        Signaller {
            tx: self.tx.clone(),
        }
    }

    /// Signal this notification
    ///
    /// # Returns
    /// `true` if the wake was delivered, `false` if one was already pending
    pub fn signal(&self, payload: T) -> bool {
        deliver(&self.tx, payload)
    }

    /// Wait for a wake (blocking)
    pub fn wait(&self) -> Result<T> {
        self.rx.recv().map_err(|_| PlatformError::NotificationClosed)
    }

    /// Wait for a wake, giving up after `timeout`
    pub fn wait_timeout(&self, timeout: Duration) -> Option<T> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Consume a pending wake without blocking
    pub fn poll(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Discard any pending wake, returning how many were dropped
    pub fn drain(&self) -> usize {
        self.rx.try_iter().count()
    }

    /// Check whether a wake is pending without consuming it
    pub fn is_pending(&self) -> bool {
        !self.rx.is_empty()
    }
}

impl<T: Send> Default for Notification<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Send-only capability to a notification
pub struct Signaller<T> {
    tx: Sender<T>,
}

impl<T: Send> Signaller<T> {
    /// Signal the target notification
    ///
    /// # Returns
    /// `true` if the wake was delivered, `false` if it was coalesced or the
    /// notification no longer exists
    pub fn signal(&self, payload: T) -> bool {
        deliver(&self.tx, payload)
    }
}

impl<T> Clone for Signaller<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> core::fmt::Debug for Signaller<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Signaller")
            .field("pending", &!self.tx.is_empty())
            .finish()
    }
}

fn deliver<T>(tx: &Sender<T>, payload: T) -> bool {
    match tx.try_send(payload) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => false,
    }
}
