//! KaaL Platform - Kernel collaborators for the OS API layer
//!
//! # Purpose
//! Provides the small set of kernel objects the OS API personality is built
//! on, hosted on native threads so components and tests run anywhere:
//! - Thread identity (who is the calling thread)
//! - Notifications (single-slot wake signals carrying a payload)
//! - Endpoints (badged request/response channels with capability transfer)
//! - Capability spaces (mint, lookup, revoke)
//! - Hardware timers (periodic interrupt source)
//!
//! # Integration Points
//! - Depends on: host threads
//! - Provides to: kaal-osapi (mutex, semaphore, sysclock)
//! - IPC endpoints: `Endpoint` call/recv/reply
//! - Capabilities required: none (this crate mints them)
//!
//! # Testing Strategy
//! - Unit tests: every object in its own module
//! - Integration tests: exercised through kaal-osapi

pub mod cspace;
pub mod endpoint;
pub mod message;
pub mod notification;
pub mod tcb;
pub mod timer;

pub use cspace::{Badge, CPtr, CSpace, CapRights, CapSlot, CAP_NULL};
pub use endpoint::{Call, Endpoint, EndpointCap, EndpointServer};
pub use message::{Message, Word, MSG_MAX_WORDS};
pub use notification::{Notification, Signaller};
pub use tcb::Tid;
pub use timer::{IntervalTimer, ManualTimer, ManualTimerHandle, TimerDevice};

use thiserror::Error;

/// Error types for platform operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("Endpoint closed")]
    EndpointClosed,

    #[error("Caller abandoned the call before the reply")]
    CallerAbandoned,

    #[error("Notification closed")]
    NotificationClosed,

    #[error("Invalid capability: {cptr}")]
    InvalidCapability { cptr: CPtr },

    #[error("Insufficient rights on capability {cptr}")]
    InsufficientRights { cptr: CPtr },

    #[error("Out of capability slots (capacity: {capacity})")]
    OutOfSlots { capacity: usize },

    #[error("Message too long: {length} words")]
    MessageTooLong { length: usize },

    #[error("Timer not armed")]
    TimerNotArmed,

    #[error("Timer stopped")]
    TimerStopped,

    #[error("Invalid timer period")]
    InvalidPeriod,
}

pub type Result<T> = core::result::Result<T, PlatformError>;
