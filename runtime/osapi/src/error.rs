//! OS API error types

use crate::clock::TimeoutId;
use kaal_platform::PlatformError;
use thiserror::Error;

/// Errors returned by OS API operations
///
/// Contract violations (unlocking a mutex that is not held, overflowing a
/// semaphore wait queue, using a freed pool handle) are not represented
/// here: they panic.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OsapiError {
    #[error("Pool exhausted (capacity: {capacity})")]
    Exhausted { capacity: usize },

    #[error("Element not found in pool")]
    NotFound,

    #[error("Maximum mutex recursion depth reached")]
    RecursionOverflow,

    #[error("Semaphore unavailable")]
    WouldBlock,

    #[error("Operation timed out")]
    TimedOut,

    #[error("Timeout schedule is full")]
    SchedulerFull,

    #[error("Timeout {id} not found")]
    TimeoutNotFound { id: TimeoutId },

    #[error("System clock unavailable")]
    ClockUnavailable,

    #[error("System clock already started")]
    ClockAlreadyStarted,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to spawn thread {name}: {reason}")]
    SpawnFailed { name: String, reason: String },

    #[error("Thread {name} panicked")]
    ThreadPanicked { name: String },

    #[error("Buffer too small: {needed} > {capacity} bytes")]
    BufferTooSmall { needed: usize, capacity: usize },

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),
}

pub type Result<T> = core::result::Result<T, OsapiError>;
