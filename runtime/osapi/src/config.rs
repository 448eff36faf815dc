//! OS API configuration
//!
//! Build-time knobs of the personality layer. Defaults match a small
//! system; a component can override any subset from a TOML document:
//!
//! ```toml
//! sysclock_period_ms = 1
//! sysclock_max_entries = 100
//! max_threads_per_process = 16
//! ```

use crate::{OsapiError, Result};
use serde::Deserialize;
use static_assertions::const_assert;
use std::path::Path;

/// Default capacity of the sysclock timeout schedule
pub const DEFAULT_SYSCLOCK_MAX_ENTRIES: usize = 100;

/// Default sysclock tick period in milliseconds
pub const DEFAULT_SYSCLOCK_PERIOD_MS: u32 = 10;

/// Default maximum number of threads in one process
pub const DEFAULT_MAX_THREADS_PER_PROCESS: usize = 16;

/// Default maximum number of user processes
pub const DEFAULT_MAX_USER_PROCESSES: usize = 8;

/// Default maximum thread name length
pub const DEFAULT_THREAD_NAME_MAX_LEN: usize = 16;

/// Default IPC receive buffer size in bytes
pub const DEFAULT_IPC_RX_BUF_SIZE: usize = 4096;

/// Default IPC transmit buffer size in bytes
pub const DEFAULT_IPC_TX_BUF_SIZE: usize = 4096;

const_assert!(DEFAULT_SYSCLOCK_MAX_ENTRIES > 0);
const_assert!(DEFAULT_SYSCLOCK_PERIOD_MS > 0);
const_assert!(DEFAULT_MAX_THREADS_PER_PROCESS > 0);

/// OS API configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OsapiConfig {
    /// Period, in milliseconds, at which the sysclock's time is advanced
    pub sysclock_period_ms: u32,

    /// Maximum number of pending timeouts in the sysclock schedule
    pub sysclock_max_entries: usize,

    /// Maximum number of threads that can be created within one process
    pub max_threads_per_process: usize,

    /// Maximum number of user processes supported by the system
    pub max_user_processes: usize,

    /// Maximum length of a thread's name
    pub thread_name_max_len: usize,

    /// Size of each IPC client's receive buffer
    pub ipc_rx_buf_size: usize,

    /// Size of each IPC client's transmit buffer
    pub ipc_tx_buf_size: usize,
}

impl Default for OsapiConfig {
    fn default() -> Self {
        Self {
            sysclock_period_ms: DEFAULT_SYSCLOCK_PERIOD_MS,
            sysclock_max_entries: DEFAULT_SYSCLOCK_MAX_ENTRIES,
            max_threads_per_process: DEFAULT_MAX_THREADS_PER_PROCESS,
            max_user_processes: DEFAULT_MAX_USER_PROCESSES,
            thread_name_max_len: DEFAULT_THREAD_NAME_MAX_LEN,
            ipc_rx_buf_size: DEFAULT_IPC_RX_BUF_SIZE,
            ipc_tx_buf_size: DEFAULT_IPC_TX_BUF_SIZE,
        }
    }
}

impl OsapiConfig {
    /// Parse a configuration from TOML, filling unset keys with defaults
    ///
    /// # Errors
    /// Returns `Config` if the document is malformed or fails validation
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| OsapiError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| OsapiError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&source)
    }

    /// Check that every capacity and period is usable
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("sysclock_period_ms", self.sysclock_period_ms as usize),
            ("sysclock_max_entries", self.sysclock_max_entries),
            ("max_threads_per_process", self.max_threads_per_process),
            ("max_user_processes", self.max_user_processes),
            ("thread_name_max_len", self.thread_name_max_len),
        ];

        for (name, value) in checks {
            if value == 0 {
                return Err(OsapiError::Config(format!("{} must be non-zero", name)));
            }
        }
        Ok(())
    }

    /// Number of wait slots in a semaphore
    ///
    /// Every thread of the process plus one foreign waiter can block on the
    /// same semaphore.
    pub fn semaphore_queue_size(&self) -> usize {
        self.max_threads_per_process + 1
    }
}
