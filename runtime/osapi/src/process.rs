//! Process Environment - Per-domain context shared by all of its threads
//!
//! # Purpose
//! A `Process` carries what every thread of one protection domain needs:
//! its identity, its configuration, its capability to the system clock and
//! its bounded thread table. It is passed explicitly to whatever needs it;
//! there is no process-global singleton.
//!
//! # Integration Points
//! - Depends on: `SysClock` (through a badged `ClockClient`), `Pool`
//! - Provides to: `Thread::spawn`, semaphores with timeouts, `System`

use crate::clock::ClockClient;
use crate::ipc::IpcClient;
use crate::mutex::Guarded;
use crate::pool::{Handle, Pool};
use crate::semaphore::Semaphore;
use crate::thread::{self, Thread, ThreadSlot};
use crate::{OsapiConfig, OsapiError, Result};
use std::sync::Arc;

/// Process identifier; the root process is 0
pub type Pid = u32;

struct ProcessInner {
    pid: Pid,
    name: String,
    config: OsapiConfig,
    clock: Option<ClockClient>,
    ipc: Option<IpcClient>,
    threads: Guarded<Pool<ThreadSlot>>,
}

/// Shared handle to a process environment
#[derive(Clone)]
pub struct Process {
    inner: Arc<ProcessInner>,
}

impl Process {
    /// Create a process environment
    ///
    /// # Arguments
    /// * `pid` - Process identifier
    /// * `name` - Human readable name
    /// * `config` - Limits applied to this process
    /// * `clock` - Capability to the system clock, if the process may use it
    pub fn new(pid: Pid, name: &str, config: OsapiConfig, clock: Option<ClockClient>) -> Self {
        Self::with_ipc(pid, name, config, clock, None)
    }

    pub(crate) fn with_ipc(
        pid: Pid,
        name: &str,
        config: OsapiConfig,
        clock: Option<ClockClient>,
        ipc: Option<IpcClient>,
    ) -> Self {
        let threads = Pool::new(config.max_threads_per_process)
            .with_init(|slot: &mut ThreadSlot| *slot = ThreadSlot::default());

        Self {
            inner: Arc::new(ProcessInner {
                pid,
                name: name.to_owned(),
                config,
                clock,
                ipc,
                threads: Guarded::new(threads),
            }),
        }
    }

    pub fn pid(&self) -> Pid {
        self.inner.pid
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> &OsapiConfig {
        &self.inner.config
    }

    /// Capability to the system clock
    pub fn clock(&self) -> Option<&ClockClient> {
        self.inner.clock.as_ref()
    }

    /// Shared buffers registered with the system IPC server
    pub fn ipc(&self) -> Option<&IpcClient> {
        self.inner.ipc.as_ref()
    }

    /// Create a binary semaphore sized for this process' threads
    ///
    /// Bounded waits are available when the process holds a clock capability.
    pub fn create_semaphore(&self, initial: bool) -> Semaphore {
        let semaphore = Semaphore::new(initial, self.inner.config.semaphore_queue_size());
        match self.clock() {
            Some(clock) => semaphore.with_clock(clock.clone()),
            None => semaphore,
        }
    }

    /// Spawn a thread in this process
    pub fn spawn<F>(&self, name: Option<&str>, routine: F) -> Result<Thread>
    where
        F: FnOnce() -> i32 + Send + 'static,
    {
        Thread::spawn(self, name, routine)
    }

    /// Block the calling thread for `ms` milliseconds of system time
    ///
    /// # Returns
    /// The tick at which the thread was woken
    ///
    /// # Errors
    /// Returns `ClockUnavailable` if the process has no clock capability
    pub fn sleep(&self, ms: u32) -> Result<u32> {
        self.clock().ok_or(OsapiError::ClockUnavailable)?.sleep(ms)
    }

    /// Number of live threads spawned in this process
    pub fn thread_count(&self) -> usize {
        self.inner
            .threads
            .lock()
            .map(|threads| threads.size())
            .unwrap_or(0)
    }

    pub(crate) fn reserve_thread(&self, name: Option<&str>) -> Result<(Handle, String)> {
        let mut threads = self.inner.threads.lock()?;
        let slot = threads.allocate()?;

        let max_len = self.inner.config.thread_name_max_len;
        let name = match name {
            Some(name) => thread::truncate_name(name, max_len),
            None => thread::truncate_name(
                &format!("p-{:02}-t-{:02}", self.inner.pid, slot.index() + 1),
                max_len,
            ),
        };

        threads.get_mut(slot).name = name.clone();
        Ok((slot, name))
    }

    pub(crate) fn release_thread(&self, slot: Handle) {
        match self.inner.threads.lock() {
            Ok(mut threads) => {
                if threads.free(slot).is_err() {
                    log::warn!("[process {}] thread slot {:?} already released", self.pid(), slot);
                }
            }
            Err(e) => log::error!("[process {}] cannot release thread slot: {}", self.pid(), e),
        }
    }
}

impl core::fmt::Debug for Process {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Process")
            .field("pid", &self.inner.pid)
            .field("name", &self.inner.name)
            .field("has_clock", &self.inner.clock.is_some())
            .finish()
    }
}
