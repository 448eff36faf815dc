//! System - Boot-time owner of the clock and the process table
//!
//! `System` plays the root task: it validates the configuration, brings up
//! the system clock, and creates user processes, each with a clock
//! capability badged with its pid and a registered IPC client.

use crate::clock::SysClock;
use crate::ipc::IpcServer;
use crate::mutex::Guarded;
use crate::pool::{Handle, Pool};
use crate::process::{Pid, Process};
use crate::{OsapiConfig, OsapiError, Result};
use kaal_platform::{Badge, TimerDevice};

/// Pid of the root process
pub const ROOT_PID: Pid = 0;

#[derive(Debug, Default, Clone, PartialEq)]
struct ProcessRecord {
    pid: Pid,
    name: String,
}

struct ProcessTable {
    records: Pool<ProcessRecord>,
    next_pid: Pid,
}

/// Running system
pub struct System {
    config: OsapiConfig,
    clock: SysClock,
    root: Process,
    ipc: IpcServer,
    processes: Guarded<ProcessTable>,
}

impl System {
    /// Bring up the system clock and the root process
    ///
    /// # Errors
    /// - `Config` if `config` fails validation
    /// - any error raised while initializing or starting the clock
    pub fn initialize(config: OsapiConfig, timer: Box<dyn TimerDevice>) -> Result<Self> {
        config.validate()?;

        let mut clock = SysClock::initialize(&config, timer)?;
        clock.start()?;

        let root = Process::new(
            ROOT_PID,
            "root",
            config.clone(),
            Some(clock.client(Badge::from(ROOT_PID))),
        );
        let ipc = IpcServer::new(&config, Some(clock.client(Badge::from(ROOT_PID))));
        let records = Pool::new(config.max_user_processes)
            .with_init(|record: &mut ProcessRecord| *record = ProcessRecord::default());

        log::info!(
            "[system] initialized: {} user processes, {} threads per process",
            config.max_user_processes,
            config.max_threads_per_process
        );

        Ok(Self {
            config,
            clock,
            root,
            ipc,
            processes: Guarded::new(ProcessTable {
                records,
                next_pid: ROOT_PID + 1,
            }),
        })
    }

    pub fn config(&self) -> &OsapiConfig {
        &self.config
    }

    pub fn clock(&self) -> &SysClock {
        &self.clock
    }

    /// Environment of the root process
    pub fn root(&self) -> &Process {
        &self.root
    }

    pub fn ipc(&self) -> &IpcServer {
        &self.ipc
    }

    /// Create a user process
    ///
    /// # Errors
    /// Returns `Exhausted` once `max_user_processes` processes exist
    pub fn create_process(&self, name: &str) -> Result<Process> {
        let mut table = self.processes.lock()?;
        let slot = table.records.allocate()?;

        let pid = table.next_pid;
        let ipc = match self.ipc.create_client(pid) {
            Ok(client) => client,
            Err(e) => {
                let _ = table.records.free(slot);
                return Err(e);
            }
        };
        table.next_pid += 1;
        *table.records.get_mut(slot) = ProcessRecord {
            pid,
            name: name.to_owned(),
        };

        log::info!("[system] created process {} ({})", pid, name);
        Ok(Process::with_ipc(
            pid,
            name,
            self.config.clone(),
            Some(self.clock.client(Badge::from(pid))),
            Some(ipc),
        ))
    }

    /// Remove a user process from the process table
    ///
    /// # Errors
    /// Returns `NotFound` if no process has `pid`
    pub fn destroy_process(&self, pid: Pid) -> Result<()> {
        let mut table = self.processes.lock()?;
        let slot = Self::find(&table, pid).ok_or(OsapiError::NotFound)?;
        table.records.free(slot)?;
        self.ipc.remove_client(pid)?;

        log::info!("[system] destroyed process {}", pid);
        Ok(())
    }

    /// Number of live user processes
    pub fn process_count(&self) -> usize {
        self.processes
            .lock()
            .map(|table| table.records.size())
            .unwrap_or(0)
    }

    /// Name of the user process with `pid`
    pub fn process_name(&self, pid: Pid) -> Option<String> {
        let table = self.processes.lock().ok()?;
        Self::find(&table, pid).map(|slot| table.records.get(slot).name.clone())
    }

    fn find(table: &ProcessTable, pid: Pid) -> Option<Handle> {
        table.records.find_by(|record| record.pid == pid)
    }
}

impl core::fmt::Debug for System {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("System")
            .field("clock", &self.clock)
            .field("processes", &self.process_count())
            .finish()
    }
}
