//! KaaL OS API - Personality layer linked into every protection domain
//!
//! # Purpose
//! Supplies components with the operating-system services the kernel leaves
//! to user level:
//! - Fixed-capacity object pools backing every dynamic structure
//! - A recursive mutex and a binary semaphore with optional timeouts
//! - Threads bounded by their process
//! - A shared system clock with one-shot and periodic timeouts
//! - Per-process shared IPC buffers
//!
//! # Integration Points
//! - Depends on: kaal-platform (notifications, endpoints, CSpace, timers)
//! - Provides to: all user components
//! - IPC endpoints: the sysclock request endpoint
//! - Capabilities required: a badged sysclock capability per process
//!
//! # Architecture
//! ```text
//! System ──► SysClock (timer thread + server thread)
//!   │            └── TimeoutSchedule ── Pool + CSpace
//!   ├──► IpcServer ── Pool<IpcClient>
//!   └──► Process ── Pool<ThreadSlot>, ClockClient
//!                     └── Semaphore ── Guarded (Mutex)
//! ```
//!
//! There are no global singletons: the clock is reached through the
//! `ClockClient` a process was created with.
//!
//! # Example
//! ```no_run
//! use kaal_osapi::{OsapiConfig, System};
//! use kaal_platform::IntervalTimer;
//!
//! let system = System::initialize(OsapiConfig::default(), Box::new(IntervalTimer::new()))?;
//! let process = system.create_process("worker")?;
//! let woke_at = process.sleep(50)?;
//! assert!(woke_at >= 50);
//! # Ok::<(), kaal_osapi::OsapiError>(())
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod ipc;
pub mod list;
pub mod mutex;
pub mod pool;
pub mod process;
pub mod semaphore;
pub mod system;
pub mod thread;

pub use clock::{ClockClient, ScheduledTimeout, SysClock, TimeoutId};
pub use config::OsapiConfig;
pub use error::{OsapiError, Result};
pub use ipc::{BufferGuard, IpcClient, IpcServer, SharedBuffer};
pub use mutex::{Guarded, GuardedRef, Mutex, MutexGuard};
pub use pool::{Handle, Pool, Sweep};
pub use process::{Pid, Process};
pub use semaphore::Semaphore;
pub use system::{System, ROOT_PID};
pub use thread::{Thread, ThreadInfo, Wakeup};
