//! Threads - Process-bounded threads with a per-thread wait notification
//!
//! Every thread, whether spawned through `Thread::spawn` or adopted on first
//! use, owns one `Notification<Wakeup>`. Semaphores enqueue a signaller to it
//! and the system clock delivers timeout fires to it, so a blocked thread
//! always waits in exactly one place.
//!
//! Threads spawned through a `Process` occupy a slot in its thread pool
//! until their routine returns or unwinds. Dropping the `Thread` handle
//! detaches the thread but keeps the slot.

use crate::pool::Handle;
use crate::process::{Pid, Process};
use crate::{OsapiError, Result};
use kaal_platform::{tcb, Notification, Signaller, Tid};
use std::thread::JoinHandle;

/// Reason a blocked thread was resumed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wakeup {
    /// Released by the primitive it was waiting on
    Ok,
    /// A scheduled timeout fired at `tick`
    Timeout { tick: u32 },
}

/// Per-thread bookkeeping visible to the thread itself
pub struct ThreadInfo {
    tid: Tid,
    name: String,
    wait: Notification<Wakeup>,
}

impl ThreadInfo {
    fn adopt() -> Self {
        let tid = tcb::current();
        let name = std::thread::current()
            .name()
            .map(str::to_owned)
            .unwrap_or_else(|| format!("tid-{}", tid));

        log::trace!("[thread] adopted {} as {}", name, tid);
        Self {
            tid,
            name,
            wait: Notification::new(),
        }
    }

    pub fn tid(&self) -> Tid {
        self.tid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Notification this thread blocks on
    pub fn wait_notification(&self) -> &Notification<Wakeup> {
        &self.wait
    }

    /// Send-only capability to this thread's wait notification
    pub fn waker(&self) -> Signaller<Wakeup> {
        self.wait.signaller()
    }
}

thread_local! {
    static CURRENT: ThreadInfo = ThreadInfo::adopt();
}

/// Run `f` with the calling thread's info
///
/// Threads not created by `Thread::spawn` are adopted on first call.
pub fn with_current<R>(f: impl FnOnce(&ThreadInfo) -> R) -> R {
    CURRENT.with(f)
}

/// Name of the calling thread
pub fn current_name() -> String {
    with_current(|info| info.name.clone())
}

/// Pool slot describing a live thread of a process
#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct ThreadSlot {
    pub(crate) name: String,
}

/// Returns a thread slot to its process when the routine ends
struct SlotRelease {
    process: Process,
    slot: Handle,
}

impl Drop for SlotRelease {
    fn drop(&mut self) {
        self.process.release_thread(self.slot);
    }
}

/// Handle to a thread spawned inside a process
pub struct Thread {
    name: String,
    pid: Pid,
    handle: JoinHandle<i32>,
}

impl Thread {
    /// Spawn `routine` as a new thread of `process`
    ///
    /// # Arguments
    /// * `process` - Process whose thread pool bounds the spawn
    /// * `name` - Thread name, or `None` for `p-NN-t-NN`
    /// * `routine` - Thread body; its return value is the exit code
    ///
    /// # Errors
    /// - `Exhausted` if the process already runs its maximum number of threads
    /// - `SpawnFailed` if the underlying thread could not be created
    pub fn spawn<F>(process: &Process, name: Option<&str>, routine: F) -> Result<Self>
    where
        F: FnOnce() -> i32 + Send + 'static,
    {
        let (slot, name) = process.reserve_thread(name)?;
        let release = SlotRelease {
            process: process.clone(),
            slot,
        };

        // On a failed spawn the closure is dropped, and the slot with it.
        let handle = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let _release = release;
                routine()
            })
            .map_err(|e| OsapiError::SpawnFailed {
                name: name.clone(),
                reason: e.to_string(),
            })?;

        log::debug!("[thread] {} started in process {}", name, process.pid());
        Ok(Self {
            name,
            pid: process.pid(),
            handle,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for the thread to finish and return its exit code
    ///
    /// # Errors
    /// Returns `ThreadPanicked` if the routine panicked
    pub fn join(self) -> Result<i32> {
        let Self { name, handle, .. } = self;
        handle
            .join()
            .map_err(|_| OsapiError::ThreadPanicked { name })
    }

    /// Whether the routine has returned or unwound
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl core::fmt::Debug for Thread {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Thread")
            .field("name", &self.name)
            .field("pid", &self.pid)
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Cut `name` to at most `max_len` bytes on a character boundary
pub(crate) fn truncate_name(name: &str, max_len: usize) -> String {
    let mut end = name.len().min(max_len);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::OsapiConfig;

    fn process(max_threads: usize) -> Process {
        let config = OsapiConfig {
            max_threads_per_process: max_threads,
            ..OsapiConfig::default()
        };
        Process::new(3, "test", config, None)
    }

    #[test]
    fn test_current_is_stable() {
        let first = with_current(|info| info.tid());
        let second = with_current(|info| info.tid());
        assert_eq!(first, second);
        assert_eq!(first, tcb::current());
    }

    #[test]
    fn test_join_returns_exit_code() {
        let process = process(2);
        let thread = Thread::spawn(&process, Some("worker"), || 42).unwrap();
        assert_eq!(thread.name(), "worker");
        assert_eq!(thread.join(), Ok(42));
        assert_eq!(process.thread_count(), 0);
    }

    #[test]
    fn test_default_name() {
        let process = process(2);
        let thread = Thread::spawn(&process, None, || {
            assert_eq!(current_name(), "p-03-t-01");
            0
        })
        .unwrap();
        assert_eq!(thread.name(), "p-03-t-01");
        assert_eq!(thread.join(), Ok(0));
    }

    #[test]
    fn test_thread_pool_bounds_spawn() {
        let process = process(1);
        let gate = Notification::<()>::new();
        let release = gate.signaller();

        let first = Thread::spawn(&process, None, move || {
            gate.wait().map(|_| 0).unwrap_or(1)
        })
        .unwrap();

        let second = Thread::spawn(&process, None, || 0);
        assert!(matches!(second, Err(OsapiError::Exhausted { capacity: 1 })));

        release.signal(());
        assert_eq!(first.join(), Ok(0));
        assert!(Thread::spawn(&process, None, || 0).unwrap().join().is_ok());
    }

    #[test]
    fn test_detached_thread_keeps_slot() {
        let process = process(1);
        let gate = Notification::<()>::new();
        let release = gate.signaller();

        let detached = Thread::spawn(&process, None, move || {
            gate.wait().map(|_| 0).unwrap_or(1)
        })
        .unwrap();
        drop(detached);

        assert_eq!(process.thread_count(), 1);
        let blocked = Thread::spawn(&process, None, || 0);
        assert!(matches!(blocked, Err(OsapiError::Exhausted { capacity: 1 })));

        release.signal(());
        while process.thread_count() > 0 {
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        assert!(Thread::spawn(&process, None, || 0).unwrap().join().is_ok());
    }

    #[test]
    fn test_default_names_unique_while_live() {
        let process = process(2);
        let gated = |gate: Notification<()>| move || gate.wait().map(|_| 0).unwrap_or(1);

        let first_gate = Notification::<()>::new();
        let release_first = first_gate.signaller();
        let first = Thread::spawn(&process, None, gated(first_gate)).unwrap();

        let second_gate = Notification::<()>::new();
        let release_second = second_gate.signaller();
        let second = Thread::spawn(&process, None, gated(second_gate)).unwrap();
        assert_eq!(first.name(), "p-03-t-01");
        assert_eq!(second.name(), "p-03-t-02");

        release_first.signal(());
        assert_eq!(first.join(), Ok(0));

        // One live thread left, the new one must not reuse its name
        let third = Thread::spawn(&process, None, || 0).unwrap();
        assert_ne!(third.name(), second.name());
        assert_eq!(third.join(), Ok(0));

        release_second.signal(());
        assert_eq!(second.join(), Ok(0));
    }

    #[test]
    fn test_panicking_routine() {
        let process = process(1);
        let thread = Thread::spawn(&process, Some("doomed"), || panic!("boom")).unwrap();
        assert_eq!(
            thread.join(),
            Err(OsapiError::ThreadPanicked {
                name: "doomed".into()
            })
        );
        assert_eq!(process.thread_count(), 0);
    }

    #[test]
    fn test_truncate_name() {
        assert_eq!(truncate_name("short", 16), "short");
        assert_eq!(truncate_name("a-very-long-thread-name", 6), "a-very");
        assert_eq!(truncate_name("héllo", 2), "h");
    }
}
