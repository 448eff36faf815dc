//! Shared-buffer IPC - Per-process receive/transmit buffers
//!
//! # Purpose
//! The system IPC server hands every user process a pair of fixed-size
//! buffers through which system services (network, serial) exchange bulk
//! data with it. Each buffer is owned by whoever holds its availability
//! semaphore.
//!
//! # Architecture
//! ```text
//! IpcServer
//!   clients: Pool<IpcClient>   (capacity = max user processes)
//!     IpcClient { id, rx: SharedBuffer, tx: SharedBuffer }
//!       SharedBuffer { data, avail: Semaphore(initially available) }
//! ```
//!
//! `SharedBuffer::acquire` takes the semaphore and returns a guard that
//! gives it back when dropped.

use crate::clock::ClockClient;
use crate::mutex::{Guarded, GuardedRef};
use crate::pool::Pool;
use crate::semaphore::Semaphore;
use crate::{OsapiConfig, OsapiError, Result};
use core::ops::{Deref, DerefMut};
use std::sync::Arc;

/// Fixed-size buffer guarded by an availability semaphore
pub struct SharedBuffer {
    data: Guarded<Box<[u8]>>,
    avail: Semaphore,
}

impl SharedBuffer {
    fn new(size: usize, max_waiters: usize, clock: Option<ClockClient>) -> Self {
        let avail = Semaphore::new(true, max_waiters);
        Self {
            data: Guarded::new(vec![0; size].into_boxed_slice()),
            avail: match clock {
                Some(clock) => avail.with_clock(clock),
                None => avail,
            },
        }
    }

    /// Buffer size in bytes
    pub fn capacity(&self) -> usize {
        self.data.lock().map(|data| data.len()).unwrap_or(0)
    }

    /// Take exclusive use of the buffer
    ///
    /// # Arguments
    /// * `timeout_ms` - As for `Semaphore::take`
    pub fn acquire(&self, timeout_ms: i32) -> Result<BufferGuard<'_>> {
        self.avail.take(timeout_ms)?;
        match self.data.lock() {
            Ok(data) => Ok(BufferGuard {
                data,
                avail: &self.avail,
            }),
            Err(e) => {
                let _ = self.avail.give();
                Err(e)
            }
        }
    }

    /// Whether the buffer is currently free
    pub fn is_available(&self) -> bool {
        self.avail.is_available()
    }
}

/// Exclusive access to a `SharedBuffer`
pub struct BufferGuard<'a> {
    data: GuardedRef<'a, Box<[u8]>>,
    avail: &'a Semaphore,
}

impl BufferGuard<'_> {
    /// Copy `bytes` to the start of the buffer
    ///
    /// # Errors
    /// Returns `BufferTooSmall` if `bytes` does not fit
    pub fn write(&mut self, bytes: &[u8]) -> Result<usize> {
        let capacity = self.data.len();
        let target = self.data.get_mut(..bytes.len()).ok_or(OsapiError::BufferTooSmall {
            needed: bytes.len(),
            capacity,
        })?;
        target.copy_from_slice(bytes);
        Ok(bytes.len())
    }
}

impl Deref for BufferGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for BufferGuard<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl Drop for BufferGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.avail.give() {
            log::error!("[ipc] failed to release buffer: {}", e);
        }
    }
}

struct IpcClientInner {
    id: u32,
    rx: SharedBuffer,
    tx: SharedBuffer,
}

/// A process' pair of shared buffers
#[derive(Clone)]
pub struct IpcClient {
    inner: Arc<IpcClientInner>,
}

impl IpcClient {
    pub fn id(&self) -> u32 {
        self.inner.id
    }

    /// Buffer carrying data towards the process
    pub fn rx(&self) -> &SharedBuffer {
        &self.inner.rx
    }

    /// Buffer carrying data from the process
    pub fn tx(&self) -> &SharedBuffer {
        &self.inner.tx
    }
}

impl PartialEq for IpcClient {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl core::fmt::Debug for IpcClient {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("IpcClient").field("id", &self.inner.id).finish()
    }
}

/// Registry of IPC clients
pub struct IpcServer {
    clients: Guarded<Pool<Option<IpcClient>>>,
    rx_size: usize,
    tx_size: usize,
    max_waiters: usize,
    clock: Option<ClockClient>,
}

impl IpcServer {
    pub fn new(config: &OsapiConfig, clock: Option<ClockClient>) -> Self {
        let clients = Pool::new(config.max_user_processes)
            .with_init(|client: &mut Option<IpcClient>| *client = None);

        log::trace!("[ipc] server initialized");
        Self {
            clients: Guarded::new(clients),
            rx_size: config.ipc_rx_buf_size,
            tx_size: config.ipc_tx_buf_size,
            max_waiters: config.semaphore_queue_size(),
            clock,
        }
    }

    /// Register a client with fresh buffers
    ///
    /// # Errors
    /// Returns `Exhausted` when every client slot is in use
    pub fn create_client(&self, id: u32) -> Result<IpcClient> {
        let mut clients = self.clients.lock()?;
        let slot = clients.allocate()?;

        let client = IpcClient {
            inner: Arc::new(IpcClientInner {
                id,
                rx: SharedBuffer::new(self.rx_size, self.max_waiters, self.clock.clone()),
                tx: SharedBuffer::new(self.tx_size, self.max_waiters, self.clock.clone()),
            }),
        };
        *clients.get_mut(slot) = Some(client.clone());

        log::debug!("[ipc] client {} registered", id);
        Ok(client)
    }

    /// Unregister the client with `id`
    ///
    /// # Errors
    /// Returns `NotFound` if no such client is registered
    pub fn remove_client(&self, id: u32) -> Result<()> {
        let mut clients = self.clients.lock()?;
        let slot = clients
            .find_by(|client| client.as_ref().is_some_and(|c| c.id() == id))
            .ok_or(OsapiError::NotFound)?;
        clients.free(slot)
    }

    /// Registered client with `id`
    pub fn client(&self, id: u32) -> Option<IpcClient> {
        let clients = self.clients.lock().ok()?;
        let found = clients
            .iter()
            .find_map(|(_, client)| client.as_ref().filter(|c| c.id() == id).cloned());
        found
    }

    /// Number of registered clients
    pub fn len(&self) -> usize {
        self.clients.lock().map(|clients| clients.size()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
