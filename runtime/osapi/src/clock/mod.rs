//! System Clock - Shared millisecond time and timeout service
//!
//! # Purpose
//! Turns one periodic hardware interrupt into a system-wide clock that every
//! process can read and schedule one-shot or periodic timeouts against.
//!
//! # Integration Points
//! - Depends on: `TimerDevice` (interrupt source), `Endpoint` (requests)
//! - Provides to: `ClockClient` holders (processes, semaphores, sleeps)
//! - IPC endpoints: one badged endpoint, badge identifies the requester
//! - Capabilities required: a wake capability per scheduled timeout
//!
//! # Architecture
//! Two threads run once `start` is called:
//!
//! ```text
//!  timer IRQ ──► sysclock::timer ──┐
//!                  tick += period   │ lock
//!                  fire due entries ├──► TimeoutSchedule (Pool + CSpace)
//!  clients ──► sysclock::server ───┘
//!              GET_TIME / SET_TIMEOUT / CANCEL_TIMEOUT
//! ```
//!
//! The tick is only written by the timer thread, under the schedule lock,
//! and is read atomically everywhere else. `Stopped -> Running` is the only
//! state transition; a started clock cannot be restarted.
//!
//! # Testing Strategy
//! - Unit tests: schedule and protocol in isolation
//! - Integration tests: full service driven by `ManualTimer`

pub mod client;
pub mod protocol;
pub mod schedule;

pub use client::{ClockClient, ScheduledTimeout};
pub use protocol::{Reply, Request, Status, WakeCap};
pub use schedule::{TimeoutEntry, TimeoutId, TimeoutSchedule};

use crate::mutex::Guarded;
use crate::{OsapiConfig, OsapiError, Result};
use core::sync::atomic::{AtomicU32, Ordering};
use kaal_platform::{Badge, Endpoint, EndpointServer, TimerDevice};
use std::sync::Arc;
use std::time::Duration;

struct ClockState {
    tick: AtomicU32,
    schedule: Guarded<TimeoutSchedule>,
}

impl ClockState {
    fn now(&self) -> u32 {
        self.tick.load(Ordering::Acquire)
    }

    fn handle(&self, badge: Badge, request: Request) -> Result<Reply> {
        let reply = match request {
            Request::GetTime => Reply::Time { tick: self.now() },
            Request::SetTimeout {
                periodic,
                period_ms,
                wake,
            } => {
                let mut schedule = self.schedule.lock()?;
                let now = self.now();
                match schedule.schedule(now, badge, periodic, period_ms, wake) {
                    Ok(id) => Reply::Scheduled {
                        id,
                        inserted_at: now,
                    },
                    Err(_) => Reply::Failed(Status::Failed),
                }
            }
            Request::CancelTimeout { id } => match self.schedule.lock()?.cancel(id) {
                Ok(()) => Reply::Cancelled,
                Err(e) => {
                    log::warn!("[sysclock] cancel from badge {}: {}", badge, e);
                    Reply::Failed(Status::Failed)
                }
            },
        };
        Ok(reply)
    }
}

/// The system clock service
pub struct SysClock {
    state: Arc<ClockState>,
    endpoint: Endpoint<WakeCap>,
    timer: Option<Box<dyn TimerDevice>>,
    period_ms: u32,
}

impl SysClock {
    /// Create a stopped clock and arm its timer
    ///
    /// # Arguments
    /// * `config` - Supplies the tick period and schedule capacity
    /// * `timer` - Interrupt source, armed with the configured period
    ///
    /// # Errors
    /// - `Config` if `config` fails validation
    /// - `Platform` if the timer cannot be armed
    pub fn initialize(config: &OsapiConfig, mut timer: Box<dyn TimerDevice>) -> Result<Self> {
        config.validate()?;

        let period_ms = config.sysclock_period_ms;
        timer.set_periodic(Duration::from_millis(u64::from(period_ms)))?;

        log::info!(
            "[sysclock] initialized: period {}ms, {} schedule entries",
            period_ms,
            config.sysclock_max_entries
        );

        Ok(Self {
            state: Arc::new(ClockState {
                tick: AtomicU32::new(0),
                schedule: Guarded::new(TimeoutSchedule::new(config.sysclock_max_entries)),
            }),
            endpoint: Endpoint::new(),
            timer: Some(timer),
            period_ms,
        })
    }

    /// Start the timer and request server threads
    ///
    /// # Errors
    /// - `ClockAlreadyStarted` on a second call
    /// - `SpawnFailed` if a service thread cannot be created
    pub fn start(&mut self) -> Result<()> {
        let timer = self.timer.take().ok_or(OsapiError::ClockAlreadyStarted)?;

        let state = Arc::clone(&self.state);
        let period_ms = self.period_ms;
        spawn_service("sysclock::timer", move || timer_loop(&state, timer, period_ms))?;

        let state = Arc::clone(&self.state);
        let server = self.endpoint.server();
        spawn_service("sysclock::server", move || server_loop(&state, &server))?;

        log::info!("[sysclock] running");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_none()
    }

    /// Mint a client capability badged with `badge`
    pub fn client(&self, badge: Badge) -> ClockClient {
        ClockClient::new(self.endpoint.mint(badge))
    }

    /// Current tick, read without a round trip to the server
    pub fn now(&self) -> u32 {
        self.state.now()
    }

    pub fn period_ms(&self) -> u32 {
        self.period_ms
    }

    /// Number of pending timeouts
    pub fn pending(&self) -> Result<usize> {
        Ok(self.state.schedule.lock()?.len())
    }
}

impl core::fmt::Debug for SysClock {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SysClock")
            .field("tick", &self.now())
            .field("period_ms", &self.period_ms)
            .field("running", &self.is_running())
            .finish()
    }
}

fn spawn_service(name: &str, body: impl FnOnce() + Send + 'static) -> Result<()> {
    std::thread::Builder::new()
        .name(name.to_owned())
        .spawn(body)
        .map(drop)
        .map_err(|e| OsapiError::SpawnFailed {
            name: name.to_owned(),
            reason: e.to_string(),
        })
}

fn timer_loop(state: &ClockState, mut timer: Box<dyn TimerDevice>, period_ms: u32) {
    loop {
        if let Err(e) = timer.wait_irq() {
            log::info!("[sysclock] timer stopped: {}", e);
            return;
        }

        match state.schedule.lock() {
            Ok(mut schedule) => {
                let now = state.tick.load(Ordering::Relaxed).wrapping_add(period_ms);
                state.tick.store(now, Ordering::Release);
                schedule.fire(now);
            }
            Err(e) => {
                log::error!("[sysclock] schedule unavailable: {}", e);
                return;
            }
        }

        if let Err(e) = timer.handle_irq() {
            log::error!("[sysclock] failed to acknowledge timer IRQ: {}", e);
            return;
        }
    }
}

fn server_loop(state: &ClockState, server: &EndpointServer<WakeCap>) {
    while let Ok(mut call) = server.recv() {
        let badge = call.badge();

        let reply = match Request::from_message(call.message_mut()) {
            Ok(request) => state.handle(badge, request).unwrap_or_else(|e| {
                log::error!("[sysclock] request from badge {} failed: {}", badge, e);
                Reply::Failed(Status::Failed)
            }),
            Err(e) => {
                log::warn!("[sysclock] bad request from badge {}: {}", badge, e);
                Reply::Failed(Status::BadRequest)
            }
        };

        let sent = reply
            .into_message()
            .and_then(|msg| call.reply(msg).map_err(OsapiError::from));
        if let Err(e) = sent {
            log::warn!("[sysclock] reply to badge {} not delivered: {}", badge, e);
        }
    }

    log::info!("[sysclock] all clients gone, server exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use kaal_platform::ManualTimer;

    fn clock(max_entries: usize) -> (SysClock, kaal_platform::ManualTimerHandle) {
        let config = OsapiConfig {
            sysclock_period_ms: 5,
            sysclock_max_entries: max_entries,
            ..OsapiConfig::default()
        };
        let (timer, handle) = ManualTimer::new();
        let clock = SysClock::initialize(&config, Box::new(timer)).unwrap();
        (clock, handle)
    }

    #[test]
    fn test_start_once() {
        let (mut clock, _handle) = clock(4);
        assert!(!clock.is_running());
        clock.start().unwrap();
        assert!(clock.is_running());
        assert_eq!(clock.start(), Err(OsapiError::ClockAlreadyStarted));
    }

    #[test]
    fn test_tick_advances_by_period() {
        let (mut clock, handle) = clock(4);
        clock.start().unwrap();
        let client = clock.client(1);

        assert_eq!(client.get_time(), Ok(0));
        handle.fire_n(3).unwrap();
        assert_eq!(client.get_time(), Ok(15));
        assert_eq!(clock.now(), 15);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = OsapiConfig {
            sysclock_period_ms: 0,
            ..OsapiConfig::default()
        };
        let (timer, _handle) = ManualTimer::new();
        assert!(matches!(
            SysClock::initialize(&config, Box::new(timer)),
            Err(OsapiError::Config(_))
        ));
    }

    #[test]
    fn test_requests_before_start_are_served_after() {
        let (mut clock, _handle) = clock(4);
        let client = clock.client(9);
        let caller = std::thread::spawn(move || client.get_time());
        clock.start().unwrap();
        assert_eq!(caller.join().unwrap(), Ok(0));
    }
}
