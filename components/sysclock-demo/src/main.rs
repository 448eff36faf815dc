//! KaaL sysclock demo
//!
//! Boots the OS API with a real interval timer and runs three scenarios
//! against the shared system clock:
//! 1. Worker threads sleeping for staggered durations
//! 2. A periodic timeout observed a few times, then cancelled
//! 3. A semaphore ping-pong between two threads, ending in a bounded wait
//!    that times out
//!
//! Usage:
//!   sysclock-demo [--config osapi.toml] [--period-ms 5] [--workers 4]

use anyhow::{Context, Result};
use clap::Parser;
use kaal_osapi::{OsapiConfig, OsapiError, Process, System};
use kaal_platform::{IntervalTimer, Notification};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "sysclock-demo")]
#[command(about = "Exercise the KaaL system clock, sleeps and semaphores")]
struct Args {
    /// OS API configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the sysclock tick period in milliseconds
    #[arg(long)]
    period_ms: Option<u32>,

    /// Number of sleeping worker threads
    #[arg(long, default_value_t = 3)]
    workers: u32,

    /// Number of periodic fires to observe
    #[arg(long, default_value_t = 3)]
    periodic_fires: u32,

    /// Semaphore ping-pong rounds
    #[arg(long, default_value_t = 5)]
    rounds: u32,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => OsapiConfig::load(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => OsapiConfig::default(),
    };
    if let Some(period_ms) = args.period_ms {
        config.sysclock_period_ms = period_ms;
    }
    config.validate().context("Invalid configuration")?;

    log::info!("═══════════════════════════════════════════════════════════");
    log::info!("  KaaL sysclock demo");
    log::info!("═══════════════════════════════════════════════════════════");
    log::info!("Configuration:");
    log::info!("  Tick period:       {}ms", config.sysclock_period_ms);
    log::info!("  Schedule entries:  {}", config.sysclock_max_entries);
    log::info!("  Threads/process:   {}", config.max_threads_per_process);
    log::info!("");

    let system = System::initialize(config, Box::new(IntervalTimer::new()))
        .context("Failed to initialize system")?;

    run_sleepers(&system, args.workers)?;
    run_periodic(&system, args.periodic_fires)?;
    run_ping_pong(&system, args.rounds)?;

    log::info!("");
    log::info!("Done at tick {}", system.clock().now());
    Ok(())
}

fn run_sleepers(system: &System, workers: u32) -> Result<()> {
    log::info!("Scenario 1: {} sleeping workers", workers);
    let process = system.create_process("sleepers")?;

    let threads = (1..=workers)
        .map(|n| {
            let worker = process.clone();
            process.spawn(None, move || {
                let duration = n * 50;
                match worker.sleep(duration) {
                    Ok(tick) => {
                        log::info!("  slept {}ms, woke at tick {}", duration, tick);
                        0
                    }
                    Err(e) => {
                        log::error!("  sleep failed: {}", e);
                        1
                    }
                }
            })
        })
        .collect::<Result<Vec<_>, OsapiError>>()?;

    for thread in threads {
        let name = thread.name().to_owned();
        let code = thread.join()?;
        anyhow::ensure!(code == 0, "worker {} exited with {}", name, code);
    }
    Ok(())
}

fn run_periodic(system: &System, fires: u32) -> Result<()> {
    log::info!("Scenario 2: periodic timeout, {} fires", fires);
    let clock = system
        .root()
        .clock()
        .context("root process has no clock")?;

    let wake = Notification::new();
    let timeout = clock.schedule_timeout(true, 100, wake.signaller())?;
    log::info!("  scheduled {} at tick {}", timeout.id, timeout.inserted_at);

    for fire in 1..=fires {
        let tick = clock.wait_for_timeout(timeout.id, &wake, fire == fires)?;
        log::info!("  fire {} at tick {}", fire, tick);
    }

    log::info!("  pending after cancel: {}", system.clock().pending()?);
    Ok(())
}

fn run_ping_pong(system: &System, rounds: u32) -> Result<()> {
    log::info!("Scenario 3: semaphore ping-pong, {} rounds", rounds);
    let process: Process = system.create_process("pingpong")?;

    let ping = Arc::new(process.create_semaphore(false));
    let pong = Arc::new(process.create_semaphore(false));

    let ponger = {
        let (ping, pong) = (Arc::clone(&ping), Arc::clone(&pong));
        process.spawn(Some("ponger"), move || {
            for _ in 0..rounds {
                if ping.take(-1).is_err() || pong.give().is_err() {
                    return 1;
                }
            }
            0
        })?
    };

    for round in 1..=rounds {
        ping.give()?;
        pong.take(1000)?;
        log::info!("  round {} complete", round);
    }
    anyhow::ensure!(ponger.join()? == 0, "ponger failed");

    match pong.take(50) {
        Err(OsapiError::TimedOut) => log::info!("  unanswered take timed out as expected"),
        other => anyhow::bail!("expected a timeout, got {:?}", other),
    }
    Ok(())
}
