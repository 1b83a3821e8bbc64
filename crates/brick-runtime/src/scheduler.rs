//! The periodic scheduler thread.
//!
//! Once started, a single background thread ticks every period: it takes
//! the hub lock, runs one round of the [`EventEngine`] and advances the
//! light patterns, releases the lock and sleeps on the periodic timer.
//! Foreground callers share the same [`SharedHub`] and simply contend for
//! the lock between ticks.
//!
//! [`Scheduler::stop`] (or dropping the scheduler) raises a stop flag, waits
//! for the thread to report that it left the loop, joins it and tears the
//! hub down.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use brick_hal::SharedHub;
use brick_types::{BrickError, BrickResult};
use tracing::{debug, info, warn};

use crate::config::BrickConfig;
use crate::engine::{EventEngine, EventKind, Process, ProcessId, Target};
use crate::timer::{self, PeriodicTimer};

/// Counters reported when the scheduler stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SchedulerStats {
    pub ticks: u64,
    /// Timer periods that elapsed without a tick.
    pub wakeups_missed: u64,
}

/// State shared between the scheduler handle and its thread.
struct Shared {
    stop: AtomicBool,
    ticks: AtomicU64,
    wakeups_missed: AtomicU64,
}

/// Handle on the running scheduler thread.
pub struct Scheduler {
    hub: SharedHub,
    engine: Arc<Mutex<EventEngine>>,
    shared: Arc<Shared>,
    exited: Option<Receiver<()>>,
    thread: Option<JoinHandle<()>>,
}

impl Scheduler {
    /// Create the periodic timer, show the startup light pattern and spawn
    /// the scheduler thread.
    ///
    /// # Errors
    ///
    /// Returns [`BrickError::Io`] if the timer or the thread cannot be
    /// created; nothing is left running in that case.
    pub fn start(hub: SharedHub, config: &BrickConfig) -> BrickResult<Self> {
        let timer = timer::open_timer(config.period(), config.use_timerfd)
            .map_err(|e| BrickError::io("create periodic timer", e))?;
        Self::start_with_timer(hub, config, timer)
    }

    /// Like [`start`][Self::start], ticking on a caller-supplied timer.
    /// `config.period_ms` and `config.use_timerfd` are ignored.
    pub fn start_with_timer(
        hub: SharedHub,
        config: &BrickConfig,
        timer: Box<dyn PeriodicTimer>,
    ) -> BrickResult<Self> {
        hub.with(|hub| {
            // Bring the light clock up to date so the startup pattern
            // begins now rather than at the previous run's last tick.
            let now_ms = hub.lights().clock_ms();
            hub.poll(now_ms);
            for &port in &config.light_ports {
                if let Err(e) = hub.lights_mut().on_with_pattern(
                    port,
                    config.startup_color,
                    config.startup_pattern,
                ) {
                    debug!(port = %port, error = %e, "startup light pattern not shown");
                }
            }
            Ok(())
        })?;

        let engine = Arc::new(Mutex::new(EventEngine::new()));
        let shared = Arc::new(Shared {
            stop: AtomicBool::new(false),
            ticks: AtomicU64::new(0),
            wakeups_missed: AtomicU64::new(0),
        });
        let (exited_tx, exited_rx) = mpsc::channel();

        let thread = {
            let hub = hub.clone();
            let engine = Arc::clone(&engine);
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("brick-scheduler".into())
                .spawn(move || {
                    run(&hub, &engine, &shared, timer);
                    let _ = exited_tx.send(());
                })
                .map_err(|e| BrickError::io("spawn scheduler thread", e))?
        };
        info!(period_ms = config.period_ms, "scheduler started");

        Ok(Self {
            hub,
            engine,
            shared,
            exited: Some(exited_rx),
            thread: Some(thread),
        })
    }

    /// The hub this scheduler ticks.
    pub fn hub(&self) -> &SharedHub {
        &self.hub
    }

    /// Register a process with the engine; it receives `Init` on a later tick.
    pub fn spawn(&self, process: Box<dyn Process>) -> BrickResult<ProcessId> {
        let mut engine = self.engine.lock().map_err(|_| BrickError::Failed)?;
        Ok(engine.spawn(process))
    }

    /// Queue an event for the engine.
    ///
    /// # Errors
    ///
    /// As [`EventEngine::post`]; [`BrickError::Again`] when the queue is full.
    pub fn post(&self, target: Target, kind: EventKind) -> BrickResult<()> {
        let mut engine = self.engine.lock().map_err(|_| BrickError::Failed)?;
        engine.post(target, kind)
    }

    pub fn request_poll(&self, id: ProcessId) -> BrickResult<()> {
        let mut engine = self.engine.lock().map_err(|_| BrickError::Failed)?;
        engine.request_poll(id);
        Ok(())
    }

    pub fn ticks(&self) -> u64 {
        self.shared.ticks.load(Ordering::Relaxed)
    }

    pub fn wakeups_missed(&self) -> u64 {
        self.shared.wakeups_missed.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    /// Stop the thread, reset every motor and turn the lights off.
    pub fn stop(mut self) -> BrickResult<SchedulerStats> {
        self.shutdown()
    }

    fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            ticks: self.ticks(),
            wakeups_missed: self.wakeups_missed(),
        }
    }

    fn shutdown(&mut self) -> BrickResult<SchedulerStats> {
        self.shared.stop.store(true, Ordering::Release);
        if let Some(exited) = self.exited.take() {
            // A disconnect means the thread died without reporting; join
            // below surfaces that.
            let _ = exited.recv();
        }
        let joined = match self.thread.take() {
            Some(thread) => thread.join().map_err(|_| {
                warn!("scheduler thread panicked");
                BrickError::Failed
            }),
            None => Ok(()),
        };
        // Motors are reset even when the thread died holding the lock.
        self.hub.teardown();
        joined?;
        let stats = self.stats();
        info!(
            ticks = stats.ticks,
            wakeups_missed = stats.wakeups_missed,
            "scheduler stopped"
        );
        Ok(stats)
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if self.thread.is_some()
            && let Err(e) = self.shutdown()
        {
            warn!(error = %e, "scheduler shutdown failed");
        }
    }
}

fn run(
    hub: &SharedHub,
    engine: &Mutex<EventEngine>,
    shared: &Shared,
    mut timer: Box<dyn PeriodicTimer>,
) {
    while !shared.stop.load(Ordering::Acquire) {
        let tick = hub.with(|hub| {
            let mut engine = engine.lock().map_err(|_| BrickError::Failed)?;
            engine.do_one_event(hub);
            let now_ms = hub.lights().clock_ms();
            hub.poll(now_ms);
            Ok(())
        });
        if let Err(e) = tick {
            warn!(error = %e, "scheduler tick failed");
        }
        shared.ticks.fetch_add(1, Ordering::Relaxed);

        match timer.wait() {
            Ok(expirations) => {
                shared
                    .wakeups_missed
                    .fetch_add(expirations.saturating_sub(1), Ordering::Relaxed);
            }
            Err(e) => warn!(error = %e, "periodic timer read failed"),
        }
    }
    debug!("scheduler loop exited");
}
