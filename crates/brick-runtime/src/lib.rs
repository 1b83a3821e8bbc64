//! `brick-runtime` – periodic scheduling and process wiring for the brick.
//!
//! # Modules
//!
//! - [`engine`] – [`EventEngine`][engine::EventEngine]: cooperative,
//!   single-shot event dispatcher for [`Process`][engine::Process]
//!   state machines.
//! - [`timer`] – [`PeriodicTimer`][timer::PeriodicTimer]: `timerfd` on Linux,
//!   a monotonic deadline sleeper elsewhere.
//! - [`scheduler`] – [`Scheduler`][scheduler::Scheduler]: the background
//!   thread that ticks the engine and the light patterns under the hub lock.
//! - [`config`] – [`BrickConfig`][config::BrickConfig]: TOML settings with
//!   `BRICK_*` environment overrides.
//! - [`runtime`] – [`Runtime`][runtime::Runtime]: opens the hub, starts the
//!   scheduler and accepts named commands.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: installs the
//!   global `tracing` subscriber with optional OTLP export.

pub mod config;
pub mod engine;
pub mod runtime;
pub mod scheduler;
pub mod telemetry;
pub mod timer;

pub use config::{BrickConfig, ConfigError};
pub use engine::{EventEngine, EventKind, Outbox, Process, ProcessId, ProcessStatus, Target};
pub use runtime::Runtime;
pub use scheduler::{Scheduler, SchedulerStats};
pub use telemetry::{TracerProviderGuard, init_tracing};
