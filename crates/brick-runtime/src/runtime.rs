//! [`Runtime`] – the whole brick core behind one handle.
//!
//! Opens the hub from a [`BrickConfig`], starts the periodic scheduler on
//! it and exposes the by-name command entry point the binding layer calls.

use brick_hal::{Hub, SharedHub};
use brick_types::{BrickError, BrickResult, Command, Reply};
use tracing::info;

use crate::config::BrickConfig;
use crate::scheduler::{Scheduler, SchedulerStats};

/// A started brick: discovered devices plus the running scheduler.
pub struct Runtime {
    hub: SharedHub,
    scheduler: Scheduler,
}

impl Runtime {
    /// Discover devices and start ticking.
    ///
    /// # Errors
    ///
    /// [`BrickError::InvalidArgument`] for a config that fails validation,
    /// otherwise whatever [`Hub::open`] or [`Scheduler::start`] return.
    pub fn start(config: &BrickConfig) -> BrickResult<Self> {
        config.validate().map_err(|e| {
            tracing::error!(error = %e, "refusing to start");
            BrickError::InvalidArgument
        })?;
        let hub = SharedHub::new(Hub::open(&config.hub_config())?);
        Self::with_hub(hub, config)
    }

    /// Start the scheduler on an already assembled hub.
    pub fn with_hub(hub: SharedHub, config: &BrickConfig) -> BrickResult<Self> {
        let scheduler = Scheduler::start(hub.clone(), config)?;
        info!(sysfs_root = %config.sysfs_root.display(), "runtime started");
        Ok(Self { hub, scheduler })
    }

    pub fn hub(&self) -> &SharedHub {
        &self.hub
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Run one named command under the hub lock.
    pub fn dispatch(&self, command: Command) -> BrickResult<Reply> {
        self.hub.dispatch(command)
    }

    /// Stop the scheduler and release every device.
    pub fn stop(self) -> BrickResult<SchedulerStats> {
        self.scheduler.stop()
    }
}

#[cfg(test)]
mod tests {
    use brick_hal::sim::SimSysfs;
    use brick_types::{Color, ErrorCode, Port};

    use super::*;

    const RED: &str = "led0:red:brick-status";
    const GREEN: &str = "led0:green:brick-status";

    fn sim_config(root: &std::path::Path) -> BrickConfig {
        BrickConfig {
            sysfs_root: root.to_path_buf(),
            period_ms: 2,
            led_names: vec![RED.into(), GREEN.into()],
            use_timerfd: false,
            ..BrickConfig::default()
        }
    }

    #[test]
    fn start_drive_and_stop() {
        let dir = tempfile::tempdir().unwrap();
        let tree = SimSysfs::new(dir.path())
            .with_motor(2, Port::B)
            .with_led(RED)
            .with_led(GREEN)
            .build()
            .unwrap();

        let runtime = Runtime::start(&sim_config(dir.path())).unwrap();
        runtime
            .dispatch(Command::SetDutyCycle {
                port: Port::B,
                percent: -30.0,
            })
            .unwrap();
        assert_eq!(tree.attr(2, "duty_cycle_sp").unwrap(), "-30");

        tree.set_attr(2, "position", "360\n").unwrap();
        assert_eq!(
            runtime.dispatch(Command::EncoderCount { port: Port::B }).unwrap(),
            Reply::Count(360)
        );

        let missing = runtime.dispatch(Command::Coast { port: Port::C });
        assert_eq!(ErrorCode::of(&missing), ErrorCode::NoDevice);

        runtime
            .dispatch(Command::LightOn {
                port: Port::SELF,
                color: Color::Red as i32,
                brightness: 100,
            })
            .unwrap();
        assert_eq!(tree.led_brightness(RED).unwrap(), 255);
        assert_eq!(tree.led_brightness(GREEN).unwrap(), 0);

        runtime.stop().unwrap();
        assert_eq!(tree.attr(2, "command").unwrap(), "reset");
        assert_eq!(tree.led_brightness(RED).unwrap(), 0);
    }

    #[test]
    fn missing_motor_class_fails_to_start() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Runtime::start(&sim_config(dir.path())),
            Err(BrickError::Io { .. })
        ));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        SimSysfs::new(dir.path()).build().unwrap();
        let cfg = BrickConfig {
            period_ms: 0,
            ..sim_config(dir.path())
        };
        assert!(matches!(Runtime::start(&cfg), Err(BrickError::InvalidArgument)));
    }
}
