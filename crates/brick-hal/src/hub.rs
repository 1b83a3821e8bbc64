//! [`Hub`] – owner of all device state, and [`SharedHub`], its lock.
//!
//! The hub holds the DC motor controller (and through it the raw motor
//! driver) and the light driver.  Foreground callers and the periodic
//! scheduler reach it only through [`SharedHub`], whose single coarse mutex
//! keeps each seek-then-read/write on a device file atomic with respect to
//! every other access.
//!
//! [`Hub::dispatch`] is the by-name entry point for the binding layer: it
//! routes a [`Command`] to the component that implements it.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use brick_types::{BrickError, BrickResult, Color, Command, Pattern, Port, PortRange, Reply};
use tracing::{debug, info, warn};

use crate::dcmotor::DcMotors;
use crate::led::{LightOutput, SysfsLed};
use crate::light::LightDriver;
use crate::rawmotor::RawMotorDriver;

/// Where the hub finds its hardware.
#[derive(Debug, Clone)]
pub struct HubConfig<'a> {
    pub sysfs_root: &'a Path,
    pub motor_ports: PortRange,
    /// Ports that may carry a light.  The LEDs in `led_names` form a single
    /// light, so only the first port listed is bound to them.
    pub light_ports: &'a [Port],
    pub led_names: &'a [String],
}

/// All device state of the brick.
pub struct Hub {
    motors: DcMotors,
    lights: LightDriver,
}

impl Hub {
    /// Assemble a hub from already constructed parts.
    pub fn new(motors: DcMotors, lights: LightDriver) -> Self {
        Self { motors, lights }
    }

    /// Discover motors and open the status LEDs.
    ///
    /// # Errors
    ///
    /// Fails only when motor discovery fails as a whole (see
    /// [`RawMotorDriver::discover`]).  Missing LEDs leave the light port
    /// reporting [`BrickError::NoDevice`].  Light ports after the first are
    /// skipped with a warning, since they would share the same LEDs.
    pub fn open(config: &HubConfig<'_>) -> BrickResult<Self> {
        let raw = RawMotorDriver::discover(config.sysfs_root, config.motor_ports)?;
        let mut lights = LightDriver::new();
        if let Some((&port, rest)) = config.light_ports.split_first() {
            match SysfsLed::open(config.sysfs_root, config.led_names) {
                Ok(led) => lights = lights.with_light(port, Box::new(led) as Box<dyn LightOutput>),
                Err(e) => warn!(port = %port, error = %e, "no light available"),
            }
            for extra in rest {
                warn!(port = %extra, claimed_by = %port, "status LEDs already bound; light port ignored");
            }
        }
        info!(
            motors = raw.connected_ports().len(),
            lights = lights.ports().len(),
            "hub opened"
        );
        Ok(Self::new(DcMotors::new(raw), lights))
    }

    pub fn motors(&self) -> &DcMotors {
        &self.motors
    }

    pub fn motors_mut(&mut self) -> &mut DcMotors {
        &mut self.motors
    }

    pub fn lights(&self) -> &LightDriver {
        &self.lights
    }

    pub fn lights_mut(&mut self) -> &mut LightDriver {
        &mut self.lights
    }

    /// Execute a named command.
    pub fn dispatch(&mut self, command: Command) -> BrickResult<Reply> {
        debug!(port = %command.port(), ?command, "dispatch");
        match command {
            Command::MotorStatus { port } => self.motors.status(port).map(|_| Reply::Done),
            Command::Coast { port } => self.motors.coast(port).map(|_| Reply::Done),
            Command::Brake { port } => self.motors.brake(port).map(|_| Reply::Done),
            Command::SetDutyCycle { port, percent } => self
                .motors
                .set_duty_cycle(port, percent)
                .map(|_| Reply::Done),
            Command::SetDutyCycleRaw { port, raw } => self
                .motors
                .raw_mut()
                .set_duty_cycle_raw(port, raw)
                .map(|_| Reply::Done),
            Command::SetConstantSettings { port, direction } => self
                .motors
                .set_constant_settings(port, direction)
                .map(|_| Reply::Done),
            Command::SetVariableSettings {
                port,
                stall_torque_limit,
            } => self
                .motors
                .set_variable_settings(port, stall_torque_limit)
                .map(|_| Reply::Done),
            Command::DescribeSettings { port } => {
                self.motors.describe_settings(port).map(Reply::Settings)
            }
            Command::EncoderCount { port } => self.motors.encoder_count(port).map(Reply::Count),
            Command::EncoderRate { port } => self.motors.encoder_rate(port).map(Reply::Rate),
            Command::LightOn {
                port,
                color,
                brightness,
            } => self
                .lights
                .on_with_brightness(port, color, brightness)
                .map(|_| Reply::Done),
            Command::LightOnWithPattern {
                port,
                color,
                pattern,
            } => {
                let color = Color::try_from(color)?;
                let pattern = Pattern::try_from(pattern)?;
                self.lights
                    .on_with_pattern(port, color, pattern)
                    .map(|_| Reply::Done)
            }
            Command::LightOff { port } => self.lights.off(port).map(|_| Reply::Done),
        }
    }

    /// One unit of time-driven hub work: advance light patterns.
    pub fn poll(&mut self, now_ms: u64) {
        self.lights.poll(now_ms);
    }

    /// Reset every motor and turn every light off.
    pub fn deinit(&mut self) {
        self.motors.deinit();
        self.lights.deinit();
        info!("hub released");
    }
}

/// The hub behind the coarse lock shared by foreground and scheduler.
#[derive(Clone)]
pub struct SharedHub(Arc<Mutex<Hub>>);

impl SharedHub {
    pub fn new(hub: Hub) -> Self {
        Self(Arc::new(Mutex::new(hub)))
    }

    /// Run `f` with the lock held.
    ///
    /// # Errors
    ///
    /// [`BrickError::Failed`] if a previous holder panicked, otherwise
    /// whatever `f` returns.
    pub fn with<R>(&self, f: impl FnOnce(&mut Hub) -> BrickResult<R>) -> BrickResult<R> {
        let mut hub = self.0.lock().map_err(|_| BrickError::Failed)?;
        f(&mut hub)
    }

    /// [`Hub::dispatch`] under the lock.
    pub fn dispatch(&self, command: Command) -> BrickResult<Reply> {
        self.with(|hub| hub.dispatch(command))
    }

    /// [`Hub::deinit`], taking the lock even if a previous holder panicked.
    ///
    /// The hub is back in its released state afterwards, so the poison flag
    /// is cleared and later callers see `NoDevice` rather than `Failed`.
    pub fn teardown(&self) {
        let mut hub = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        hub.deinit();
        drop(hub);
        self.0.clear_poison();
    }
}
