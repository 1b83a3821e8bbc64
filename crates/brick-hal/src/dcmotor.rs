//! [`DcMotors`] – settings-aware duty-cycle control on top of the raw driver.
//!
//! Callers speak in signed percentages.  Each port carries a
//! [`DcMotorSettings`] record: a polarity and a stall-duty limit.  A duty
//! request is converted to raw units, clamped symmetrically to the limit and
//! only then sign-flipped for inverted motors, so the limit bounds physical
//! torque whatever the polarity.

use std::fmt;

use brick_types::{BrickError, BrickResult, DUTY_PCT_TO_ABS, Direction, MAX_DUTY, Port};
use tracing::debug;

use crate::rawmotor::RawMotorDriver;

/// Per-port motor settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DcMotorSettings {
    pub direction: Direction,
    /// Largest raw duty magnitude, in `[0, MAX_DUTY]`.
    pub max_stall_duty: i32,
}

impl Default for DcMotorSettings {
    fn default() -> Self {
        Self {
            direction: Direction::Normal,
            max_stall_duty: MAX_DUTY,
        }
    }
}

/// Percent to raw duty.  Out-of-range floats saturate.
fn pct_to_raw(percent: f32) -> BrickResult<i32> {
    if !percent.is_finite() {
        return Err(BrickError::InvalidArgument);
    }
    Ok((DUTY_PCT_TO_ABS * percent) as i32)
}

/// DC motor controller owning the raw driver and one settings slot per port.
pub struct DcMotors {
    raw: RawMotorDriver,
    settings: Vec<DcMotorSettings>,
}

impl DcMotors {
    /// Wrap `raw`, starting every port at `{Normal, MAX_DUTY}`.
    pub fn new(raw: RawMotorDriver) -> Self {
        let settings = vec![DcMotorSettings::default(); raw.ports().len()];
        Self { raw, settings }
    }

    pub fn raw(&self) -> &RawMotorDriver {
        &self.raw
    }

    pub fn raw_mut(&mut self) -> &mut RawMotorDriver {
        &mut self.raw
    }

    /// Status of the motor on `port`, as reported by the raw driver.
    pub fn status(&self, port: Port) -> BrickResult<()> {
        self.raw.status(port)
    }

    /// Current settings of `port`.
    pub fn settings(&self, port: Port) -> BrickResult<DcMotorSettings> {
        let slot = self.slot(port)?;
        Ok(self.settings[slot])
    }

    /// Set the polarity of `port`.
    pub fn set_constant_settings(&mut self, port: Port, direction: Direction) -> BrickResult<()> {
        let slot = self.slot(port)?;
        self.settings[slot].direction = direction;
        debug!(port = %port, %direction, "direction set");
        Ok(())
    }

    /// Set the stall-torque limit of `port` as a percentage of full duty.
    ///
    /// # Errors
    ///
    /// [`BrickError::InvalidArgument`] when the limit is not within
    /// `0..=100` percent.
    pub fn set_variable_settings(&mut self, port: Port, stall_torque_limit: f32) -> BrickResult<()> {
        let slot = self.slot(port)?;
        let max_stall_duty = pct_to_raw(stall_torque_limit)?;
        if !(0..=MAX_DUTY).contains(&max_stall_duty) {
            return Err(BrickError::InvalidArgument);
        }
        self.settings[slot].max_stall_duty = max_stall_duty;
        debug!(port = %port, max_stall_duty, "stall limit set");
        Ok(())
    }

    pub fn coast(&mut self, port: Port) -> BrickResult<()> {
        self.raw.coast(port)
    }

    /// Hold the motor with zero duty.  Unlike [`coast`][Self::coast] this
    /// keeps the motor in run-direct mode.
    pub fn brake(&mut self, port: Port) -> BrickResult<()> {
        self.raw.set_duty_cycle_raw(port, 0)
    }

    /// Drive `port` at `duty_cycle` percent (sign gives direction).
    ///
    /// Values beyond the stall limit are capped, not rejected.
    pub fn set_duty_cycle(&mut self, port: Port, duty_cycle: f32) -> BrickResult<()> {
        let slot = self.slot(port)?;
        let requested = pct_to_raw(duty_cycle)?;
        let DcMotorSettings {
            direction,
            max_stall_duty: limit,
        } = self.settings[slot];

        let mut duty = requested.clamp(-limit, limit);
        if direction == Direction::Inverted {
            duty = -duty;
        }
        self.raw.set_duty_cycle_raw(port, duty)
    }

    /// Human-readable settings of `port`.
    pub fn describe_settings(&self, port: Port) -> BrickResult<String> {
        let settings = self.settings(port)?;
        Ok(SettingsReport { port, settings }.to_string())
    }

    pub fn encoder_count(&mut self, port: Port) -> BrickResult<i32> {
        self.raw.encoder_count_raw(port)
    }

    pub fn encoder_rate(&mut self, port: Port) -> BrickResult<i32> {
        self.raw.encoder_rate_raw(port)
    }

    /// Release the raw driver.  Settings are kept.
    pub fn deinit(&mut self) {
        self.raw.deinit();
    }

    // Connected-port check shared by every settings operation.
    fn slot(&self, port: Port) -> BrickResult<usize> {
        self.raw.status(port)?;
        self.raw.ports().index(port)
    }
}

struct SettingsReport {
    port: Port,
    settings: DcMotorSettings,
}

impl fmt::Display for SettingsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Port: {}\nDirection: {}\nTorque limit: {:.1}",
            self.port,
            self.settings.direction,
            self.settings.max_stall_duty as f32 / DUTY_PCT_TO_ABS
        )
    }
}
