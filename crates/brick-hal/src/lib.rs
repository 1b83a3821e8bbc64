//! `brick-hal` – Motor and light hardware abstraction.
//!
//! # Modules
//!
//! - [`rawmotor`] – [`RawMotorDriver`][rawmotor::RawMotorDriver]: discovers
//!   motors under the sysfs `tacho-motor` class and performs raw duty,
//!   coast and encoder I/O through retained file handles.
//! - [`dcmotor`] – [`DcMotors`][dcmotor::DcMotors]: per-port direction and
//!   stall-duty settings, percent to raw conversion, symmetric clamping.
//! - [`light`] – [`LightDriver`][light::LightDriver]: color and pattern
//!   state machine, advanced by a periodic `poll`.
//! - [`led`] – [`LightOutput`][led::LightOutput] and the sysfs status LED
//!   implementation.
//! - [`hub`] – [`Hub`][hub::Hub] and [`SharedHub`][hub::SharedHub]: the
//!   lock-protected owner of all device state and the by-name command
//!   dispatcher.
//! - [`sim`] – fake sysfs trees and a recording light for headless tests.

pub mod dcmotor;
pub mod hub;
pub mod led;
pub mod light;
pub mod rawmotor;
pub mod sim;

pub use dcmotor::{DcMotorSettings, DcMotors};
pub use hub::{Hub, HubConfig, SharedHub};
pub use led::{LightOutput, Rgb, SysfsLed};
pub use light::{LightDriver, LightState};
pub use rawmotor::RawMotorDriver;
