//! Simulated hardware for CI and tests without a brick.
//!
//! [`SimSysfs`] lays out a fake sysfs tree on disk (`tacho-motor/motorN/…`
//! and `leds/<name>/brightness`) that the real drivers can discover and
//! drive.  [`SimLight`] is a [`LightOutput`] that records every frame.
//!
//! # Example
//!
//! ```rust
//! use brick_hal::rawmotor::RawMotorDriver;
//! use brick_hal::sim::SimSysfs;
//! use brick_types::{Port, PortRange};
//!
//! let dir = std::env::temp_dir().join(format!("brick-sim-doc-{}", std::process::id()));
//! let tree = SimSysfs::new(&dir).with_motor(3, Port::B).build().unwrap();
//!
//! let mut driver = RawMotorDriver::discover(&dir, PortRange::MOTORS).unwrap();
//! driver.set_duty_cycle_raw(Port::B, 4_000).unwrap();
//! assert_eq!(tree.attr(3, "duty_cycle_sp").unwrap(), "40");
//! # std::fs::remove_dir_all(&dir).unwrap();
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use brick_types::{BrickResult, Port};

use crate::led::{LEDS_CLASS, LightOutput, Rgb};
use crate::rawmotor::TACHO_MOTOR_CLASS;

// ────────────────────────────────────────────────────────────────────────────
// On-disk sysfs tree
// ────────────────────────────────────────────────────────────────────────────

/// Builder for a fake sysfs tree rooted at an arbitrary directory.
pub struct SimSysfs {
    root: PathBuf,
    motors: Vec<(u32, Port)>,
    leds: Vec<String>,
}

impl SimSysfs {
    /// Start an empty tree under `root`.  Nothing is written until
    /// [`build`][Self::build].
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            motors: Vec::new(),
            leds: Vec::new(),
        }
    }

    /// Add `motor<device_index>` plugged into output `port`.
    pub fn with_motor(mut self, device_index: u32, port: Port) -> Self {
        self.motors.push((device_index, port));
        self
    }

    /// Add an LED class device called `name`.
    pub fn with_led(mut self, name: impl Into<String>) -> Self {
        self.leds.push(name.into());
        self
    }

    /// Write the tree to disk.  The motor class directory is always
    /// created, even when no motor was added.
    pub fn build(self) -> io::Result<SimTree> {
        let motor_class = self.root.join(TACHO_MOTOR_CLASS);
        fs::create_dir_all(&motor_class)?;
        for (index, port) in &self.motors {
            let dir = motor_class.join(format!("motor{index}"));
            fs::create_dir_all(&dir)?;
            fs::write(dir.join("address"), format!("ev3-ports:out{}\n", port.label()))?;
            fs::write(dir.join("command"), "")?;
            fs::write(dir.join("stop_action"), "")?;
            fs::write(dir.join("position"), "0\n")?;
            fs::write(dir.join("speed"), "0\n")?;
            fs::write(dir.join("duty_cycle_sp"), "0\n")?;
        }
        for name in &self.leds {
            let dir = self.root.join(LEDS_CLASS).join(name);
            fs::create_dir_all(&dir)?;
            fs::write(dir.join("brightness"), "0\n")?;
        }
        Ok(SimTree { root: self.root })
    }
}

/// Handle on a built fake tree, for poking device files from tests.
pub struct SimTree {
    root: PathBuf,
}

impl SimTree {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn motor_dir(&self, device_index: u32) -> PathBuf {
        self.root
            .join(TACHO_MOTOR_CLASS)
            .join(format!("motor{device_index}"))
    }

    /// First line of a motor attribute, trimmed.
    pub fn attr(&self, device_index: u32, attr: &str) -> io::Result<String> {
        read_first_line(&self.motor_dir(device_index).join(attr))
    }

    /// Replace a motor attribute, as the kernel would when state changes.
    pub fn set_attr(&self, device_index: u32, attr: &str, value: &str) -> io::Result<()> {
        fs::write(self.motor_dir(device_index).join(attr), value)
    }

    /// Current brightness of LED `name`.
    pub fn led_brightness(&self, name: &str) -> io::Result<u8> {
        let path = self.root.join(LEDS_CLASS).join(name).join("brightness");
        read_first_line(&path)?
            .parse()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

fn read_first_line(path: &Path) -> io::Result<String> {
    let text = fs::read_to_string(path)?;
    Ok(text.lines().next().unwrap_or("").trim().to_string())
}

// ────────────────────────────────────────────────────────────────────────────
// Recording light
// ────────────────────────────────────────────────────────────────────────────

/// A [`LightOutput`] that stores every frame it is asked to show.
///
/// Clones share the same frame log, so a test can keep one clone and hand
/// the other to a [`LightDriver`][crate::light::LightDriver].
#[derive(Clone, Default)]
pub struct SimLight {
    frames: Arc<Mutex<Vec<Rgb>>>,
}

impl SimLight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every frame shown so far, oldest first.
    pub fn frames(&self) -> Vec<Rgb> {
        self.frames.lock().map(|f| f.clone()).unwrap_or_default()
    }

    /// The most recent frame, if any.
    pub fn last(&self) -> Option<Rgb> {
        self.frames.lock().ok().and_then(|f| f.last().copied())
    }
}

impl LightOutput for SimLight {
    fn set_rgb(&mut self, rgb: Rgb) -> BrickResult<()> {
        if let Ok(mut frames) = self.frames.lock() {
            frames.push(rgb);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_writes_motor_and_led_files() {
        let dir = tempfile::tempdir().unwrap();
        let tree = SimSysfs::new(dir.path())
            .with_motor(7, Port::D)
            .with_led("led0:green:brick-status")
            .build()
            .unwrap();

        let address = fs::read(tree.motor_dir(7).join("address")).unwrap();
        assert_eq!(address[crate::rawmotor::ADDRESS_PORT_OFFSET], b'D');
        assert_eq!(tree.attr(7, "position").unwrap(), "0");
        assert_eq!(tree.led_brightness("led0:green:brick-status").unwrap(), 0);
    }

    #[test]
    fn empty_tree_still_has_motor_class() {
        let dir = tempfile::tempdir().unwrap();
        let tree = SimSysfs::new(dir.path()).build().unwrap();
        assert!(tree.root().join(TACHO_MOTOR_CLASS).is_dir());
    }

    #[test]
    fn sim_light_clones_share_frames() {
        let seen = SimLight::new();
        let mut output = seen.clone();
        output.set_rgb(Rgb::new(1, 2, 3)).unwrap();
        assert_eq!(seen.frames(), vec![Rgb::new(1, 2, 3)]);
        assert_eq!(seen.last(), Some(Rgb::new(1, 2, 3)));
    }
}
