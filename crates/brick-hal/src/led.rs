//! Light outputs: the `LightOutput` trait and its sysfs LED driver.
//!
//! [`LightDriver`][crate::light::LightDriver] decides *what* a light should
//! show; a [`LightOutput`] only knows how to put one RGB frame on the
//! hardware.

use std::fs;
use std::path::{Path, PathBuf};

use brick_types::{BrickError, BrickResult, Color};
use tracing::{debug, warn};

/// sysfs class directory for LEDs.
pub const LEDS_CLASS: &str = "leds";

/// One raw RGB frame.  Components are device values, not calibrated
/// intensities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const OFF: Rgb = Rgb { r: 0, g: 0, b: 0 };

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Device values for a predefined color.
    pub fn for_color(color: Color) -> Rgb {
        match color {
            Color::None | Color::Black => Rgb::OFF,
            Color::Blue => Rgb::new(0, 0, 255),
            Color::Green => Rgb::new(0, 255, 0),
            Color::Yellow => Rgb::new(255, 255, 0),
            Color::Red => Rgb::new(255, 0, 0),
            Color::White => Rgb::new(255, 255, 255),
            Color::Brown => Rgb::new(165, 42, 0),
            Color::Orange => Rgb::new(255, 140, 0),
            Color::Purple => Rgb::new(128, 0, 128),
        }
    }

    /// Scale every component by `level / 255`.
    pub fn scaled(self, level: u8) -> Rgb {
        let scale = |c: u8| ((u16::from(c) * u16::from(level)) / 255) as u8;
        Rgb::new(scale(self.r), scale(self.g), scale(self.b))
    }
}

/// Something that can display an [`Rgb`] frame.
pub trait LightOutput: Send {
    /// Show `rgb` until the next call.
    ///
    /// # Errors
    ///
    /// Returns [`BrickError::Io`] if the hardware could not be updated.
    fn set_rgb(&mut self, rgb: Rgb) -> BrickResult<()>;
}

/// The EV3 status LEDs as exposed under `/sys/class/leds`.
///
/// Each LED class device is a single channel.  Names containing `:red:` are
/// driven with the red component and names containing `:green:` with the
/// green one; the EV3 has no blue channel, so blue is dropped.
pub struct SysfsLed {
    red: Vec<PathBuf>,
    green: Vec<PathBuf>,
}

impl SysfsLed {
    /// Locate the `brightness` files of `names` under `<sysfs_root>/leds`.
    ///
    /// # Errors
    ///
    /// Returns [`BrickError::NoDevice`] if none of the named LEDs exist.
    pub fn open<S: AsRef<str>>(sysfs_root: &Path, names: &[S]) -> BrickResult<Self> {
        let class_dir = sysfs_root.join(LEDS_CLASS);
        let mut red = Vec::new();
        let mut green = Vec::new();
        for name in names {
            let name = name.as_ref();
            let path = class_dir.join(name).join("brightness");
            if !path.is_file() {
                warn!(led = name, "LED not present");
                continue;
            }
            if name.contains(":red:") {
                red.push(path);
            } else if name.contains(":green:") {
                green.push(path);
            } else {
                warn!(led = name, "LED color not recognised; ignoring");
            }
        }
        if red.is_empty() && green.is_empty() {
            return Err(BrickError::NoDevice);
        }
        debug!(red = red.len(), green = green.len(), "status LEDs opened");
        Ok(Self { red, green })
    }
}

impl LightOutput for SysfsLed {
    fn set_rgb(&mut self, rgb: Rgb) -> BrickResult<()> {
        let channels = self
            .red
            .iter()
            .map(|p| (p, rgb.r))
            .chain(self.green.iter().map(|p| (p, rgb.g)));
        for (path, value) in channels {
            fs::write(path, format!("{value}\n"))
                .map_err(|e| BrickError::io(path.display().to_string(), e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimSysfs;

    const LEFT_RED: &str = "led0:red:brick-status";
    const LEFT_GREEN: &str = "led0:green:brick-status";

    #[test]
    fn color_table() {
        assert_eq!(Rgb::for_color(Color::Black), Rgb::OFF);
        assert_eq!(Rgb::for_color(Color::Green), Rgb::new(0, 255, 0));
        assert_eq!(Rgb::for_color(Color::Red), Rgb::new(255, 0, 0));
    }

    #[test]
    fn scaling() {
        let c = Rgb::new(255, 128, 0);
        assert_eq!(c.scaled(255), c);
        assert_eq!(c.scaled(0), Rgb::OFF);
        assert_eq!(Rgb::new(255, 255, 255).scaled(51), Rgb::new(51, 51, 51));
    }

    #[test]
    fn sysfs_led_drives_red_and_green_channels() {
        let dir = tempfile::tempdir().unwrap();
        let tree = SimSysfs::new(dir.path())
            .with_led(LEFT_RED)
            .with_led(LEFT_GREEN)
            .build()
            .unwrap();

        let mut led = SysfsLed::open(dir.path(), &[LEFT_RED, LEFT_GREEN]).unwrap();
        led.set_rgb(Rgb::for_color(Color::Orange)).unwrap();
        assert_eq!(tree.led_brightness(LEFT_RED).unwrap(), 255);
        assert_eq!(tree.led_brightness(LEFT_GREEN).unwrap(), 140);

        led.set_rgb(Rgb::OFF).unwrap();
        assert_eq!(tree.led_brightness(LEFT_RED).unwrap(), 0);
        assert_eq!(tree.led_brightness(LEFT_GREEN).unwrap(), 0);
    }

    #[test]
    fn missing_leds_are_no_device() {
        let dir = tempfile::tempdir().unwrap();
        let result = SysfsLed::open(dir.path(), &[LEFT_RED]);
        assert!(matches!(result, Err(BrickError::NoDevice)));
    }
}
