//! [`LightDriver`] – color and pattern state for indicator lights.
//!
//! Each light-capable port is in one of three [`LightState`]s.  Explicit
//! calls (`on`, `on_with_pattern`, `off`) render immediately; patterns are
//! advanced by [`LightDriver::poll`], which the scheduler calls every
//! period with [`LightDriver::clock_ms`].  The clock starts when the driver
//! is created and keeps running across scheduler restarts, so a pattern
//! started in one run is timed on the same scale as the next run's polls.
//!
//! | Pattern | Rendering |
//! |---|---|
//! | `Flash` | full color for [`FLASH_INTERVAL_MS`], dark for the same time |
//! | `Breathe` | triangular ramp 0 → full → 0 over [`BREATHE_PERIOD_MS`] |

use std::time::Instant;

use brick_types::{BrickError, BrickResult, Color, Pattern, Port};
use tracing::{debug, warn};

use crate::led::{LightOutput, Rgb};

/// Length of each on and each off phase of [`Pattern::Flash`].
pub const FLASH_INTERVAL_MS: u64 = 250;

/// Full cycle length of [`Pattern::Breathe`].
pub const BREATHE_PERIOD_MS: u64 = 2_000;

/// What a light is currently showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightState {
    Off,
    SteadyColor(Color),
    Patterned(Color, Pattern),
}

struct LightSlot {
    port: Port,
    output: Box<dyn LightOutput>,
    state: LightState,
    pattern_start_ms: u64,
    last_rendered: Option<Rgb>,
}

impl LightSlot {
    fn show(&mut self, rgb: Rgb) -> BrickResult<()> {
        self.output.set_rgb(rgb)?;
        self.last_rendered = Some(rgb);
        Ok(())
    }
}

/// Owner of every light and its pattern state.
pub struct LightDriver {
    slots: Vec<LightSlot>,
    epoch: Instant,
    /// Latest time passed to `poll`; new patterns start here.
    now_ms: u64,
}

impl Default for LightDriver {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            epoch: Instant::now(),
            now_ms: 0,
        }
    }
}

impl LightDriver {
    /// A driver with no lights; every port reports [`BrickError::NoDevice`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `output` as the light of `port`.  A second output for the same
    /// port replaces the first.
    pub fn with_light(mut self, port: Port, output: Box<dyn LightOutput>) -> Self {
        self.slots.retain(|s| s.port != port);
        self.slots.push(LightSlot {
            port,
            output,
            state: LightState::Off,
            pattern_start_ms: 0,
            last_rendered: None,
        });
        self
    }

    /// Ports that have a light.
    pub fn ports(&self) -> Vec<Port> {
        self.slots.iter().map(|s| s.port).collect()
    }

    pub fn state(&self, port: Port) -> BrickResult<LightState> {
        let idx = self.slot_index(port)?;
        Ok(self.slots[idx].state)
    }

    /// Show a steady `color`.  Dark colors turn the light off.
    pub fn on(&mut self, port: Port, color: Color) -> BrickResult<()> {
        self.on_with_pattern(port, color, Pattern::None)
    }

    /// Show `color` with `pattern`.  Dark colors turn the light off.
    pub fn on_with_pattern(&mut self, port: Port, color: Color, pattern: Pattern) -> BrickResult<()> {
        let idx = self.slot_index(port)?;
        let now_ms = self.now_ms;
        let slot = &mut self.slots[idx];

        let (state, rgb) = match (color.is_dark(), pattern) {
            (true, _) => (LightState::Off, Rgb::OFF),
            (false, Pattern::None) => (LightState::SteadyColor(color), Rgb::for_color(color)),
            (false, pattern) => (
                LightState::Patterned(color, pattern),
                pattern_frame(color, pattern, 0),
            ),
        };
        slot.show(rgb)?;
        slot.state = state;
        slot.pattern_start_ms = now_ms;
        debug!(port = %port, ?state, "light state changed");
        Ok(())
    }

    pub fn off(&mut self, port: Port) -> BrickResult<()> {
        self.on(port, Color::None)
    }

    /// Turn on from unvalidated binding arguments.
    ///
    /// `brightness` is clamped to `0..=100`; only full brightness is
    /// supported, anything else is [`BrickError::NotImplemented`].  Color
    /// ordinals outside `None..=Purple` are [`BrickError::InvalidArgument`].
    pub fn on_with_brightness(&mut self, port: Port, color_id: i32, brightness: i32) -> BrickResult<()> {
        if brightness.clamp(0, 100) != 100 {
            return Err(BrickError::NotImplemented);
        }
        let color = Color::try_from(color_id)?;
        self.on(port, color)
    }

    /// Milliseconds since this driver was created.
    pub fn clock_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    /// Advance every patterned light to `now_ms`.  Failures are logged and do
    /// not stop other lights from updating.
    pub fn poll(&mut self, now_ms: u64) {
        self.now_ms = now_ms;
        for slot in &mut self.slots {
            let LightState::Patterned(color, pattern) = slot.state else {
                continue;
            };
            let elapsed = now_ms.saturating_sub(slot.pattern_start_ms);
            let rgb = pattern_frame(color, pattern, elapsed);
            if slot.last_rendered == Some(rgb) {
                continue;
            }
            if let Err(e) = slot.show(rgb) {
                warn!(port = %slot.port, error = %e, "light update failed");
            }
        }
    }

    /// Turn every light off.
    pub fn deinit(&mut self) {
        for slot in &mut self.slots {
            slot.state = LightState::Off;
            if let Err(e) = slot.show(Rgb::OFF) {
                warn!(port = %slot.port, error = %e, "could not turn light off");
            }
        }
    }

    fn slot_index(&self, port: Port) -> BrickResult<usize> {
        match self.slots.iter().position(|s| s.port == port) {
            Some(idx) => Ok(idx),
            None if port.is_known() => Err(BrickError::NoDevice),
            None => Err(BrickError::InvalidPort),
        }
    }
}

/// Frame shown `elapsed_ms` into `pattern`.
fn pattern_frame(color: Color, pattern: Pattern, elapsed_ms: u64) -> Rgb {
    let full = Rgb::for_color(color);
    match pattern {
        Pattern::None => full,
        Pattern::Flash => {
            if (elapsed_ms / FLASH_INTERVAL_MS) % 2 == 0 {
                full
            } else {
                Rgb::OFF
            }
        }
        Pattern::Breathe => {
            let half = BREATHE_PERIOD_MS / 2;
            let phase = elapsed_ms % BREATHE_PERIOD_MS;
            let ramp = if phase < half { phase } else { BREATHE_PERIOD_MS - phase };
            full.scaled((ramp * 255 / half) as u8)
        }
    }
}
