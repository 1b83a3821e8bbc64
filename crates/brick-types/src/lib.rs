//! `brick-types` – vocabulary shared by every brick crate.
//!
//! Ports, motor directions, light colors and patterns, the device constants
//! that form the stable ABI, the [`BrickError`] taxonomy and the
//! [`Command`]/[`Reply`] surface the binding layer calls through.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub mod command;
pub mod error;
pub mod port;

pub use command::{Command, Reply, command_schema};
pub use error::{BrickError, BrickResult, ErrorCode};
pub use port::{Port, PortRange};

/// Default scheduler period in milliseconds.
pub const PERIOD_MS: u64 = 10;

/// Largest raw duty-cycle magnitude accepted by the motor drivers.
pub const MAX_DUTY: i32 = 10_000;

/// Multiply a percentage by this to obtain raw duty units.
pub const DUTY_PCT_TO_ABS: f32 = 100.0;

/// Motor rotation polarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Positive duty turns the motor clockwise.
    #[default]
    Normal,
    /// Positive duty turns the motor counterclockwise.
    Inverted,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Normal => write!(f, "normal"),
            Direction::Inverted => write!(f, "inverted"),
        }
    }
}

/// Light colors, also used for detected colors.  The ordinals are part of
/// the binding ABI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Color {
    #[default]
    None = 0,
    Black = 1,
    Blue = 2,
    Green = 3,
    Yellow = 4,
    Red = 5,
    White = 6,
    Brown = 7,
    Orange = 8,
    Purple = 9,
}

impl Color {
    /// `None` and `Black` both mean "no light".
    pub fn is_dark(self) -> bool {
        matches!(self, Color::None | Color::Black)
    }
}

impl TryFrom<i32> for Color {
    type Error = BrickError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Color::None,
            1 => Color::Black,
            2 => Color::Blue,
            3 => Color::Green,
            4 => Color::Yellow,
            5 => Color::Red,
            6 => Color::White,
            7 => Color::Brown,
            8 => Color::Orange,
            9 => Color::Purple,
            _ => return Err(BrickError::InvalidArgument),
        })
    }
}

/// Timed light patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Pattern {
    /// The light does not change.
    #[default]
    None = 0,
    Flash = 1,
    Breathe = 2,
}

impl TryFrom<i32> for Pattern {
    type Error = BrickError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Pattern::None),
            1 => Ok(Pattern::Flash),
            2 => Ok(Pattern::Breathe),
            _ => Err(BrickError::InvalidArgument),
        }
    }
}
