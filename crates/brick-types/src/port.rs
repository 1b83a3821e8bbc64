//! Physical connection points.
//!
//! A [`Port`] is the ASCII ordinal of its label (`'A'`, `'1'`, `'@'`, …).
//! Any byte can be wrapped so that callers can hand in arbitrary values; the
//! components decide validity with closed range checks such as
//! [`PortRange::index`].

use std::fmt;

use schemars::JsonSchema;
use schemars::r#gen::SchemaGenerator;
use schemars::schema::Schema;
use serde::{Deserialize, Serialize};

use crate::error::{BrickError, BrickResult};

/// Logical identifier for one physical actuator or sensor connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "char", try_from = "char")]
pub struct Port(u8);

impl Port {
    /// The brick itself (status light, buttons).
    pub const SELF: Port = Port(b'@');
    pub const A: Port = Port(b'A');
    pub const B: Port = Port(b'B');
    pub const C: Port = Port(b'C');
    pub const D: Port = Port(b'D');
    pub const S1: Port = Port(b'1');
    pub const S2: Port = Port(b'2');
    pub const S3: Port = Port(b'3');
    pub const S4: Port = Port(b'4');

    /// Wrap a raw ordinal without validating it.
    pub const fn from_raw(raw: u8) -> Self {
        Port(raw)
    }

    /// The raw ordinal.
    pub const fn raw(self) -> u8 {
        self.0
    }

    /// The port's label character.
    pub fn label(self) -> char {
        char::from(self.0)
    }

    /// `true` for every label the brick has: `@`, `A`..`D`, `1`..`4`.
    pub fn is_known(self) -> bool {
        matches!(self.0, b'@' | b'A'..=b'D' | b'1'..=b'4')
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_ascii_graphic() {
            write!(f, "{}", self.label())
        } else {
            write!(f, "#{}", self.0)
        }
    }
}

impl From<Port> for char {
    fn from(port: Port) -> char {
        port.label()
    }
}

impl TryFrom<char> for Port {
    type Error = BrickError;

    fn try_from(c: char) -> Result<Self, Self::Error> {
        u8::try_from(c)
            .map(Port)
            .map_err(|_| BrickError::InvalidPort)
    }
}

impl JsonSchema for Port {
    fn schema_name() -> String {
        "Port".to_string()
    }

    fn json_schema(generator: &mut SchemaGenerator) -> Schema {
        <char as JsonSchema>::json_schema(generator)
    }
}

/// An inclusive, contiguous set of ports served by one driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    pub first: Port,
    pub last: Port,
}

impl PortRange {
    /// The four EV3 output ports, `A` through `D`.
    pub const MOTORS: PortRange = PortRange {
        first: Port::A,
        last: Port::D,
    };

    pub const fn new(first: Port, last: Port) -> Self {
        Self { first, last }
    }

    /// Number of ports in the range (zero if `last < first`).
    pub fn len(&self) -> usize {
        if self.last.0 < self.first.0 {
            0
        } else {
            usize::from(self.last.0 - self.first.0) + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, port: Port) -> bool {
        (self.first.0..=self.last.0).contains(&port.0)
    }

    /// Arena index of `port`, or [`BrickError::InvalidPort`] if it lies
    /// outside the range.
    pub fn index(&self, port: Port) -> BrickResult<usize> {
        if self.contains(port) {
            Ok(usize::from(port.0 - self.first.0))
        } else {
            Err(BrickError::InvalidPort)
        }
    }

    /// Iterate over every port in the range, in order.
    pub fn iter(&self) -> impl Iterator<Item = Port> + use<> {
        (self.first.0..=self.last.0).map(Port)
    }
}

impl Default for PortRange {
    fn default() -> Self {
        PortRange::MOTORS
    }
}
