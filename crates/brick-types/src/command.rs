//! Named operations exposed to the binding layer.
//!
//! Every public motor and light operation has a [`Command`] variant.  The
//! binding collaborator parses its own argument objects, builds a
//! [`Command`] and hands it to the hub; the result comes back as a
//! [`Reply`] or a [`BrickError`][crate::BrickError].  Commands are
//! serialized as `{"op": "...", "args": {...}}`.

use schemars::JsonSchema;
use schemars::schema::RootSchema;
use schemars::schema_for;
use serde::{Deserialize, Serialize};

use crate::{Direction, Port};

/// A single named call into the brick core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "op", content = "args")]
pub enum Command {
    /// Check whether a motor is attached to `port`.
    MotorStatus { port: Port },
    /// Let the motor spin freely.
    Coast { port: Port },
    /// Drive the motor with zero duty.
    Brake { port: Port },
    /// Drive the motor at a signed percentage, subject to the port settings.
    SetDutyCycle { port: Port, percent: f32 },
    /// Write a raw duty value in `[-10000, 10000]`, bypassing the settings.
    SetDutyCycleRaw { port: Port, raw: i32 },
    SetConstantSettings { port: Port, direction: Direction },
    SetVariableSettings { port: Port, stall_torque_limit: f32 },
    DescribeSettings { port: Port },
    EncoderCount { port: Port },
    EncoderRate { port: Port },
    /// Color ordinal and brightness are passed unvalidated, as the binding
    /// layer received them.
    LightOn { port: Port, color: i32, brightness: i32 },
    LightOnWithPattern { port: Port, color: i32, pattern: i32 },
    LightOff { port: Port },
}

impl Command {
    /// The port the command addresses.
    pub fn port(&self) -> Port {
        match self {
            Command::MotorStatus { port }
            | Command::Coast { port }
            | Command::Brake { port }
            | Command::SetDutyCycle { port, .. }
            | Command::SetDutyCycleRaw { port, .. }
            | Command::SetConstantSettings { port, .. }
            | Command::SetVariableSettings { port, .. }
            | Command::DescribeSettings { port }
            | Command::EncoderCount { port }
            | Command::EncoderRate { port }
            | Command::LightOn { port, .. }
            | Command::LightOnWithPattern { port, .. }
            | Command::LightOff { port } => *port,
        }
    }
}

/// Successful outcome of a [`Command`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", content = "value")]
pub enum Reply {
    Done,
    Count(i32),
    Rate(i32),
    Settings(String),
}

/// JSON Schema of [`Command`], for binding generators.
pub fn command_schema() -> RootSchema {
    schema_for!(Command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_duty_cycle_wire_format() {
        let cmd = Command::SetDutyCycle {
            port: Port::B,
            percent: 42.5,
        };
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["op"], "SetDutyCycle");
        assert_eq!(json["args"]["port"], "B");
        let back: Command = serde_json::from_value(json).unwrap();
        assert_eq!(back, cmd);
    }

    #[test]
    fn direction_is_lowercase_on_the_wire() {
        let json = r#"{"op":"SetConstantSettings","args":{"port":"A","direction":"inverted"}}"#;
        let cmd: Command = serde_json::from_str(json).unwrap();
        assert_eq!(
            cmd,
            Command::SetConstantSettings {
                port: Port::A,
                direction: Direction::Inverted,
            }
        );
        assert_eq!(cmd.port(), Port::A);
    }

    #[test]
    fn schema_lists_every_operation() {
        let schema = serde_json::to_string(&command_schema()).unwrap();
        for op in ["MotorStatus", "Brake", "SetVariableSettings", "LightOnWithPattern"] {
            assert!(schema.contains(op), "schema is missing {op}");
        }
    }

    #[test]
    fn reply_roundtrip() {
        let reply = Reply::Count(-720);
        let json = serde_json::to_string(&reply).unwrap();
        assert_eq!(serde_json::from_str::<Reply>(&json).unwrap(), reply);
    }
}
