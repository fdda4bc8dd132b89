//! Outbound commands
//!
//! Commands are a single ASCII line: `turns,speed,distance,mode\n`, with the
//! distance in millimetres printed with exactly two fractional digits. The
//! device does not answer, so sending is fire-and-forget.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ProtocolError;

/// Motion mode selector, sent as the last field of a command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MotionMode {
    /// Spin a number of turns at a given speed
    Velocity,
    /// Travel a linear distance in millimetres
    Distance,
}

impl MotionMode {
    /// Wire selector for this mode
    pub fn selector(&self) -> u8 {
        match self {
            MotionMode::Velocity => 0,
            MotionMode::Distance => 1,
        }
    }

    /// Look up a mode from its wire selector
    pub fn from_selector(selector: u8) -> Option<Self> {
        match selector {
            0 => Some(MotionMode::Velocity),
            1 => Some(MotionMode::Distance),
            _ => None,
        }
    }
}

/// A command for the motor controller
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Revolutions to perform
    pub turns: i32,
    /// Speed in device units
    pub speed: i32,
    /// Distance in millimetres
    pub distance: f64,
    /// Motion mode
    pub mode: MotionMode,
}

impl Command {
    /// Create a command from its four fields
    pub fn new(turns: i32, speed: i32, distance: f64, mode: MotionMode) -> Self {
        Self {
            turns,
            speed,
            distance,
            mode,
        }
    }

    /// Move a linear distance (turns and speed are sent as zero)
    pub fn distance(millimetres: f64) -> Self {
        Self::new(0, 0, millimetres, MotionMode::Distance)
    }

    /// Spin a number of turns at a speed (distance is sent as zero)
    pub fn turns(turns: i32, speed: i32) -> Self {
        Self::new(turns, speed, 0.0, MotionMode::Velocity)
    }

    /// Build a move from optional user-supplied parts
    ///
    /// A turns move needs both `turns` and a nonzero `speed`; a distance move
    /// takes `distance` alone. Nothing given means no command.
    pub fn from_move_options(
        turns: Option<i32>,
        speed: Option<i32>,
        distance: Option<f64>,
    ) -> Result<Option<Self>, ProtocolError> {
        let invalid = |msg: &str| -> Result<Option<Self>, ProtocolError> {
            Err(ProtocolError::InvalidCommand(msg.to_string()))
        };
        match (turns, speed, distance) {
            (None, None, None) => Ok(None),
            (Some(_), Some(0), None) => invalid("speed must be nonzero for a turns move"),
            (Some(turns), Some(speed), None) => Ok(Some(Self::turns(turns, speed))),
            (Some(_), None, None) => invalid("a turns move needs a speed"),
            (None, Some(_), None) => invalid("speed only applies to a turns move"),
            (None, None, Some(mm)) => Ok(Some(Self::distance(mm))),
            _ => invalid("a move is either turns/speed or distance, not both"),
        }
    }

    /// Encode the command as the bytes of one wire line
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        if !self.distance.is_finite() {
            return Err(ProtocolError::InvalidCommand(format!(
                "distance must be finite, got {}",
                self.distance
            )));
        }
        Ok(self.to_string().into_bytes())
    }
}

/// Formats the full wire line, trailing newline included
impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{},{},{:.2},{}",
            self.turns,
            self.speed,
            self.distance,
            self.mode.selector()
        )
    }
}

impl FromStr for Command {
    type Err = ProtocolError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let invalid = || ProtocolError::InvalidCommand(line.trim_end().to_string());

        let fields: Vec<&str> = line.trim_end_matches(['\r', '\n']).split(',').collect();
        let [turns, speed, distance, mode] = fields.as_slice() else {
            return Err(invalid());
        };

        let mode = mode
            .trim()
            .parse::<u8>()
            .ok()
            .and_then(MotionMode::from_selector)
            .ok_or_else(invalid)?;

        Ok(Self {
            turns: turns.trim().parse().map_err(|_| invalid())?,
            speed: speed.trim().parse().map_err(|_| invalid())?,
            distance: distance.trim().parse().map_err(|_| invalid())?,
            mode,
        })
    }
}

/// Encode a command line from its raw fields
pub fn encode(
    turns: i32,
    speed: i32,
    distance: f64,
    mode: MotionMode,
) -> Result<Vec<u8>, ProtocolError> {
    Command::new(turns, speed, distance, mode).encode()
}
