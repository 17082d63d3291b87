//! Control surface snapshot produced by the operator UI

use serde::{Deserialize, Serialize};

use crate::{ProtocolError, SettingsBundle};

/// Full deflection of a bidirectional axis (throttle, steering)
pub const AXIS_LIMIT: i32 = 100;

/// Full scale of a one-sided percentage control (brake, axis halves)
pub const PERCENT_MAX: i32 = 100;

/// Clamp a signed axis value into `[-100, 100]`
pub fn clamp_axis(value: i32) -> i32 {
    value.clamp(-AXIS_LIMIT, AXIS_LIMIT)
}

/// Clamp a percentage into `[0, 100]`
pub fn clamp_percent(value: i32) -> u8 {
    value.clamp(0, PERCENT_MAX) as u8
}

/// Transmission gear
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Gear {
    #[default]
    First,
    Second,
    Third,
}

impl Gear {
    /// Gear number as shown to the operator and sent on the wire
    pub fn number(self) -> u8 {
        match self {
            Gear::First => 1,
            Gear::Second => 2,
            Gear::Third => 3,
        }
    }
}

impl TryFrom<u8> for Gear {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Gear::First),
            2 => Ok(Gear::Second),
            3 => Ok(Gear::Third),
            other => Err(ProtocolError::InvalidGear(other.to_string())),
        }
    }
}

impl From<Gear> for u8 {
    fn from(gear: Gear) -> Self {
        gear.number()
    }
}

impl std::fmt::Display for Gear {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// Snapshot of every operator-adjustable vehicle parameter.
///
/// The UI produces a fresh snapshot on each gesture update. It is always a
/// complete state, never a diff against a previous one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlSurfaceState {
    /// Signed throttle, positive is forward
    pub throttle: i32,
    /// Brake pressure in percent
    pub brake: i32,
    /// Signed steering, positive is right
    pub steering: i32,
    pub gear: Gear,
    pub lights_on: bool,
    pub auto_mode: bool,
    pub honk: bool,
}

impl ControlSurfaceState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_throttle(mut self, throttle: i32) -> Self {
        self.throttle = clamp_axis(throttle);
        self
    }

    pub fn with_steering(mut self, steering: i32) -> Self {
        self.steering = clamp_axis(steering);
        self
    }

    pub fn with_brake(mut self, brake: i32) -> Self {
        self.brake = clamp_percent(brake) as i32;
        self
    }

    pub fn with_gear(mut self, gear: Gear) -> Self {
        self.gear = gear;
        self
    }

    pub fn with_lights(mut self, on: bool) -> Self {
        self.lights_on = on;
        self
    }

    pub fn with_auto_mode(mut self, on: bool) -> Self {
        self.auto_mode = on;
        self
    }

    /// Copy with every field forced into its legal range
    pub fn clamped(self) -> Self {
        Self {
            throttle: clamp_axis(self.throttle),
            brake: clamp_percent(self.brake) as i32,
            steering: clamp_axis(self.steering),
            ..self
        }
    }

    /// The `{gear, lights, auto}` bundle carried by every record
    pub fn settings(&self) -> SettingsBundle {
        SettingsBundle {
            gear: self.gear,
            lights: self.lights_on,
            auto: self.auto_mode,
        }
    }
}
