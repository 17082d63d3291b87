//! Encoding of control surface updates and decoding of inbound records

use serde::Deserialize;
use serde_json::Value;

use crate::{
    ControlMessage, ControlSurfaceState, Decoded, Gear, MAX_RECORD_LEN, MessageKind, Payload,
    ProtocolError, ProtocolResult, SettingsBundle, WireRecord, clamp_axis, clamp_percent,
};

/// A single control surface update to transmit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Signed throttle, positive is forward
    Throttle(i32),
    /// Signed steering, positive is right
    Steering(i32),
    /// Brake percentage
    Brake(i32),
    Honk(bool),
    /// Gear, lights or auto mode changed
    Settings,
    /// Bring every actuator to rest
    Stop,
}

impl Command {
    /// The command sent when the operator lets go of this control
    pub fn released(self) -> Self {
        match self {
            Command::Throttle(_) => Command::Throttle(0),
            Command::Steering(_) => Command::Steering(0),
            Command::Brake(_) => Command::Brake(0),
            Command::Honk(_) => Command::Honk(false),
            Command::Settings => Command::Settings,
            Command::Stop => Command::Stop,
        }
    }
}

/// Magnitudes of the two halves of a bidirectional axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisSplit {
    pub positive: u8,
    pub negative: u8,
}

/// Split a signed axis value into two non-negative magnitudes
pub fn split_axis(value: i32) -> AxisSplit {
    let value = clamp_axis(value);
    AxisSplit {
        positive: value.max(0) as u8,
        negative: (-value).max(0) as u8,
    }
}

/// Encode a command against the current control surface snapshot.
///
/// Axis commands always produce both halves, so the vehicle's two actuation
/// channels are updated together and neither is left holding a stale value.
pub fn encode(command: Command, state: &ControlSurfaceState) -> Vec<WireRecord> {
    let settings = state.settings();
    let percent = |kind: MessageKind, value: u8| {
        WireRecord::new(kind, Some(Payload::Percent(value)), settings)
    };

    match command {
        Command::Throttle(value) => {
            let split = split_axis(value);
            vec![
                percent(MessageKind::ThrottleForward, split.positive),
                percent(MessageKind::ThrottleBackward, split.negative),
            ]
        }
        Command::Steering(value) => {
            let split = split_axis(value);
            vec![
                percent(MessageKind::SteeringRight, split.positive),
                percent(MessageKind::SteeringLeft, split.negative),
            ]
        }
        Command::Brake(value) => vec![percent(MessageKind::Brake, clamp_percent(value))],
        Command::Honk(on) => vec![WireRecord::new(
            MessageKind::Honk,
            Some(Payload::Flag(on)),
            settings,
        )],
        Command::Settings => vec![WireRecord::new(MessageKind::Settings, None, settings)],
        Command::Stop => release_all(state),
    }
}

/// Records that bring every actuator back to rest
pub fn release_all(state: &ControlSurfaceState) -> Vec<WireRecord> {
    [
        Command::Throttle(0),
        Command::Steering(0),
        Command::Brake(0),
        Command::Honk(false),
    ]
    .into_iter()
    .flat_map(|command| encode(command, state))
    .collect()
}

/// Encode straight to text frames
pub fn encode_frames(command: Command, state: &ControlSurfaceState) -> ProtocolResult<Vec<String>> {
    encode(command, state)
        .iter()
        .map(|record| record.to_json().map_err(ProtocolError::from))
        .collect()
}

#[derive(Debug, Deserialize)]
struct RawRecord {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    gear: Option<Value>,
    #[serde(default)]
    lights: Option<Value>,
    #[serde(default)]
    auto: Option<Value>,
}

/// Decode an inbound text frame.
///
/// Unknown `type` names decode to [`ControlMessage::Unrecognized`]; only
/// structurally invalid records are errors.
pub fn decode(text: &str) -> ProtocolResult<Decoded> {
    if text.len() > MAX_RECORD_LEN {
        return Err(ProtocolError::RecordTooLarge {
            size: text.len(),
            max: MAX_RECORD_LEN,
        });
    }

    let value: Value = serde_json::from_str(text)?;
    if !value.is_object() {
        return Err(ProtocolError::NotAnObject);
    }
    let raw: RawRecord = serde_json::from_value(value)?;

    // Settings on an unknown record are best effort, never an error
    let Some(kind) = MessageKind::from_wire(&raw.kind) else {
        tracing::trace!(kind = %raw.kind, "Unrecognized record type");
        let settings = decode_settings(&raw).ok().flatten();
        return Ok(Decoded {
            message: ControlMessage::Unrecognized { kind: raw.kind },
            settings,
        });
    };
    let settings = decode_settings(&raw)?;

    let message = match kind {
        MessageKind::ThrottleForward => {
            ControlMessage::ThrottleForward(decode_percent(kind, &raw.value)?)
        }
        MessageKind::ThrottleBackward => {
            ControlMessage::ThrottleBackward(decode_percent(kind, &raw.value)?)
        }
        MessageKind::Brake => ControlMessage::Brake(decode_percent(kind, &raw.value)?),
        MessageKind::SteeringLeft => ControlMessage::SteeringLeft(decode_percent(kind, &raw.value)?),
        MessageKind::SteeringRight => {
            ControlMessage::SteeringRight(decode_percent(kind, &raw.value)?)
        }
        MessageKind::Honk => ControlMessage::Honk(decode_flag(kind, &raw.value)?),
        MessageKind::Settings => ControlMessage::Settings(settings.unwrap_or_default()),
    };

    Ok(Decoded { message, settings })
}

fn decode_settings(raw: &RawRecord) -> ProtocolResult<Option<SettingsBundle>> {
    if raw.gear.is_none() && raw.lights.is_none() && raw.auto.is_none() {
        return Ok(None);
    }

    let gear = match &raw.gear {
        None | Some(Value::Null) => Gear::default(),
        Some(value) => value
            .as_u64()
            .and_then(|number| u8::try_from(number).ok())
            .ok_or_else(|| ProtocolError::InvalidGear(value.to_string()))
            .and_then(Gear::try_from)?,
    };

    Ok(Some(SettingsBundle {
        gear,
        lights: decode_setting_flag("lights", raw.lights.as_ref())?,
        auto: decode_setting_flag("auto", raw.auto.as_ref())?,
    }))
}

fn decode_setting_flag(field: &'static str, value: Option<&Value>) -> ProtocolResult<bool> {
    match value {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(flag)) => Ok(*flag),
        Some(other) => Err(ProtocolError::InvalidSetting {
            field,
            value: other.to_string(),
        }),
    }
}

// A missing value means zero, out-of-range values are clamped
fn decode_percent(kind: MessageKind, value: &Value) -> ProtocolResult<u8> {
    match value {
        Value::Null => Ok(0),
        Value::Number(number) => {
            let raw = number.as_f64().unwrap_or(0.0);
            Ok(raw.round().clamp(0.0, 100.0) as u8)
        }
        other => Err(ProtocolError::InvalidValue {
            kind,
            reason: format!("expected a number, got {other}"),
        }),
    }
}

fn decode_flag(kind: MessageKind, value: &Value) -> ProtocolResult<bool> {
    match value {
        Value::Null => Ok(false),
        Value::Bool(flag) => Ok(*flag),
        other => Err(ProtocolError::InvalidValue {
            kind,
            reason: format!("expected a boolean, got {other}"),
        }),
    }
}
