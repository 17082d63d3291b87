//! Wire record definitions

use serde::{Deserialize, Serialize};

use crate::Gear;

/// Kind of control record, sent in the `type` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    ThrottleForward,
    ThrottleBackward,
    Brake,
    SteeringLeft,
    SteeringRight,
    Honk,
    /// Settings-only change (gear, lights, auto)
    Settings,
}

impl MessageKind {
    pub const ALL: [MessageKind; 7] = [
        MessageKind::ThrottleForward,
        MessageKind::ThrottleBackward,
        MessageKind::Brake,
        MessageKind::SteeringLeft,
        MessageKind::SteeringRight,
        MessageKind::Honk,
        MessageKind::Settings,
    ];

    /// Name used in the `type` field
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::ThrottleForward => "throttle_forward",
            MessageKind::ThrottleBackward => "throttle_backward",
            MessageKind::Brake => "brake",
            MessageKind::SteeringLeft => "steering_left",
            MessageKind::SteeringRight => "steering_right",
            MessageKind::Honk => "honk",
            MessageKind::Settings => "settings",
        }
    }

    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }

    /// Kinds whose value is a percentage rather than a flag
    pub fn is_percentage(self) -> bool {
        !matches!(self, MessageKind::Honk | MessageKind::Settings)
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings carried redundantly by every record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsBundle {
    pub gear: Gear,
    pub lights: bool,
    pub auto: bool,
}

/// Record payload: a percentage or a flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Flag(bool),
    Percent(u8),
}

/// One outbound JSON record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WireRecord {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Payload>,
    pub gear: Gear,
    pub lights: bool,
    pub auto: bool,
}

impl WireRecord {
    pub fn new(kind: MessageKind, value: Option<Payload>, settings: SettingsBundle) -> Self {
        Self {
            kind,
            value,
            gear: settings.gear,
            lights: settings.lights,
            auto: settings.auto,
        }
    }

    pub fn settings(&self) -> SettingsBundle {
        SettingsBundle {
            gear: self.gear,
            lights: self.lights,
            auto: self.auto,
        }
    }

    /// Percentage payload, if this record carries one
    pub fn percent(&self) -> Option<u8> {
        match self.value {
            Some(Payload::Percent(value)) => Some(value),
            _ => None,
        }
    }

    /// Serialize to a text frame
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Decoded control record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    ThrottleForward(u8),
    ThrottleBackward(u8),
    Brake(u8),
    SteeringLeft(u8),
    SteeringRight(u8),
    Honk(bool),
    Settings(SettingsBundle),
    /// Well-formed record with a `type` this protocol does not define
    Unrecognized { kind: String },
}

impl ControlMessage {
    pub fn kind(&self) -> Option<MessageKind> {
        match self {
            ControlMessage::ThrottleForward(_) => Some(MessageKind::ThrottleForward),
            ControlMessage::ThrottleBackward(_) => Some(MessageKind::ThrottleBackward),
            ControlMessage::Brake(_) => Some(MessageKind::Brake),
            ControlMessage::SteeringLeft(_) => Some(MessageKind::SteeringLeft),
            ControlMessage::SteeringRight(_) => Some(MessageKind::SteeringRight),
            ControlMessage::Honk(_) => Some(MessageKind::Honk),
            ControlMessage::Settings(_) => Some(MessageKind::Settings),
            ControlMessage::Unrecognized { .. } => None,
        }
    }
}

/// A decoded record together with the settings bundle it carried
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub message: ControlMessage,
    /// `None` when the record had no settings fields at all
    pub settings: Option<SettingsBundle>,
}
