//! Error types for the protocol

use thiserror::Error;

use crate::MessageKind;

/// Protocol error
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Malformed record: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Record is not a JSON object")]
    NotAnObject,

    #[error("Record too large: {size} bytes (max: {max})")]
    RecordTooLarge { size: usize, max: usize },

    #[error("Invalid value for {kind}: {reason}")]
    InvalidValue { kind: MessageKind, reason: String },

    #[error("Invalid gear: {0} (expected 1, 2 or 3)")]
    InvalidGear(String),

    #[error("Invalid {field} setting: {value}")]
    InvalidSetting { field: &'static str, value: String },
}

/// Result type alias for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;
