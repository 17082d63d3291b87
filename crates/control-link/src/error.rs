//! Link error types

use thiserror::Error;

/// Why an endpoint string could not be resolved
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EndpointError {
    #[error("Endpoint is empty")]
    Empty,

    #[error("Endpoint has no host")]
    MissingHost,

    #[error("Unterminated '[' in endpoint: {0}")]
    UnterminatedBracket(String),

    #[error("Unexpected bracket in endpoint: {0}")]
    StrayBracket(String),

    #[error("Invalid IPv6 literal: {0}")]
    InvalidIpv6(String),

    #[error("Unexpected text after IPv6 literal: {0}")]
    TrailingText(String),

    #[error("Invalid port: {0:?}")]
    InvalidPort(String),

    #[error("Invalid character in host: {0:?}")]
    InvalidHost(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Connection timeout")]
    Timeout,

    #[error("Not connected")]
    NotConnected,
}

pub type TransportResult<T> = Result<T, TransportError>;

/// Failures surfaced to link observers.
///
/// Malformed inbound records never appear here: they are logged and dropped
/// without affecting the link.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(#[from] EndpointError),

    #[error("Vehicle unreachable: {0}")]
    TransportUnreachable(String),

    #[error("Protocol error (close code {code})")]
    ProtocolError { code: u16 },

    #[error("Connection closed by vehicle")]
    ClosedByPeer { code: Option<u16> },

    #[error("Gave up after {attempts} connection attempts")]
    ExhaustedRetries { attempts: u32 },
}

impl LinkError {
    /// Needs the operator to fix something before the link can recover
    pub fn is_user_actionable(&self) -> bool {
        matches!(
            self,
            LinkError::InvalidEndpoint(_) | LinkError::ExhaustedRetries { .. }
        )
    }

    /// Reported as status while automatic reconnection runs
    pub fn is_transient(&self) -> bool {
        !self.is_user_actionable()
    }
}
