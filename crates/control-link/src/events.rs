//! Link state and observer events

use std::time::Duration;

use control_protocol::Decoded;

use crate::{EndpointDescriptor, LinkError};

/// Why the link is closed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Vehicle closed with a normal close code
    Normal,
    /// Vehicle closed for any other non-protocol reason
    ClosedByPeer { code: Option<u16> },
    /// Handshake failed, timed out, or the connection dropped
    Unreachable(String),
    /// Vehicle reported a protocol violation
    ProtocolError { code: u16 },
    /// Reconnect budget spent, waits for the operator
    Exhausted,
}

impl CloseReason {
    /// Categorize a WebSocket close code
    pub fn from_close_code(code: Option<u16>) -> Self {
        match code {
            Some(1000) => CloseReason::Normal,
            Some(code @ (1002 | 1003 | 1007 | 1008 | 1009 | 1010)) => {
                CloseReason::ProtocolError { code }
            }
            Some(1006) => CloseReason::Unreachable("abnormal closure".to_string()),
            other => CloseReason::ClosedByPeer { code: other },
        }
    }

    /// Error reported to observers alongside the transition
    pub fn to_error(&self) -> Option<LinkError> {
        match self {
            CloseReason::Normal => Some(LinkError::ClosedByPeer { code: Some(1000) }),
            CloseReason::ClosedByPeer { code } => Some(LinkError::ClosedByPeer { code: *code }),
            CloseReason::Unreachable(detail) => Some(LinkError::TransportUnreachable(detail.clone())),
            CloseReason::ProtocolError { code } => Some(LinkError::ProtocolError { code: *code }),
            CloseReason::Exhausted => None,
        }
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::Normal => write!(f, "normal"),
            CloseReason::ClosedByPeer { code: Some(code) } => write!(f, "closed by peer ({code})"),
            CloseReason::ClosedByPeer { code: None } => write!(f, "closed by peer"),
            CloseReason::Unreachable(detail) => write!(f, "unreachable: {detail}"),
            CloseReason::ProtocolError { code } => write!(f, "protocol error ({code})"),
            CloseReason::Exhausted => write!(f, "exhausted"),
        }
    }
}

/// Lifecycle state of the link
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LinkState {
    #[default]
    Idle,
    Connecting,
    Open,
    Closing,
    Closed(CloseReason),
}

impl LinkState {
    pub fn is_open(&self) -> bool {
        matches!(self, LinkState::Open)
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, LinkState::Closed(CloseReason::Exhausted))
    }
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkState::Idle => write!(f, "idle"),
            LinkState::Connecting => write!(f, "connecting"),
            LinkState::Open => write!(f, "open"),
            LinkState::Closing => write!(f, "closing"),
            LinkState::Closed(reason) => write!(f, "closed ({reason})"),
        }
    }
}

/// Event delivered to state observers, in the order it happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    StateChanged { state: LinkState, attempt: u32 },
    ReconnectScheduled { attempt: u32, delay: Duration },
    Error(LinkError),
}

pub type StateObserver = Box<dyn Fn(&LinkEvent) + Send>;
pub type MessageObserver = Box<dyn Fn(&Decoded) + Send>;

/// Point-in-time view of the link
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkStatus {
    pub state: LinkState,
    pub attempt: u32,
    pub endpoint: Option<EndpointDescriptor>,
}
