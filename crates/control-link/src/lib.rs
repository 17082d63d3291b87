//! Control Link - the operator's single connection to the vehicle
//!
//! Resolves the operator-supplied endpoint into control and camera URLs,
//! drives the WebSocket lifecycle with bounded backoff, and transmits
//! encoded control surface updates.

mod backoff;
mod config;
mod endpoint;
mod error;
mod events;
mod link;
mod machine;
mod scheduler;
mod transport;

pub use backoff::*;
pub use config::*;
pub use endpoint::*;
pub use error::*;
pub use events::*;
pub use link::*;
pub use machine::*;
pub use scheduler::*;
pub use transport::*;

/// Default WebSocket control port on the vehicle
pub const DEFAULT_CONTROL_PORT: u16 = 8765;

/// Default HTTP camera port on the vehicle
pub const DEFAULT_CAMERA_PORT: u16 = 8080;

/// Path of the camera stream below the media base
pub const CAMERA_PATH: &str = "/camera";

/// WebSocket handshake timeout
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 10_000;
