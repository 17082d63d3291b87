//! Control Protocol - wire format shared by the operator and the vehicle
//!
//! Control records are JSON text frames. Every record names its kind in a
//! `type` field and carries the full `{gear, lights, auto}` settings bundle so
//! the vehicle can apply settings and axis updates from a single record.

mod codec;
mod error;
mod message;
mod surface;

pub use codec::*;
pub use error::*;
pub use message::*;
pub use surface::*;

/// Largest inbound text frame the decoder will look at
pub const MAX_RECORD_LEN: usize = 1024;
