//! Overlay Geometry - position and size of the floating video overlay
//!
//! Keeps the overlay inside the viewport through drag, resize and viewport
//! changes, and persists the rect through a [`RectStore`] whenever a gesture
//! is committed.

mod error;
mod manager;
mod rect;
mod store;

pub use error::*;
pub use manager::*;
pub use rect::*;
pub use store::*;
