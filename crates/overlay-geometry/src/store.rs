//! Overlay persistence collaborator

use crate::{OverlayRect, StoreResult};

/// Where the overlay rect lives between runs
pub trait RectStore {
    /// Stored rect, or `None` on first run
    fn load(&self) -> StoreResult<Option<OverlayRect>>;

    fn save(&mut self, rect: &OverlayRect) -> StoreResult<()>;
}

/// In-process store
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    rect: Option<OverlayRect>,
    saves: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rect(rect: OverlayRect) -> Self {
        Self {
            rect: Some(rect),
            saves: 0,
        }
    }

    pub fn rect(&self) -> Option<OverlayRect> {
        self.rect
    }

    /// Number of successful saves
    pub fn saves(&self) -> usize {
        self.saves
    }
}

impl RectStore for MemoryStore {
    fn load(&self) -> StoreResult<Option<OverlayRect>> {
        Ok(self.rect)
    }

    fn save(&mut self, rect: &OverlayRect) -> StoreResult<()> {
        self.rect = Some(*rect);
        self.saves += 1;
        Ok(())
    }
}
