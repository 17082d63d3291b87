//! Overlay gestures
//!
//! Drag and resize work from the rect captured when the gesture began plus
//! the gesture's cumulative delta, so intermediate moves never accumulate
//! rounding or clamping drift. Only the end of a gesture is persisted.

use tracing::{debug, info, warn};

use crate::{OverlayLimits, OverlayRect, RectStore, Viewport};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Gesture {
    Idle,
    Drag { origin: OverlayRect },
    Resize { origin: OverlayRect },
}

pub struct OverlayManager<S: RectStore> {
    store: S,
    limits: OverlayLimits,
    viewport: Viewport,
    rect: OverlayRect,
    gesture: Gesture,
}

impl<S: RectStore> OverlayManager<S> {
    /// Restore the stored rect, clamped into `viewport`
    pub fn new(store: S, viewport: Viewport, limits: OverlayLimits) -> Self {
        let stored = match store.load() {
            Ok(Some(rect)) => rect,
            Ok(None) => {
                info!("No stored overlay, using default");
                OverlayRect::default()
            }
            Err(e) => {
                warn!("Failed to restore overlay: {}", e);
                OverlayRect::default()
            }
        };

        let rect = OverlayRect {
            fullscreen: false,
            ..stored
        }
        .clamped(viewport, &limits);

        Self {
            store,
            limits,
            viewport,
            rect,
            gesture: Gesture::Idle,
        }
    }

    /// Current windowed rect, regardless of fullscreen
    pub fn rect(&self) -> OverlayRect {
        self.rect
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn limits(&self) -> &OverlayLimits {
        &self.limits
    }

    pub fn is_fullscreen(&self) -> bool {
        self.rect.fullscreen
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// What should be drawn: the whole viewport while fullscreen
    pub fn effective_frame(&self) -> OverlayRect {
        if self.rect.fullscreen {
            OverlayRect {
                x: 0.0,
                y: 0.0,
                width: self.viewport.width,
                height: self.viewport.height,
                fullscreen: true,
            }
        } else {
            self.rect
        }
    }

    pub fn begin_drag(&mut self) {
        if self.rect.fullscreen {
            return;
        }
        self.abandon_gesture();
        self.gesture = Gesture::Drag { origin: self.rect };
    }

    /// Move to the gesture start plus `(dx, dy)`
    pub fn drag_to(&mut self, dx: f64, dy: f64) {
        let Gesture::Drag { origin } = self.gesture else {
            return;
        };

        self.rect.x = origin.x + finite(dx);
        self.rect.y = origin.y + finite(dy);
        self.rect.clamp_position(self.viewport);
    }

    pub fn end_drag(&mut self) {
        if let Gesture::Drag { .. } = self.gesture {
            self.gesture = Gesture::Idle;
            debug!("Overlay moved to ({}, {})", self.rect.x, self.rect.y);
            self.persist();
        }
    }

    /// One-shot committed drag
    pub fn drag(&mut self, dx: f64, dy: f64) {
        self.begin_drag();
        self.drag_to(dx, dy);
        self.end_drag();
    }

    pub fn begin_resize(&mut self) {
        if self.rect.fullscreen {
            return;
        }
        self.abandon_gesture();
        self.gesture = Gesture::Resize { origin: self.rect };
    }

    /// Size captured at `begin_resize` plus `(dw, dh)`; no aspect lock
    pub fn resize(&mut self, dw: f64, dh: f64) {
        let Gesture::Resize { origin } = self.gesture else {
            return;
        };

        self.rect.width = origin.width + finite(dw);
        self.rect.height = origin.height + finite(dh);
        self.rect.clamp_size(self.viewport, &self.limits);
        self.rect.x = origin.x;
        self.rect.y = origin.y;
        self.rect.clamp_position(self.viewport);
    }

    pub fn end_resize(&mut self) {
        if let Gesture::Resize { .. } = self.gesture {
            self.gesture = Gesture::Idle;
            debug!("Overlay resized to {}x{}", self.rect.width, self.rect.height);
            self.persist();
        }
    }

    /// Flip fullscreen. The windowed rect is untouched and not persisted.
    pub fn toggle_fullscreen(&mut self) -> bool {
        self.abandon_gesture();
        self.rect.fullscreen = !self.rect.fullscreen;
        self.rect.fullscreen
    }

    /// Adopt a new viewport, re-clamping and persisting if the rect moved
    pub fn set_viewport(&mut self, viewport: Viewport) {
        if viewport == self.viewport {
            return;
        }
        self.abandon_gesture();
        self.viewport = viewport;

        let before = self.rect;
        self.rect.clamp_size(viewport, &self.limits);
        self.rect.clamp_position(viewport);
        if self.rect != before {
            self.persist();
        }
    }

    // An unfinished gesture snaps back to where it started
    fn abandon_gesture(&mut self) {
        match std::mem::replace(&mut self.gesture, Gesture::Idle) {
            Gesture::Idle => {}
            Gesture::Drag { origin } | Gesture::Resize { origin } => {
                self.rect = OverlayRect {
                    fullscreen: self.rect.fullscreen,
                    ..origin
                };
            }
        }
    }

    fn persist(&mut self) {
        let rect = OverlayRect {
            fullscreen: false,
            ..self.rect
        };
        if let Err(e) = self.store.save(&rect) {
            warn!("Failed to persist overlay: {}", e);
        }
    }
}

fn finite(delta: f64) -> f64 {
    if delta.is_finite() { delta } else { 0.0 }
}
