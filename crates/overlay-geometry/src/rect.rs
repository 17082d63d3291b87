//! Overlay rectangle and clamping rules

use serde::{Deserialize, Serialize};

/// Visible area the overlay must stay inside
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Size bounds for the overlay
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayLimits {
    pub min_width: f64,
    pub min_height: f64,
    /// Space kept free between the largest overlay and the viewport edge
    pub margin: f64,
}

impl Default for OverlayLimits {
    fn default() -> Self {
        Self {
            min_width: 150.0,
            min_height: 100.0,
            margin: 20.0,
        }
    }
}

impl OverlayLimits {
    pub fn max_width(&self, viewport: Viewport) -> f64 {
        (viewport.width - self.margin).max(self.min_width)
    }

    pub fn max_height(&self, viewport: Viewport) -> f64 {
        (viewport.height - self.margin).max(self.min_height)
    }
}

/// Overlay position and size, top-left origin
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverlayRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub fullscreen: bool,
}

impl Default for OverlayRect {
    fn default() -> Self {
        Self {
            x: 20.0,
            y: 80.0,
            width: 320.0,
            height: 240.0,
            fullscreen: false,
        }
    }
}

impl OverlayRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
            fullscreen: false,
        }
    }

    /// Bring the size into `[min, viewport - margin]` per axis
    pub fn clamp_size(&mut self, viewport: Viewport, limits: &OverlayLimits) {
        self.width = clamp_or_min(self.width, limits.min_width, limits.max_width(viewport));
        self.height = clamp_or_min(self.height, limits.min_height, limits.max_height(viewport));
    }

    /// Bring the top-left corner into `[0, viewport - size]` per axis
    pub fn clamp_position(&mut self, viewport: Viewport) {
        self.x = clamp_or_min(self.x, 0.0, (viewport.width - self.width).max(0.0));
        self.y = clamp_or_min(self.y, 0.0, (viewport.height - self.height).max(0.0));
    }

    pub fn clamped(mut self, viewport: Viewport, limits: &OverlayLimits) -> Self {
        self.clamp_size(viewport, limits);
        self.clamp_position(viewport);
        self
    }

    /// Whether the rect lies fully inside the viewport within the limits
    pub fn fits(&self, viewport: Viewport, limits: &OverlayLimits) -> bool {
        self.x >= 0.0
            && self.y >= 0.0
            && self.x + self.width <= viewport.width
            && self.y + self.height <= viewport.height
            && self.width >= limits.min_width
            && self.height >= limits.min_height
    }
}

// NaN collapses to the lower bound
fn clamp_or_min(value: f64, min: f64, max: f64) -> f64 {
    if value.is_nan() {
        min
    } else {
        value.clamp(min, max.max(min))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rect_fits_phone_viewport() {
        let viewport = Viewport::new(400.0, 800.0);
        let limits = OverlayLimits::default();

        assert!(OverlayRect::default().fits(viewport, &limits));
    }

    #[test]
    fn test_clamp_oversized_rect() {
        let viewport = Viewport::new(400.0, 800.0);
        let rect = OverlayRect::new(-50.0, 900.0, 1000.0, 50.0)
            .clamped(viewport, &OverlayLimits::default());

        assert_eq!(rect, OverlayRect::new(0.0, 700.0, 380.0, 100.0));
    }

    #[test]
    fn test_tiny_viewport_does_not_panic() {
        let viewport = Viewport::new(100.0, 50.0);
        let rect = OverlayRect::default().clamped(viewport, &OverlayLimits::default());

        assert_eq!(rect.width, 150.0);
        assert_eq!(rect.height, 100.0);
        assert_eq!((rect.x, rect.y), (0.0, 0.0));
    }

    #[test]
    fn test_nan_is_clamped() {
        let viewport = Viewport::new(400.0, 800.0);
        let rect = OverlayRect::new(f64::NAN, 10.0, f64::NAN, 200.0)
            .clamped(viewport, &OverlayLimits::default());

        assert_eq!(rect, OverlayRect::new(0.0, 10.0, 150.0, 200.0));
    }

    #[test]
    fn test_fullscreen_flag_defaults_when_missing() {
        let rect: OverlayRect =
            serde_json::from_str(r#"{"x":1.0,"y":2.0,"width":300.0,"height":200.0}"#).unwrap();

        assert!(!rect.fullscreen);
        assert_eq!(rect.width, 300.0);
    }
}
