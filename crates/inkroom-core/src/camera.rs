//! Camera module for pan/zoom transforms.

use crate::config::{MAX_SCALE, MIN_SCALE, WORLD_SIZE};
use kurbo::{Point, Size, Vec2};
use serde::{Deserialize, Serialize};

/// Camera maps world space to screen space.
///
/// `x`/`y` is the world-space position of the screen origin and `scale` is a
/// uniform zoom factor, so `screen = (world - (x, y)) * scale`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub x: f64,
    pub y: f64,
    pub scale: f64,
    /// Minimum allowed zoom level
    pub min_scale: f64,
    /// Maximum allowed zoom level
    pub max_scale: f64,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            scale: 1.0,
            min_scale: MIN_SCALE,
            max_scale: MAX_SCALE,
        }
    }
}

impl Camera {
    /// Create a new camera at the world origin, scale 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Camera with custom scale bounds.
    pub fn with_bounds(min_scale: f64, max_scale: f64) -> Self {
        Self {
            min_scale,
            max_scale,
            ..Self::default()
        }
    }

    /// Center the view on the middle of a square world of side `world_size`.
    pub fn center_on_world(&mut self, viewport: Size, world_size: f64) {
        let half = world_size / 2.0;
        self.x = half - viewport.width / (2.0 * self.scale);
        self.y = half - viewport.height / (2.0 * self.scale);
    }

    /// Default camera centred on the default world.
    pub fn centered(viewport: Size) -> Self {
        let mut camera = Self::new();
        camera.center_on_world(viewport, WORLD_SIZE);
        camera
    }

    /// Convert a world point to screen coordinates.
    pub fn world_to_screen(&self, world: Point) -> Point {
        Point::new((world.x - self.x) * self.scale, (world.y - self.y) * self.scale)
    }

    /// Convert a screen point to world coordinates.
    pub fn screen_to_world(&self, screen: Point) -> Point {
        Point::new(screen.x / self.scale + self.x, screen.y / self.scale + self.y)
    }

    /// Pan by a screen-space pointer delta. The content follows the pointer.
    pub fn pan(&mut self, screen_delta: Vec2) {
        self.x -= screen_delta.x / self.scale;
        self.y -= screen_delta.y / self.scale;
    }

    /// Zoom by `factor`, keeping the world point under `anchor` (screen
    /// coordinates) at the same screen position.
    pub fn zoom_at(&mut self, anchor: Point, factor: f64) {
        let world = self.screen_to_world(anchor);
        let new_scale = (self.scale * factor).clamp(self.min_scale, self.max_scale);
        if (new_scale - self.scale).abs() < f64::EPSILON {
            return;
        }
        self.scale = new_scale;
        self.x = world.x - anchor.x / self.scale;
        self.y = world.y - anchor.y / self.scale;
    }

    /// A length in screen pixels expressed in world units.
    pub fn screen_len_to_world(&self, px: f64) -> f64 {
        px / self.scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: Point, b: Point) {
        assert!((a.x - b.x).abs() < 1e-9, "{a:?} != {b:?}");
        assert!((a.y - b.y).abs() < 1e-9, "{a:?} != {b:?}");
    }

    #[test]
    fn test_default_camera() {
        let camera = Camera::new();
        assert!((camera.scale - 1.0).abs() < f64::EPSILON);
        assert_close(camera.world_to_screen(Point::new(10.0, 20.0)), Point::new(10.0, 20.0));
    }

    #[test]
    fn test_world_to_screen_with_offset_and_scale() {
        let camera = Camera {
            x: 100.0,
            y: 50.0,
            scale: 2.0,
            ..Camera::default()
        };
        assert_close(camera.world_to_screen(Point::new(110.0, 60.0)), Point::new(20.0, 20.0));
        assert_close(camera.screen_to_world(Point::new(20.0, 20.0)), Point::new(110.0, 60.0));
    }

    #[test]
    fn test_roundtrip_across_scale_range() {
        for &scale in &[MIN_SCALE, 0.1, 1.0, 3.7, MAX_SCALE] {
            let camera = Camera {
                x: 4000.0,
                y: -1234.5,
                scale,
                ..Camera::default()
            };
            for &p in &[Point::new(0.0, 0.0), Point::new(4096.0, 4096.0), Point::new(-50.25, 8191.0)] {
                let back = camera.screen_to_world(camera.world_to_screen(p));
                assert!((back.x - p.x).abs() < 1e-6);
                assert!((back.y - p.y).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_zoom_keeps_anchor_fixed() {
        let mut camera = Camera {
            x: 300.0,
            y: 200.0,
            scale: 1.3,
            ..Camera::default()
        };
        let anchor = Point::new(420.0, 250.0);
        let world_before = camera.screen_to_world(anchor);

        for &factor in &[1.1, 1.1, 0.5, 2.5, 0.9] {
            camera.zoom_at(anchor, factor);
            assert_close(camera.world_to_screen(world_before), anchor);
        }
    }

    #[test]
    fn test_zoom_clamp() {
        let mut camera = Camera::new();
        camera.zoom_at(Point::ZERO, 0.0001);
        assert!((camera.scale - MIN_SCALE).abs() < f64::EPSILON);

        camera.zoom_at(Point::ZERO, 1e6);
        assert!((camera.scale - MAX_SCALE).abs() < f64::EPSILON);
    }

    #[test]
    fn test_pan_is_scaled() {
        let mut camera = Camera {
            scale: 2.0,
            ..Camera::default()
        };
        camera.pan(Vec2::new(10.0, -20.0));
        assert!((camera.x + 5.0).abs() < f64::EPSILON);
        assert!((camera.y - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_centered_view() {
        let camera = Camera::centered(Size::new(800.0, 600.0));
        let center = camera.screen_to_world(Point::new(400.0, 300.0));
        assert_close(center, Point::new(4096.0, 4096.0));
    }
}
