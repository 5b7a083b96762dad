//! Camera module for pan/zoom transforms.

use crate::config::{CameraConfig, ConfigError};
use kurbo::{Affine, Point, Rect, Size, Vec2};
use serde::{Deserialize, Serialize};

/// Camera manages the view transform for the canvas.
///
/// Screen space is device pixels: `screen = offset + world * zoom * scale_factor`.
/// The camera is a plain value; every conversion takes it explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    /// Current translation offset (pan), in screen pixels.
    pub offset: Vec2,
    /// Current zoom level (1.0 = 100%).
    pub zoom: f64,
    /// Minimum allowed zoom level
    pub min_zoom: f64,
    /// Maximum allowed zoom level
    pub max_zoom: f64,
    /// Device pixel ratio (for HiDPI).
    pub scale_factor: f64,
    /// Viewport size in screen pixels.
    pub viewport: Size,
}

impl Default for Camera {
    fn default() -> Self {
        Self::identity(&CameraConfig::default())
    }
}

impl Camera {
    /// Create a new camera with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Identity camera (screen == world) with the configured zoom range.
    pub fn from_config(config: &CameraConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::identity(config))
    }

    fn identity(config: &CameraConfig) -> Self {
        let mut camera = Self {
            offset: Vec2::ZERO,
            zoom: 1.0,
            min_zoom: config.min_zoom,
            max_zoom: config.max_zoom,
            scale_factor: config.scale_factor,
            viewport: config.viewport,
        };
        camera.zoom = camera.clamp_zoom(1.0);
        camera
    }

    /// Limit `zoom` to `[min_zoom, max_zoom]`. The limits are public fields,
    /// so an inverted pair settles on `max_zoom` instead of panicking.
    fn clamp_zoom(&self, zoom: f64) -> f64 {
        zoom.max(self.min_zoom).min(self.max_zoom)
    }

    /// Combined world-to-screen scale.
    pub fn scale(&self) -> f64 {
        self.zoom * self.scale_factor
    }

    /// Get the affine transform for rendering.
    ///
    /// This transform converts world coordinates to screen coordinates.
    pub fn transform(&self) -> Affine {
        Affine::translate(self.offset) * Affine::scale(self.scale())
    }

    /// Get the inverse transform for input handling.
    ///
    /// This transform converts screen coordinates to world coordinates.
    pub fn inverse_transform(&self) -> Affine {
        Affine::scale(1.0 / self.scale()) * Affine::translate(-self.offset)
    }

    /// Convert a screen point to world coordinates.
    pub fn screen_to_world(&self, screen_point: Point) -> Point {
        self.inverse_transform() * screen_point
    }

    /// Convert a world point to screen coordinates.
    pub fn world_to_screen(&self, world_point: Point) -> Point {
        self.transform() * world_point
    }

    /// Convert a screen rectangle to the world rectangle it covers.
    pub fn screen_rect_to_world(&self, rect: Rect) -> Rect {
        Rect::from_points(
            self.screen_to_world(Point::new(rect.x0, rect.y0)),
            self.screen_to_world(Point::new(rect.x1, rect.y1)),
        )
    }

    /// World-space rectangle currently visible in the viewport.
    pub fn visible_world_rect(&self) -> Rect {
        self.screen_rect_to_world(self.viewport.to_rect())
    }

    /// Pan the camera by a delta in screen coordinates.
    pub fn pan_by(&mut self, delta: Vec2) {
        if delta.is_finite() {
            self.offset += delta;
        }
    }

    /// Zoom the camera, keeping the given screen point fixed.
    ///
    /// The resulting zoom is clamped to `[min_zoom, max_zoom]`. Returns true
    /// if the camera changed.
    pub fn zoom_at(&mut self, screen_point: Point, factor: f64) -> bool {
        if !(factor.is_finite() && factor > 0.0) || !screen_point.is_finite() {
            return false;
        }
        let new_zoom = self.clamp_zoom(self.zoom * factor);
        if (new_zoom - self.zoom).abs() < f64::EPSILON {
            return false;
        }

        // Convert screen point to world before zoom
        let world_point = self.screen_to_world(screen_point);

        // Apply new zoom
        self.zoom = new_zoom;

        // Adjust offset so world_point stays at screen_point
        let new_screen = self.world_to_screen(world_point);
        self.offset += screen_point - new_screen;
        true
    }

    /// Resize the viewport (in screen pixels).
    pub fn set_viewport(&mut self, viewport: Size) {
        self.viewport = viewport;
    }

    /// Reset camera to identity pan and zoom.
    pub fn reset(&mut self) {
        self.offset = Vec2::ZERO;
        self.zoom = self.clamp_zoom(1.0);
    }

    /// Fit the camera to show the given bounding box.
    pub fn fit_to_bounds(&mut self, bounds: Rect, padding: f64) {
        if bounds.is_zero_area() {
            self.reset();
            return;
        }

        let padded_viewport = Size::new(
            (self.viewport.width - padding * 2.0).max(1.0),
            (self.viewport.height - padding * 2.0).max(1.0),
        );

        let scale_x = padded_viewport.width / bounds.width();
        let scale_y = padded_viewport.height / bounds.height();
        self.zoom = self.clamp_zoom(scale_x.min(scale_y) / self.scale_factor);

        // Center the bounds in the viewport
        let bounds_center = bounds.center();
        let viewport_center = Point::new(self.viewport.width / 2.0, self.viewport.height / 2.0);
        self.offset = viewport_center.to_vec2() - bounds_center.to_vec2() * self.scale();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Point, b: Point, eps: f64) -> bool {
        (a.x - b.x).abs() <= eps && (a.y - b.y).abs() <= eps
    }

    fn cameras() -> Vec<Camera> {
        let mut out = Vec::new();
        for &zoom in &[0.05, 0.3, 1.0, 1.7, 5.0] {
            for &offset in &[Vec2::ZERO, Vec2::new(30.0, -20.0), Vec2::new(-1234.5, 987.25)] {
                for &scale_factor in &[1.0, 2.0, 1.25] {
                    out.push(Camera {
                        offset,
                        zoom,
                        scale_factor,
                        ..Camera::new()
                    });
                }
            }
        }
        out
    }

    #[test]
    fn test_default_camera_is_identity() {
        let camera = Camera::new();
        let p = Point::new(100.0, 200.0);
        assert_eq!(camera.world_to_screen(p), p);
        assert_eq!(camera.screen_to_world(p), p);
    }

    #[test]
    fn test_screen_to_world_with_offset_and_zoom() {
        let mut camera = Camera::new();
        camera.offset = Vec2::new(50.0, 100.0);
        camera.zoom = 2.0;
        let world = camera.screen_to_world(Point::new(100.0, 200.0));
        assert!(close(world, Point::new(25.0, 50.0), 1e-12));
    }

    #[test]
    fn test_device_pixel_scale() {
        let mut camera = Camera::new();
        camera.scale_factor = 2.0;
        assert_eq!(camera.world_to_screen(Point::new(3.0, 4.0)), Point::new(6.0, 8.0));
    }

    #[test]
    fn test_roundtrip_conversion() {
        let points = [
            Point::new(0.0, 0.0),
            Point::new(123.0, 456.0),
            Point::new(-9876.5, 0.125),
            Point::new(1e6, -1e6),
        ];
        for camera in cameras() {
            for &p in &points {
                let back = camera.screen_to_world(camera.world_to_screen(p));
                let eps = 1e-9 * (1.0 + p.x.abs().max(p.y.abs()));
                assert!(close(back, p, eps), "{p:?} came back as {back:?}");
            }
        }
    }

    #[test]
    fn test_zoom_pivot_invariance() {
        let pivots = [Point::new(0.0, 0.0), Point::new(640.0, 400.0), Point::new(-30.0, 75.5)];
        for before in cameras() {
            for &pivot in &pivots {
                for &factor in &[0.5, 1.1, 0.9, 3.0, 1e-6, 1e6] {
                    let mut after = before.clone();
                    after.zoom_at(pivot, factor);
                    let world = before.screen_to_world(pivot);
                    let back = after.world_to_screen(world);
                    assert!(close(back, pivot, 1e-7), "pivot {pivot:?} drifted to {back:?}");
                }
            }
        }
    }

    #[test]
    fn test_zoom_clamp() {
        let mut camera = Camera::new();
        camera.zoom_at(Point::ZERO, 0.001); // Try to zoom way out
        assert!((camera.zoom - camera.min_zoom).abs() < f64::EPSILON);

        camera.zoom = 1.0;
        camera.zoom_at(Point::ZERO, 1000.0); // Try to zoom way in
        assert!((camera.zoom - camera.max_zoom).abs() < f64::EPSILON);

        // Already at the limit: pan must not move.
        let offset = camera.offset;
        assert!(!camera.zoom_at(Point::new(300.0, 300.0), 2.0));
        assert_eq!(camera.offset, offset);
    }

    #[test]
    fn test_zoom_rejects_bad_factor() {
        let mut camera = Camera::new();
        assert!(!camera.zoom_at(Point::ZERO, 0.0));
        assert!(!camera.zoom_at(Point::ZERO, f64::NAN));
        assert!(!camera.zoom_at(Point::new(f64::NAN, 0.0), 2.0));
        assert_eq!(camera, Camera::new());
    }

    #[test]
    fn test_pan() {
        let mut camera = Camera::new();
        camera.pan_by(Vec2::new(10.0, 20.0));
        assert!((camera.offset.x - 10.0).abs() < f64::EPSILON);
        assert!((camera.offset.y - 20.0).abs() < f64::EPSILON);
        camera.pan_by(Vec2::new(f64::NAN, 1.0));
        assert_eq!(camera.offset, Vec2::new(10.0, 20.0));
    }

    #[test]
    fn test_fit_to_bounds_centers_content() {
        let mut camera = Camera::new();
        camera.set_viewport(Size::new(800.0, 600.0));
        camera.fit_to_bounds(Rect::new(0.0, 0.0, 200.0, 100.0), 50.0);
        let center = camera.world_to_screen(Point::new(100.0, 50.0));
        assert!(close(center, Point::new(400.0, 300.0), 1e-9));
        let visible = camera.visible_world_rect();
        assert!(visible.contains(Point::new(0.0, 0.0)));
        assert!(visible.contains(Point::new(200.0, 100.0)));
    }

    #[test]
    fn test_from_config_rejects_inverted_zoom_range() {
        let config = CameraConfig {
            min_zoom: 4.0,
            max_zoom: 2.0,
            ..CameraConfig::default()
        };
        assert!(matches!(
            Camera::from_config(&config),
            Err(ConfigError::Invalid { field: "camera.min_zoom", .. })
        ));
        let camera = Camera::from_config(&CameraConfig::default()).unwrap();
        assert_eq!(camera, Camera::new());
    }

    #[test]
    fn test_inverted_limits_do_not_panic() {
        let mut camera = Camera {
            min_zoom: 4.0,
            max_zoom: 2.0,
            ..Camera::new()
        };
        camera.zoom_at(Point::new(10.0, 10.0), 3.0);
        assert_eq!(camera.zoom, 2.0);
        camera.reset();
        assert_eq!(camera.zoom, 2.0);
        camera.fit_to_bounds(Rect::new(0.0, 0.0, 10.0, 10.0), 0.0);
        assert_eq!(camera.zoom, 2.0);
    }
}
