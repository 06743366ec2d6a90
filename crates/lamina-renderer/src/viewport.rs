use serde::{Deserialize, Serialize};

use lamina_core::geometry::{BBox, Matrix3, Point};

/// Canvas size in device pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanvasSize {
    pub width: u32,
    pub height: u32,
}

impl CanvasSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// The visible world rectangle and the canvas it is drawn into.
///
/// World y grows downwards, like image rows, so the top of the canvas shows
/// `rect.min.y`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// Visible world rectangle.
    pub rect: BBox,
    pub canvas: CanvasSize,
}

impl Viewport {
    pub fn new(canvas: CanvasSize) -> Self {
        let rect = BBox::new(
            Point::new(0.0, 0.0),
            Point::new(f64::from(canvas.width), f64::from(canvas.height)),
        );
        Self { rect, canvas }
    }

    /// Replaces the visible rectangle. Returns whether anything changed.
    pub fn set_rect(&mut self, rect: BBox) -> bool {
        if rect == self.rect || rect.width() <= 0.0 || rect.height() <= 0.0 {
            return false;
        }
        self.rect = rect;
        true
    }

    /// Resizes the canvas. Returns whether anything changed.
    pub fn set_canvas(&mut self, canvas: CanvasSize) -> bool {
        if canvas == self.canvas {
            return false;
        }
        self.canvas = canvas;
        true
    }

    /// Device pixels per world unit along x.
    pub fn pixels_per_unit(&self) -> f64 {
        let width = self.rect.width();
        if width > 0.0 {
            f64::from(self.canvas.width) / width
        } else {
            1.0
        }
    }

    /// Pan by a delta in screen pixels.
    pub fn pan(&mut self, dx: f64, dy: f64) {
        let (sx, sy) = self.units_per_pixel();
        let offset = Point::new(-dx * sx, -dy * sy);
        self.rect = BBox::new(
            Point::new(self.rect.min.x + offset.x, self.rect.min.y + offset.y),
            Point::new(self.rect.max.x + offset.x, self.rect.max.y + offset.y),
        );
    }

    /// Zoom by `factor` (>1 zooms in) keeping the world point under the
    /// screen position fixed.
    pub fn zoom_at(&mut self, screen: Point, factor: f64) {
        if !(factor.is_finite() && factor > 0.0) {
            return;
        }
        let anchor = self.screen_to_world(screen);
        let scale = 1.0 / factor;
        let min = Point::new(
            anchor.x - (anchor.x - self.rect.min.x) * scale,
            anchor.y - (anchor.y - self.rect.min.y) * scale,
        );
        let max = Point::new(
            anchor.x + (self.rect.max.x - anchor.x) * scale,
            anchor.y + (self.rect.max.y - anchor.y) * scale,
        );
        self.rect = BBox::new(min, max);
    }

    /// Fit a bounding box with a 10% margin, keeping the canvas aspect ratio.
    pub fn fit_bbox(&mut self, bbox: &BBox) -> bool {
        let (width, height) = (bbox.width(), bbox.height());
        if width <= 0.0 || height <= 0.0 || self.canvas.is_empty() {
            return false;
        }
        let aspect = f64::from(self.canvas.width) / f64::from(self.canvas.height);
        let (mut half_w, mut half_h) = (width / 2.0 / 0.9, height / 2.0 / 0.9);
        if half_w / half_h < aspect {
            half_w = half_h * aspect;
        } else {
            half_h = half_w / aspect;
        }
        let c = bbox.center();
        self.set_rect(BBox::new(
            Point::new(c.x - half_w, c.y - half_h),
            Point::new(c.x + half_w, c.y + half_h),
        ))
    }

    pub fn screen_to_world(&self, screen: Point) -> Point {
        let (sx, sy) = self.units_per_pixel();
        Point::new(self.rect.min.x + screen.x * sx, self.rect.min.y + screen.y * sy)
    }

    pub fn world_to_screen(&self, world: Point) -> Point {
        let (sx, sy) = self.units_per_pixel();
        Point::new((world.x - self.rect.min.x) / sx, (world.y - self.rect.min.y) / sy)
    }

    /// World→clip matrix: the visible rectangle maps onto `[-1, 1]²`, with
    /// `rect.min.y` at the top (clip y = 1).
    pub fn world_to_clip(&self) -> Matrix3 {
        let (w, h) = (self.rect.width(), self.rect.height());
        if w <= 0.0 || h <= 0.0 {
            return Matrix3::IDENTITY;
        }
        let c = self.rect.center();
        Matrix3::from_rows([
            [2.0 / w, 0.0, -2.0 * c.x / w],
            [0.0, -2.0 / h, 2.0 * c.y / h],
            [0.0, 0.0, 1.0],
        ])
    }

    fn units_per_pixel(&self) -> (f64, f64) {
        let per = |extent: f64, pixels: u32| {
            if pixels == 0 {
                1.0
            } else {
                extent / f64::from(pixels)
            }
        };
        (
            per(self.rect.width(), self.canvas.width),
            per(self.rect.height(), self.canvas.height),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Point, b: Point) -> bool {
        (a.x - b.x).abs() < 1e-9 && (a.y - b.y).abs() < 1e-9
    }

    #[test]
    fn test_screen_world_roundtrip() {
        let mut vp = Viewport::new(CanvasSize::new(800, 600));
        vp.set_rect(BBox::new(Point::new(100.0, 50.0), Point::new(500.0, 350.0)));
        let world = vp.screen_to_world(Point::new(400.0, 300.0));
        assert!(close(world, Point::new(300.0, 200.0)));
        assert!(close(vp.world_to_screen(world), Point::new(400.0, 300.0)));
        assert_eq!(vp.pixels_per_unit(), 2.0);
    }

    #[test]
    fn test_zoom_keeps_anchor_fixed() {
        let mut vp = Viewport::new(CanvasSize::new(800, 600));
        let screen = Point::new(200.0, 150.0);
        let before = vp.screen_to_world(screen);
        vp.zoom_at(screen, 2.0);
        assert!(close(vp.screen_to_world(screen), before));
        assert_eq!(vp.pixels_per_unit(), 2.0);
    }

    #[test]
    fn test_pan_moves_content_with_cursor() {
        let mut vp = Viewport::new(CanvasSize::new(100, 100));
        vp.pan(10.0, -20.0);
        assert!(close(vp.rect.min, Point::new(-10.0, 20.0)));
    }

    #[test]
    fn test_fit_bbox_keeps_aspect() {
        let mut vp = Viewport::new(CanvasSize::new(200, 100));
        assert!(vp.fit_bbox(&BBox::new(Point::new(0.0, 0.0), Point::new(90.0, 90.0))));
        assert!((vp.rect.height() - 100.0).abs() < 1e-9);
        assert!((vp.rect.width() - 200.0).abs() < 1e-9);
        assert!(close(vp.rect.center(), Point::new(45.0, 45.0)));
        assert!(!vp.fit_bbox(&BBox::new(Point::new(0.0, 0.0), Point::new(0.0, 5.0))));
    }

    #[test]
    fn test_set_reports_changes() {
        let mut vp = Viewport::new(CanvasSize::new(10, 10));
        let rect = vp.rect;
        assert!(!vp.set_rect(rect));
        assert!(vp.set_rect(BBox::new(Point::new(0.0, 0.0), Point::new(5.0, 5.0))));
        assert!(!vp.set_canvas(CanvasSize::new(10, 10)));
        assert!(vp.set_canvas(CanvasSize::new(20, 10)));
    }

    #[test]
    fn test_world_to_clip_flips_y() {
        let mut vp = Viewport::new(CanvasSize::new(10, 10));
        vp.set_rect(BBox::new(Point::new(0.0, 0.0), Point::new(4.0, 2.0)));
        let m = vp.world_to_clip();
        assert!(close(m.apply(Point::new(0.0, 0.0)), Point::new(-1.0, 1.0)));
        assert!(close(m.apply(Point::new(4.0, 2.0)), Point::new(1.0, -1.0)));
    }
}
