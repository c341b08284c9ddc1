use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Sub};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Locks `mutex`, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Integer pixel rectangle. Width and height are never negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width: width.max(0),
            height: height.max(0),
        }
    }

    pub fn with_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width as i32, height as i32)
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// True if `other` lies entirely inside `self`.
    pub fn contains(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    pub fn overlaps(&self, other: &Rect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    /// Shrinks `self` to its intersection with `other`. Disjoint rectangles clip to
    /// an empty rectangle, never to a negative size.
    pub fn clip_to(&mut self, other: &Rect) {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        self.x = left;
        self.y = top;
        self.width = (right - left).max(0);
        self.height = (bottom - top).max(0);
    }

    pub fn intersection(&self, other: &Rect) -> Rect {
        let mut result = *self;
        result.clip_to(other);
        result
    }

    pub fn offset(&self, dx: i32, dy: i32) -> Rect {
        Rect::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// Grows the rectangle by `padding` on every side.
    pub fn padded(&self, padding: i32) -> Rect {
        Rect::new(
            self.x - padding,
            self.y - padding,
            self.width + 2 * padding,
            self.height + 2 * padding,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const NONE: Color = Color::rgba(0, 0, 0, 0);
    pub const BLACK: Color = Color::rgba(0, 0, 0, 255);
    pub const WHITE: Color = Color::rgba(255, 255, 255, 255);
    pub const RED: Color = Color::rgba(255, 0, 0, 255);
    pub const GREEN: Color = Color::rgba(0, 255, 0, 255);
    pub const BLUE: Color = Color::rgba(0, 0, 255, 255);

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::rgba(r, g, b, 255)
    }

    pub fn to_f32_array(self) -> [f32; 4] {
        [
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
            self.a as f32 / 255.0,
        ]
    }

    pub fn to_image_rgba(self) -> image::Rgba<u8> {
        image::Rgba([self.r, self.g, self.b, self.a])
    }

    pub fn from_image_rgba(pixel: image::Rgba<u8>) -> Self {
        let [r, g, b, a] = pixel.0;
        Self { r, g, b, a }
    }

    /// Linear interpolation per channel; `weight` 0 yields `self`, 1 yields `other`.
    pub fn lerp(self, other: Color, weight: f64) -> Color {
        let mix = |a: u8, b: u8| -> u8 {
            let v = a as f64 + (b as f64 - a as f64) * weight;
            v.round().clamp(0.0, 255.0) as u8
        };
        Color {
            r: mix(self.r, other.r),
            g: mix(self.g, other.g),
            b: mix(self.b, other.b),
            a: mix(self.a, other.a),
        }
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::WHITE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn lerp(self, other: Point, weight: f64) -> Point {
        self + (other - self) * weight
    }
}

impl Add for Point {
    type Output = Point;
    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;
    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Point {
    type Output = Point;
    fn mul(self, factor: f64) -> Point {
        Point::new(self.x * factor, self.y * factor)
    }
}

/// GPU-facing vertex layout shared by both backends.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 2],
    pub tex_coords: [f32; 2],
    pub color: [f32; 4],
}

/// A logical-space corner as recorded by draw calls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawVertex {
    pub x: f64,
    pub y: f64,
    pub color: Color,
}

impl DrawVertex {
    pub fn new(x: f64, y: f64, color: Color) -> Self {
        Self { x, y, color }
    }

    pub fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

impl Default for DrawVertex {
    fn default() -> Self {
        Self::new(0.0, 0.0, Color::WHITE)
    }
}

/// Four corners in the order top-left, top-right, bottom-left, bottom-right.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quad {
    pub corners: [DrawVertex; 4],
}

impl Quad {
    pub fn new(
        top_left: DrawVertex,
        top_right: DrawVertex,
        bottom_left: DrawVertex,
        bottom_right: DrawVertex,
    ) -> Self {
        Self {
            corners: [top_left, top_right, bottom_left, bottom_right],
        }
    }

    /// Axis-aligned quad with a uniform color.
    pub fn from_rect(x: f64, y: f64, width: f64, height: f64, color: Color) -> Self {
        Self::new(
            DrawVertex::new(x, y, color),
            DrawVertex::new(x + width, y, color),
            DrawVertex::new(x, y + height, color),
            DrawVertex::new(x + width, y + height, color),
        )
    }

    pub fn top_left(&self) -> DrawVertex {
        self.corners[0]
    }

    pub fn top_right(&self) -> DrawVertex {
        self.corners[1]
    }

    pub fn bottom_left(&self) -> DrawVertex {
        self.corners[2]
    }

    pub fn bottom_right(&self) -> DrawVertex {
        self.corners[3]
    }

    /// Bilinear interpolation of position and color at relative coordinates
    /// `(rel_x, rel_y)` in `[0, 1]²`.
    pub fn interpolate(&self, rel_x: f64, rel_y: f64) -> DrawVertex {
        let [tl, tr, bl, br] = self.corners;
        let left = tl.point().lerp(bl.point(), rel_y);
        let right = tr.point().lerp(br.point(), rel_y);
        let pos = left.lerp(right, rel_x);
        let left_c = tl.color.lerp(bl.color, rel_y);
        let right_c = tr.color.lerp(br.color, rel_y);
        DrawVertex::new(pos.x, pos.y, left_c.lerp(right_c, rel_x))
    }

    pub fn is_uniformly(&self, color: Color) -> bool {
        self.corners.iter().all(|c| c.color == color)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disjoint_rects_clip_to_empty() {
        let mut a = Rect::new(0, 0, 10, 10);
        a.clip_to(&Rect::new(20, 20, 5, 5));
        assert!(a.is_empty());
        assert!(a.width >= 0 && a.height >= 0);
    }

    #[test]
    fn intersection_is_overlap() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(5, 3, 10, 10);
        assert_eq!(a.intersection(&b), Rect::new(5, 3, 5, 7));
        assert!(a.contains(&Rect::new(1, 1, 9, 9)));
        assert!(!a.contains(&b));
    }

    #[test]
    fn quad_interpolation_hits_corners() {
        let q = Quad::from_rect(10.0, 20.0, 100.0, 50.0, Color::WHITE);
        let br = q.interpolate(1.0, 1.0);
        assert_eq!((br.x, br.y), (110.0, 70.0));
        let mid = q.interpolate(0.5, 0.5);
        assert_eq!((mid.x, mid.y), (60.0, 45.0));
    }
}
