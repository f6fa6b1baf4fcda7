// Core types shared by the capture loop, the compositor, the tracker and the canvas.

use image::RgbImage;
use serde::{Deserialize, Serialize};

/// A captured (or loaded) color picture: 8-bit RGB, row-major.
/// The tracker works on `image::GrayImage` derived from it.
pub type Frame = RgbImage;

/// Packed pixels ready for the window.
#[derive(Clone)]
pub struct FrameBuffer {
    pub width: usize,      // how wide the frame is on screen (pixels)
    pub height: usize,     // how tall the frame is on screen (pixels)
    pub pixels: Vec<u32>,  // each entry is 0x00RRGGBB for minifb
}

impl FrameBuffer {
    /// Pack an RGB frame as 0x00RRGGBB.
    pub fn from_frame(frame: &Frame) -> Self {
        let (w, h) = frame.dimensions();
        let mut pixels = Vec::with_capacity((w as usize) * (h as usize));
        for px in frame.pixels() {
            let r = px[0] as u32;
            let g = px[1] as u32;
            let b = px[2] as u32;
            pixels.push((r << 16) | (g << 8) | b);
        }
        Self { width: w as usize, height: h as usize, pixels }
    }
}

/// Binary key mask; `true` = pixel is inside the key color range.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mask {
    pub width: u32,
    pub height: u32,
    pub keyed: Vec<bool>,  // length = width * height
}

impl Mask {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height, keyed: vec![false; (width as usize) * (height as usize)] }
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> bool {
        self.keyed[(y as usize) * (self.width as usize) + x as usize]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, on: bool) {
        let idx = (y as usize) * (self.width as usize) + x as usize;
        self.keyed[idx] = on;
    }

    /// Every bit flipped.
    pub fn complement(&self) -> Self {
        Self {
            width: self.width,
            height: self.height,
            keyed: self.keyed.iter().map(|k| !k).collect(),
        }
    }

    /// Number of keyed pixels.
    pub fn count(&self) -> usize {
        self.keyed.iter().filter(|k| **k).count()
    }
}

/// Inclusive HSV bounds in 8-bit OpenCV convention:
/// hue 0..=179 (degrees / 2), saturation and value 0..=255.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorRange {
    pub lower: [u8; 3],
    pub upper: [u8; 3],
}

impl ColorRange {
    pub fn new(lower: [u8; 3], upper: [u8; 3]) -> Self {
        Self { lower, upper }
    }

    #[inline]
    pub fn contains(&self, hsv: [u8; 3]) -> bool {
        (0..3).all(|c| hsv[c] >= self.lower[c] && hsv[c] <= self.upper[c])
    }
}

impl Default for ColorRange {
    /// Green screen.
    fn default() -> Self {
        Self { lower: [35, 50, 50], upper: [85, 255, 255] }
    }
}

/// Pointer position in frame-local pixels (may lie outside the frame while dragging).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: Point) -> f32 {
        let dx = (other.x - self.x) as f32;
        let dy = (other.y - self.y) as f32;
        (dx * dx + dy * dy).sqrt()
    }
}

/// One step of a pointer gesture: press, any number of drags, release.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerEvent {
    Press(Point),
    Drag(Point),
    Release(Point),
}

/// Axis-aligned region of interest in frame coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Roi {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Roi {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Rectangle spanned by two drag endpoints, in either order.
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self {
            x: a.x.min(b.x),
            y: a.y.min(b.y),
            width: a.x.abs_diff(b.x),
            height: a.y.abs_diff(b.y),
        }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Part of the ROI that lies inside a `width x height` frame, if any.
    pub fn clip(&self, width: u32, height: u32) -> Option<Roi> {
        let x0 = self.x.max(0) as i64;
        let y0 = self.y.max(0) as i64;
        let x1 = (self.x as i64 + self.width as i64).min(width as i64);
        let y1 = (self.y as i64 + self.height as i64).min(height as i64);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(Roi::new(x0 as i32, y0 as i32, (x1 - x0) as u32, (y1 - y0) as u32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roi_from_corners_normalizes_any_drag_direction() {
        let roi = Roi::from_corners(Point::new(50, 40), Point::new(10, 70));
        assert_eq!(roi, Roi::new(10, 40, 40, 30));
        assert!(!roi.is_empty());
        assert!(Roi::from_corners(Point::new(5, 5), Point::new(5, 90)).is_empty());
    }

    #[test]
    fn roi_clip_keeps_only_the_visible_part() {
        let roi = Roi::new(-10, 20, 30, 30);
        assert_eq!(roi.clip(100, 40), Some(Roi::new(0, 20, 20, 20)));
        assert_eq!(Roi::new(200, 0, 10, 10).clip(100, 100), None);
    }

    #[test]
    fn mask_complement_is_exhaustive() {
        let mut m = Mask::new(4, 3);
        m.set(1, 1, true);
        m.set(3, 2, true);
        let inv = m.complement();
        assert_eq!(m.count() + inv.count(), 12);
        assert!(!inv.get(1, 1));
        assert!(inv.get(0, 0));
    }

    #[test]
    fn frame_buffer_packs_rgb() {
        let frame = Frame::from_pixel(2, 1, image::Rgb([0x12, 0x34, 0x56]));
        let fb = FrameBuffer::from_frame(&frame);
        assert_eq!(fb.pixels, vec![0x0012_3456, 0x0012_3456]);
        assert_eq!((fb.width, fb.height), (2, 1));
    }
}
