// Window + software drawing utilities.
// Visual effects provided here:
// 1) A window that shows the live (or composited) camera image, or the annotation canvas.
// 2) Stroked shapes: thick lines, rectangle/circle outlines, arrows.
// 3) A crosshair that follows your mouse.
// 4) A tiny 5x7 bitmap font to render HUD text on top of the picture.

use crate::error::Error;
use crate::types::{Frame, FrameBuffer, Point, PointerEvent};
use image::Rgb;
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_circle_mut, draw_line_segment_mut};
use minifb::{Key, KeyRepeat, MouseButton, MouseMode, Window, WindowOptions};

pub struct Drawer {
    window: Window, // the on-screen window you see
    buffer_size: (usize, usize), // size of the last presented buffer
}

impl Drawer {
    /// Create a window sized to the camera feed.
    /// Visual: a new empty window appears with your chosen title.
    pub fn new(title: &str, width: usize, height: usize) -> Result<Self, Error> {
        let window = Window::new(title, width, height, WindowOptions::default())
            .map_err(|e| Error::WindowInit(e.to_string()))?;
        Ok(Self { window, buffer_size: (width, height) })
    }

    /// Push the pixels for this frame to the screen.
    /// Visual: the window immediately displays the new image (stretched to the window).
    pub fn present(&mut self, framebuffer: &FrameBuffer) -> Result<(), Error> {
        self.window
            .update_with_buffer(&framebuffer.pixels, framebuffer.width, framebuffer.height)
            .map_err(|e| Error::WindowUpdate(e.to_string()))?;
        self.buffer_size = (framebuffer.width, framebuffer.height);
        Ok(())
    }

    /// Returns false when the user closes the window (so we can stop the loop).
    pub fn is_open(&self) -> bool {
        self.window.is_open()
    }

    /// True while ESC is held down (we'll exit when this is pressed).
    pub fn esc_pressed(&self) -> bool {
        self.window.is_key_down(Key::Escape)
    }

    /// True once per key stroke.
    pub fn key_pressed_once(&self, key: Key) -> bool {
        self.window.is_key_pressed(key, KeyRepeat::No)
    }

    /// Current mouse position in *buffer* pixel coordinates (clamped to the window).
    /// The window may be stretched, so window pixels are scaled back to the last
    /// presented buffer.
    pub fn mouse_pos(&self) -> Option<Point> {
        let (wx, wy) = self.window.get_mouse_pos(MouseMode::Clamp)?;
        let (ww, wh) = self.window.get_size();
        let (bw, bh) = self.buffer_size;
        if ww == 0 || wh == 0 {
            return None;
        }
        let x = wx.max(0.0) * bw as f32 / ww as f32;
        let y = wy.max(0.0) * bh as f32 / wh as f32;
        Some(Point::new(x as i32, y as i32))
    }

    pub fn left_mouse_down(&self) -> bool {
        self.window.get_mouse_down(MouseButton::Left)
    }
}

/// Turns polled "button down + position" samples into press/drag/release events.
#[derive(Default)]
pub struct PointerTracker {
    down: bool,
    last: Option<Point>,
}

impl PointerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one poll sample; returns the gesture step it represents, if any.
    pub fn step(&mut self, down: bool, pos: Option<Point>) -> Option<PointerEvent> {
        let event = match (self.down, down, pos.or(self.last)) {
            (false, true, Some(p)) => Some(PointerEvent::Press(p)),
            (true, true, Some(p)) if Some(p) != self.last => Some(PointerEvent::Drag(p)),
            (true, false, Some(p)) => Some(PointerEvent::Release(p)),
            _ => None,
        };
        // A press without a position is ignored until the pointer is known.
        if !(down && !self.down && pos.is_none() && self.last.is_none()) {
            self.down = down;
        }
        if pos.is_some() {
            self.last = pos;
        }
        event
    }
}

/* ---------- Software drawing on RGB frames ---------- */

/// Pen used for shapes and free-hand strokes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Stroke {
    pub color: Rgb<u8>,
    pub width: u32,
}

/// Put a pixel on the frame if (x,y) is inside bounds.
/// Visual: the exact pixel at (x,y) changes color.
#[inline]
pub fn put_pixel(img: &mut Frame, x: i32, y: i32, color: Rgb<u8>) {
    if x < 0 || y < 0 {
        return;
    }
    let (x, y) = (x as u32, y as u32);
    if x >= img.width() || y >= img.height() {
        return;
    }
    img.put_pixel(x, y, color);
}

/// Walk the Bresenham path from (x0,y0) to (x1,y1), calling `plot` at every cell.
fn bresenham(x0: i32, y0: i32, x1: i32, y1: i32, mut plot: impl FnMut(i32, i32)) {
    let (mut x0, mut y0) = (x0, y0);
    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        plot(x0, y0);
        if x0 == x1 && y0 == y1 { break; }
        let e2 = 2 * err;
        if e2 >= dy { err += dy; x0 += sx; }
        if e2 <= dx { err += dx; y0 += sy; }
    }
}

/// Draw a line with the stroke's width.
/// Visual: 1 px wide lines are plain; wider ones are discs stamped along the path.
pub fn draw_line(img: &mut Frame, a: Point, b: Point, stroke: Stroke) {
    if stroke.width <= 1 {
        draw_line_segment_mut(img, (a.x as f32, a.y as f32), (b.x as f32, b.y as f32), stroke.color);
        return;
    }
    let radius = (stroke.width / 2) as i32;
    bresenham(a.x, a.y, b.x, b.y, |x, y| {
        draw_filled_circle_mut(img, (x, y), radius, stroke.color);
    });
}

/// Rectangle outline with corners at `a` and `b`.
pub fn draw_rect(img: &mut Frame, a: Point, b: Point, stroke: Stroke) {
    let tr = Point::new(b.x, a.y);
    let bl = Point::new(a.x, b.y);
    draw_line(img, a, tr, stroke);
    draw_line(img, tr, b, stroke);
    draw_line(img, b, bl, stroke);
    draw_line(img, bl, a, stroke);
}

/// Circle outline; wide strokes fill the ring |d - r| <= width/2.
pub fn draw_circle(img: &mut Frame, center: Point, radius: i32, stroke: Stroke) {
    if stroke.width <= 1 {
        draw_hollow_circle_mut(img, (center.x, center.y), radius, stroke.color);
        return;
    }
    let half = stroke.width as f32 / 2.0;
    let outer = radius + half.ceil() as i32;
    // Only the part of the ring's bounding box that lies on the image.
    let (w, h) = (img.width() as i32, img.height() as i32);
    let (x0, x1) = ((center.x - outer).max(0), (center.x + outer).min(w - 1));
    let (y0, y1) = ((center.y - outer).max(0), (center.y + outer).min(h - 1));
    for y in y0..=y1 {
        for x in x0..=x1 {
            let d = Point::new(x, y).distance(center);
            if (d - radius as f32).abs() <= half {
                img.put_pixel(x as u32, y as u32, stroke.color);
            }
        }
    }
}

/// Line from `a` to `b` with two barbs at `b`; barbs are 10% of the shaft length.
pub fn draw_arrow(img: &mut Frame, a: Point, b: Point, stroke: Stroke) {
    draw_line(img, a, b, stroke);

    let tip = 0.1 * a.distance(b);
    let angle = ((a.y - b.y) as f32).atan2((a.x - b.x) as f32);
    for side in [std::f32::consts::FRAC_PI_4, -std::f32::consts::FRAC_PI_4] {
        let barb = Point::new(
            (b.x as f32 + tip * (angle + side).cos()).round() as i32,
            (b.y as f32 + tip * (angle + side).sin()).round() as i32,
        );
        draw_line(img, b, barb, stroke);
    }
}

/// Draw a small crosshair centered at (cx,cy).
/// Visual: a "+" shape (with a tiny gap at the center) follows your mouse.
pub fn draw_crosshair(img: &mut Frame, cx: i32, cy: i32, size: i32, color: Rgb<u8>) {
    let thin = Stroke { color, width: 1 };
    draw_line(img, Point::new(cx - size, cy), Point::new(cx - 2, cy), thin);
    draw_line(img, Point::new(cx + 2, cy), Point::new(cx + size, cy), thin);
    draw_line(img, Point::new(cx, cy - size), Point::new(cx, cy - 2), thin);
    draw_line(img, Point::new(cx, cy + 2), Point::new(cx, cy + size), thin);
    // Small center dot to anchor the crosshair visually
    put_pixel(img, cx, cy, color);
}

/* ---------- 5x7 bitmap font (digits, A-Z, a little punctuation) ---------- */

/// Return a 5x7 glyph bitmap; lowercase letters map to uppercase.
/// Each u8 is a row; the low 5 bits are the pixels (bit 4 = leftmost).
fn glyph5x7(ch: char) -> Option<[u8; 7]> {
    // Helper macro to define a glyph quickly
    macro_rules! g { ($a:expr,$b:expr,$c:expr,$d:expr,$e:expr,$f:expr,$g:expr) => {
        Some([$a,$b,$c,$d,$e,$f,$g])
    }; }

    match ch.to_ascii_uppercase() {
        // Digits 0..9
        '0' => g!(0b01110,0b10001,0b10011,0b10101,0b11001,0b10001,0b01110),
        '1' => g!(0b00100,0b01100,0b00100,0b00100,0b00100,0b00100,0b01110),
        '2' => g!(0b01110,0b10001,0b00001,0b00010,0b00100,0b01000,0b11111),
        '3' => g!(0b11110,0b00001,0b00001,0b01110,0b00001,0b00001,0b11110),
        '4' => g!(0b00010,0b00110,0b01010,0b10010,0b11111,0b00010,0b00010),
        '5' => g!(0b11111,0b10000,0b11110,0b00001,0b00001,0b10001,0b01110),
        '6' => g!(0b00110,0b01000,0b10000,0b11110,0b10001,0b10001,0b01110),
        '7' => g!(0b11111,0b00001,0b00010,0b00100,0b01000,0b01000,0b01000),
        '8' => g!(0b01110,0b10001,0b10001,0b01110,0b10001,0b10001,0b01110),
        '9' => g!(0b01110,0b10001,0b10001,0b01111,0b00001,0b00010,0b01100),

        // Letters
        'A' => g!(0b01110,0b10001,0b10001,0b11111,0b10001,0b10001,0b10001),
        'B' => g!(0b11110,0b10001,0b10001,0b11110,0b10001,0b10001,0b11110),
        'C' => g!(0b01110,0b10001,0b10000,0b10000,0b10000,0b10001,0b01110),
        'D' => g!(0b11100,0b10010,0b10001,0b10001,0b10001,0b10010,0b11100),
        'E' => g!(0b11111,0b10000,0b10000,0b11110,0b10000,0b10000,0b11111),
        'F' => g!(0b11111,0b10000,0b10000,0b11110,0b10000,0b10000,0b10000),
        'G' => g!(0b01110,0b10001,0b10000,0b10111,0b10001,0b10001,0b01111),
        'H' => g!(0b10001,0b10001,0b10001,0b11111,0b10001,0b10001,0b10001),
        'I' => g!(0b01110,0b00100,0b00100,0b00100,0b00100,0b00100,0b01110),
        'J' => g!(0b00111,0b00010,0b00010,0b00010,0b00010,0b10010,0b01100),
        'K' => g!(0b10001,0b10010,0b10100,0b11000,0b10100,0b10010,0b10001),
        'L' => g!(0b10000,0b10000,0b10000,0b10000,0b10000,0b10000,0b11111),
        'M' => g!(0b10001,0b11011,0b10101,0b10101,0b10001,0b10001,0b10001),
        'N' => g!(0b10001,0b10001,0b11001,0b10101,0b10011,0b10001,0b10001),
        'O' => g!(0b01110,0b10001,0b10001,0b10001,0b10001,0b10001,0b01110),
        'P' => g!(0b11110,0b10001,0b10001,0b11110,0b10000,0b10000,0b10000),
        'Q' => g!(0b01110,0b10001,0b10001,0b10001,0b10101,0b10010,0b01101),
        'R' => g!(0b11110,0b10001,0b10001,0b11110,0b10100,0b10010,0b10001),
        'S' => g!(0b01111,0b10000,0b10000,0b01110,0b00001,0b00001,0b11110),
        'T' => g!(0b11111,0b00100,0b00100,0b00100,0b00100,0b00100,0b00100),
        'U' => g!(0b10001,0b10001,0b10001,0b10001,0b10001,0b10001,0b01110),
        'V' => g!(0b10001,0b10001,0b10001,0b10001,0b10001,0b01010,0b00100),
        'W' => g!(0b10001,0b10001,0b10001,0b10101,0b10101,0b10101,0b01010),
        'X' => g!(0b10001,0b10001,0b01010,0b00100,0b01010,0b10001,0b10001),
        'Y' => g!(0b10001,0b10001,0b01010,0b00100,0b00100,0b00100,0b00100),
        'Z' => g!(0b11111,0b00001,0b00010,0b00100,0b01000,0b10000,0b11111),

        // Punctuation
        ' ' => g!(0b00000,0b00000,0b00000,0b00000,0b00000,0b00000,0b00000),
        '|' => g!(0b00100,0b00100,0b00100,0b00100,0b00100,0b00100,0b00100),
        ':' => g!(0b00000,0b00100,0b00000,0b00000,0b00100,0b00000,0b00000),
        '.' => g!(0b00000,0b00000,0b00000,0b00000,0b00000,0b00100,0b00000),
        '-' => g!(0b00000,0b00000,0b00000,0b11111,0b00000,0b00000,0b00000),
        '+' => g!(0b00000,0b00100,0b00100,0b11111,0b00100,0b00100,0b00000),
        '=' => g!(0b00000,0b00000,0b11111,0b00000,0b11111,0b00000,0b00000),
        '/' => g!(0b00001,0b00001,0b00010,0b00100,0b01000,0b10000,0b10000),
        '(' => g!(0b00010,0b00100,0b01000,0b01000,0b01000,0b00100,0b00010),
        ')' => g!(0b01000,0b00100,0b00010,0b00010,0b00010,0b00100,0b01000),

        _ => None,
    }
}

/// Draw a single 5x7 character at (x,y).
/// Visual: a tiny glyph appears with a 1-pixel black shadow for contrast.
fn draw_char_5x7(img: &mut Frame, x: i32, y: i32, ch: char, color: Rgb<u8>) {
    if let Some(rows) = glyph5x7(ch) {
        // Shadow pass first, then the glyph itself on top
        for (dx, dy, c) in [(1, 1, Rgb([0, 0, 0])), (0, 0, color)] {
            for (ry, rowbits) in rows.iter().enumerate() {
                for rx in 0..5 {
                    if (rowbits & (1 << (4 - rx))) != 0 {
                        put_pixel(img, x + rx + dx, y + ry as i32 + dy, c);
                    }
                }
            }
        }
    }
}

/// Draw a text string using 5x7 glyphs.
/// Visual: a compact HUD string appears; each glyph is 5x7 with 1-pixel spacing.
pub fn draw_text_5x7(img: &mut Frame, mut x: i32, y: i32, text: &str, color: Rgb<u8>) {
    for ch in text.chars() {
        draw_char_5x7(img, x, y, ch, color);
        x += 6; // 5 pixels glyph width + 1 pixel spacing
    }
}
