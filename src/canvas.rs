// Annotation canvas: paint shapes, free-hand strokes and erase over a still picture.
// Visual expectation: drag with the rectangle tool and a rubber-band rectangle follows the
// mouse without leaving ghosts; undo/redo step through whole gestures; the eraser brings
// back the picture as it was loaded (not white paint).

use std::path::Path;

use crate::codec;
use crate::draw::{self, Stroke};
use crate::error::Result;
use crate::history::History;
use crate::types::{Frame, Point, PointerEvent};
use image::Rgb;
use image::imageops::{self, FilterType};

/// Pictures larger than this are scaled down on load (aspect ratio kept).
pub const DEFAULT_MAX_SIZE: (u32, u32) = (800, 800);
pub const MIN_STROKE_WIDTH: u32 = 1;
pub const MAX_STROKE_WIDTH: u32 = 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShapeKind {
    Line,
    Circle,
    Rectangle,
    Arrow,
}

/// Exactly one tool is active at a time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tool {
    Shape(ShapeKind),
    FreeDraw,
    Erase,
}

/// Draw `kind` spanning anchor `a` to pointer `b`.
/// Circles are centered on `a` with radius |ab|.
pub fn draw_shape(img: &mut Frame, kind: ShapeKind, a: Point, b: Point, stroke: Stroke) {
    match kind {
        ShapeKind::Line => draw::draw_line(img, a, b, stroke),
        ShapeKind::Circle => draw::draw_circle(img, a, a.distance(b).round() as i32, stroke),
        ShapeKind::Rectangle => draw::draw_rect(img, a, b, stroke),
        ShapeKind::Arrow => draw::draw_arrow(img, a, b, stroke),
    }
}

/// Scale `frame` down to fit inside `max_w x max_h`, keeping its aspect ratio.
pub fn fit_within(frame: Frame, max_w: u32, max_h: u32) -> Frame {
    let (w, h) = frame.dimensions();
    if w <= max_w && h <= max_h {
        return frame;
    }
    let aspect = w as f64 / h as f64;
    let mut new_w = max_w;
    let mut new_h = (new_w as f64 / aspect) as u32;
    if new_h > max_h {
        new_h = max_h;
        new_w = (new_h as f64 * aspect) as u32;
    }
    imageops::resize(&frame, new_w.max(1), new_h.max(1), FilterType::Triangle)
}

/// One editing session over a loaded picture.
pub struct Canvas {
    image: Frame,
    original: Frame, // untouched copy taken at load time; the eraser restores from it
    history: History,
    tool: Tool,
    stroke: Stroke,
    anchor: Option<Point>, // Some(..) while a gesture is in flight
    max_size: (u32, u32),
}

impl Canvas {
    /// Start editing `image` with the line tool and a 2 px red pen.
    pub fn new(image: Frame) -> Self {
        let image = fit_within(image, DEFAULT_MAX_SIZE.0, DEFAULT_MAX_SIZE.1);
        Self {
            original: image.clone(),
            image,
            history: History::new(),
            tool: Tool::Shape(ShapeKind::Line),
            stroke: Stroke { color: Rgb([255, 0, 0]), width: 2 },
            anchor: None,
            max_size: DEFAULT_MAX_SIZE,
        }
    }

    /// Decode `path` and start editing it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(codec::load_image(path)?))
    }

    pub fn with_max_size(mut self, max_w: u32, max_h: u32) -> Self {
        self.max_size = (max_w.max(1), max_h.max(1));
        self
    }

    /// Begin a new session on `image`: original replaced, history cleared.
    /// Tool and pen carry over.
    pub fn load(&mut self, image: Frame) {
        let image = fit_within(image, self.max_size.0, self.max_size.1);
        self.original = image.clone();
        self.image = image;
        self.history.clear();
        self.anchor = None;
    }

    /// Like `load`, from a file. On a decode error nothing changes.
    pub fn load_path(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let image = codec::load_image(path)?;
        self.load(image);
        Ok(())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        codec::save_image(path, &self.image)
    }

    pub fn image(&self) -> &Frame {
        &self.image
    }

    pub fn original(&self) -> &Frame {
        &self.original
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    /// Switching tools never touches history.
    pub fn set_tool(&mut self, tool: Tool) {
        self.tool = tool;
    }

    pub fn stroke(&self) -> Stroke {
        self.stroke
    }

    pub fn set_color(&mut self, color: Rgb<u8>) {
        self.stroke.color = color;
    }

    pub fn set_stroke_width(&mut self, width: u32) {
        self.stroke.width = width.clamp(MIN_STROKE_WIDTH, MAX_STROKE_WIDTH);
    }

    pub fn is_drawing(&self) -> bool {
        self.anchor.is_some()
    }

    pub fn handle(&mut self, event: PointerEvent) {
        match event {
            PointerEvent::Press(p) => self.press(p),
            PointerEvent::Drag(p) => self.drag(p),
            PointerEvent::Release(p) => self.release(p),
        }
    }

    /// Snapshot the current image, then start the gesture at `p`.
    pub fn press(&mut self, p: Point) {
        self.history.push_snapshot(self.image.clone());
        self.anchor = Some(p);
        if self.tool == Tool::Erase {
            self.erase_at(p);
        }
    }

    pub fn drag(&mut self, p: Point) {
        let Some(anchor) = self.anchor else { return };
        match self.tool {
            Tool::Shape(kind) => self.preview_shape(kind, anchor, p),
            Tool::FreeDraw => {
                draw::draw_line(&mut self.image, anchor, p, self.stroke);
                self.anchor = Some(p);
            }
            Tool::Erase => self.erase_at(p),
        }
    }

    /// Finish the gesture; the resulting image is the committed one.
    pub fn release(&mut self, p: Point) {
        let Some(anchor) = self.anchor.take() else { return };
        match self.tool {
            Tool::Shape(kind) => self.preview_shape(kind, anchor, p),
            Tool::FreeDraw if anchor != p => draw::draw_line(&mut self.image, anchor, p, self.stroke),
            Tool::FreeDraw | Tool::Erase => {}
        }
    }

    /// Abandon the in-flight gesture and roll back to its pre-edit snapshot.
    pub fn cancel_gesture(&mut self) {
        if self.anchor.take().is_none() {
            return;
        }
        if let Some(before) = self.history.pop_snapshot() {
            self.image = before;
        }
    }

    /// Undo the last committed edit. A gesture still in flight is dropped first.
    pub fn undo(&mut self) -> bool {
        self.cancel_gesture();
        self.history.undo(&mut self.image)
    }

    pub fn redo(&mut self) -> bool {
        self.cancel_gesture();
        self.history.redo(&mut self.image)
    }

    /// Back to the picture as loaded. Undoable.
    pub fn clear(&mut self) {
        self.cancel_gesture();
        let before = std::mem::replace(&mut self.image, self.original.clone());
        self.history.push_snapshot(before);
    }

    // Re-render from the pre-edit snapshot so previews never accumulate.
    fn preview_shape(&mut self, kind: ShapeKind, anchor: Point, p: Point) {
        let Some(before) = self.history.peek() else { return };
        let mut img = before.clone();
        draw_shape(&mut img, kind, anchor, p, self.stroke);
        self.image = img;
    }

    // Copy the original back inside a square of half-size 2x the pen width.
    fn erase_at(&mut self, p: Point) {
        let half = (2 * self.stroke.width) as i32;
        let (w, h) = self.image.dimensions();
        let x0 = (p.x - half).max(0);
        let y0 = (p.y - half).max(0);
        let x1 = (p.x + half).min(w as i32 - 1);
        let y1 = (p.y + half).min(h as i32 - 1);
        for y in y0..=y1 {
            for x in x0..=x1 {
                let px = *self.original.get_pixel(x as u32, y as u32);
                self.image.put_pixel(x as u32, y as u32, px);
            }
        }
    }
}
