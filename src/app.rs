// The interactive session: one window, four modes.
// What you SEE:
// • 1 LIVE: the raw camera.
// • 2 CHROMA: green is replaced by the background picture (solid blue until one is set).
// • 3 TRACK: drag a box around something; a green box follows it. HUD says LOST when it's gone.
// • 4 PAINT: a still picture you can draw on (shapes, free-hand, eraser, undo/redo).
// Video keys: S snapshot, B reload background, X drop background, R reset tracker.
// Paint keys: L/C/R/A shapes, F free-hand, E eraser, P next color, +/- pen width,
//             Z undo, Y redo, DEL clear, O reopen picture, S save.
// ESC quits.

use std::sync::Arc;
use std::time::{Duration, Instant};

use image::Rgb;
use minifb::Key;

use crate::camera::CameraCapture;
use crate::canvas::{Canvas, ShapeKind, Tool};
use crate::codec;
use crate::config::Config;
use crate::draw::{self, Drawer, PointerTracker, Stroke};
use crate::error::Result;
use crate::render::{Command, Effect, Event, Pipeline, Published, RenderLoop};
use crate::tracker::{TemplateBackend, TrackerState};
use crate::types::{Frame, FrameBuffer, Point, PointerEvent};

const HUD: Rgb<u8> = Rgb([255, 255, 255]);
const ALERT: Rgb<u8> = Rgb([255, 60, 60]);
const CURSOR: Rgb<u8> = Rgb([255, 204, 51]);
const SELECTION: Stroke = Stroke { color: Rgb([255, 255, 0]), width: 1 };

/// Pen colors cycled with P.
pub const PALETTE: [[u8; 3]; 6] = [
    [255, 0, 0],
    [0, 200, 0],
    [0, 0, 255],
    [255, 255, 0],
    [0, 0, 0],
    [255, 255, 255],
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Live,
    Chroma,
    Tracking,
    Paint,
}

impl Mode {
    /// Effect the capture loop runs while this mode is shown.
    pub fn effect(self) -> Effect {
        match self {
            Mode::Live | Mode::Paint => Effect::None,
            Mode::Chroma => Effect::ChromaKey,
            Mode::Tracking => Effect::Tracking,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Mode::Live => "LIVE",
            Mode::Chroma => "CHROMA",
            Mode::Tracking => "TRACK",
            Mode::Paint => "PAINT",
        }
    }
}

pub fn tool_label(tool: Tool) -> &'static str {
    match tool {
        Tool::Shape(ShapeKind::Line) => "LINE",
        Tool::Shape(ShapeKind::Circle) => "CIRCLE",
        Tool::Shape(ShapeKind::Rectangle) => "RECT",
        Tool::Shape(ShapeKind::Arrow) => "ARROW",
        Tool::FreeDraw => "FREE",
        Tool::Erase => "ERASE",
    }
}

/// Frames per second, refreshed once a second.
pub struct FpsCounter {
    since: Instant,
    frames: u32,
    fps: f32,
}

impl FpsCounter {
    pub fn new(now: Instant) -> Self {
        Self { since: now, frames: 0, fps: 0.0 }
    }

    /// Count one presented frame; returns the new rate when a second has passed.
    pub fn tick(&mut self, now: Instant) -> Option<f32> {
        self.frames += 1;
        let elapsed = now.duration_since(self.since);
        if elapsed < Duration::from_secs(1) {
            return None;
        }
        self.fps = self.frames as f32 / elapsed.as_secs_f32();
        self.frames = 0;
        self.since = now;
        Some(self.fps)
    }

    pub fn fps(&self) -> f32 {
        self.fps
    }
}

/// Rubber-band box for choosing the tracking region.
#[derive(Default)]
pub struct RoiDrag {
    anchor: Option<Point>,
    current: Option<Point>,
}

impl RoiDrag {
    /// Returns both corners when the drag is released.
    pub fn handle(&mut self, event: PointerEvent) -> Option<(Point, Point)> {
        match event {
            PointerEvent::Press(p) => {
                self.anchor = Some(p);
                self.current = Some(p);
                None
            }
            PointerEvent::Drag(p) => {
                if self.anchor.is_some() {
                    self.current = Some(p);
                }
                None
            }
            PointerEvent::Release(p) => {
                self.current = None;
                self.anchor.take().map(|a| (a, p))
            }
        }
    }

    /// Box being dragged right now, if any.
    pub fn preview(&self) -> Option<(Point, Point)> {
        self.anchor.zip(self.current)
    }
}

/// Status messages under the HUD line, one per row, top to bottom.
pub fn status_lines(
    mode: Mode,
    has_frame: bool,
    stalled: bool,
    tracker: TrackerState,
) -> Vec<(&'static str, Rgb<u8>)> {
    let mut lines = Vec::new();
    if !has_frame {
        lines.push(("WAITING FOR CAMERA", HUD));
    }
    if stalled {
        lines.push(("NO SIGNAL", ALERT));
    }
    if mode == Mode::Tracking && tracker == TrackerState::Lost {
        lines.push(("LOST", ALERT));
    }
    lines
}

struct App {
    config: Config,
    render: RenderLoop,
    canvas: Canvas,
    mode: Mode,
    pointer: PointerTracker,
    roi: RoiDrag,
    palette_index: usize,
    stalled: Option<String>,
    size: (u32, u32),
}

impl App {
    fn switch_mode(&mut self, mode: Mode) {
        if mode == self.mode {
            return;
        }
        if self.mode == Mode::Tracking {
            self.render.send(Command::ResetTracker);
            self.roi = RoiDrag::default();
        }
        if self.mode == Mode::Paint {
            self.canvas.cancel_gesture();
        }
        log::info!("mode: {} -> {}", self.mode.label(), mode.label());
        self.mode = mode;
        self.render.send(Command::SetEffect(mode.effect()));
    }

    fn handle_keys(&mut self, drawer: &Drawer) {
        for (key, mode) in [
            (Key::Key1, Mode::Live),
            (Key::Key2, Mode::Chroma),
            (Key::Key3, Mode::Tracking),
            (Key::Key4, Mode::Paint),
        ] {
            if drawer.key_pressed_once(key) {
                self.switch_mode(mode);
            }
        }

        if self.mode == Mode::Paint {
            self.handle_paint_keys(drawer);
        } else {
            self.handle_video_keys(drawer);
        }
    }

    fn handle_video_keys(&mut self, drawer: &Drawer) {
        if drawer.key_pressed_once(Key::S) {
            match self.render.latest() {
                Some(shot) => match codec::save_image(&self.config.snapshot_path, &shot.frame) {
                    Ok(()) => log::info!("snapshot saved to {:?}", self.config.snapshot_path),
                    Err(e) => log::error!("{e}"),
                },
                None => log::warn!("no frame to snapshot yet"),
            }
        }
        if drawer.key_pressed_once(Key::B) {
            self.load_background();
        }
        if drawer.key_pressed_once(Key::X) {
            self.render.send(Command::ClearBackground);
            if self.mode == Mode::Chroma {
                // Re-entering chroma installs the default background again.
                self.render.send(Command::SetEffect(Effect::ChromaKey));
            }
        }
        if drawer.key_pressed_once(Key::R) {
            self.render.send(Command::ResetTracker);
        }
    }

    fn handle_paint_keys(&mut self, drawer: &Drawer) {
        for (key, tool) in [
            (Key::L, Tool::Shape(ShapeKind::Line)),
            (Key::C, Tool::Shape(ShapeKind::Circle)),
            (Key::R, Tool::Shape(ShapeKind::Rectangle)),
            (Key::A, Tool::Shape(ShapeKind::Arrow)),
            (Key::F, Tool::FreeDraw),
            (Key::E, Tool::Erase),
        ] {
            if drawer.key_pressed_once(key) {
                self.canvas.set_tool(tool);
            }
        }
        if drawer.key_pressed_once(Key::P) {
            self.palette_index = (self.palette_index + 1) % PALETTE.len();
            self.canvas.set_color(Rgb(PALETTE[self.palette_index]));
        }
        let width = self.canvas.stroke().width;
        if drawer.key_pressed_once(Key::Equal) {
            self.canvas.set_stroke_width(width + 1);
        }
        if drawer.key_pressed_once(Key::Minus) {
            self.canvas.set_stroke_width(width.saturating_sub(1));
        }

        if drawer.key_pressed_once(Key::Z) {
            self.canvas.undo();
        }
        if drawer.key_pressed_once(Key::Y) {
            self.canvas.redo();
        }
        if drawer.key_pressed_once(Key::Delete) {
            self.canvas.clear();
        }
        if drawer.key_pressed_once(Key::O) {
            if let Some(path) = self.config.canvas_path.clone() {
                if let Err(e) = self.canvas.load_path(&path) {
                    log::error!("{e}");
                }
            }
        }
        if drawer.key_pressed_once(Key::S) {
            match self.canvas.save(&self.config.canvas_save_path) {
                Ok(()) => log::info!("canvas saved to {:?}", self.config.canvas_save_path),
                Err(e) => log::error!("{e}"),
            }
        }
    }

    fn handle_pointer(&mut self, event: PointerEvent) {
        match self.mode {
            Mode::Paint => self.canvas.handle(event),
            Mode::Tracking => {
                if let Some((a, b)) = self.roi.handle(event) {
                    self.render.send(Command::SelectRoi(a, b));
                }
            }
            Mode::Live | Mode::Chroma => {}
        }
    }

    fn load_background(&mut self) {
        let Some(path) = self.config.background_path.clone() else {
            log::warn!("no background_path configured");
            return;
        };
        match codec::load_image(&path) {
            Ok(bg) => {
                log::info!("background loaded from {path:?}");
                self.render.send(Command::SetBackground(bg));
            }
            Err(e) => log::error!("{e}"),
        }
    }

    fn poll_events(&mut self) -> bool {
        let mut running = true;
        for event in self.render.poll_events() {
            match event {
                Event::CaptureStalled(reason) => self.stalled = Some(reason),
                Event::CaptureRecovered => self.stalled = None,
                Event::TrackerChanged(state) => log::debug!("tracker: {state:?}"),
                Event::Stopped => running = false,
            }
        }
        running
    }

    /// Picture for this refresh, HUD included.
    fn compose(&self, mouse: Option<Point>, fps: f32) -> Frame {
        match self.mode {
            Mode::Paint => {
                let mut screen = self.canvas.image().clone();
                if let Some(p) = mouse {
                    draw::draw_crosshair(&mut screen, p.x, p.y, 12, CURSOR);
                }
                let stroke = self.canvas.stroke();
                let hud = format!(
                    "PAINT | {} W{} | UNDO {} REDO {} | FPS {fps:.1}",
                    tool_label(self.canvas.tool()),
                    stroke.width,
                    self.canvas.history().undo_len(),
                    self.canvas.history().redo_len(),
                );
                draw::draw_text_5x7(&mut screen, 8, 8, &hud, HUD);
                draw::draw_text_5x7(&mut screen, 8, 20, "PEN", stroke.color);
                screen
            }
            _ => {
                let latest: Option<Arc<Published>> = self.render.latest();
                let (mut screen, tracker) = match &latest {
                    Some(p) => (p.frame.clone(), p.tracker),
                    None => (Frame::new(self.size.0, self.size.1), TrackerState::Idle),
                };
                if let Some((a, b)) = self.roi.preview() {
                    draw::draw_rect(&mut screen, a, b, SELECTION);
                }
                let hud = format!("{} | FPS {fps:.1}", self.mode.label());
                draw::draw_text_5x7(&mut screen, 8, 8, &hud, HUD);
                let lines = status_lines(self.mode, latest.is_some(), self.stalled.is_some(), tracker);
                for (row, (text, color)) in lines.into_iter().enumerate() {
                    draw::draw_text_5x7(&mut screen, 8, 20 + 12 * row as i32, text, color);
                }
                screen
            }
        }
    }
}

/// Open the camera and window, then run until ESC or the window closes.
pub fn run(config: Config) -> Result<()> {
    /* 1) Capture thread. Visual: nothing yet, but the camera light turns on. */
    let (index, width, height, fps) = (config.camera_index, config.width, config.height, config.fps);
    let pipeline = Pipeline::new(
        config.key_range,
        TemplateBackend::new(config.tracker),
        config.default_background,
    );
    let render = RenderLoop::start(
        move || CameraCapture::open(index, width, height, fps),
        pipeline,
        config.stall_threshold,
    )?;

    /* 2) Canvas: the configured picture, or a white sheet. */
    let (max_w, max_h) = config.canvas_max_size;
    let mut canvas = Canvas::new(Frame::from_pixel(width, height, Rgb([255, 255, 255])))
        .with_max_size(max_w, max_h);
    if let Some(path) = &config.canvas_path {
        if let Err(e) = canvas.load_path(path) {
            log::warn!("{e}; starting with a blank canvas");
        }
    }
    canvas.set_color(Rgb(config.stroke_color));
    canvas.set_stroke_width(config.stroke_width);

    /* 3) Window. Visual: it opens black until the first frame arrives. */
    let mut drawer = Drawer::new("chroma-sketch", width as usize, height as usize)?;

    let mut app = App {
        config,
        render,
        canvas,
        mode: Mode::Live,
        pointer: PointerTracker::new(),
        roi: RoiDrag::default(),
        palette_index: 0,
        stalled: None,
        size: (width, height),
    };
    if app.config.background_path.is_some() {
        app.load_background();
    }

    let mut fps = FpsCounter::new(Instant::now());
    while drawer.is_open() && !drawer.esc_pressed() {
        /* 4) Inputs: keys first, then the pointer gesture. */
        app.handle_keys(&drawer);
        let mouse = drawer.mouse_pos();
        if let Some(event) = app.pointer.step(drawer.left_mouse_down(), mouse) {
            app.handle_pointer(event);
        }
        if !app.poll_events() {
            log::error!("capture loop exited");
            break;
        }

        /* 5) Present. */
        let screen = app.compose(mouse, fps.fps());
        drawer.present(&FrameBuffer::from_frame(&screen))?;

        if let Some(rate) = fps.tick(Instant::now()) {
            log::info!("FPS: {rate:.1}");
        }
    }

    app.render.stop()
}
