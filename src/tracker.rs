// Region tracking: the user drags a rectangle around something, and every following frame
// the rectangle is moved to wherever that something went.
// Visual expectation: a green box sticks to the object; when the object leaves the picture
// (or changes too much) the HUD says LOST until a new box is dragged.

use crate::error::{Error, Result};
use crate::types::{Frame, Point, Roi};
use image::imageops;
use image::GrayImage;
use imageproc::template_matching::{MatchTemplateMethod, find_extremes, match_template};
use serde::{Deserialize, Serialize};

/// Lifecycle of the one tracker a session owns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackerState {
    Idle,
    Initializing(Roi), // ROI chosen, waiting for the next captured frame to seed on
    Tracking(Roi),
    Lost,
}

/// A seeded tracker: follows its target frame by frame.
pub trait Tracker {
    /// Estimate the target's new rectangle. `false` means the target was lost;
    /// the returned ROI is then the last known one.
    fn update(&mut self, frame: &Frame) -> (Roi, bool);

    /// Rectangle currently followed; right after `init` this is the seeded
    /// region as it fits inside the frame.
    fn roi(&self) -> Roi;
}

/// Builds trackers; `init` seeds a new one on `frame` inside `roi`.
pub trait TrackerBackend {
    type Handle: Tracker;

    fn init(&self, frame: &Frame, roi: Roi) -> Result<Self::Handle>;
}

/// Drives the Idle → Initializing → Tracking → Lost state machine and owns
/// at most one live tracker handle.
pub struct TrackerController<B: TrackerBackend> {
    backend: B,
    state: TrackerState,
    handle: Option<B::Handle>,
}

impl<B: TrackerBackend> TrackerController<B> {
    pub fn new(backend: B) -> Self {
        Self { backend, state: TrackerState::Idle, handle: None }
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    /// Current ROI while initializing or tracking.
    pub fn roi(&self) -> Option<Roi> {
        match self.state {
            TrackerState::Initializing(roi) | TrackerState::Tracking(roi) => Some(roi),
            TrackerState::Idle | TrackerState::Lost => None,
        }
    }

    /// A finished drag from `a` to `b`. Zero-area drags are ignored; any other
    /// drag drops the current tracker and waits to seed on the next frame.
    pub fn select(&mut self, a: Point, b: Point) -> bool {
        self.select_roi(Roi::from_corners(a, b))
    }

    pub fn select_roi(&mut self, roi: Roi) -> bool {
        if roi.is_empty() {
            log::debug!("ignoring zero-area selection {roi:?}");
            return false;
        }
        self.handle = None;
        self.state = TrackerState::Initializing(roi);
        log::info!("ROI selected: {roi:?}");
        true
    }

    /// Back to Idle, releasing the tracker.
    pub fn reset(&mut self) {
        self.handle = None;
        self.state = TrackerState::Idle;
    }

    /// Feed one captured frame. A pending ROI is seeded on this very frame
    /// (no update on the seeding frame); a running tracker is updated once.
    pub fn process(&mut self, frame: &Frame) -> TrackerState {
        match self.state {
            TrackerState::Initializing(roi) => self.seed(frame, roi),
            TrackerState::Tracking(_) => self.step(frame),
            TrackerState::Idle | TrackerState::Lost => {}
        }
        self.state
    }

    fn seed(&mut self, frame: &Frame, roi: Roi) {
        match self.backend.init(frame, roi) {
            Ok(handle) => {
                let seeded = handle.roi();
                if seeded != roi {
                    log::debug!("ROI {roi:?} clipped to {seeded:?}");
                }
                self.handle = Some(handle);
                self.state = TrackerState::Tracking(seeded);
            }
            Err(e) => {
                log::warn!("tracker init failed: {e}");
                self.handle = None;
                self.state = TrackerState::Lost;
            }
        }
    }

    fn step(&mut self, frame: &Frame) {
        let Some(handle) = self.handle.as_mut() else {
            self.state = TrackerState::Lost;
            return;
        };
        let (roi, ok) = handle.update(frame);
        if ok {
            self.state = TrackerState::Tracking(roi);
        } else {
            log::warn!("tracking lost near {roi:?}");
            self.handle = None;
            self.state = TrackerState::Lost;
        }
    }
}

/// Tuning for the template tracker.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateParams {
    /// Smallest search margin around the last ROI, in pixels.
    pub min_search_margin: u32,
    /// Largest accepted RMS difference per pixel (gray levels) before the target counts as lost.
    pub max_rms_error: f32,
    /// How much of each new match is blended into the template (0 = never adapt).
    pub learning_rate: f32,
}

impl Default for TemplateParams {
    fn default() -> Self {
        Self { min_search_margin: 8, max_rms_error: 40.0, learning_rate: 0.1 }
    }
}

/// Grayscale template matching (sum of squared errors) in a window around the last ROI.
#[derive(Clone, Copy, Debug, Default)]
pub struct TemplateBackend {
    pub params: TemplateParams,
}

impl TemplateBackend {
    pub fn new(params: TemplateParams) -> Self {
        Self { params }
    }
}

impl TrackerBackend for TemplateBackend {
    type Handle = TemplateTracker;

    fn init(&self, frame: &Frame, roi: Roi) -> Result<TemplateTracker> {
        let gray = imageops::grayscale(frame);
        let roi = roi
            .clip(gray.width(), gray.height())
            .ok_or_else(|| Error::TrackerInit(format!("{roi:?} lies outside the frame")))?;
        let template = crop(&gray, roi);
        Ok(TemplateTracker { template, roi, params: self.params })
    }
}

pub struct TemplateTracker {
    template: GrayImage,
    roi: Roi,
    params: TemplateParams,
}

impl TemplateTracker {
    fn blend_template(&mut self, patch: &GrayImage) {
        let a = self.params.learning_rate.clamp(0.0, 1.0);
        if a == 0.0 {
            return;
        }
        for (t, p) in self.template.pixels_mut().zip(patch.pixels()) {
            let v = (1.0 - a) * t[0] as f32 + a * p[0] as f32;
            t[0] = v.round().clamp(0.0, 255.0) as u8;
        }
    }
}

impl Tracker for TemplateTracker {
    fn update(&mut self, frame: &Frame) -> (Roi, bool) {
        let gray = imageops::grayscale(frame);
        let (tw, th) = self.template.dimensions();
        let margin = self.params.min_search_margin.max(tw.max(th) / 2);

        let window = Roi::new(
            self.roi.x - margin as i32,
            self.roi.y - margin as i32,
            tw + 2 * margin,
            th + 2 * margin,
        );
        // Target (partly) left the picture: the template no longer fits the search area.
        let Some(window) = window.clip(gray.width(), gray.height()) else {
            return (self.roi, false);
        };
        if window.width < tw || window.height < th {
            return (self.roi, false);
        }

        let search = crop(&gray, window);
        let scores = match_template(&search, &self.template, MatchTemplateMethod::SumOfSquaredErrors);
        let best = find_extremes(&scores);
        let rms = (best.min_value.max(0.0) / (tw * th) as f32).sqrt();
        if rms > self.params.max_rms_error {
            return (self.roi, false);
        }

        let (dx, dy) = best.min_value_location;
        let found = Roi::new(window.x + dx as i32, window.y + dy as i32, tw, th);
        let patch = crop(&gray, found);
        self.blend_template(&patch);
        self.roi = found;
        (found, true)
    }

    fn roi(&self) -> Roi {
        self.roi
    }
}

// `roi` must already be clipped to the image.
fn crop(gray: &GrayImage, roi: Roi) -> GrayImage {
    imageops::crop_imm(gray, roi.x as u32, roi.y as u32, roi.width, roi.height).to_image()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::rc::Rc;

    /// Backend whose trackers answer from a script; counts inits and drops.
    #[derive(Default, Clone)]
    struct Scripted {
        outcomes: Rc<RefCell<VecDeque<bool>>>,
        inits: Rc<Cell<usize>>,
        drops: Rc<Cell<usize>>,
        fail_init: bool,
    }

    struct ScriptedHandle {
        roi: Roi,
        outcomes: Rc<RefCell<VecDeque<bool>>>,
        drops: Rc<Cell<usize>>,
    }

    impl Tracker for ScriptedHandle {
        fn update(&mut self, _frame: &Frame) -> (Roi, bool) {
            let ok = self.outcomes.borrow_mut().pop_front().unwrap_or(true);
            if ok {
                self.roi.x += 1;
            }
            (self.roi, ok)
        }

        fn roi(&self) -> Roi {
            self.roi
        }
    }

    impl Drop for ScriptedHandle {
        fn drop(&mut self) {
            self.drops.set(self.drops.get() + 1);
        }
    }

    impl TrackerBackend for Scripted {
        type Handle = ScriptedHandle;

        fn init(&self, _frame: &Frame, roi: Roi) -> Result<ScriptedHandle> {
            if self.fail_init {
                return Err(Error::TrackerInit("scripted".into()));
            }
            self.inits.set(self.inits.get() + 1);
            Ok(ScriptedHandle { roi, outcomes: self.outcomes.clone(), drops: self.drops.clone() })
        }
    }

    fn frame() -> Frame {
        Frame::new(64, 48)
    }

    #[test]
    fn zero_area_drag_stays_idle() {
        let mut ctl = TrackerController::new(Scripted::default());
        assert!(!ctl.select(Point::new(10, 10), Point::new(10, 40)));
        assert_eq!(ctl.process(&frame()), TrackerState::Idle);
    }

    #[test]
    fn positive_drag_tracks_after_one_init() {
        let backend = Scripted::default();
        let mut ctl = TrackerController::new(backend.clone());
        assert!(ctl.select(Point::new(30, 20), Point::new(10, 5)));
        assert_eq!(ctl.state(), TrackerState::Initializing(Roi::new(10, 5, 20, 15)));

        assert_eq!(ctl.process(&frame()), TrackerState::Tracking(Roi::new(10, 5, 20, 15)));
        assert_eq!(backend.inits.get(), 1);

        assert_eq!(ctl.process(&frame()), TrackerState::Tracking(Roi::new(11, 5, 20, 15)));
        assert_eq!(backend.inits.get(), 1);
    }

    #[test]
    fn failed_update_is_lost_until_a_new_drag() {
        let backend = Scripted::default();
        backend.outcomes.borrow_mut().extend([true, false]);
        let mut ctl = TrackerController::new(backend.clone());
        ctl.select(Point::new(0, 0), Point::new(8, 8));
        ctl.process(&frame());
        ctl.process(&frame());
        assert_eq!(ctl.process(&frame()), TrackerState::Lost);
        assert_eq!(backend.drops.get(), 1);

        // Frames alone never re-acquire.
        assert_eq!(ctl.process(&frame()), TrackerState::Lost);
        assert_eq!(backend.inits.get(), 1);

        ctl.select(Point::new(1, 1), Point::new(9, 9));
        assert_eq!(ctl.state(), TrackerState::Initializing(Roi::new(1, 1, 8, 8)));
        assert!(matches!(ctl.process(&frame()), TrackerState::Tracking(_)));
    }

    #[test]
    fn new_drag_mid_tracking_releases_the_old_tracker() {
        let backend = Scripted::default();
        let mut ctl = TrackerController::new(backend.clone());
        ctl.select(Point::new(0, 0), Point::new(8, 8));
        ctl.process(&frame());
        ctl.select(Point::new(20, 20), Point::new(30, 30));
        assert_eq!(backend.drops.get(), 1);
        ctl.process(&frame());
        assert_eq!(backend.inits.get(), 2);
        assert_eq!(ctl.roi(), Some(Roi::new(20, 20, 10, 10)));

        ctl.reset();
        assert_eq!(backend.drops.get(), 2);
        assert_eq!(ctl.state(), TrackerState::Idle);
    }

    #[test]
    fn failed_seed_goes_lost() {
        let backend = Scripted { fail_init: true, ..Default::default() };
        let mut ctl = TrackerController::new(backend);
        ctl.select(Point::new(0, 0), Point::new(8, 8));
        assert_eq!(ctl.process(&frame()), TrackerState::Lost);
    }

    fn square_at(x0: u32, y0: u32) -> Frame {
        Frame::from_fn(120, 100, |x, y| {
            if (x0..x0 + 20).contains(&x) && (y0..y0 + 20).contains(&y) {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        })
    }

    #[test]
    fn template_tracker_follows_a_moving_square() {
        let backend = TemplateBackend::default();
        let mut t = backend.init(&square_at(30, 30), Roi::new(30, 30, 20, 20)).unwrap();

        assert_eq!(t.update(&square_at(36, 33)), (Roi::new(36, 33, 20, 20), true));
        assert_eq!(t.update(&square_at(40, 28)), (Roi::new(40, 28, 20, 20), true));
    }

    #[test]
    fn template_tracker_loses_a_vanished_target() {
        let backend = TemplateBackend::default();
        let mut t = backend.init(&square_at(30, 30), Roi::new(30, 30, 20, 20)).unwrap();
        let (roi, ok) = t.update(&Frame::new(120, 100));
        assert!(!ok);
        assert_eq!(roi, Roi::new(30, 30, 20, 20));
    }

    #[test]
    fn roi_hanging_off_the_frame_tracks_its_visible_part() {
        let mut ctl = TrackerController::new(TemplateBackend::default());
        ctl.select(Point::new(100, 90), Point::new(140, 130));
        assert_eq!(ctl.state(), TrackerState::Initializing(Roi::new(100, 90, 40, 40)));

        let clipped = Roi::new(100, 90, 20, 10);
        assert_eq!(ctl.process(&square_at(30, 30)), TrackerState::Tracking(clipped));
        assert_eq!(ctl.roi(), Some(clipped));
    }

    #[test]
    fn roi_outside_the_frame_cannot_seed() {
        let backend = TemplateBackend::default();
        let err = backend.init(&square_at(0, 0), Roi::new(500, 500, 10, 10));
        assert!(matches!(err, Err(Error::TrackerInit(_))));
    }
}
