// The capture thread: pull a frame, run the active effect, publish the result.
// Visual expectation: the window always shows the newest *finished* frame; it never sees a
// picture the capture thread is still writing into.
//
// UI → loop: `Command`s over a channel (set effect, background, ROI...).
// Loop → UI: the latest `Published` frame (an `Arc` swapped under a mutex) and `Event`s.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use image::Rgb;

use crate::camera::FrameSource;
use crate::chroma::ChromaCompositor;
use crate::draw::{self, Stroke};
use crate::error::{Error, Result};
use crate::tracker::{TrackerBackend, TrackerController, TrackerState};
use crate::types::{ColorRange, Frame, Point};

const OVERLAY: Stroke = Stroke { color: Rgb([0, 255, 0]), width: 2 };
const IDLE_WAIT: Duration = Duration::from_millis(5);   // after an empty read
const ERROR_WAIT: Duration = Duration::from_millis(10); // after a failed read

/// Which effect the loop applies to live frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Effect {
    None,
    ChromaKey,
    Tracking,
}

/// Intents sent from the UI to the capture thread.
pub enum Command {
    SetEffect(Effect),
    SetColorRange(ColorRange),
    SetBackground(Frame),
    ClearBackground,
    /// A finished ROI drag, in frame coordinates.
    SelectRoi(Point, Point),
    ResetTracker,
}

/// Status reported by the capture thread.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// Reads have been failing for a while. Sent once per failure run.
    CaptureStalled(String),
    /// A frame arrived again after `CaptureStalled`.
    CaptureRecovered,
    TrackerChanged(TrackerState),
    Stopped,
}

/// One finished frame, immutable once published.
#[derive(Debug)]
pub struct Published {
    pub frame: Frame,
    pub seq: u64,
    pub effect: Effect,
    pub tracker: TrackerState,
}

/// Per-frame processing: chroma key or tracking, plus the state both need.
pub struct Pipeline<B: TrackerBackend> {
    effect: Effect,
    chroma: ChromaCompositor,
    tracker: TrackerController<B>,
    default_background: [u8; 3],
}

impl<B: TrackerBackend> Pipeline<B> {
    pub fn new(range: ColorRange, backend: B, default_background: [u8; 3]) -> Self {
        Self {
            effect: Effect::None,
            chroma: ChromaCompositor::new(range),
            tracker: TrackerController::new(backend),
            default_background,
        }
    }

    pub fn effect(&self) -> Effect {
        self.effect
    }

    pub fn tracker_state(&self) -> TrackerState {
        self.tracker.state()
    }

    pub fn chroma(&self) -> &ChromaCompositor {
        &self.chroma
    }

    /// Apply one UI intent. `frame` is the frame about to be processed; chroma
    /// uses it to size the default background.
    pub fn apply(&mut self, command: Command, frame: &Frame) {
        match command {
            Command::SetEffect(effect) => {
                if effect == Effect::ChromaKey {
                    let (w, h) = frame.dimensions();
                    self.chroma.ensure_background(w, h, self.default_background);
                }
                log::info!("effect: {:?} -> {:?}", self.effect, effect);
                self.effect = effect;
            }
            Command::SetColorRange(range) => self.chroma.set_range(range),
            Command::SetBackground(bg) => self.chroma.set_background(bg),
            Command::ClearBackground => self.chroma.clear_background(),
            Command::SelectRoi(a, b) => {
                self.tracker.select(a, b);
            }
            Command::ResetTracker => self.tracker.reset(),
        }
    }

    /// Run the active effect on `frame`.
    pub fn process(&mut self, frame: Frame) -> Result<Frame> {
        match self.effect {
            Effect::None => Ok(frame),
            Effect::ChromaKey => self.chroma.apply(&frame),
            Effect::Tracking => {
                let mut frame = frame;
                if let TrackerState::Tracking(roi) = self.tracker.process(&frame) {
                    let a = Point::new(roi.x, roi.y);
                    let b = Point::new(roi.x + roi.width as i32, roi.y + roi.height as i32);
                    draw::draw_rect(&mut frame, a, b, OVERLAY);
                }
                Ok(frame)
            }
        }
    }
}

// A moving ROI is not news; Idle/Initializing/Tracking/Lost transitions are.
fn state_kind_changed(before: TrackerState, after: TrackerState) -> bool {
    std::mem::discriminant(&before) != std::mem::discriminant(&after)
}

struct Shared {
    stop: AtomicBool,
    latest: Mutex<Option<Arc<Published>>>,
    published: AtomicU64,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle to a running capture thread. Dropping it stops and joins the thread.
pub struct RenderLoop {
    shared: Arc<Shared>,
    commands: Sender<Command>,
    events: Receiver<Event>,
    thread: Option<JoinHandle<()>>,
}

impl RenderLoop {
    /// Spawn the capture thread. The source is opened *on* that thread (so it
    /// never has to cross threads) and released there after the loop exits.
    /// Fails fast when `open` fails.
    pub fn start<S, B, F>(open: F, pipeline: Pipeline<B>, stall_threshold: u32) -> Result<Self>
    where
        S: FrameSource + 'static,
        B: TrackerBackend + Send + 'static,
        B::Handle: Send,
        F: FnOnce() -> Result<S> + Send + 'static,
    {
        let shared = Arc::new(Shared {
            stop: AtomicBool::new(false),
            latest: Mutex::new(None),
            published: AtomicU64::new(0),
        });
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (evt_tx, evt_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();

        let worker = Worker {
            shared: shared.clone(),
            commands: cmd_rx,
            events: evt_tx,
            stall_threshold: stall_threshold.max(1),
        };
        let thread = thread::Builder::new()
            .name("render-loop".into())
            .spawn(move || {
                let source = match open() {
                    Ok(source) => source,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                worker.run(source, pipeline);
            })
            .map_err(|e| Error::RenderLoop(format!("spawn: {e}")))?;

        let opened = ready_rx
            .recv()
            .unwrap_or_else(|_| Err(Error::RenderLoop("capture thread died while opening".into())));
        if let Err(e) = opened {
            let _ = thread.join();
            log::error!("cannot start capture: {e}");
            return Err(e);
        }

        Ok(Self { shared, commands: cmd_tx, events: evt_rx, thread: Some(thread) })
    }

    /// Queue an intent; false when the loop has already exited.
    pub fn send(&self, command: Command) -> bool {
        self.commands.send(command).is_ok()
    }

    /// Newest finished frame, if any was published yet.
    pub fn latest(&self) -> Option<Arc<Published>> {
        lock(&self.shared.latest).clone()
    }

    pub fn frames_published(&self) -> u64 {
        self.shared.published.load(Ordering::Acquire)
    }

    /// Drain pending status events without blocking.
    pub fn poll_events(&self) -> Vec<Event> {
        self.events.try_iter().collect()
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Ask the loop to stop and wait for it. The source is released on the
    /// loop thread before this returns.
    pub fn stop(&mut self) -> Result<()> {
        self.shared.stop.store(true, Ordering::Release);
        match self.thread.take() {
            Some(t) => t.join().map_err(|_| Error::RenderLoop("capture thread panicked".into())),
            None => Ok(()),
        }
    }
}

impl Drop for RenderLoop {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::error!("{e}");
        }
    }
}

struct Worker {
    shared: Arc<Shared>,
    commands: Receiver<Command>,
    events: Sender<Event>,
    stall_threshold: u32,
}

impl Worker {
    fn run<S: FrameSource, B: TrackerBackend>(self, mut source: S, mut pipeline: Pipeline<B>) {
        log::info!("capture loop started");
        let mut failures: u32 = 0;
        let mut seq: u64 = 0;

        while !self.shared.stop.load(Ordering::Acquire) {
            // 1) Grab a frame; misses and errors skip the cycle.
            let frame = match source.read() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    thread::sleep(IDLE_WAIT);
                    continue;
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    log::debug!("capture miss #{failures}: {e}");
                    if failures == self.stall_threshold {
                        log::warn!("capture stalled after {failures} failed reads: {e}");
                        let _ = self.events.send(Event::CaptureStalled(e.to_string()));
                    }
                    thread::sleep(ERROR_WAIT);
                    continue;
                }
            };
            if failures >= self.stall_threshold {
                log::info!("capture recovered");
                let _ = self.events.send(Event::CaptureRecovered);
            }
            failures = 0;

            // 2) Intents queued since the last frame; a new ROI seeds on *this* frame.
            for command in self.commands.try_iter() {
                pipeline.apply(command, &frame);
            }

            // 3) Effect.
            let before = pipeline.tracker_state();
            let out = match pipeline.process(frame) {
                Ok(out) => out,
                Err(e) => {
                    log::warn!("effect failed, frame dropped: {e}");
                    continue;
                }
            };
            let after = pipeline.tracker_state();
            if state_kind_changed(before, after) {
                let _ = self.events.send(Event::TrackerChanged(after));
            }

            // 4) Publish: readers only ever get whole, immutable frames.
            seq += 1;
            let published = Arc::new(Published {
                frame: out,
                seq,
                effect: pipeline.effect(),
                tracker: after,
            });
            *lock(&self.shared.latest) = Some(published);
            self.shared.published.store(seq, Ordering::Release);
        }

        source.release();
        log::info!("capture loop stopped after {seq} frames");
        let _ = self.events.send(Event::Stopped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::TemplateBackend;
    use crate::types::Roi;
    use std::collections::VecDeque;
    use std::time::Instant;

    struct Scripted {
        script: VecDeque<Result<Option<Frame>>>,
        then: Option<Frame>,
        released: Arc<AtomicBool>,
    }

    impl FrameSource for Scripted {
        fn read(&mut self) -> Result<Option<Frame>> {
            thread::sleep(Duration::from_millis(1));
            match self.script.pop_front() {
                Some(step) => step,
                None => match &self.then {
                    Some(f) => Ok(Some(f.clone())),
                    None => Err(Error::CameraFrame("unplugged".into())),
                },
            }
        }

        fn release(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    fn pipeline() -> Pipeline<TemplateBackend> {
        Pipeline::new(ColorRange::default(), TemplateBackend::default(), [0, 0, 255])
    }

    fn wait_for(mut ok: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if ok() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn loop_skips_misses_publishes_and_releases_on_stop() {
        let released = Arc::new(AtomicBool::new(false));
        let flag = released.clone();
        let grey = Frame::from_pixel(8, 6, Rgb([9, 9, 9]));
        let script: VecDeque<_> = vec![
            Ok(None),
            Err(Error::CameraFrame("glitch".into())),
            Ok(Some(grey.clone())),
        ]
        .into();

        let mut rl = RenderLoop::start(
            move || Ok(Scripted { script, then: Some(grey), released: flag }),
            pipeline(),
            30,
        )
        .unwrap();

        assert!(wait_for(|| rl.frames_published() >= 3));
        let shot = rl.latest().unwrap();
        assert_eq!(shot.frame.dimensions(), (8, 6));
        assert_eq!(shot.effect, Effect::None);

        rl.stop().unwrap();
        assert!(released.load(Ordering::SeqCst));
        assert!(!rl.is_running());
        assert!(rl.poll_events().contains(&Event::Stopped));
    }

    #[test]
    fn open_failure_is_reported_to_the_caller() {
        let res = RenderLoop::start(
            || -> Result<Scripted> { Err(Error::DeviceUnavailable("no camera 7".into())) },
            pipeline(),
            30,
        );
        assert!(matches!(res, Err(Error::DeviceUnavailable(_))));
    }

    #[test]
    fn persistent_failure_is_reported_once() {
        let released = Arc::new(AtomicBool::new(false));
        let flag = released.clone();
        let mut rl = RenderLoop::start(
            move || Ok(Scripted { script: VecDeque::new(), then: None, released: flag }),
            pipeline(),
            3,
        )
        .unwrap();

        let mut seen = Vec::new();
        assert!(wait_for(|| {
            seen.extend(rl.poll_events());
            seen.iter().any(|e| matches!(e, Event::CaptureStalled(_)))
        }));
        thread::sleep(Duration::from_millis(100));
        seen.extend(rl.poll_events());
        rl.stop().unwrap();

        let stalls = seen.iter().filter(|e| matches!(e, Event::CaptureStalled(_))).count();
        assert_eq!(stalls, 1);
        assert!(rl.latest().is_none());
    }

    #[test]
    fn chroma_command_takes_effect_on_following_frames() {
        let released = Arc::new(AtomicBool::new(false));
        let flag = released.clone();
        let green = Frame::from_pixel(16, 12, Rgb([0, 255, 0]));
        let mut rl = RenderLoop::start(
            move || Ok(Scripted { script: VecDeque::new(), then: Some(green), released: flag }),
            pipeline(),
            30,
        )
        .unwrap();

        assert!(rl.send(Command::SetEffect(Effect::ChromaKey)));
        // No background chosen: the default solid blue is used.
        assert!(wait_for(|| rl
            .latest()
            .is_some_and(|p| p.effect == Effect::ChromaKey && *p.frame.get_pixel(3, 3) == Rgb([0, 0, 255]))));

        rl.send(Command::SetBackground(Frame::from_pixel(4, 4, Rgb([200, 0, 0]))));
        assert!(wait_for(|| rl.latest().is_some_and(|p| *p.frame.get_pixel(15, 11) == Rgb([200, 0, 0]))));
        rl.stop().unwrap();
    }

    #[test]
    fn only_state_kind_changes_are_reported() {
        let a = TrackerState::Tracking(Roi::new(1, 1, 5, 5));
        let b = TrackerState::Tracking(Roi::new(3, 2, 5, 5));
        assert!(!state_kind_changed(a, b));
        assert!(state_kind_changed(a, TrackerState::Lost));
        assert!(state_kind_changed(TrackerState::Initializing(Roi::new(1, 1, 5, 5)), a));
        assert!(!state_kind_changed(TrackerState::Idle, TrackerState::Idle));
    }

    #[test]
    fn moving_target_does_not_flood_the_event_channel() {
        let released = Arc::new(AtomicBool::new(false));
        let flag = released.clone();
        let square = |x0: u32| {
            Frame::from_fn(80, 60, move |x, y| {
                if (x0..x0 + 12).contains(&x) && (20..32).contains(&y) { Rgb([250, 250, 250]) } else { Rgb([10, 10, 10]) }
            })
        };
        let mut script: VecDeque<Result<Option<Frame>>> = (0..20).map(|_| Ok(Some(square(10)))).collect();
        script.extend((1..=15).map(|i| Ok(Some(square(10 + 2 * i)))));
        let last = square(40);

        let mut rl = RenderLoop::start(
            move || Ok(Scripted { script, then: Some(last), released: flag }),
            pipeline(),
            30,
        )
        .unwrap();
        rl.send(Command::SetEffect(Effect::Tracking));
        rl.send(Command::SelectRoi(Point::new(8, 18), Point::new(24, 34)));

        assert!(wait_for(|| rl.latest().is_some_and(|p| matches!(p.tracker, TrackerState::Tracking(r) if r.x >= 38))));
        rl.stop().unwrap();

        let changes: Vec<Event> = rl
            .poll_events()
            .into_iter()
            .filter(|e| matches!(e, Event::TrackerChanged(_)))
            .collect();
        // Initializing -> Tracking only, however far the box travelled.
        assert_eq!(changes.len(), 1);
        assert!(matches!(changes[0], Event::TrackerChanged(TrackerState::Tracking(_))));
    }

    #[test]
    fn roi_is_seeded_on_the_frame_it_arrives_with() {
        let mut p = pipeline();
        let frame = Frame::from_fn(60, 40, |x, y| {
            if (20..30).contains(&x) && (10..20).contains(&y) { Rgb([255, 255, 255]) } else { Rgb([0, 0, 0]) }
        });
        p.apply(Command::SetEffect(Effect::Tracking), &frame);
        p.apply(Command::SelectRoi(Point::new(20, 10), Point::new(30, 20)), &frame);
        assert_eq!(p.tracker_state(), TrackerState::Initializing(Roi::new(20, 10, 10, 10)));

        let out = p.process(frame.clone()).unwrap();
        assert_eq!(p.tracker_state(), TrackerState::Tracking(Roi::new(20, 10, 10, 10)));
        // Overlay drawn at the ROI corner, input untouched elsewhere.
        assert_eq!(*out.get_pixel(20, 10), Rgb([0, 255, 0]));
        assert_eq!(out.get_pixel(45, 35), frame.get_pixel(45, 35));

        p.apply(Command::ResetTracker, &frame);
        assert_eq!(p.tracker_state(), TrackerState::Idle);
        assert_eq!(p.process(frame.clone()).unwrap(), frame);
    }
}
