// Frame sources: the camera (through nokhwa) and anything else that can hand out frames.
// Visual expectation: when the render loop calls `read()`, you get the next RGB picture
// the camera sees, or `None` when the device had nothing ready this time.

use crate::error::{Error, Result};
use crate::types::Frame;

// Bring in nokhwa types for camera control.
use nokhwa::{
    Camera,
    pixel_format::RgbFormat,
    utils::{
        CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
    },
};

/// Anything the render loop can pull frames from.
///
/// `read` returns `Ok(None)` for a transient empty capture (the loop skips the
/// cycle silently) and `Err` for a failed read. `release` is called once, on
/// the loop thread, after the loop has exited.
pub trait FrameSource {
    fn read(&mut self) -> Result<Option<Frame>>;

    fn release(&mut self) {}
}

// A small wrapper around nokhwa::Camera so the render loop stays clean.
pub struct CameraCapture {
    cam: Camera,
    released: bool,
}

impl CameraCapture {
    /// Open camera `index` at a target resolution (falls back if not exact).
    /// On success the stream is already running.
    pub fn open(index: u32, width: u32, height: u32, fps: u32) -> Result<Self> {
        let idx = CameraIndex::Index(index);

        let fmt = CameraFormat::new(
            Resolution::new(width, height),
            FrameFormat::YUYV, // uncompressed; cheap to convert to RGB
            fps,
        );

        // Ask for RGB frames, closest to the requested format.
        let req = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(fmt));

        let mut cam = Camera::new(idx, req)
            .map_err(|e| Error::DeviceUnavailable(format!("camera {index}: {e}")))?;

        cam.open_stream()
            .map_err(|e| Error::DeviceUnavailable(format!("camera {index} stream: {e}")))?;

        // The actual stream might choose a slightly different resolution.
        let actual = cam.resolution();
        log::info!("camera {index} streaming at {}x{}", actual.width(), actual.height());

        Ok(Self { cam, released: false })
    }
}

impl FrameSource for CameraCapture {
    fn read(&mut self) -> Result<Option<Frame>> {
        // Blocks until a new frame is ready.
        let buffer = self
            .cam
            .frame()
            .map_err(|e| Error::CameraFrame(format!("fetch frame: {e}")))?;

        let rgb = buffer
            .decode_image::<RgbFormat>()
            .map_err(|e| Error::CameraFrame(format!("decode RGB: {e}")))?;

        if rgb.width() == 0 || rgb.height() == 0 {
            return Ok(None);
        }
        Ok(Some(rgb))
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = self.cam.stop_stream() {
            log::warn!("camera stop failed: {e}");
        } else {
            log::info!("camera released");
        }
    }
}

impl Drop for CameraCapture {
    fn drop(&mut self) {
        self.release();
    }
}
