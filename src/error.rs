// One error type for the whole crate.
// Every variant states *where* things went wrong.
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Window init error: {0}")]
    WindowInit(String), // Creating the window failed
    #[error("Window update error: {0}")]
    WindowUpdate(String), // Updating the window buffer failed
    #[error("Camera unavailable: {0}")]
    DeviceUnavailable(String), // Opening/starting the camera failed
    #[error("Camera frame error: {0}")]
    CameraFrame(String), // Grabbing/decoding a frame failed
    #[error("Cannot decode image {path:?}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("Cannot encode image {path:?}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("Tracker init error: {0}")]
    TrackerInit(String), // Seeding the tracker with a frame + ROI failed
    #[error("Dimension mismatch: {0}")]
    Dimensions(String), // Two buffers that must match in size do not
    #[error("Config error: {0}")]
    Config(String), // Reading/parsing the configuration file failed
    #[error("Render loop error: {0}")]
    RenderLoop(String), // Spawning/joining the capture thread failed
}

pub type Result<T> = std::result::Result<T, Error>;
