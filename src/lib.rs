//! Live camera effects (chroma key, region tracking) and a still-image annotation canvas.

pub mod app;
pub mod camera;
pub mod canvas;
pub mod chroma;
pub mod codec;
pub mod config;
pub mod draw;
pub mod error;
pub mod history;
pub mod render;
pub mod tracker;
pub mod types;

pub use canvas::{Canvas, ShapeKind, Tool};
pub use chroma::ChromaCompositor;
pub use config::Config;
pub use error::{Error, Result};
pub use render::{Command, Effect, Event, Pipeline, RenderLoop};
pub use tracker::{TemplateBackend, TrackerController, TrackerState};
pub use types::{ColorRange, Frame, Point, PointerEvent, Roi};
