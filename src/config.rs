// Settings for a session, optionally read from a JSON file.
// Every field has a default, so a partial file (or no file at all) is fine.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::tracker::TemplateParams;
use crate::types::ColorRange;

/// Environment variable consulted when no path is given on the command line.
pub const CONFIG_ENV: &str = "CHROMA_SKETCH_CONFIG";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub camera_index: u32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,

    /// HSV key range (hue 0..=179).
    pub key_range: ColorRange,
    /// Solid background used when chroma is enabled before a picture was chosen.
    pub default_background: [u8; 3],
    pub background_path: Option<PathBuf>,

    /// Picture opened in paint mode; a blank white sheet when absent.
    pub canvas_path: Option<PathBuf>,
    pub canvas_save_path: PathBuf,
    pub canvas_max_size: (u32, u32),
    pub stroke_color: [u8; 3],
    pub stroke_width: u32,

    /// Where the snapshot key writes the latest live frame.
    pub snapshot_path: PathBuf,

    /// Consecutive failed reads before the capture loop reports a stalled device.
    pub stall_threshold: u32,
    pub tracker: TemplateParams,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera_index: 0,
            width: 640,
            height: 480,
            fps: 30,
            key_range: ColorRange::default(),
            default_background: [0, 0, 255],
            background_path: None,
            canvas_path: None,
            canvas_save_path: PathBuf::from("annotated.png"),
            canvas_max_size: (800, 800),
            stroke_color: [255, 0, 0],
            stroke_width: 2,
            snapshot_path: PathBuf::from("snapshot.png"),
            stall_threshold: 30,
            tracker: TemplateParams::default(),
        }
    }
}

impl Config {
    /// Parse a JSON config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("read {path:?}: {e}")))?;
        Self::from_json(&text).map_err(|e| Error::Config(format!("{path:?}: {e}")))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Explicit path if given, else `CHROMA_SKETCH_CONFIG`, else defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let from_env = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        match path.map(Path::to_path_buf).or(from_env) {
            Some(p) => {
                let cfg = Self::from_file(&p)?;
                log::info!("loaded config from {p:?}");
                Ok(cfg)
            }
            None => {
                log::info!("no config file, using defaults");
                Ok(Self::default())
            }
        }
    }
}
