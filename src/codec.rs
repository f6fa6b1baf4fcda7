// Load/save pictures from disk (background images, canvas images, snapshots).
// The format is picked from the file extension by the `image` crate.

use std::path::Path;

use crate::error::{Error, Result};
use crate::types::Frame;

/// Decode any supported picture into an RGB frame.
pub fn load_image(path: impl AsRef<Path>) -> Result<Frame> {
    let path = path.as_ref();
    let img = image::open(path).map_err(|source| Error::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    log::debug!("loaded {:?} ({}x{})", path, img.width(), img.height());
    Ok(img.to_rgb8())
}

/// Encode `frame` to `path`. Nothing is written when the extension is unknown.
pub fn save_image(path: impl AsRef<Path>, frame: &Frame) -> Result<()> {
    let path = path.as_ref();
    frame.save(path).map_err(|source| Error::Encode {
        path: path.to_path_buf(),
        source,
    })?;
    log::info!("saved {:?}", path);
    Ok(())
}
