// chroma-sketch: live chroma key + region tracking over the camera, and an annotation canvas.
// Usage: chroma-sketch [config.json]   (or set CHROMA_SKETCH_CONFIG)
// Logging goes to stderr; RUST_LOG=debug shows per-frame detail.

use std::path::PathBuf;

use chroma_sketch::{Config, Error, app};

fn main() -> Result<(), Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = Config::load(path.as_deref())?;
    app::run(config)
}
