//! Decoded texture pixels.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{ResourceError, ResourceResult};

/// An image decoded to tightly packed RGBA8.
#[derive(Clone, Debug)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
    pub path: PathBuf,
}

impl ImageData {
    /// Decodes a PNG or JPEG file.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::FileNotFound`] if `path` does not exist, or
    /// the decoder error otherwise.
    pub fn load(path: &Path) -> ResourceResult<Self> {
        if !path.exists() {
            return Err(ResourceError::FileNotFound(path.to_path_buf()));
        }

        let rgba = image::open(path)?.to_rgba8();
        let (width, height) = rgba.dimensions();
        debug!("Decoded {} ({}x{})", path.display(), width, height);

        Ok(Self {
            width,
            height,
            pixels: rgba.into_raw(),
            path: path.to_path_buf(),
        })
    }
}
