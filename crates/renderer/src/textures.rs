//! Uploaded textures, deduplicated by source path.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use vkscene_resources::ImageData;
use vkscene_rhi::command::CommandPool;
use vkscene_rhi::device::Device;
use vkscene_rhi::texture::Texture;

use crate::error::RenderResult;

/// Owns every texture the renderer has uploaded.
#[derive(Default)]
pub struct TextureStore {
    textures: Vec<Texture>,
    by_path: HashMap<PathBuf, usize>,
}

impl TextureStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes and uploads `path`, returning its index.
    ///
    /// A path that is already loaded returns the existing index without
    /// touching the file.
    ///
    /// # Errors
    ///
    /// Returns an error if decoding or the upload fails.
    pub fn load(
        &mut self,
        device: Arc<Device>,
        pool: &CommandPool,
        path: &Path,
    ) -> RenderResult<usize> {
        if let Some(&index) = self.by_path.get(path) {
            debug!("Texture {} already loaded (#{})", path.display(), index);
            return Ok(index);
        }

        let data = ImageData::load(path)?;
        let texture = Texture::from_rgba8(
            device,
            pool,
            data.width,
            data.height,
            &data.pixels,
            &data.path,
        )?;

        let index = self.textures.len();
        info!(
            "Texture #{} loaded: {} ({}x{}, {} mips)",
            index,
            path.display(),
            data.width,
            data.height,
            texture.mip_levels()
        );
        self.textures.push(texture);
        self.by_path.insert(path.to_path_buf(), index);
        Ok(index)
    }

    pub fn get(&self, index: usize) -> Option<&Texture> {
        self.textures.get(index)
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }
}
