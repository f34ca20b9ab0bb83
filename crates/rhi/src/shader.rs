//! Shader module management.
//!
//! SPIR-V binaries are loaded as raw bytes and turned into VkShaderModule
//! objects. The graphics pipeline uses exactly one vertex and one fragment
//! stage, loaded from `vert.spv` and `frag.spv`.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::path::Path;
//! use vkscene_rhi::device::Device;
//! use vkscene_rhi::shader::ShaderPair;
//!
//! # fn example(device: Arc<Device>) -> Result<(), vkscene_rhi::RhiError> {
//! let shaders = ShaderPair::load(device, Path::new("resources/shaders"))?;
//! let stages = shaders.stage_create_infos();
//! # Ok(())
//! # }
//! ```

use std::ffi::CStr;
use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Entry point of every shader module.
pub const SHADER_ENTRY_POINT: &CStr = c"main";

/// File name of the vertex stage binary.
pub const VERTEX_SHADER_FILE: &str = "vert.spv";

/// File name of the fragment stage binary.
pub const FRAGMENT_SHADER_FILE: &str = "frag.spv";

/// Shader stage type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    /// Converts the shader stage to Vulkan shader stage flags.
    pub fn to_vk_stage(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }

    /// Returns a human-readable name for the shader stage.
    pub fn name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
        }
    }
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Reinterprets SPIR-V bytes as little-endian code words.
///
/// # Errors
///
/// Returns [`RhiError::ShaderError`] if the length is not a multiple of 4.
pub fn spirv_words(bytes: &[u8]) -> RhiResult<Vec<u32>> {
    if !bytes.len().is_multiple_of(4) {
        return Err(RhiError::ShaderError(format!(
            "SPIR-V code must be 4-byte aligned, got {} bytes",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Vulkan shader module wrapper.
pub struct Shader {
    device: Arc<Device>,
    module: vk::ShaderModule,
    stage: ShaderStage,
}

impl Shader {
    /// Creates a shader module from a SPIR-V file.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read
    /// - The byte length is not a multiple of 4
    /// - Shader module creation fails
    pub fn from_spirv_file(
        device: Arc<Device>,
        path: &Path,
        stage: ShaderStage,
    ) -> RhiResult<Self> {
        debug!("Loading {} shader from {}", stage, path.display());

        let bytes = std::fs::read(path).map_err(|e| {
            RhiError::ShaderError(format!(
                "Failed to read shader file {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::from_spirv_bytes(device, &bytes, stage)
    }

    /// Creates a shader module from SPIR-V bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the byte length is not a multiple of 4 or module
    /// creation fails.
    pub fn from_spirv_bytes(
        device: Arc<Device>,
        bytes: &[u8],
        stage: ShaderStage,
    ) -> RhiResult<Self> {
        let code = spirv_words(bytes)?;
        let create_info = vk::ShaderModuleCreateInfo::default().code(&code);
        let module = unsafe { device.handle().create_shader_module(&create_info, None)? };

        info!("Created {} shader module ({} bytes)", stage, bytes.len());

        Ok(Self {
            device,
            module,
            stage,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    #[inline]
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// Stage description for pipeline creation.
    pub fn stage_create_info(&self) -> vk::PipelineShaderStageCreateInfo<'static> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(self.stage.to_vk_stage())
            .module(self.module)
            .name(SHADER_ENTRY_POINT)
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_shader_module(self.module, None);
        }
        debug!("Destroyed {} shader module", self.stage);
    }
}

/// The vertex and fragment modules of the scene pipeline.
pub struct ShaderPair {
    pub vertex: Shader,
    pub fragment: Shader,
}

impl ShaderPair {
    /// Loads `vert.spv` and `frag.spv` from `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if either file is missing or invalid.
    pub fn load(device: Arc<Device>, dir: &Path) -> RhiResult<Self> {
        Ok(Self {
            vertex: Shader::from_spirv_file(
                device.clone(),
                &dir.join(VERTEX_SHADER_FILE),
                ShaderStage::Vertex,
            )?,
            fragment: Shader::from_spirv_file(
                device,
                &dir.join(FRAGMENT_SHADER_FILE),
                ShaderStage::Fragment,
            )?,
        })
    }

    /// Vertex then fragment stage.
    pub fn stage_create_infos(&self) -> [vk::PipelineShaderStageCreateInfo<'static>; 2] {
        [
            self.vertex.stage_create_info(),
            self.fragment.stage_create_info(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shader_stage_to_vk_stage() {
        assert_eq!(
            ShaderStage::Vertex.to_vk_stage(),
            vk::ShaderStageFlags::VERTEX
        );
        assert_eq!(
            ShaderStage::Fragment.to_vk_stage(),
            vk::ShaderStageFlags::FRAGMENT
        );
    }

    #[test]
    fn test_shader_stage_display() {
        assert_eq!(format!("{}", ShaderStage::Vertex), "vertex");
        assert_eq!(format!("{}", ShaderStage::Fragment), "fragment");
    }

    #[test]
    fn test_spirv_words_little_endian() {
        let bytes = [0x03, 0x02, 0x23, 0x07, 0x00, 0x00, 0x01, 0x00];
        let words = spirv_words(&bytes).unwrap();
        assert_eq!(words, vec![0x0723_0203, 0x0001_0000]);
    }

    #[test]
    fn test_spirv_words_rejects_misaligned() {
        let err = spirv_words(&[0u8; 5]).unwrap_err();
        assert!(matches!(err, RhiError::ShaderError(_)));
        assert!(spirv_words(&[]).unwrap().is_empty());
    }
}
