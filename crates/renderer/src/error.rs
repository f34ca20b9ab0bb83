//! Renderer error type.

use thiserror::Error;
use vkscene_resources::ResourceError;
use vkscene_rhi::RhiError;

/// Any failure while building or driving the renderer.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error(transparent)]
    Rhi(#[from] RhiError),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    Core(#[from] vkscene_core::Error),
}

impl From<ash::vk::Result> for RenderError {
    fn from(result: ash::vk::Result) -> Self {
        RenderError::Rhi(RhiError::VulkanError(result))
    }
}

/// Result type alias for renderer operations.
pub type RenderResult<T> = Result<T, RenderError>;
