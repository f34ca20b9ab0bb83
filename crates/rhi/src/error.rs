//! RHI-specific error types.

use ash::vk;
use thiserror::Error;

/// RHI-specific error type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] vk::Result),

    /// Failed to load Vulkan library
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// The allocator mutex was poisoned by a panicking thread
    #[error("Allocator lock poisoned")]
    AllocatorPoisoned,

    /// No suitable GPU found
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// Validation was requested but the layer is not installed
    #[error("Validation layer requested but not available: {0}")]
    MissingValidationLayer(String),

    /// Shader loading error
    #[error("Shader error: {0}")]
    ShaderError(String),

    /// Surface creation error
    #[error("Surface error: {0}")]
    SurfaceError(String),

    /// Swapchain error
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// Invalid handle or argument
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// Pipeline creation error
    #[error("Pipeline error: {0}")]
    PipelineError(String),

    /// No candidate format supports the requested features
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Layout transition outside the supported table
    #[error("Unsupported layout transition: {old:?} -> {new:?}")]
    UnsupportedLayoutTransition {
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    },

    /// A descriptor binding has no resource attached
    #[error("Descriptor binding '{0}' has no resource bound")]
    DescriptorNotBound(String),

    /// A descriptor name is not part of the schema, or the resource kind
    /// does not match the binding
    #[error("Unknown descriptor: {0}")]
    UnknownDescriptor(String),

    /// Push constant payload does not match the declared range size
    #[error("Push constant range {index} expects {expected} bytes, got {actual}")]
    PushConstantSize {
        index: usize,
        expected: u32,
        actual: usize,
    },

    /// Data does not fit in a fixed-capacity buffer
    #[error("Buffer '{name}' overflow: {size} bytes exceeds capacity {capacity}")]
    BufferOverflow {
        name: String,
        size: u64,
        capacity: u64,
    },
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;
