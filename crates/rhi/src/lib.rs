//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! This crate provides a safe abstraction over Vulkan using the `ash` crate.
//! It handles:
//! - Instance, physical device selection and logical device creation
//! - Swapchain management
//! - Command pools, recording and one-shot submission
//! - Buffer, image and texture management through gpu-allocator
//! - Render pass, pipeline and descriptor bundles
//! - Synchronization primitives

mod error;

pub mod buffer;
pub mod bundle;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod image;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod render_pass;
pub mod sampler;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod texture;
pub mod vertex;

pub use error::{RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;
