//! Scene rendering on top of the RHI.
//!
//! This crate orchestrates the rendering process:
//! - Swapchain targets and their rebuild
//! - Texture and buffer ownership
//! - Per-frame command recording, submission and presentation

mod error;
pub mod renderer;
pub mod targets;
pub mod textures;
pub mod ubo;

pub use error::{RenderError, RenderResult};
pub use renderer::Renderer;
pub use vkscene_rhi::sync::MAX_FRAMES_IN_FLIGHT;
