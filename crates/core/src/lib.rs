//! Core utilities shared across the vkscene workspace.
//!
//! This crate provides foundational types used by every other crate:
//! - Error types and result aliases
//! - Logging initialization
//! - Frame timing and FPS counting
//! - Configuration loading

mod config;
mod error;
mod logging;
mod timer;

pub use config::{CameraConfig, ModelConfig, PathsConfig, RendererConfig, WindowConfig};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use timer::{FpsCounter, Timer};
