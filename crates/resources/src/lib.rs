//! Resource loading and management.
//!
//! This crate handles loading of external assets:
//! - Texture atlas packing and its placement manifest
//! - OBJ model loading into shared vertex/index arrays
//! - Image decoding for GPU upload

pub mod atlas;
mod error;
pub mod mesh;
pub mod texture;

pub use atlas::{AtlasEntry, AtlasManifest, AtlasPacker, PackOutcome, Skyline};
pub use error::{ResourceError, ResourceResult};
pub use mesh::{MeshData, Model};
pub use texture::ImageData;
