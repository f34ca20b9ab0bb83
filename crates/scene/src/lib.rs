//! Scene state.
//!
//! This crate provides:
//! - Per-model instance transforms
//! - Point lights
//! - The first-person camera

pub mod camera;
pub mod instances;
pub mod light;

pub use camera::{Camera, Projection};
pub use instances::{InstanceStore, MAX_RENDER_INSTANCES, RenderInstance};
pub use light::{LightData, LightList};
