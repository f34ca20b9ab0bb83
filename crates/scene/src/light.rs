//! Point lights for the scene.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use tracing::warn;

use crate::instances::MAX_RENDER_INSTANCES;

/// A point light as laid out in the light storage buffer.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct LightData {
    /// Light position in world space
    pub position: Vec3,
    pub _padding: f32,
    /// Light color
    pub color: Vec3,
    /// Light intensity
    pub intensity: f32,
}

impl LightData {
    pub fn new(position: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            position,
            _padding: 0.0,
            color,
            intensity,
        }
    }
}

impl Default for LightData {
    fn default() -> Self {
        Self::new(Vec3::ZERO, Vec3::ONE, 1.0)
    }
}

/// Lights uploaded every frame, capped at [`MAX_RENDER_INSTANCES`].
#[derive(Clone, Debug, Default)]
pub struct LightList {
    lights: Vec<LightData>,
}

impl LightList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a light. Beyond the cap the light is dropped with a warning.
    pub fn add_light(&mut self, position: Vec3, color: Vec3, intensity: f32) {
        if self.lights.len() >= MAX_RENDER_INSTANCES {
            warn!("Light limit ({}) reached, ignoring light", MAX_RENDER_INSTANCES);
            return;
        }
        self.lights.push(LightData::new(position, color, intensity));
    }

    pub fn reset_lights(&mut self) {
        self.lights.clear();
    }

    #[inline]
    pub fn as_slice(&self) -> &[LightData] {
        &self.lights
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.lights.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_light_data_layout() {
        assert_eq!(std::mem::size_of::<LightData>(), 32);
        let light = LightData::new(Vec3::new(1.0, 2.0, 3.0), Vec3::X, 0.5);
        let floats: &[f32] = bytemuck::cast_slice(std::slice::from_ref(&light));
        assert_eq!(floats, &[1.0, 2.0, 3.0, 0.0, 1.0, 0.0, 0.0, 0.5]);
    }

    #[test]
    fn test_add_and_reset_lights() {
        let mut lights = LightList::new();
        lights.add_light(Vec3::ZERO, Vec3::ONE, 0.0);
        lights.add_light(Vec3::Y, Vec3::Z, 1.0);
        assert_eq!(lights.len(), 2);
        assert_eq!(lights.as_slice()[1].color, Vec3::Z);

        lights.reset_lights();
        assert!(lights.is_empty());
    }

    #[test]
    fn test_light_cap() {
        let mut lights = LightList::new();
        for _ in 0..MAX_RENDER_INSTANCES + 3 {
            lights.add_light(Vec3::ZERO, Vec3::ONE, 1.0);
        }
        assert_eq!(lights.len(), MAX_RENDER_INSTANCES);
    }
}
