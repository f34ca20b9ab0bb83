//! GPU-visible parameter blocks.
//!
//! These structures must match the GLSL layouts exactly. All structures use
//! `#[repr(C)]` and implement `Pod` and `Zeroable` for safe byte casting.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, UVec2, Vec3};
use vkscene_resources::atlas::ATLAS_SIZE;
use vkscene_resources::mesh::Model;
use vkscene_scene::Camera;

/// Per-image camera data (binding 0).
///
/// # Memory Layout
///
/// - Offset 0: view matrix (64 bytes)
/// - Offset 64: projection matrix (64 bytes)
/// - Offset 128: camera position (12 bytes)
/// - Offset 140: padding (4 bytes)
/// - Total size: 144 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct UniformBufferObject {
    pub view: Mat4,
    pub proj: Mat4,
    pub camera_pos: Vec3,
    pub _padding: f32,
}

impl UniformBufferObject {
    /// Size of the struct in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn from_camera(camera: &Camera, aspect: f32) -> Self {
        Self {
            view: camera.view_matrix(),
            proj: camera.projection_matrix(aspect),
            camera_pos: camera.position,
            _padding: 0.0,
        }
    }
}

/// Vertex-stage push constants for one model draw.
///
/// Atlas rectangles are normalised by the atlas edge length.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct PushConstants {
    /// First instance of the model in the transform storage buffer
    pub index: i32,
    pub tex_offset_x: f32,
    pub tex_offset_y: f32,
    pub tex_width: f32,
    pub tex_height: f32,
    pub has_normal_map: i32,
    pub normal_offset_x: f32,
    pub normal_offset_y: f32,
    pub normal_width: f32,
    pub normal_height: f32,
}

fn normalized(v: UVec2) -> (f32, f32) {
    let edge = ATLAS_SIZE as f32;
    (v.x as f32 / edge, v.y as f32 / edge)
}

impl PushConstants {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn for_model(first_instance: u32, model: &Model) -> Self {
        let (tex_offset_x, tex_offset_y) = normalized(model.texture_offset);
        let (tex_width, tex_height) = normalized(model.texture_size);
        let (normal_offset_x, normal_offset_y) = normalized(model.normal_offset);
        let (normal_width, normal_height) = normalized(model.normal_size);

        Self {
            index: first_instance as i32,
            tex_offset_x,
            tex_offset_y,
            tex_width,
            tex_height,
            has_normal_map: i32::from(model.has_normal_map),
            normal_offset_x,
            normal_offset_y,
            normal_width,
            normal_height,
        }
    }
}

/// Fragment-stage push constant: number of lights in the light buffer.
pub type LightCount = i32;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ubo_layout() {
        assert_eq!(UniformBufferObject::SIZE, 144);
        assert_eq!(std::mem::align_of::<UniformBufferObject>(), 16);
    }

    #[test]
    fn test_push_constants_size() {
        assert_eq!(PushConstants::SIZE, 40);
        assert_eq!(std::mem::size_of::<LightCount>(), 4);
    }

    #[test]
    fn test_push_constants_for_model() {
        let model = Model {
            index_offset: 0,
            index_count: 36,
            texture_offset: UVec2::new(1024, 2048),
            texture_size: UVec2::new(512, 4096),
            has_normal_map: true,
            normal_offset: UVec2::new(0, 0),
            normal_size: UVec2::new(2048, 2048),
        };
        let pc = PushConstants::for_model(7, &model);
        assert_eq!(pc.index, 7);
        assert_eq!((pc.tex_offset_x, pc.tex_offset_y), (0.25, 0.5));
        assert_eq!((pc.tex_width, pc.tex_height), (0.125, 1.0));
        assert_eq!(pc.has_normal_map, 1);
        assert_eq!(pc.normal_width, 0.5);
    }

    #[test]
    fn test_ubo_from_camera() {
        let camera = Camera::default();
        let ubo = UniformBufferObject::from_camera(&camera, 16.0 / 9.0);
        assert_eq!(ubo.view, camera.view_matrix());
        assert_eq!(ubo.proj, camera.projection_matrix(16.0 / 9.0));
        assert_eq!(ubo.camera_pos, camera.position);
        // Vulkan clip space has Y pointing down
        assert!(ubo.proj.y_axis.y < 0.0);
    }
}
