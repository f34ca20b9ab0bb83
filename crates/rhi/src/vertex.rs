//! Vertex format used by the scene pipeline.
//!
//! # Memory Layout
//!
//! | Location | Field | Format | Offset |
//! |----------|-------|--------|--------|
//! | 0 | `pos` | vec3 | 0 |
//! | 1 | `normal` | vec3 | 12 |
//! | 2 | `tex_coord` | vec2 | 24 |
//! | 3 | `diffuse` | vec3 | 32 |
//! | 4 | `specular` | vec3 | 44 |
//! | 5 | `ambient` | vec3 | 56 |
//! | 6 | `shininess` | float | 68 |
//! | 7 | `opacity` | float | 72 |
//!
//! Stride: 76 bytes.

use std::hash::{Hash, Hasher};
use std::mem::offset_of;

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

/// Mesh vertex with per-vertex material terms.
///
/// Equality and hashing compare the exact bit pattern of every field, so
/// vertices can key a deduplication map. `-0.0` and `0.0` are distinct.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct Vertex {
    pub pos: Vec3,
    pub normal: Vec3,
    pub tex_coord: Vec2,
    pub diffuse: Vec3,
    pub specular: Vec3,
    pub ambient: Vec3,
    pub shininess: f32,
    pub opacity: f32,
}

impl Vertex {
    /// Returns the size of the vertex in bytes.
    #[inline]
    pub const fn size() -> usize {
        std::mem::size_of::<Self>()
    }

    /// Binding 0, per-vertex rate.
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: Self::size() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    /// The eight attributes at locations 0-7.
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 8] {
        let attr = |location: u32, format: vk::Format, offset: usize| {
            vk::VertexInputAttributeDescription {
                binding: 0,
                location,
                format,
                offset: offset as u32,
            }
        };

        [
            attr(0, vk::Format::R32G32B32_SFLOAT, offset_of!(Self, pos)),
            attr(1, vk::Format::R32G32B32_SFLOAT, offset_of!(Self, normal)),
            attr(2, vk::Format::R32G32_SFLOAT, offset_of!(Self, tex_coord)),
            attr(3, vk::Format::R32G32B32_SFLOAT, offset_of!(Self, diffuse)),
            attr(4, vk::Format::R32G32B32_SFLOAT, offset_of!(Self, specular)),
            attr(5, vk::Format::R32G32B32_SFLOAT, offset_of!(Self, ambient)),
            attr(6, vk::Format::R32_SFLOAT, offset_of!(Self, shininess)),
            attr(7, vk::Format::R32_SFLOAT, offset_of!(Self, opacity)),
        ]
    }
}

impl PartialEq for Vertex {
    fn eq(&self, other: &Self) -> bool {
        bytemuck::bytes_of(self) == bytemuck::bytes_of(other)
    }
}

impl Eq for Vertex {}

impl Hash for Vertex {
    fn hash<H: Hasher>(&self, state: &mut H) {
        bytemuck::bytes_of(self).hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sample() -> Vertex {
        Vertex {
            pos: Vec3::new(1.0, 2.0, 3.0),
            normal: Vec3::Y,
            tex_coord: Vec2::new(0.25, 0.75),
            diffuse: Vec3::splat(0.5),
            specular: Vec3::splat(0.1),
            ambient: Vec3::splat(0.1),
            shininess: 1.0,
            opacity: 1.0,
        }
    }

    #[test]
    fn test_vertex_size() {
        assert_eq!(std::mem::size_of::<Vertex>(), 76);
        assert_eq!(Vertex::binding_description().stride, 76);
        assert_eq!(
            Vertex::binding_description().input_rate,
            vk::VertexInputRate::VERTEX
        );
    }

    #[test]
    fn test_vertex_attribute_descriptions() {
        let attrs = Vertex::attribute_descriptions();
        let offsets: Vec<u32> = attrs.iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 12, 24, 32, 44, 56, 68, 72]);

        for (i, attr) in attrs.iter().enumerate() {
            assert_eq!(attr.location, i as u32);
            assert_eq!(attr.binding, 0);
        }

        assert_eq!(attrs[2].format, vk::Format::R32G32_SFLOAT);
        assert_eq!(attrs[6].format, vk::Format::R32_SFLOAT);
        assert_eq!(attrs[7].format, vk::Format::R32_SFLOAT);
    }

    #[test]
    fn test_vertex_equality_is_bitwise() {
        let a = sample();
        let mut b = sample();
        assert_eq!(a, b);

        b.opacity = 0.999;
        assert_ne!(a, b);

        let mut zero = Vertex::default();
        let mut neg_zero = Vertex::default();
        zero.pos.x = 0.0;
        neg_zero.pos.x = -0.0;
        assert_ne!(zero, neg_zero);
    }

    #[test]
    fn test_vertex_dedup_map() {
        let mut unique: HashMap<Vertex, u32> = HashMap::new();
        let mut other = sample();
        other.tex_coord.x = 0.5;

        for v in [sample(), other, sample(), other, sample()] {
            let next = unique.len() as u32;
            unique.entry(v).or_insert(next);
        }

        assert_eq!(unique.len(), 2);
        assert_eq!(unique[&sample()], 0);
        assert_eq!(unique[&other], 1);
    }
}
