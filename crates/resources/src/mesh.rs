//! OBJ mesh loading into one shared vertex/index pool.
//!
//! All models live in a single vertex buffer and a single index buffer.
//! Indices are absolute into the shared vertex array, so each model is drawn
//! with its own index range and a vertex offset of zero.

use std::collections::HashMap;
use std::path::Path;

use glam::{UVec2, Vec2, Vec3, Vec4};
use tracing::{debug, info, warn};
use vkscene_rhi::vertex::Vertex;

use crate::atlas::AtlasManifest;
use crate::error::{ResourceError, ResourceResult};

/// A loaded model: its index range and atlas rectangles in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Model {
    /// First index in the shared index buffer.
    pub index_offset: u32,
    pub index_count: u32,
    pub texture_offset: UVec2,
    pub texture_size: UVec2,
    pub has_normal_map: bool,
    pub normal_offset: UVec2,
    pub normal_size: UVec2,
}

/// Shared geometry for every loaded model.
#[derive(Clone, Debug, Default)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub models: Vec<Model>,
}

/// Per-vertex material terms when the face has no material.
fn tinted_vertex(tint: Vec4) -> Vertex {
    Vertex {
        diffuse: tint.truncate(),
        specular: Vec3::splat(0.5),
        ambient: Vec3::splat(0.1),
        shininess: 32.0,
        opacity: tint.w,
        ..Vertex::default()
    }
}

/// Per-vertex material terms when the face has a material.
fn material_vertex() -> Vertex {
    Vertex {
        diffuse: Vec3::splat(0.5),
        specular: Vec3::splat(0.1),
        ambient: Vec3::splat(0.1),
        shininess: 1.0,
        opacity: 1.0,
        ..Vertex::default()
    }
}

fn atlas_rect(atlas: &AtlasManifest, name: &str) -> (UVec2, UVec2) {
    let offset = atlas.offset(name);
    let size = atlas.size(name);
    (UVec2::new(offset.0, offset.1), UVec2::new(size.0, size.1))
}

impl MeshData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads an OBJ file, appends its geometry and returns the model index.
    ///
    /// Positions are multiplied by `scale`. Faces without a material get
    /// `tint` as their diffuse color and opacity. The first material's
    /// diffuse and normal textures are resolved against `atlas`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, cannot be parsed, or holds
    /// no meshes.
    pub fn load_obj(
        &mut self,
        path: &Path,
        tint: Vec4,
        scale: f32,
        atlas: &AtlasManifest,
    ) -> ResourceResult<usize> {
        if !path.exists() {
            return Err(ResourceError::FileNotFound(path.to_path_buf()));
        }

        let (shapes, materials) =
            tobj::load_obj(path, &tobj::GPU_LOAD_OPTIONS).map_err(|source| ResourceError::Obj {
                path: path.to_path_buf(),
                source,
            })?;

        if shapes.is_empty() {
            return Err(ResourceError::NoMeshes(path.to_path_buf()));
        }

        let materials = materials.unwrap_or_else(|e| {
            warn!("No materials for {}: {}", path.display(), e);
            Vec::new()
        });

        let mut model = Model {
            index_offset: self.indices.len() as u32,
            ..Model::default()
        };

        if let Some(material) = materials.first() {
            if let Some(name) = &material.diffuse_texture {
                (model.texture_offset, model.texture_size) = atlas_rect(atlas, name);
            }
            if let Some(name) = &material.normal_texture {
                (model.normal_offset, model.normal_size) = atlas_rect(atlas, name);
                model.has_normal_map = true;
                debug!("Normal map for {} is {}", path.display(), name);
            }
        }

        let mut unique: HashMap<Vertex, u32> = HashMap::new();

        for shape in &shapes {
            let mesh = &shape.mesh;
            let template = match mesh.material_id {
                Some(id) if id < materials.len() => material_vertex(),
                _ => tinted_vertex(tint),
            };

            for &index in &mesh.indices {
                let i = index as usize;
                let mut vertex = template;

                vertex.pos = Vec3::new(
                    mesh.positions[3 * i],
                    mesh.positions[3 * i + 1],
                    mesh.positions[3 * i + 2],
                ) * scale;

                if mesh.normals.len() >= 3 * i + 3 {
                    vertex.normal = Vec3::new(
                        mesh.normals[3 * i],
                        mesh.normals[3 * i + 1],
                        mesh.normals[3 * i + 2],
                    );
                }

                if mesh.texcoords.len() >= 2 * i + 2 {
                    vertex.tex_coord =
                        Vec2::new(mesh.texcoords[2 * i], 1.0 - mesh.texcoords[2 * i + 1]);
                }

                let next = self.vertices.len() as u32;
                let id = *unique.entry(vertex).or_insert_with(|| {
                    self.vertices.push(vertex);
                    next
                });
                self.indices.push(id);
            }
        }

        model.index_count = self.indices.len() as u32 - model.index_offset;
        info!(
            "Loaded model {} ({} indices, {} unique vertices)",
            path.display(),
            model.index_count,
            unique.len()
        );

        self.models.push(model);
        Ok(self.models.len() - 1)
    }

    #[inline]
    pub fn model(&self, index: usize) -> Option<&Model> {
        self.models.get(index)
    }

    #[inline]
    pub fn model_count(&self) -> usize {
        self.models.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tinted_vertex() {
        let v = tinted_vertex(Vec4::new(0.9, 0.1, 0.2, 0.5));
        assert_eq!(v.diffuse, Vec3::new(0.9, 0.1, 0.2));
        assert_eq!(v.specular, Vec3::splat(0.5));
        assert_eq!(v.ambient, Vec3::splat(0.1));
        assert_eq!(v.shininess, 32.0);
        assert_eq!(v.opacity, 0.5);
    }

    #[test]
    fn test_material_vertex() {
        let v = material_vertex();
        assert_eq!(v.diffuse, Vec3::splat(0.5));
        assert_eq!(v.specular, Vec3::splat(0.1));
        assert_eq!(v.shininess, 1.0);
        assert_eq!(v.opacity, 1.0);
    }

    #[test]
    fn test_missing_file() {
        let mut data = MeshData::new();
        let err = data
            .load_obj(
                Path::new("does/not/exist.obj"),
                Vec4::ONE,
                1.0,
                &AtlasManifest::default(),
            )
            .unwrap_err();
        assert!(matches!(err, ResourceError::FileNotFound(_)));
        assert_eq!(data.model_count(), 0);
    }
}
