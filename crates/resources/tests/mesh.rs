//! OBJ loading from generated files.

use std::fs;
use std::path::{Path, PathBuf};

use glam::{UVec2, Vec2, Vec3, Vec4};
use tempfile::TempDir;
use vkscene_resources::atlas::{AtlasEntry, AtlasManifest};
use vkscene_resources::{MeshData, ResourceError};

const QUAD_OBJ: &str = "\
v 0.0 0.0 0.0
v 1.0 0.0 0.0
v 1.0 1.0 0.0
v 0.0 1.0 0.0
vt 0.0 0.0
vt 1.0 0.0
vt 1.0 1.0
vt 0.0 1.0
vn 0.0 0.0 1.0
f 1/1/1 2/2/1 3/3/1
f 1/1/1 3/3/1 4/4/1
";

fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}

fn atlas() -> AtlasManifest {
    AtlasManifest::from_entries([
        AtlasEntry {
            name: "textures/brick.png".to_string(),
            offset: (128, 256),
            size: (512, 512),
        },
        AtlasEntry {
            name: "textures/brick_n.png".to_string(),
            offset: (640, 256),
            size: (512, 512),
        },
    ])
}

#[test]
fn test_load_untextured_quad() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "quad.obj", QUAD_OBJ);

    let mut data = MeshData::new();
    let tint = Vec4::new(0.9, 0.1, 0.1, 1.0);
    let index = data.load_obj(&path, tint, 2.0, &AtlasManifest::default()).unwrap();
    assert_eq!(index, 0);

    let model = data.models[0];
    assert_eq!(model.index_offset, 0);
    assert_eq!(model.index_count, 6);
    assert!(!model.has_normal_map);
    assert_eq!(model.texture_size, UVec2::ZERO);

    // four corners shared by both triangles
    assert_eq!(data.vertices.len(), 4);
    assert_eq!(data.indices, vec![0, 1, 2, 0, 2, 3]);

    let corner = data.vertices[2];
    assert_eq!(corner.pos, Vec3::new(2.0, 2.0, 0.0));
    assert_eq!(corner.normal, Vec3::Z);
    assert_eq!(corner.tex_coord, Vec2::new(1.0, 0.0));
    assert_eq!(corner.diffuse, Vec3::new(0.9, 0.1, 0.1));
    assert_eq!(corner.shininess, 32.0);
}

#[test]
fn test_load_textured_quad_resolves_atlas() {
    let dir = TempDir::new().unwrap();
    write_file(
        dir.path(),
        "brick.mtl",
        "newmtl brick\nKd 1.0 1.0 1.0\nmap_Kd brick.png\nmap_Bump brick_n.png\n",
    );
    let obj = format!("mtllib brick.mtl\nusemtl brick\n{QUAD_OBJ}");
    let path = write_file(dir.path(), "brick.obj", &obj);

    let mut data = MeshData::new();
    data.load_obj(&path, Vec4::ONE, 1.0, &atlas()).unwrap();

    let model = data.models[0];
    assert_eq!(model.texture_offset, UVec2::new(128, 256));
    assert_eq!(model.texture_size, UVec2::new(512, 512));
    assert!(model.has_normal_map);
    assert_eq!(model.normal_offset, UVec2::new(640, 256));

    let v = data.vertices[0];
    assert_eq!(v.diffuse, Vec3::splat(0.5));
    assert_eq!(v.specular, Vec3::splat(0.1));
    assert_eq!(v.shininess, 1.0);
    assert_eq!(v.opacity, 1.0);
}

#[test]
fn test_models_share_one_index_space() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "quad.obj", QUAD_OBJ);

    let mut data = MeshData::new();
    data.load_obj(&path, Vec4::new(1.0, 0.0, 0.0, 1.0), 1.0, &AtlasManifest::default())
        .unwrap();
    let second = data
        .load_obj(&path, Vec4::new(0.0, 0.0, 1.0, 0.5), 1.0, &AtlasManifest::default())
        .unwrap();
    assert_eq!(second, 1);

    let model = data.models[1];
    assert_eq!(model.index_offset, 6);
    assert_eq!(model.index_count, 6);
    assert_eq!(data.vertices.len(), 8);

    let range = &data.indices[6..12];
    assert!(range.iter().all(|&i| (4..8).contains(&i)));
    assert_eq!(data.vertices[4].opacity, 0.5);
}

#[test]
fn test_empty_obj_has_no_meshes() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "empty.obj", "# nothing here\n");

    let mut data = MeshData::new();
    let err = data
        .load_obj(&path, Vec4::ONE, 1.0, &AtlasManifest::default())
        .unwrap_err();
    assert!(matches!(
        err,
        ResourceError::NoMeshes(_) | ResourceError::Obj { .. }
    ));
}
