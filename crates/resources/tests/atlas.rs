//! End-to-end atlas packing in a scratch directory.

use std::fs;
use std::path::Path;

use image::{Rgba, RgbaImage};
use tempfile::TempDir;
use vkscene_resources::atlas::{ATLAS_SIZE, AtlasManifest, AtlasPacker, PackOutcome};

fn write_png(dir: &Path, name: &str, w: u32, h: u32, color: [u8; 4]) {
    let img = RgbaImage::from_pixel(w, h, Rgba(color));
    img.save(dir.join(name)).unwrap();
}

#[test]
fn test_pack_writes_atlas_and_manifest() {
    let dir = TempDir::new().unwrap();
    write_png(dir.path(), "red.png", 100, 50, [255, 0, 0, 255]);
    write_png(dir.path(), "green.png", 100, 50, [0, 255, 0, 255]);
    write_png(dir.path(), "blue.png", 200, 20, [0, 0, 255, 255]);
    fs::write(dir.path().join("notes.txt"), "not an image").unwrap();

    let packer = AtlasPacker::new(dir.path());
    let entries = match packer.pack().unwrap() {
        PackOutcome::Packed(entries) => entries,
        PackOutcome::Unchanged => panic!("first pack must produce an atlas"),
    };
    assert_eq!(entries.len(), 3);
    // tallest first
    assert_eq!(entries[2].size, (200, 20));

    let atlas = image::open(packer.atlas_path()).unwrap().to_rgba8();
    assert_eq!(atlas.dimensions(), (ATLAS_SIZE, ATLAS_SIZE));

    let manifest = AtlasManifest::load(&packer.manifest_path()).unwrap();
    assert_eq!(manifest.len(), 3);

    let (bx, by) = manifest.offset("blue.png");
    assert_eq!(manifest.size("blue.png"), (200, 20));
    assert_eq!(*atlas.get_pixel(bx, by), Rgba([0, 0, 255, 255]));

    let (rx, ry) = manifest.offset("red.png");
    assert_eq!(*atlas.get_pixel(rx + 99, ry + 49), Rgba([255, 0, 0, 255]));
}

#[test]
fn test_repack_with_same_sources_skips_image_io() {
    let dir = TempDir::new().unwrap();
    write_png(dir.path(), "a.png", 8, 8, [1, 2, 3, 255]);
    write_png(dir.path(), "b.png", 4, 16, [4, 5, 6, 255]);

    let packer = AtlasPacker::new(dir.path());
    assert!(matches!(packer.pack().unwrap(), PackOutcome::Packed(_)));
    let manifest_before = fs::read_to_string(packer.manifest_path()).unwrap();

    // An undecodable source proves the second pass never opens the images.
    fs::write(dir.path().join("a.png"), b"garbage").unwrap();
    assert_eq!(packer.pack().unwrap(), PackOutcome::Unchanged);
    assert_eq!(
        fs::read_to_string(packer.manifest_path()).unwrap(),
        manifest_before
    );
}

#[test]
fn test_new_source_triggers_repack() {
    let dir = TempDir::new().unwrap();
    write_png(dir.path(), "a.png", 8, 8, [1, 2, 3, 255]);

    let packer = AtlasPacker::new(dir.path());
    assert!(matches!(packer.pack().unwrap(), PackOutcome::Packed(_)));

    write_png(dir.path(), "c.png", 16, 16, [7, 8, 9, 255]);
    match packer.pack().unwrap() {
        PackOutcome::Packed(entries) => assert_eq!(entries.len(), 2),
        PackOutcome::Unchanged => panic!("added source must trigger a repack"),
    }
}

#[test]
fn test_unreadable_source_is_skipped() {
    let dir = TempDir::new().unwrap();
    write_png(dir.path(), "good.png", 8, 8, [9, 9, 9, 255]);
    fs::write(dir.path().join("broken.png"), b"not a png").unwrap();

    let packer = AtlasPacker::new(dir.path());
    match packer.pack().unwrap() {
        PackOutcome::Packed(entries) => {
            assert_eq!(entries.len(), 1);
            assert!(entries[0].name.ends_with("good.png"));
        }
        PackOutcome::Unchanged => panic!("expected a pack"),
    }
}

#[test]
fn test_atlas_file_is_not_a_source() {
    let dir = TempDir::new().unwrap();
    write_png(dir.path(), "a.png", 8, 8, [1, 1, 1, 255]);

    let packer = AtlasPacker::new(dir.path());
    packer.pack().unwrap();

    let sources = packer.source_images().unwrap();
    assert_eq!(sources.len(), 1);
    assert!(packer.is_up_to_date(&sources));
}

#[test]
fn test_deleted_atlas_triggers_repack() {
    let dir = TempDir::new().unwrap();
    write_png(dir.path(), "a.png", 8, 8, [1, 1, 1, 255]);

    let packer = AtlasPacker::new(dir.path());
    assert!(matches!(packer.pack().unwrap(), PackOutcome::Packed(_)));

    // Manifest still lists every source, but the image is gone.
    fs::remove_file(packer.atlas_path()).unwrap();
    let sources = packer.source_images().unwrap();
    assert!(!packer.is_up_to_date(&sources));

    match packer.pack().unwrap() {
        PackOutcome::Packed(entries) => assert_eq!(entries.len(), 1),
        PackOutcome::Unchanged => panic!("missing atlas must be rebuilt"),
    }
    assert!(packer.atlas_path().is_file());
}
