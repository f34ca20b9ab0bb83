//! Texture atlas packing and its manifest.
//!
//! Every `*.png` in the texture directory (except the generated
//! `atlas.png`) is packed onto one 4096x4096 RGBA canvas with a skyline
//! packer. The placement of each source is recorded in `image_paths.txt`,
//! one line per image:
//!
//! ```text
//! resources/textures/brick.png | 0 , 0 , 512 , 512
//! ```
//!
//! Packing is skipped when the set of source paths matches the manifest.
//!
//! # Example
//!
//! ```no_run
//! use vkscene_resources::atlas::{AtlasManifest, AtlasPacker, PackOutcome};
//!
//! # fn example() -> vkscene_resources::ResourceResult<()> {
//! let packer = AtlasPacker::new("resources/textures");
//! if let PackOutcome::Packed(entries) = packer.pack()? {
//!     println!("packed {} images", entries.len());
//! }
//! let manifest = AtlasManifest::load(&packer.manifest_path())?;
//! let (x, y) = manifest.offset("brick.png");
//! # Ok(())
//! # }
//! ```

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use image::RgbaImage;
use tracing::{debug, error, info, warn};

use crate::error::ResourceResult;

/// Edge length of the square atlas canvas in pixels.
pub const ATLAS_SIZE: u32 = 4096;

/// File name of the generated atlas image.
pub const ATLAS_FILE_NAME: &str = "atlas.png";

/// File name of the placement manifest.
pub const MANIFEST_FILE_NAME: &str = "image_paths.txt";

/// A horizontal run of the skyline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Segment {
    x: u32,
    y: u32,
    width: u32,
}

/// Skyline bin packer over a fixed width and unbounded height.
#[derive(Clone, Debug)]
pub struct Skyline {
    width: u32,
    height: u32,
    segments: Vec<Segment>,
}

impl Skyline {
    pub fn new(width: u32) -> Self {
        Self {
            width,
            height: 0,
            segments: vec![Segment { x: 0, y: 0, width }],
        }
    }

    /// Places a `w` x `h` rectangle and returns its top-left corner.
    ///
    /// The segment giving the lowest top edge wins, the first one on ties.
    /// When no segment is wide enough the skyline is closed off at the
    /// current height and the rectangle starts a new full-width row.
    pub fn insert(&mut self, w: u32, h: u32) -> (u32, u32) {
        let mut best: Option<(usize, u32)> = None;
        for (i, seg) in self.segments.iter().enumerate() {
            if seg.width >= w {
                let top = seg.y + h;
                if best.is_none_or(|(_, best_top)| top < best_top) {
                    best = Some((i, top));
                }
            }
        }

        let (index, top) = match best {
            Some(found) => found,
            None => {
                self.segments.clear();
                self.segments.push(Segment {
                    x: 0,
                    y: self.height,
                    width: self.width,
                });
                (0, self.height + h)
            }
        };

        let seg = self.segments[index];
        self.height = self.height.max(top);

        if seg.width > w {
            self.segments.insert(
                index + 1,
                Segment {
                    x: seg.x + w,
                    y: seg.y,
                    width: seg.width - w,
                },
            );
        }
        self.segments[index] = Segment {
            x: seg.x,
            y: top,
            width: w,
        };

        self.merge();
        (seg.x, seg.y)
    }

    fn merge(&mut self) {
        let mut i = 0;
        while i + 1 < self.segments.len() {
            if self.segments[i].y == self.segments[i + 1].y {
                self.segments[i].width += self.segments[i + 1].width;
                self.segments.remove(i + 1);
            } else {
                i += 1;
            }
        }
    }

    /// Height used so far.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }
}

/// Placement of one source image in the atlas, in pixels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AtlasEntry {
    pub name: String,
    pub offset: (u32, u32),
    pub size: (u32, u32),
}

/// Result of [`AtlasPacker::pack`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PackOutcome {
    /// The manifest already covers the current sources; nothing was touched.
    Unchanged,
    /// A new atlas and manifest were written.
    Packed(Vec<AtlasEntry>),
}

/// Last path component, splitting on either separator.
pub fn file_name_of(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Formats manifest lines for `entries`.
pub fn format_manifest(entries: &[AtlasEntry]) -> String {
    entries
        .iter()
        .map(|e| {
            format!(
                "{} | {} , {} , {} , {}\n",
                e.name, e.offset.0, e.offset.1, e.size.0, e.size.1
            )
        })
        .collect()
}

/// Splits a manifest line into its trimmed path and the four numbers.
fn split_line(line: &str) -> Option<(&str, [u32; 4])> {
    let (path, coords) = line.split_once('|')?;
    let path = path.trim();
    if path.is_empty() {
        return None;
    }

    let fields: Vec<&str> = coords.split(',').collect();
    if fields.len() != 4 {
        return None;
    }

    let mut values = [0u32; 4];
    for (value, field) in values.iter_mut().zip(fields) {
        *value = field.trim().parse().unwrap_or(0);
    }
    Some((path, values))
}

/// Parses manifest text. Names are reduced to their file name.
///
/// Lines without a `|` separator, with an empty path or with other than
/// four comma-separated fields are skipped. A field that does not parse as
/// a number reads as 0 and the line is kept.
pub fn parse_manifest(contents: &str) -> Vec<AtlasEntry> {
    contents
        .lines()
        .filter_map(split_line)
        .map(|(path, [x, y, w, h])| AtlasEntry {
            name: file_name_of(path).to_string(),
            offset: (x, y),
            size: (w, h),
        })
        .collect()
}

/// The raw path column of a manifest.
fn manifest_paths(contents: &str) -> HashSet<String> {
    contents
        .lines()
        .filter_map(|line| line.split_once('|'))
        .map(|(path, _)| path.trim())
        .filter(|path| !path.is_empty())
        .map(str::to_string)
        .collect()
}

/// Writes `entries` to `path` in manifest format.
pub fn write_manifest(path: &Path, entries: &[AtlasEntry]) -> ResourceResult<()> {
    fs::write(path, format_manifest(entries))?;
    debug!("Wrote {} atlas entries to {}", entries.len(), path.display());
    Ok(())
}

/// Reads the manifest at `path`.
pub fn read_manifest(path: &Path) -> ResourceResult<Vec<AtlasEntry>> {
    let contents = fs::read_to_string(path)?;
    Ok(parse_manifest(&contents))
}

/// Name-indexed view of a manifest.
#[derive(Clone, Debug, Default)]
pub struct AtlasManifest {
    entries: HashMap<String, AtlasEntry>,
}

impl AtlasManifest {
    pub fn from_entries(entries: impl IntoIterator<Item = AtlasEntry>) -> Self {
        let entries = entries
            .into_iter()
            .map(|mut entry| {
                entry.name = file_name_of(&entry.name).to_string();
                (entry.name.clone(), entry)
            })
            .collect();
        Self { entries }
    }

    /// Loads and indexes the manifest at `path`.
    pub fn load(path: &Path) -> ResourceResult<Self> {
        let manifest = Self::from_entries(read_manifest(path)?);
        info!(
            "Loaded atlas manifest {} ({} entries)",
            path.display(),
            manifest.len()
        );
        Ok(manifest)
    }

    pub fn get(&self, name: &str) -> Option<&AtlasEntry> {
        self.entries.get(file_name_of(name))
    }

    /// Pixel offset of `name`, or `(0, 0)` with a warning if it is absent.
    pub fn offset(&self, name: &str) -> (u32, u32) {
        match self.get(name) {
            Some(entry) => entry.offset,
            None => {
                warn!("Texture '{}' not found in atlas", name);
                (0, 0)
            }
        }
    }

    /// Pixel size of `name`, or `(0, 0)` with a warning if it is absent.
    pub fn size(&self, name: &str) -> (u32, u32) {
        match self.get(name) {
            Some(entry) => entry.size,
            None => {
                warn!("Texture '{}' not found in atlas", name);
                (0, 0)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

struct SourceImage {
    path: String,
    pixels: RgbaImage,
}

/// Packs the PNGs of one directory into `atlas.png` plus its manifest.
pub struct AtlasPacker {
    dir: PathBuf,
}

impl AtlasPacker {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn atlas_path(&self) -> PathBuf {
        self.dir.join(ATLAS_FILE_NAME)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILE_NAME)
    }

    /// Source PNG paths, sorted, excluding the generated atlas.
    pub fn source_images(&self) -> ResourceResult<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let is_png = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("png"));
            let is_atlas = path.file_name().is_some_and(|name| name == ATLAS_FILE_NAME);
            if is_png && !is_atlas {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    /// Whether the atlas image exists and the manifest's path column equals
    /// `sources` as a set.
    pub fn is_up_to_date(&self, sources: &[PathBuf]) -> bool {
        if !self.atlas_path().is_file() {
            return false;
        }
        let Ok(contents) = fs::read_to_string(self.manifest_path()) else {
            return false;
        };
        let recorded = manifest_paths(&contents);
        let current: HashSet<String> = sources
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        recorded == current
    }

    /// Packs the directory unless the manifest is already current.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read or the atlas or
    /// manifest cannot be written. Unreadable source images are skipped.
    pub fn pack(&self) -> ResourceResult<PackOutcome> {
        let sources = self.source_images()?;
        if self.is_up_to_date(&sources) {
            info!("Texture atlas is up to date ({} sources)", sources.len());
            return Ok(PackOutcome::Unchanged);
        }

        let mut images: Vec<SourceImage> = sources
            .iter()
            .filter_map(|path| match image::open(path) {
                Ok(img) => {
                    debug!(
                        "Loaded image {} ({}x{})",
                        path.display(),
                        img.width(),
                        img.height()
                    );
                    Some(SourceImage {
                        path: path.display().to_string(),
                        pixels: img.to_rgba8(),
                    })
                }
                Err(e) => {
                    error!("Error loading image {}: {}", path.display(), e);
                    None
                }
            })
            .collect();

        if images.is_empty() {
            warn!("No images loaded from {}", self.dir.display());
        }

        images.sort_by(|a, b| b.pixels.height().cmp(&a.pixels.height()));

        let mut skyline = Skyline::new(ATLAS_SIZE);
        let mut canvas = RgbaImage::new(ATLAS_SIZE, ATLAS_SIZE);
        let mut entries = Vec::with_capacity(images.len());

        for img in &images {
            let (w, h) = img.pixels.dimensions();
            let (x, y) = skyline.insert(w, h);
            // Clipped to the canvas.
            image::imageops::replace(&mut canvas, &img.pixels, i64::from(x), i64::from(y));
            entries.push(AtlasEntry {
                name: img.path.clone(),
                offset: (x, y),
                size: (w, h),
            });
        }

        if skyline.height() > ATLAS_SIZE {
            warn!(
                "Atlas content is {} pixels tall, clipped to {}",
                skyline.height(),
                ATLAS_SIZE
            );
        }

        canvas.save(self.atlas_path())?;
        write_manifest(&self.manifest_path(), &entries)?;

        info!(
            "Packed {} images into {} ({}x{} used)",
            entries.len(),
            self.atlas_path().display(),
            ATLAS_SIZE,
            skyline.height()
        );

        Ok(PackOutcome::Packed(entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overlaps(a: ((u32, u32), (u32, u32)), b: ((u32, u32), (u32, u32))) -> bool {
        let ((ax, ay), (aw, ah)) = a;
        let ((bx, by), (bw, bh)) = b;
        ax < bx + bw && bx < ax + aw && ay < by + bh && by < ay + ah
    }

    fn pack_all(width: u32, sizes: &[(u32, u32)]) -> (Vec<((u32, u32), (u32, u32))>, u32) {
        let mut skyline = Skyline::new(width);
        let placed = sizes
            .iter()
            .map(|&(w, h)| (skyline.insert(w, h), (w, h)))
            .collect();
        (placed, skyline.height())
    }

    fn assert_disjoint(placed: &[((u32, u32), (u32, u32))]) {
        for (i, a) in placed.iter().enumerate() {
            for b in &placed[i + 1..] {
                assert!(!overlaps(*a, *b), "{a:?} overlaps {b:?}");
            }
        }
    }

    #[test]
    fn test_skyline_scenario() {
        let (placed, height) = pack_all(300, &[(100, 50), (100, 50), (200, 20)]);
        assert_disjoint(&placed);
        assert!((50..=70).contains(&height));
        assert_eq!(placed[0].0, (0, 0));
        assert_eq!(placed[1].0, (100, 0));
        assert_eq!(placed[2].0, (0, 50));
    }

    #[test]
    fn test_skyline_rows_of_squares() {
        let (placed, height) = pack_all(256, &[(64, 64); 20]);
        assert_disjoint(&placed);
        assert_eq!(height, 320);
        assert_eq!(placed[4].0, (0, 64));
    }

    #[test]
    fn test_skyline_fallback_row_does_not_overlap() {
        let sizes = [(120, 80), (60, 60), (200, 40), (50, 30), (90, 30), (30, 10)];
        let (placed, height) = pack_all(256, &sizes);
        assert_disjoint(&placed);
        assert!(height >= 80);
        assert_eq!(placed[2].0, (0, 80));
    }

    #[test]
    fn test_skyline_height_at_least_tallest() {
        let (_, height) = pack_all(4096, &[(10, 300), (4000, 5)]);
        assert!(height >= 300);
    }

    #[test]
    fn test_file_name_of() {
        assert_eq!(file_name_of("resources/textures/a.png"), "a.png");
        assert_eq!(file_name_of("resources\\textures\\b.png"), "b.png");
        assert_eq!(file_name_of("c.png"), "c.png");
    }

    #[test]
    fn test_manifest_round_trip() {
        let entries = vec![
            AtlasEntry {
                name: "tex/a.png".to_string(),
                offset: (0, 0),
                size: (512, 256),
            },
            AtlasEntry {
                name: "tex/b.png".to_string(),
                offset: (512, 0),
                size: (64, 64),
            },
        ];
        let text = format_manifest(&entries);
        assert_eq!(text.lines().next(), Some("tex/a.png | 0 , 0 , 512 , 256"));

        let parsed = parse_manifest(&text);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].name, "a.png");
        assert_eq!(parsed[1].offset, (512, 0));
        assert_eq!(parsed[1].size, (64, 64));
    }

    #[test]
    fn test_manifest_whitespace_and_malformed_lines() {
        let text = "  dir\\x.png|1,2 ,  3,4  \n\
                    no separator here\n\
                    y.png | 5 , 6 , 7\n\
                     | 1 , 2 , 3 , 4\n";
        let parsed = parse_manifest(text);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].name, "x.png");
        assert_eq!((parsed[0].offset, parsed[0].size), ((1, 2), (3, 4)));
    }

    #[test]
    fn test_manifest_unparsable_number_reads_zero() {
        let parsed = parse_manifest("z.png | a , 8 , -9 , 10\n");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].name, "z.png");
        assert_eq!(parsed[0].offset, (0, 8));
        assert_eq!(parsed[0].size, (0, 10));
    }

    #[test]
    fn test_atlas_manifest_lookup() {
        let manifest = AtlasManifest::from_entries([AtlasEntry {
            name: "resources/textures/brick.png".to_string(),
            offset: (10, 20),
            size: (30, 40),
        }]);
        assert_eq!(manifest.offset("brick.png"), (10, 20));
        assert_eq!(manifest.size("other/dir/brick.png"), (30, 40));
        assert_eq!(manifest.offset("missing.png"), (0, 0));
        assert_eq!(manifest.size("missing.png"), (0, 0));
    }

    #[test]
    fn test_manifest_paths_keep_full_path() {
        let paths = manifest_paths("a/b.png | 0 , 0 , 1 , 1\n  c.png |1,1,1,1\n");
        assert!(paths.contains("a/b.png"));
        assert!(paths.contains("c.png"));
        assert_eq!(paths.len(), 2);
    }
}
