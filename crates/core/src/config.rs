//! Renderer configuration (`vkscene.toml`).
//!
//! Every field has a default so a missing file, or a file that only sets a
//! few keys, still produces a complete configuration.
//!
//! # Example
//!
//! ```toml
//! validation = false
//!
//! [window]
//! width = 1280
//! height = 720
//!
//! [[models]]
//! file = "texcube.obj"
//! tint = [0.9, 0.1, 0.1, 1.0]
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use crate::Result;

/// Top-level renderer configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Window settings.
    pub window: WindowConfig,
    /// Camera settings.
    pub camera: CameraConfig,
    /// Resource directories.
    pub paths: PathsConfig,
    /// Models to load, in draw order. The position in this list is the
    /// model index used by render instances.
    pub models: Vec<ModelConfig>,
    /// Enable the Khronos validation layer.
    pub validation: bool,
}

/// Window configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

/// Camera configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Vertical field of view in degrees.
    pub fov_degrees: f32,
    /// Scale applied to every camera movement request.
    pub velocity: f32,
    pub near: f32,
    pub far: f32,
}

/// Resource directory layout.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding source textures, `atlas.png` and the manifest.
    pub textures: PathBuf,
    /// Directory holding `vert.spv` and `frag.spv`.
    pub shaders: PathBuf,
    /// Directory holding OBJ models.
    pub models: PathBuf,
}

/// One model entry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelConfig {
    /// File name relative to [`PathsConfig::models`].
    pub file: String,
    /// RGBA tint used for faces without a material.
    #[serde(default = "default_tint")]
    pub tint: [f32; 4],
    /// Uniform scale applied to positions.
    #[serde(default = "default_scale")]
    pub scale: f32,
}

fn default_tint() -> [f32; 4] {
    [1.0, 1.0, 1.0, 1.0]
}

fn default_scale() -> f32 {
    1.0
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            camera: CameraConfig::default(),
            paths: PathsConfig::default(),
            models: vec![
                ModelConfig::new("texcube.obj", [0.9, 0.1, 0.1, 1.0]),
                ModelConfig::new("test3.obj", [0.2, 0.4, 0.9, 1.0]),
                ModelConfig::new("xyzOrigin.obj", [0.1, 0.9, 0.1, 1.0]),
                ModelConfig::new("bep.obj", [0.7, 0.9, 0.1, 1.0]),
            ],
            validation: cfg!(debug_assertions),
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            title: "vkscene".to_string(),
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_degrees: 90.0,
            velocity: 0.5,
            near: 0.001,
            far: 1000.0,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            textures: PathBuf::from("resources/textures"),
            shaders: PathBuf::from("resources/shaders"),
            models: PathBuf::from("resources/models"),
        }
    }
}

impl ModelConfig {
    /// Create a model entry with unit scale.
    pub fn new(file: impl Into<String>, tint: [f32; 4]) -> Self {
        Self {
            file: file.into(),
            tint,
            scale: default_scale(),
        }
    }
}

impl RendererConfig {
    /// Load the configuration from a TOML file.
    ///
    /// A missing file yields [`RendererConfig::default`].
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Io`] if the file exists but cannot be read and
    /// [`crate::Error::Config`] if it is not valid TOML for this schema.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Vertical field of view in radians.
    pub fn fov_radians(&self) -> f32 {
        self.camera.fov_degrees.to_radians()
    }

    /// Full path of a model file.
    pub fn model_path(&self, model: &ModelConfig) -> PathBuf {
        self.paths.models.join(&model.file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_defaults() {
        let config = RendererConfig::default();
        assert_eq!(config.window.width, 1920);
        assert_eq!(config.window.height, 1080);
        assert_eq!(config.camera.fov_degrees, 90.0);
        assert_eq!(config.camera.velocity, 0.5);
        assert_eq!(config.models.len(), 4);
        assert_eq!(config.models[3].file, "bep.obj");
        assert_eq!(config.models[1].tint, [0.2, 0.4, 0.9, 1.0]);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = RendererConfig::from_toml_str(
            r#"
            validation = false

            [window]
            width = 800
            "#,
        )
        .unwrap();

        assert!(!config.validation);
        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, 1080);
        assert_eq!(config.paths.shaders, PathBuf::from("resources/shaders"));
        assert_eq!(config.models.len(), 4);
    }

    #[test]
    fn test_models_override() {
        let config = RendererConfig::from_toml_str(
            r#"
            [[models]]
            file = "cube.obj"
            scale = 2.0
            "#,
        )
        .unwrap();

        assert_eq!(config.models.len(), 1);
        assert_eq!(config.models[0].scale, 2.0);
        assert_eq!(config.models[0].tint, [1.0, 1.0, 1.0, 1.0]);
        assert_eq!(
            config.model_path(&config.models[0]),
            PathBuf::from("resources/models/cube.obj")
        );
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let err = RendererConfig::from_toml_str("[window\nwidth = 1").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = RendererConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, RendererConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vkscene.toml");
        std::fs::write(&path, "[camera]\nvelocity = 0.25\n").unwrap();

        let config = RendererConfig::load(&path).unwrap();
        assert_eq!(config.camera.velocity, 0.25);
        assert_eq!(config.camera.fov_degrees, 90.0);
    }
}
