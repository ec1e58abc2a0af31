// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// Every section falls back to its defaults, so a partial file only overrides
// the keys it names. A missing file is not an error.

use crate::backend::capability::DeviceRequirements;
use crate::backend::pipeline::PipelineSettings;
use crate::backend::renderer::RendererSettings;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::ffi::CString;
use std::path::{Path, PathBuf};

pub const CONFIG_PATH: &str = "config.toml";

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub device: DeviceConfig,
    pub debug: DebugConfig,
}

/// Window settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Vulkan".to_string(),
            width: 800,
            height: 600,
        }
    }
}

/// Graphics settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub clear_color: [f32; 4],
    pub vertex_shader: PathBuf,
    pub fragment_shader: PathBuf,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            clear_color: [0.0, 0.0, 0.0, 1.0],
            vertex_shader: PathBuf::from("shaders/triangle.vert.spv"),
            fragment_shader: PathBuf::from("shaders/triangle.frag.spv"),
        }
    }
}

/// Physical device requirements
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub extensions: Vec<String>,
    pub require_discrete_gpu: bool,
    pub require_geometry_shader: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["VK_KHR_swapchain".to_string()],
            require_discrete_gpu: true,
            require_geometry_shader: true,
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Only honored in debug builds.
    pub validation_layers: bool,
    pub layers: Vec<String>,
    pub log_level: String,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
            layers: vec!["VK_LAYER_KHRONOS_validation".to_string()],
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load `config.toml`, falling back to defaults. The logger is not up
    /// yet when this runs, so a load error is handed back for the caller to
    /// report once it is.
    pub fn load() -> (Self, Option<anyhow::Error>) {
        Self::load_or_default(CONFIG_PATH)
    }

    pub fn load_or_default<P: AsRef<Path>>(path: P) -> (Self, Option<anyhow::Error>) {
        match Self::load_from_path(path) {
            Ok(config) => (config, None),
            Err(e) => (Config::default(), Some(e)),
        }
    }

    /// Load configuration from a specific path. A missing file yields the
    /// defaults; nothing is logged here.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        Ok(config)
    }

    pub fn device_requirements(&self) -> Result<DeviceRequirements> {
        Ok(DeviceRequirements {
            extensions: to_cstrings(&self.device.extensions, "device.extensions")?,
            require_discrete_gpu: self.device.require_discrete_gpu,
            require_geometry_shader: self.device.require_geometry_shader,
        })
    }

    /// Layers to enable on the instance and device. Release builds never
    /// enable validation.
    pub fn validation_layers(&self) -> Result<Vec<CString>> {
        self.layers_for_build(cfg!(debug_assertions))
    }

    fn layers_for_build(&self, debug_build: bool) -> Result<Vec<CString>> {
        if debug_build && self.debug.validation_layers {
            to_cstrings(&self.debug.layers, "debug.layers")
        } else {
            Ok(Vec::new())
        }
    }

    pub fn renderer_settings(&self) -> Result<RendererSettings> {
        Ok(RendererSettings {
            app_name: self.window.title.clone(),
            validation_layers: self.validation_layers()?,
            device: self.device_requirements()?,
            pipeline: PipelineSettings {
                vertex_shader: self.graphics.vertex_shader.clone(),
                fragment_shader: self.graphics.fragment_shader.clone(),
                clear_color: self.graphics.clear_color,
            },
        })
    }
}

fn to_cstrings(names: &[String], key: &str) -> Result<Vec<CString>> {
    names
        .iter()
        .map(|name| {
            CString::new(name.as_str())
                .with_context(|| format!("Invalid name {:?} in {}", name, key))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from_path(dir.path().join("config.toml")).unwrap();

        assert_eq!(config.window.title, "Vulkan");
        assert_eq!((config.window.width, config.window.height), (800, 600));
        assert_eq!(config.graphics.clear_color, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(
            config.graphics.vertex_shader,
            PathBuf::from("shaders/triangle.vert.spv")
        );
        assert_eq!(config.device.extensions, vec!["VK_KHR_swapchain"]);
        assert_eq!(config.debug.log_level, "info");
    }

    #[test]
    fn partial_file_merges_with_defaults() {
        let file = write_config(
            r#"
            [window]
            width = 1024

            [device]
            require_geometry_shader = false
            "#,
        );
        let config = Config::load_from_path(file.path()).unwrap();

        assert_eq!(config.window.width, 1024);
        assert_eq!(config.window.height, 600);
        assert_eq!(config.window.title, "Vulkan");
        assert!(!config.device.require_geometry_shader);
        assert!(config.device.require_discrete_gpu);
        assert_eq!(config.debug.layers, vec!["VK_LAYER_KHRONOS_validation"]);
    }

    #[test]
    fn invalid_file_is_an_error() {
        let file = write_config("[window]\nwidth = \"wide\"\n");
        let err = Config::load_from_path(file.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse config file"));
    }

    #[test]
    fn invalid_file_falls_back_with_the_error() {
        let file = write_config("[graphics]\nclear_color = 3\n");
        let (config, error) = Config::load_or_default(file.path());

        assert_eq!(config.graphics.clear_color, [0.0, 0.0, 0.0, 1.0]);
        let error = error.expect("a parse error to report");
        assert!(format!("{:#}", error).contains("Failed to parse config file"));
    }

    #[test]
    fn missing_file_falls_back_without_error() {
        let dir = tempfile::tempdir().unwrap();
        let (config, error) = Config::load_or_default(dir.path().join("config.toml"));
        assert!(error.is_none());
        assert_eq!(config.window.width, 800);
    }

    #[test]
    fn device_requirements_follow_device_section() {
        let file = write_config(
            r#"
            [device]
            extensions = ["VK_KHR_swapchain", "VK_KHR_maintenance1"]
            require_discrete_gpu = false
            "#,
        );
        let config = Config::load_from_path(file.path()).unwrap();
        let requirements = config.device_requirements().unwrap();

        let names: Vec<_> = requirements
            .extensions
            .iter()
            .map(|e| e.to_str().unwrap().to_owned())
            .collect();
        assert_eq!(names, vec!["VK_KHR_swapchain", "VK_KHR_maintenance1"]);
        assert!(!requirements.require_discrete_gpu);
        assert!(requirements.require_geometry_shader);
    }

    #[test]
    fn interior_nul_in_a_name_is_rejected() {
        let mut config = Config::default();
        config.device.extensions = vec!["VK_KHR\0swapchain".to_string()];
        assert!(config.device_requirements().is_err());
    }

    #[test]
    fn validation_is_debug_build_only() {
        let config = Config::default();
        assert_eq!(config.layers_for_build(true).unwrap().len(), 1);
        assert!(config.layers_for_build(false).unwrap().is_empty());

        let mut disabled = Config::default();
        disabled.debug.validation_layers = false;
        assert!(disabled.layers_for_build(true).unwrap().is_empty());
    }

    #[test]
    fn renderer_settings_carry_graphics_section() {
        let mut config = Config::default();
        config.graphics.clear_color = [0.2, 0.3, 0.4, 1.0];
        let settings = config.renderer_settings().unwrap();

        assert_eq!(settings.app_name, "Vulkan");
        assert_eq!(settings.pipeline.clear_color, [0.2, 0.3, 0.4, 1.0]);
        assert_eq!(
            settings.pipeline.fragment_shader,
            PathBuf::from("shaders/triangle.frag.spv")
        );
    }
}
