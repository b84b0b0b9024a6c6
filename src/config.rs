// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// Every section is optional and every field has a default, so a partial file
// (or no file at all) still yields a complete configuration. Enum-like
// settings are kept as strings here and converted when descriptions are built.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::format::{ColorF, Format, PresentMode, Size2D};
use crate::instance::{BackendPreference, InstanceDescription};
use crate::swapchain::SwapchainDescription;

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub instance: InstanceConfig,
    pub window: WindowConfig,
    pub swapchain: SwapchainConfig,
    pub frame: FrameConfig,
    pub debug: DebugConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct InstanceConfig {
    pub app_name: String,
    /// "auto", "software" or "vulkan"
    pub backend: String,
    /// Validation layers / per-command tracing
    pub debug: bool,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            app_name: "gpu-bridge demo".to_string(),
            backend: "auto".to_string(),
            debug: cfg!(debug_assertions),
        }
    }
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
            title: "gpu-bridge".to_string(),
            width: 1280,
            height: 720,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SwapchainConfig {
    pub buffer_count: u32,
    pub format: String,
    pub present_mode: String,
}

impl Default for SwapchainConfig {
    fn default() -> Self {
        Self {
            buffer_count: 2,
            format: "bgra8".to_string(),
            present_mode: "fifo".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    /// Base clear color (RGBA, 0-1 range); the demo cycles the hue around it
    pub clear_color: [f32; 4],
    /// Exit after this many frames; 0 runs until the window closes
    pub frame_limit: u64,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            clear_color: [0.1, 0.2, 0.8, 1.0],
            frame_limit: 0,
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub log_to_file: bool,
    pub log_file: String,
    pub show_fps: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_to_file: false,
            log_file: "gpu_bridge.log".to_string(),
            show_fps: true,
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults if not found
    pub fn load() -> Self {
        Self::load_from_path("config.toml").unwrap_or_else(|e| {
            log::warn!("Failed to load config.toml: {:#}. Using defaults.", e);
            Config::default()
        })
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }

    pub fn backend_preference(&self) -> BackendPreference {
        match self.instance.backend.to_lowercase().as_str() {
            "auto" => BackendPreference::Auto,
            "software" => BackendPreference::Software,
            "vulkan" => BackendPreference::Vulkan,
            other => {
                log::warn!("Unknown backend '{}', defaulting to auto", other);
                BackendPreference::Auto
            }
        }
    }

    pub fn instance_description(&self) -> InstanceDescription {
        InstanceDescription {
            app_name: self.instance.app_name.clone(),
            backend: self.backend_preference(),
            debug: self.instance.debug,
        }
    }

    pub fn format(&self) -> Format {
        Format::from_name(&self.swapchain.format).unwrap_or_else(|| {
            log::warn!("Unknown swapchain format '{}', defaulting to bgra8", self.swapchain.format);
            Format::B8G8R8A8Unorm
        })
    }

    pub fn present_mode(&self) -> PresentMode {
        PresentMode::from_name(&self.swapchain.present_mode).unwrap_or_else(|| {
            log::warn!(
                "Unknown present mode '{}', defaulting to fifo",
                self.swapchain.present_mode
            );
            PresentMode::Fifo
        })
    }

    /// Swapchain description for a window of `size`.
    pub fn swapchain_description(&self, size: Size2D) -> SwapchainDescription {
        SwapchainDescription::new(size, self.format(), self.present_mode(), self.swapchain.buffer_count)
    }

    pub fn clear_color(&self) -> ColorF {
        let [r, g, b, a] = self.frame.clear_color;
        ColorF::new(r, g, b, a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_means_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from_path(dir.path().join("config.toml")).unwrap();
        assert_eq!(config.swapchain.buffer_count, 2);
        assert_eq!(config.backend_preference(), BackendPreference::Auto);
        assert_eq!(config.format(), Format::B8G8R8A8Unorm);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[instance]\nbackend = \"software\"\n\n[swapchain]\nbuffer_count = 3\npresent_mode = \"Immediate\""
        )
        .unwrap();

        let config = Config::load_from_path(file.path()).unwrap();
        assert_eq!(config.backend_preference(), BackendPreference::Software);
        assert_eq!(config.window.width, 1280);

        let desc = config.swapchain_description(Size2D::new(800, 600));
        assert_eq!(desc.buffer_count, 3);
        assert_eq!(desc.present_mode, PresentMode::Immediate);
        assert_eq!(desc.size, Size2D::new(800, 600));
    }

    #[test]
    fn unknown_names_fall_back() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[instance]\nbackend = \"metal\"\n[swapchain]\nformat = \"rgb565\"\npresent_mode = \"vsync\"").unwrap();

        let config = Config::load_from_path(file.path()).unwrap();
        assert_eq!(config.instance_description().backend, BackendPreference::Auto);
        assert_eq!(config.format(), Format::B8G8R8A8Unorm);
        assert_eq!(config.present_mode(), PresentMode::Fifo);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[window\nwidth = ").unwrap();
        assert!(Config::load_from_path(file.path()).is_err());
    }
}
