//! # Render Configuration
//!
//! Settings read once when the render context is created: display mode,
//! resource capacities, post-processing, screenshots and the texture
//! loading knobs. Every field has a default so a partial file is valid.

use serde::{Deserialize, Serialize};

use super::{Config, ConfigError};

/// Back buffer pixel format
///
/// The depth buffer format follows from it: 16-bit colour pairs with a
/// 16-bit depth buffer, 32-bit colour with 24-bit depth plus stencil.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackBufferFormat {
    /// 16-bit colour
    #[serde(rename = "FMT_R5G6B5")]
    R5G6B5,
    /// 32-bit colour with alpha
    #[serde(rename = "FMT_A8R8G8B8")]
    A8R8G8B8,
}

/// Image container used for screenshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScreenshotFormat {
    /// Windows bitmap
    Bmp,
    /// JPEG
    Jpg,
    /// PNG
    Png,
    /// Targa
    Tga,
}

impl ScreenshotFormat {
    /// File extension, without the dot
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Bmp => "bmp",
            Self::Jpg => "jpg",
            Self::Png => "png",
            Self::Tga => "tga",
        }
    }

    /// Parse a user-facing name, falling back to JPEG for anything unknown
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "bmp" => Self::Bmp,
            "png" => Self::Png,
            "tga" => Self::Tga,
            "jpg" | "jpeg" => Self::Jpg,
            other => {
                log::warn!("Unknown screenshot format '{}', using jpg", other);
                Self::Jpg
            }
        }
    }
}

/// Glow post-process parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlowConfig {
    /// Tap offset in texels
    pub blur_size: f32,
    /// Number of ping-pong blur iterations
    pub blur_passes: u32,
    /// Additive glow weight, 0..=255
    pub intensity: u32,
}

impl Default for GlowConfig {
    fn default() -> Self {
        Self {
            blur_size: 0.8,
            blur_passes: 4,
            intensity: 200,
        }
    }
}

/// # Render Configuration
///
/// Display, capacity and feature settings for a render context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Back buffer width in pixels
    pub screen_width: u32,
    /// Back buffer height in pixels
    pub screen_height: u32,
    /// Exclusive fullscreen instead of a window
    pub full_screen: bool,
    /// Wait for vertical blank on present
    pub vsync: bool,
    /// Multisample count, 0 disables multisampling
    pub msaa: u32,
    /// Maximum anisotropy used by the common sampler state
    pub anisotropy: f32,
    /// Display adapter index
    pub adapter: u32,
    /// Back buffer pixel format
    pub back_buffer_format: BackBufferFormat,
    /// Enable the glow post-process
    pub post_process: bool,
    /// Glow post-process parameters
    pub glow: GlowConfig,
    /// Screenshot container format
    pub screenshot_format: ScreenshotFormat,
    /// Directory screenshots are written to
    pub screenshot_dir: String,
    /// Root directory of `.tx` textures
    pub texture_root: String,
    /// Number of top mip levels skipped when loading `.tx` textures
    pub texture_degradation: u32,
    /// Near clip plane distance
    pub near_clip: f32,
    /// Far clip plane distance
    pub far_clip: f32,
    /// Multiplier applied to every camera field of view
    pub fov_multiplier: f32,
    /// Print the frame rate each frame
    pub show_fps: bool,
    /// Print resource totals each frame
    pub show_ex_info: bool,
    /// Clear colour, ARGB
    pub background_color: u32,
    /// Font manifest file (TOML or RON)
    pub font_manifest: String,
    /// Font made current after init
    pub default_font: String,
    /// Optional technique library file (TOML or RON)
    pub techniques: Option<String>,
    /// Texture table capacity
    pub max_textures: usize,
    /// Vertex and index buffer table capacity, each
    pub max_buffers: usize,
    /// Font table capacity
    pub max_fonts: usize,
    /// Default log filter
    pub log_level: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            screen_width: 1024,
            screen_height: 768,
            full_screen: false,
            vsync: false,
            msaa: 0,
            anisotropy: 3.0,
            adapter: 0,
            back_buffer_format: BackBufferFormat::R5G6B5,
            post_process: false,
            glow: GlowConfig::default(),
            screenshot_format: ScreenshotFormat::Jpg,
            screenshot_dir: "screenshots".to_string(),
            texture_root: "resource/textures".to_string(),
            texture_degradation: 0,
            near_clip: 0.1,
            far_clip: 4000.0,
            fov_multiplier: 1.0,
            show_fps: false,
            show_ex_info: false,
            background_color: 0xFF00_0000,
            font_manifest: "resource/ini/fonts.toml".to_string(),
            default_font: "normal".to_string(),
            techniques: None,
            max_textures: 10_240,
            max_buffers: 10_240,
            max_fonts: 256,
            log_level: "info".to_string(),
        }
    }
}

impl RenderConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set screen resolution
    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.screen_width = width;
        self.screen_height = height;
        self
    }

    /// Enable or disable the glow post-process
    pub fn with_post_process(mut self, enabled: bool) -> Self {
        self.post_process = enabled;
        self
    }

    /// Set the texture root directory
    pub fn with_texture_root(mut self, root: impl Into<String>) -> Self {
        self.texture_root = root.into();
        self
    }

    /// Set the number of skipped top mips
    pub fn with_texture_degradation(mut self, levels: u32) -> Self {
        self.texture_degradation = levels;
        self
    }

    /// Set the screenshot directory and format
    pub fn with_screenshots(mut self, dir: impl Into<String>, format: ScreenshotFormat) -> Self {
        self.screenshot_dir = dir.into();
        self.screenshot_format = format;
        self
    }

    /// Set the multisample count
    pub fn with_msaa(mut self, samples: u32) -> Self {
        self.msaa = samples;
        self
    }

    /// Set slot table capacities
    pub fn with_capacities(mut self, textures: usize, buffers: usize, fonts: usize) -> Self {
        self.max_textures = textures;
        self.max_buffers = buffers;
        self.max_fonts = fonts;
        self
    }

    /// Multisample count the device is created with
    ///
    /// Zero disables multisampling; any other value outside `2..=16`
    /// becomes 16.
    pub const fn effective_msaa(&self) -> u32 {
        match self.msaa {
            0 => 0,
            n @ 2..=16 => n,
            _ => 16,
        }
    }

    /// Screen height over width
    pub fn aspect(&self) -> f32 {
        self.screen_height as f32 / self.screen_width.max(1) as f32
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.screen_width == 0 || self.screen_height == 0 {
            return Err(format!(
                "Invalid screen size {}x{}",
                self.screen_width, self.screen_height
            ));
        }
        if self.near_clip <= 0.0 || self.far_clip <= self.near_clip {
            return Err(format!(
                "Invalid clip planes near={} far={}",
                self.near_clip, self.far_clip
            ));
        }
        if self.max_textures == 0 || self.max_buffers == 0 || self.max_fonts == 0 {
            return Err("Slot table capacities must be non-zero".to_string());
        }
        if self.fov_multiplier <= 0.0 {
            return Err(format!("Invalid fov multiplier {}", self.fov_multiplier));
        }
        Ok(())
    }

    /// Validate, wrapping the message in a [`ConfigError`]
    pub fn checked(self) -> Result<Self, ConfigError> {
        self.validate().map_err(ConfigError::Invalid)?;
        Ok(self)
    }
}

impl Config for RenderConfig {}
