//! Pipeline configuration and fixed constants.
//!
//! Offscreen targets are square and never resized at runtime; the window can change
//! size freely because every full-screen pass stretches its input to the surface.

use std::path::PathBuf;

/// Edge length of every offscreen render target, in texels.
pub const TARGET_RESOLUTION: u32 = 1024;

/// Maximum number of lights a program can receive in one pass.
pub const MAX_LIGHTS: usize = 8;

/// Highest quality tier. 0 = lighting only, 1 = adds ambient occlusion, 2 = adds shadows.
pub const MAX_RENDER_LEVEL: i32 = 2;

/// Configuration for a render strategy.
///
/// # Example
///
/// ```
/// use deferred_shading::PipelineConfig;
///
/// let config = PipelineConfig::new()
///     .initial_level(1)
///     .debug_views(true);
/// assert_eq!(config.initial_level, 1);
/// ```
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Edge length of the square offscreen targets.
    pub resolution: u32,
    /// Quality tier the deferred pipeline starts at (clamped to `0..=MAX_RENDER_LEVEL`).
    pub initial_level: i32,
    /// Draw picture-in-picture views of the intermediate buffers.
    pub debug_views: bool,
    /// Background color written where no geometry was drawn.
    pub clear_color: [f32; 4],
    /// Load shader sources from this directory instead of the embedded copies.
    pub shader_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            resolution: TARGET_RESOLUTION,
            initial_level: MAX_RENDER_LEVEL,
            debug_views: false,
            clear_color: [0.1, 0.3, 0.1, 1.0],
            shader_dir: None,
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolution(mut self, resolution: u32) -> Self {
        self.resolution = resolution.max(1);
        self
    }

    pub fn initial_level(mut self, level: i32) -> Self {
        self.initial_level = level.clamp(0, MAX_RENDER_LEVEL);
        self
    }

    pub fn debug_views(mut self, enabled: bool) -> Self {
        self.debug_views = enabled;
        self
    }

    pub fn clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    pub fn shader_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.shader_dir = Some(dir.into());
        self
    }
}

/// Window settings for the interactive shell.
#[derive(Clone, Debug)]
pub struct DemoConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            title: "Deferred Shading".to_string(),
            width: 1280,
            height: 720,
        }
    }
}

impl DemoConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }
}
