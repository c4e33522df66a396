//! Caption styling configuration.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default caption font size in pixels.
pub const DEFAULT_FONT_SIZE: u32 = 28;
/// Default caption fill color.
pub const DEFAULT_FONT_COLOR: &str = "yellow";
/// Default caption outline color.
pub const DEFAULT_OUTLINE_COLOR: &str = "black";
/// Default caption outline width in pixels.
pub const DEFAULT_OUTLINE_WIDTH: u32 = 1;

/// Styling for rendered caption overlays.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CaptionStyle {
    /// Font size in pixels.
    #[serde(default = "default_font_size")]
    pub font_size: u32,

    /// Fill color (FFmpeg color name or 0xRRGGBB).
    #[serde(default = "default_font_color")]
    pub font_color: String,

    /// Outline color.
    #[serde(default = "default_outline_color")]
    pub outline_color: String,

    /// Outline width in pixels.
    #[serde(default = "default_outline_width")]
    pub outline_width: u32,

    /// Optional font file; the renderer's default font is used when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_file: Option<PathBuf>,
}

fn default_font_size() -> u32 {
    DEFAULT_FONT_SIZE
}
fn default_font_color() -> String {
    DEFAULT_FONT_COLOR.to_string()
}
fn default_outline_color() -> String {
    DEFAULT_OUTLINE_COLOR.to_string()
}
fn default_outline_width() -> u32 {
    DEFAULT_OUTLINE_WIDTH
}

impl Default for CaptionStyle {
    fn default() -> Self {
        Self {
            font_size: DEFAULT_FONT_SIZE,
            font_color: DEFAULT_FONT_COLOR.to_string(),
            outline_color: DEFAULT_OUTLINE_COLOR.to_string(),
            outline_width: DEFAULT_OUTLINE_WIDTH,
            font_file: None,
        }
    }
}

impl CaptionStyle {
    /// Returns a new style with the given font file.
    pub fn with_font_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.font_file = Some(path.into());
        self
    }
}
