use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub stream: StreamConfig,
    pub display: DisplayConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the processing service (REST endpoints live under it).
    pub base_url: String,
    /// Explicit frame channel address. Derived from `base_url` when unset.
    pub channel_url: Option<String>,
    pub timeout_secs: u64,
    /// Uploads move whole video files, so they get their own budget.
    pub upload_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            channel_url: None,
            timeout_secs: 30,
            upload_timeout_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Server-side path to stream, or "0"/"webcam" for the live camera.
    pub source: Option<String>,
    /// Local video to upload first; the returned server path becomes the source.
    pub upload_file: Option<String>,
    pub max_notices: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            source: None,
            upload_file: None,
            max_notices: 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Fixed display size. Frames are shown at their natural size when unset.
    pub viewport: Option<Size>,
    /// TTF/OTF font used for overlay labels. Labels are not rasterised without one.
    pub font_path: Option<String>,
    /// Composite frame + overlay written here every `preview_every` frames.
    pub preview_path: Option<String>,
    pub preview_every: u64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            viewport: None,
            font_path: None,
            preview_path: None,
            preview_every: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Pixel dimensions of an image or drawing surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}
