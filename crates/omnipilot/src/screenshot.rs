use crate::errors::{PilotError, Result};
use base64::{engine::general_purpose, Engine as _};
use image::ImageFormat;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Captures the screen into an image file.
pub trait ScreenCapturer {
    /// Capture the screen, overwrite `path` with a PNG and return the written path.
    fn capture(&mut self, path: &Path) -> Result<PathBuf>;
}

/// Captures the primary monitor with xcap.
#[derive(Debug, Default)]
pub struct XcapCapturer;

impl XcapCapturer {
    pub fn new() -> Self {
        Self
    }

    fn primary_monitor() -> Result<xcap::Monitor> {
        let monitors = xcap::Monitor::all()
            .map_err(|e| PilotError::Screenshot(format!("failed to list monitors: {e}")))?;
        let mut fallback = None;
        for monitor in monitors {
            if monitor.is_primary().unwrap_or(false) {
                return Ok(monitor);
            }
            fallback.get_or_insert(monitor);
        }
        fallback.ok_or_else(|| PilotError::Screenshot("no monitors found".to_string()))
    }
}

impl ScreenCapturer for XcapCapturer {
    fn capture(&mut self, path: &Path) -> Result<PathBuf> {
        let monitor = Self::primary_monitor()?;
        let image = monitor
            .capture_image()
            .map_err(|e| PilotError::Screenshot(format!("failed to capture monitor: {e}")))?;
        debug!("captured {}x{} screenshot", image.width(), image.height());

        image.save_with_format(path, ImageFormat::Png)?;
        info!("Screenshot saved to {}", path.display());
        Ok(path.to_path_buf())
    }
}

/// Read an image file and base64-encode it for the model request.
pub fn encode_file_base64(path: &Path) -> Result<String> {
    let bytes = fs::read(path)?;
    Ok(general_purpose::STANDARD.encode(bytes))
}

/// `data:` URL for a base64 PNG, as used in `image_url` content parts.
pub fn png_data_url(base64_png: &str) -> String {
    format!("data:image/png;base64,{base64_png}")
}
