use chrono::{DateTime, Utc};

use crate::error::{CaptureError, CaptureResult};

/// An encoded document photo
#[derive(Debug, Clone)]
pub struct StillImage {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub width: u32,
    pub height: u32,
    pub captured_at: DateTime<Utc>,
}

/// Encode an RGBA frame as PNG
pub fn encode_png(width: u32, height: u32, rgba: &[u8]) -> CaptureResult<Vec<u8>> {
    let expected = width as usize * height as usize * 4;
    if width == 0 || height == 0 || rgba.len() != expected {
        return Err(CaptureError::DeviceUnavailable(format!(
            "malformed frame: {}x{} with {} bytes",
            width,
            height,
            rgba.len()
        )));
    }

    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, width, height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);

        let mut writer = encoder
            .write_header()
            .map_err(|e| CaptureError::DeviceUnavailable(format!("png header: {}", e)))?;
        writer
            .write_image_data(rgba)
            .map_err(|e| CaptureError::DeviceUnavailable(format!("png data: {}", e)))?;
    }

    Ok(out)
}
