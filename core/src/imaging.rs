use std::io::Cursor;

use anyhow::{Context, Result};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;

pub const MAX_IMAGE_WIDTH: u32 = 1200;
pub const JPEG_QUALITY: u8 = 70;

/// Downscale to at most `max_width` (keeping the aspect ratio) and re-encode as JPEG.
pub fn try_compress_image(data: &[u8], max_width: u32, quality: u8) -> Result<Vec<u8>> {
    let mut img = image::load_from_memory(data).context("Invalid image")?;

    if img.width() > max_width && max_width > 0 {
        let height = (u64::from(img.height()) * u64::from(max_width) / u64::from(img.width()))
            .max(1);
        let height = u32::try_from(height).unwrap_or(u32::MAX);
        img = img.resize_exact(max_width, height, FilterType::Triangle);
    }

    let mut buffer = Vec::new();
    {
        let mut cursor = Cursor::new(&mut buffer);
        let rgb_img = img.to_rgb8();
        let encoder = JpegEncoder::new_with_quality(&mut cursor, quality);
        rgb_img
            .write_with_encoder(encoder)
            .context("Image compression failed")?;
    }
    Ok(buffer)
}

/// Like [`try_compress_image`], but hands back the input untouched when it
/// cannot be decoded or re-encoded.
#[must_use]
pub fn compress_image(data: &[u8], max_width: u32, quality: u8) -> Vec<u8> {
    match try_compress_image(data, max_width, quality) {
        Ok(out) => out,
        Err(e) => {
            tracing::warn!(error = %format!("{e:#}"), bytes = data.len(), "image compression skipped");
            data.to_vec()
        }
    }
}

#[must_use]
pub fn is_data_url(s: &str) -> bool {
    s.starts_with("data:")
}

#[must_use]
pub fn to_data_url(mime: &str, data: &[u8]) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(data))
}

/// Split a base64 `data:` URL into its media type and payload.
#[must_use]
pub fn decode_data_url(url: &str) -> Option<(String, Vec<u8>)> {
    let rest = url.strip_prefix("data:")?;
    let (meta, payload) = rest.split_once(',')?;
    let mime = meta.strip_suffix(";base64")?;
    let bytes = STANDARD.decode(payload.trim()).ok()?;
    let mime = if mime.is_empty() {
        "application/octet-stream"
    } else {
        mime
    };
    Some((mime.to_string(), bytes))
}
