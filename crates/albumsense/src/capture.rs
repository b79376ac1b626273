//! Query and catalog image decoding.

use std::path::Path;

use image::{DynamicImage, ImageFormat};

use crate::types::{RetrievalError, RetrievalResult};

/// Map a declared media type to an image format, if it is one we recognise.
pub fn format_from_mime(mime: &str) -> Option<ImageFormat> {
    match mime.trim().to_ascii_lowercase().as_str() {
        "image/png" => Some(ImageFormat::Png),
        "image/jpeg" | "image/jpg" => Some(ImageFormat::Jpeg),
        "image/webp" => Some(ImageFormat::WebP),
        "image/gif" => Some(ImageFormat::Gif),
        "image/bmp" => Some(ImageFormat::Bmp),
        "image/tiff" => Some(ImageFormat::Tiff),
        _ => None,
    }
}

/// Decode an image from a file path.
pub fn decode_from_file(path: &Path) -> RetrievalResult<DynamicImage> {
    Ok(image::open(path)?)
}

/// Decode an image from an in-memory byte stream and its declared media type.
///
/// Unknown media types fall back to content sniffing.
pub fn decode_from_bytes(bytes: &[u8], mime: &str) -> RetrievalResult<DynamicImage> {
    if bytes.is_empty() {
        return Err(RetrievalError::Decode("Empty image payload".to_string()));
    }

    let img = match format_from_mime(mime) {
        Some(fmt) => image::load_from_memory_with_format(bytes, fmt)?,
        None => image::load_from_memory(bytes)?,
    };
    Ok(img)
}

/// Decode base64 text into the raw image payload.
pub fn decode_base64(data: &str) -> RetrievalResult<Vec<u8>> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(data.trim())
        .map_err(|e| RetrievalError::Decode(format!("Invalid base64: {e}")))
}
