//! Frame payload decoding and validation.
//!
//! Frames arrive as base64-encoded still images. Only the image header is
//! read here (format and dimensions); pixel decoding is left to whichever
//! detector consumes the frame.

use std::io::Cursor;

use base64::Engine;
use image::{ImageFormat, ImageReader};

use crate::error::CoreError;

/// Smallest accepted width or height, in pixels.
pub const MIN_FRAME_DIM: u32 = 100;

/// Largest accepted width or height, in pixels.
pub const MAX_FRAME_DIM: u32 = 4096;

/// Largest accepted frame index; indexes are persisted as `BIGINT`.
pub const MAX_FRAME_INDEX: u64 = i64::MAX as u64;

/// Formats accepted from clients.
const ACCEPTED_FORMATS: &[ImageFormat] = &[ImageFormat::Jpeg, ImageFormat::Png, ImageFormat::WebP];

/// A validated, still-encoded frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub index: u64,
    pub payload: Vec<u8>,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    /// MIME type of the encoded payload.
    pub fn content_type(&self) -> &'static str {
        self.format.to_mime_type()
    }

    /// File extension used when the frame is written into a clip archive.
    pub fn extension(&self) -> &'static str {
        extension_for(self.format)
    }
}

/// File extension for an accepted image format.
pub fn extension_for(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "jpg",
        ImageFormat::Png => "png",
        ImageFormat::WebP => "webp",
        _ => "bin",
    }
}

/// File extension for a stored frame's MIME type.
pub fn extension_for_content_type(content_type: &str) -> &'static str {
    ImageFormat::from_mime_type(content_type)
        .map(extension_for)
        .unwrap_or("bin")
}

/// Decode a base64 frame payload and validate its image header.
///
/// Whitespace and an optional `data:image/...;base64,` prefix are tolerated
/// since browser canvas exports produce both.
pub fn decode_frame(index: u64, encoded: &str) -> Result<Frame, CoreError> {
    check_index(index)?;
    let body = match encoded.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => encoded,
    };
    let cleaned: String = body.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if cleaned.is_empty() {
        return Err(CoreError::Validation("frame must not be empty".to_string()));
    }

    let payload = base64::engine::general_purpose::STANDARD
        .decode(cleaned.as_bytes())
        .map_err(|e| CoreError::Validation(format!("frame is not valid base64: {e}")))?;

    inspect_frame(index, payload)
}

/// Validate an already-decoded image payload.
///
/// Rules:
/// - The format must be recognisable and one of JPEG, PNG, WebP.
/// - Both dimensions must be within `MIN_FRAME_DIM..=MAX_FRAME_DIM`.
/// - `index` must not exceed `MAX_FRAME_INDEX`.
pub fn inspect_frame(index: u64, payload: Vec<u8>) -> Result<Frame, CoreError> {
    check_index(index)?;
    let reader = ImageReader::new(Cursor::new(payload.as_slice()))
        .with_guessed_format()
        .map_err(|e| CoreError::Validation(format!("frame could not be read: {e}")))?;

    let format = reader
        .format()
        .ok_or_else(|| CoreError::Validation("frame is not a recognised image".to_string()))?;
    if !ACCEPTED_FORMATS.contains(&format) {
        return Err(CoreError::Validation(format!(
            "frame format {format:?} is not accepted; expected JPEG, PNG, or WebP"
        )));
    }

    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| CoreError::Validation(format!("frame header is malformed: {e}")))?;

    let range = MIN_FRAME_DIM..=MAX_FRAME_DIM;
    if !range.contains(&width) || !range.contains(&height) {
        return Err(CoreError::Validation(format!(
            "frame is {width}x{height}; both dimensions must be between {MIN_FRAME_DIM} and {MAX_FRAME_DIM}"
        )));
    }

    Ok(Frame {
        index,
        payload,
        format,
        width,
        height,
    })
}

fn check_index(index: u64) -> Result<(), CoreError> {
    if index > MAX_FRAME_INDEX {
        return Err(CoreError::Validation(format!(
            "frame_index {index} exceeds the maximum of {MAX_FRAME_INDEX}"
        )));
    }
    Ok(())
}
