//! Packaging of a closed window's frames into a single uploadable clip.
//!
//! Layout of the ZIP archive:
//!
//! ```text
//! manifest.json
//! frames/000000000012.jpg
//! frames/000000000013.jpg
//! ```
//!
//! Frame images are stored uncompressed (they are already compressed);
//! the manifest is deflated.

use std::io::{Cursor, Write};

use serde::Serialize;
use sha2::{Digest, Sha256};
use sentinel_core::clip::{ClipFrame, ClipWindow, SealReason};
use sentinel_core::frame::extension_for_content_type;
use sentinel_core::types::Timestamp;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::PipelineError;

/// MIME type of a clip archive.
pub const CLIP_CONTENT_TYPE: &str = "application/zip";

pub const MANIFEST_NAME: &str = "manifest.json";

#[derive(Debug, Serialize)]
struct Manifest<'a> {
    window_id: &'a str,
    session_id: &'a str,
    opened_at: Timestamp,
    last_detection_at: Timestamp,
    sealed_at: Option<Timestamp>,
    seal_reason: Option<SealReason>,
    frame_count: usize,
    frames: Vec<ManifestFrame>,
}

#[derive(Debug, Serialize)]
struct ManifestFrame {
    frame_index: u64,
    captured_at: Timestamp,
    content_type: String,
    file: String,
    size_bytes: usize,
    sha256: String,
}

/// A built clip, ready for upload.
#[derive(Debug, Clone)]
pub struct ClipArchive {
    pub bytes: Vec<u8>,
    pub frame_count: usize,
    /// Hex SHA-256 of `bytes`.
    pub sha256: String,
}

/// Path of a frame inside the archive. Zero-padded so lexical order
/// matches frame order.
pub fn frame_entry_name(frame: &ClipFrame) -> String {
    format!(
        "frames/{:012}.{}",
        frame.frame_index,
        extension_for_content_type(&frame.content_type)
    )
}

/// Build the archive. `frames` must already be in clip order.
pub fn build_archive(window: &ClipWindow, frames: &[ClipFrame]) -> Result<ClipArchive, PipelineError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

    let mut entries = Vec::with_capacity(frames.len());
    for frame in frames {
        let name = frame_entry_name(frame);
        writer
            .start_file(name.as_str(), entry_options(CompressionMethod::Stored))
            .map_err(archive_err)?;
        writer.write_all(&frame.payload).map_err(archive_err)?;
        entries.push(ManifestFrame {
            frame_index: frame.frame_index,
            captured_at: frame.captured_at,
            content_type: frame.content_type.clone(),
            file: name,
            size_bytes: frame.payload.len(),
            sha256: format!("{:x}", Sha256::digest(&frame.payload)),
        });
    }

    let manifest = Manifest {
        window_id: &window.id,
        session_id: &window.session_id,
        opened_at: window.opened_at,
        last_detection_at: window.last_detection_at,
        sealed_at: window.sealed_at,
        seal_reason: window.seal_reason,
        frame_count: entries.len(),
        frames: entries,
    };
    let manifest_json = serde_json::to_vec_pretty(&manifest).map_err(archive_err)?;
    writer
        .start_file(MANIFEST_NAME, entry_options(CompressionMethod::Deflated))
        .map_err(archive_err)?;
    writer.write_all(&manifest_json).map_err(archive_err)?;

    let bytes = writer.finish().map_err(archive_err)?.into_inner();
    Ok(ClipArchive {
        sha256: format!("{:x}", Sha256::digest(&bytes)),
        frame_count: frames.len(),
        bytes,
    })
}

fn entry_options(method: CompressionMethod) -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(method)
}

fn archive_err(e: impl std::fmt::Display) -> PipelineError {
    PipelineError::Archive(e.to_string())
}
