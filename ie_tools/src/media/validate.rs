use abi::{IeError, IeResult};
use std::path::Path;

pub const MAX_MEDIA_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

const SUPPORTED: &[(&str, &str, MediaKind)] = &[
    ("png", "image/png", MediaKind::Image),
    ("jpg", "image/jpeg", MediaKind::Image),
    ("jpeg", "image/jpeg", MediaKind::Image),
    ("gif", "image/gif", MediaKind::Image),
    ("webp", "image/webp", MediaKind::Image),
    ("mp4", "video/mp4", MediaKind::Video),
    ("webm", "video/webm", MediaKind::Video),
];

pub fn content_type_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    SUPPORTED
        .iter()
        .find(|(e, _, _)| *e == ext)
        .map(|(_, content_type, _)| *content_type)
}

/// Rejects unsupported types and oversized input before any processing.
pub fn validate_media(len: u64, content_type: &str) -> IeResult<MediaKind> {
    let kind = SUPPORTED
        .iter()
        .find(|(_, ct, _)| ct.eq_ignore_ascii_case(content_type))
        .map(|(_, _, kind)| *kind)
        .ok_or_else(|| IeError::invalid(format!("unsupported media type: {}", content_type)))?;

    if len == 0 {
        return Err(IeError::invalid("file is empty"));
    }
    if len > MAX_MEDIA_BYTES {
        return Err(IeError::invalid(format!(
            "file is {} bytes, the limit is {}",
            len, MAX_MEDIA_BYTES
        )));
    }
    Ok(kind)
}

/// Validates a file on disk by its extension and size, without reading it.
pub fn validate_path(path: &Path) -> IeResult<(MediaKind, &'static str)> {
    let content_type = content_type_for_path(path)
        .ok_or_else(|| IeError::invalid(format!("unsupported file: {}", path.display())))?;
    let len = std::fs::metadata(path)
        .map_err(|e| IeError::invalid(format!("{}: {}", path.display(), e)))?
        .len();
    Ok((validate_media(len, content_type)?, content_type))
}
