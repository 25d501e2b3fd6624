use std::fs::Metadata;
use std::io;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// What the storage layer knows about a resource being served.
///
/// Built once per request and only read by the responder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    pub total_size: u64,
    pub content_type: String,
    pub last_modified: SystemTime,
    /// Strong validator, quotes included, e.g. `"65a1c3f0-3e8"`.
    pub etag: String,
    pub supports_ranges: bool,
    pub original_filename: String,
}

impl ResourceDescriptor {
    /// Range support is inferred from `content_type`, see [`range_capable`].
    pub fn new(
        total_size: u64,
        content_type: impl Into<String>,
        last_modified: SystemTime,
        etag: impl Into<String>,
        original_filename: impl Into<String>,
    ) -> Self {
        let content_type = content_type.into();
        let supports_ranges = range_capable(&content_type);
        ResourceDescriptor {
            total_size,
            content_type,
            last_modified,
            etag: etag.into(),
            supports_ranges,
            original_filename: original_filename.into(),
        }
    }

    /// Builds a descriptor from file metadata, guessing the content type from
    /// `original_filename` and deriving the validator from size and mtime.
    pub fn from_metadata(metadata: &Metadata, original_filename: impl Into<String>) -> io::Result<Self> {
        let original_filename = original_filename.into();
        let last_modified = metadata.modified()?;
        let total_size = metadata.len();
        let content_type = mime_guess::from_path(Path::new(&original_filename))
            .first_or_octet_stream()
            .to_string();
        let etag = strong_etag(total_size, last_modified);
        Ok(ResourceDescriptor::new(total_size, content_type, last_modified, etag, original_filename))
    }

    /// Overrides the content type based classification.
    pub fn with_range_support(mut self, supports_ranges: bool) -> Self {
        self.supports_ranges = supports_ranges;
        self
    }
}

/// Whether byte ranges are offered for a content type.
///
/// Media and documents that players and viewers seek through: `video/*`,
/// `audio/*`, `image/*` and `application/pdf`.
pub fn range_capable(content_type: &str) -> bool {
    let essence = essence(content_type);
    ["video/", "audio/", "image/"]
        .iter()
        .any(|prefix| starts_with_ignore_case(&essence, prefix))
        || essence.eq_ignore_ascii_case("application/pdf")
}

/// Validator for file content identified by its size and mtime.
pub fn strong_etag(total_size: u64, last_modified: SystemTime) -> String {
    let mtime = last_modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    format!("\"{mtime:x}-{total_size:x}\"")
}

/// Media type without parameters, e.g. `text/plain` for `text/plain; charset=utf-8`.
pub(crate) fn essence(content_type: &str) -> &str {
    content_type.split(';').next().unwrap_or_default().trim()
}

pub(crate) fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len()
        && s.is_char_boundary(prefix.len())
        && s[..prefix.len()].eq_ignore_ascii_case(prefix)
}
