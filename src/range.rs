//! `Range` header parsing.
//!
//! Handles the `bytes` unit from RFC 9110 §14: `first-last`, open ended
//! `first-` and suffix `-length` specs, comma separated. Every satisfiable
//! spec is resolved against the resource size and the results are coalesced
//! into a single [`ByteWindow`].

use std::ops::RangeInclusive;

use crate::error::RangeParseError;

/// An inclusive span of bytes inside a resource.
///
/// Always satisfies `start <= end < total_size` for the resource it was
/// built against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteWindow {
    start: u64,
    end: u64,
}

impl ByteWindow {
    /// Returns `None` unless `start <= end < total_size`.
    pub fn new(start: u64, end: u64, total_size: u64) -> Option<Self> {
        (start <= end && end < total_size).then_some(ByteWindow { start, end })
    }

    /// Window covering an entire non-empty resource.
    pub fn full(total_size: u64) -> Option<Self> {
        total_size.checked_sub(1).map(|end| ByteWindow { start: 0, end })
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    /// Last byte included in the window.
    pub fn end(&self) -> u64 {
        self.end
    }

    /// Number of bytes in the window, never zero.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn as_range(&self) -> RangeInclusive<u64> {
        self.start..=self.end
    }

    /// Overlapping or directly adjacent windows can be served as one.
    fn touches(&self, other: &ByteWindow) -> bool {
        other.start <= self.end.saturating_add(1)
    }
}

/// Parses a `Range` header value against a resource of `total_size` bytes.
///
/// Errors for which [`RangeParseError::is_lenient`] is true mean the header
/// was not a byte range at all; every other error means 416.
pub fn parse_range_header(header: &str, total_size: u64) -> Result<ByteWindow, RangeParseError> {
    let (unit, set) = header
        .split_once('=')
        .ok_or_else(|| RangeParseError::Malformed(header.to_string()))?;

    let unit = unit.trim();
    if unit.is_empty() || unit.contains(char::is_whitespace) {
        return Err(RangeParseError::Malformed(header.to_string()));
    }
    if !unit.eq_ignore_ascii_case("bytes") {
        return Err(RangeParseError::UnsupportedUnit(unit.to_string()));
    }

    let mut windows = Vec::new();
    let mut specs = 0;
    for spec in set.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        specs += 1;
        if let Some(window) = resolve_spec(spec, total_size)? {
            windows.push(window);
        }
    }

    if specs == 0 {
        return Err(RangeParseError::EmptySet);
    }

    coalesce(windows).ok_or(RangeParseError::Unsatisfiable { total_size })
}

/// Resolves one byte-range-spec. `Ok(None)` is a well formed spec that
/// starts past the end of the resource.
fn resolve_spec(spec: &str, total_size: u64) -> Result<Option<ByteWindow>, RangeParseError> {
    let invalid = || RangeParseError::InvalidSpec(spec.to_string());

    let (first, last) = spec.split_once('-').ok_or_else(invalid)?;
    let (first, last) = (first.trim(), last.trim());

    if first.is_empty() {
        // suffix-byte-range-spec: the final `length` bytes
        let length = parse_pos(last).ok_or_else(invalid)?;
        if length == 0 {
            return Err(RangeParseError::ZeroSuffix);
        }
        let start = total_size.saturating_sub(length);
        return Ok(total_size
            .checked_sub(1)
            .and_then(|end| ByteWindow::new(start, end, total_size)));
    }

    let start = parse_pos(first).ok_or_else(invalid)?;
    let end = if last.is_empty() {
        None
    } else {
        let end = parse_pos(last).ok_or_else(invalid)?;
        if end < start {
            return Err(RangeParseError::Inverted { start, end });
        }
        Some(end)
    };

    if start >= total_size {
        return Ok(None);
    }

    let last_byte = total_size - 1;
    let end = end.map_or(last_byte, |end| end.min(last_byte));
    Ok(ByteWindow::new(start, end, total_size))
}

/// `1*DIGIT`, rejecting the signs and whitespace `u64::from_str` would accept.
fn parse_pos(digits: &str) -> Option<u64> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Merges windows into the single window covering all of them.
///
/// Overlapping and adjacent windows merge naturally. Disjoint windows would
/// need a `multipart/byteranges` body, so the gap between them is served too.
fn coalesce(mut windows: Vec<ByteWindow>) -> Option<ByteWindow> {
    windows.sort_by_key(|w| w.start);

    let mut iter = windows.into_iter();
    let mut merged = iter.next()?;
    for window in iter {
        if !merged.touches(&window) {
            tracing::debug!(
                gap_start = merged.end + 1,
                gap_end = window.start - 1,
                "serving gap between disjoint ranges"
            );
        }
        merged.end = merged.end.max(window.end);
    }
    Some(merged)
}
