//! Conditional and range decision logic.
//!
//! [`RangeResponder::decide`] is a pure function of the resource descriptor
//! and request headers. [`RangeResponder::respond`] turns the decision into a
//! status line and header set without touching the resource bytes.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::http::header::{self, HeaderValue};
use axum::http::{HeaderMap, StatusCode};
use axum_extra::headers::{AcceptRanges, ContentLength, ContentRange, Header, HeaderMapExt, IfModifiedSince, LastModified};

use crate::config::{CacheTier, ResponderConfig};
use crate::descriptor::ResourceDescriptor;
use crate::error::RespondError;
use crate::range::{parse_range_header, ByteWindow};
use crate::request::RangeRequest;

/// Outcome for one request. Fully determines status and headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseDecision {
    /// Client copy is fresh, 304.
    NotModified,
    /// Whole resource, 200.
    FullContent,
    /// One byte window, 206.
    PartialContent(ByteWindow),
    /// Byte range outside the resource, 416.
    RangeNotSatisfiable,
    /// `Range` header that is not a byte range, answered like [`FullContent`](Self::FullContent).
    MalformedRangeFallback,
}

impl ResponseDecision {
    pub fn status(&self) -> StatusCode {
        match self {
            ResponseDecision::NotModified => StatusCode::NOT_MODIFIED,
            ResponseDecision::FullContent | ResponseDecision::MalformedRangeFallback => StatusCode::OK,
            ResponseDecision::PartialContent(_) => StatusCode::PARTIAL_CONTENT,
            ResponseDecision::RangeNotSatisfiable => StatusCode::RANGE_NOT_SATISFIABLE,
        }
    }

    /// Bytes to stream for a resource of `total_size` bytes, `None` for an
    /// empty body.
    pub fn body_window(&self, total_size: u64) -> Option<ByteWindow> {
        match self {
            ResponseDecision::PartialContent(window) => Some(*window),
            ResponseDecision::FullContent | ResponseDecision::MalformedRangeFallback => ByteWindow::full(total_size),
            ResponseDecision::NotModified | ResponseDecision::RangeNotSatisfiable => None,
        }
    }
}

/// Status, headers and body window computed for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub decision: ResponseDecision,
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Span of the resource the body must contain, `None` for no body.
    pub body: Option<ByteWindow>,
}

/// Decides how to answer a request for a resource. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct RangeResponder {
    config: Arc<ResponderConfig>,
}

impl RangeResponder {
    pub fn new(config: ResponderConfig) -> Self {
        RangeResponder { config: Arc::new(config) }
    }

    pub fn config(&self) -> &ResponderConfig {
        &self.config
    }

    /// Picks the response for `request` against `resource`.
    ///
    /// Validators are checked before the `Range` header, so a client
    /// revalidating a fresh copy gets 304 even when it also asked for bytes.
    pub fn decide(&self, resource: &ResourceDescriptor, request: &RangeRequest) -> ResponseDecision {
        if is_fresh(resource, request) {
            return ResponseDecision::NotModified;
        }

        let Some(range) = request.range.as_deref() else {
            return ResponseDecision::FullContent;
        };

        if !resource.supports_ranges {
            tracing::debug!(content_type = %resource.content_type, "ignoring range for resource without range support");
            return ResponseDecision::FullContent;
        }

        if let Some(validator) = request.if_range.as_deref() {
            if !if_range_matches(validator, resource) {
                tracing::debug!(if_range = validator, "stale If-Range, sending full resource");
                return ResponseDecision::FullContent;
            }
        }

        match parse_range_header(range, resource.total_size) {
            Ok(window) => ResponseDecision::PartialContent(window),
            Err(e) if e.is_lenient() => {
                tracing::debug!(range, error = %e, "ignoring malformed range header");
                ResponseDecision::MalformedRangeFallback
            }
            Err(e) => {
                tracing::debug!(range, total_size = resource.total_size, error = %e, "range not satisfiable");
                ResponseDecision::RangeNotSatisfiable
            }
        }
    }

    /// Decides and assembles the response head.
    pub fn respond(&self, resource: &ResourceDescriptor, request: &RangeRequest) -> Result<ResponseHead, RespondError> {
        let decision = self.decide(resource, request);
        tracing::debug!(?decision, total_size = resource.total_size, etag = %resource.etag, "range decision");
        self.head(resource, decision)
    }

    /// Header set for an already made decision.
    pub fn head(&self, resource: &ResourceDescriptor, decision: ResponseDecision) -> Result<ResponseHead, RespondError> {
        let mut headers = HeaderMap::new();

        match decision {
            ResponseDecision::RangeNotSatisfiable => {
                headers.typed_insert(ContentRange::unsatisfied_bytes(resource.total_size));
            }
            ResponseDecision::NotModified => {
                self.insert_validators(&mut headers, resource)?;
                self.insert_cache_control(&mut headers, resource)?;
            }
            ResponseDecision::FullContent | ResponseDecision::MalformedRangeFallback | ResponseDecision::PartialContent(_) => {
                self.insert_validators(&mut headers, resource)?;
                headers.insert(header::CONTENT_TYPE, self.content_type(resource)?);

                match decision {
                    ResponseDecision::PartialContent(window) => {
                        let content_range = ContentRange::bytes(window.as_range(), resource.total_size)
                            .map_err(|_| RespondError::InvalidContentRange { window, total_size: resource.total_size })?;
                        headers.typed_insert(content_range);
                        headers.typed_insert(ContentLength(window.len()));
                        headers.typed_insert(AcceptRanges::bytes());
                    }
                    _ => {
                        headers.typed_insert(ContentLength(resource.total_size));
                        if resource.supports_ranges {
                            headers.typed_insert(AcceptRanges::bytes());
                        }
                    }
                }

                self.insert_cache_control(&mut headers, resource)?;
                headers.insert(
                    header::CONTENT_DISPOSITION,
                    HeaderValue::try_from(inline_disposition(&resource.original_filename))
                        .map_err(RespondError::invalid_header(header::CONTENT_DISPOSITION))?,
                );
            }
        }

        Ok(ResponseHead {
            decision,
            status: decision.status(),
            headers,
            body: decision.body_window(resource.total_size),
        })
    }

    fn insert_validators(&self, headers: &mut HeaderMap, resource: &ResourceDescriptor) -> Result<(), RespondError> {
        let etag = HeaderValue::from_str(&resource.etag).map_err(RespondError::invalid_header(header::ETAG))?;
        headers.insert(header::ETAG, etag);
        if let Some(modified) = http_date(resource.last_modified) {
            headers.typed_insert(LastModified::from(modified));
        }
        Ok(())
    }

    fn insert_cache_control(&self, headers: &mut HeaderMap, resource: &ResourceDescriptor) -> Result<(), RespondError> {
        let tier = CacheTier::for_content_type(&resource.content_type);
        let value = HeaderValue::try_from(self.config.cache.header_value(tier))
            .map_err(RespondError::invalid_header(header::CACHE_CONTROL))?;
        headers.insert(header::CACHE_CONTROL, value);
        Ok(())
    }

    fn content_type(&self, resource: &ResourceDescriptor) -> Result<HeaderValue, RespondError> {
        let content_type = if resource.content_type.trim().is_empty() {
            &self.config.default_content_type
        } else {
            &resource.content_type
        };
        HeaderValue::from_str(content_type).map_err(RespondError::invalid_header(header::CONTENT_TYPE))
    }
}

/// `If-None-Match` wins over `If-Modified-Since` when both are sent.
fn is_fresh(resource: &ResourceDescriptor, request: &RangeRequest) -> bool {
    match request.if_none_match.as_deref() {
        Some(if_none_match) => etag_listed(if_none_match, &resource.etag),
        None => request
            .if_modified_since
            .and_then(http_date)
            .zip(http_date(resource.last_modified))
            .is_some_and(|(since, modified)| !IfModifiedSince::from(since).is_modified(modified)),
    }
}

/// Exact match against the header or any member of its comma separated list.
fn etag_listed(if_none_match: &str, etag: &str) -> bool {
    if_none_match.trim() == etag
        || if_none_match
            .split(',')
            .map(str::trim)
            .any(|candidate| candidate == "*" || candidate == etag)
}

/// `If-Range` holds either a strong entity tag or the exact `Last-Modified` date.
fn if_range_matches(validator: &str, resource: &ResourceDescriptor) -> bool {
    if validator.starts_with('"') {
        return validator == resource.etag;
    }
    if validator.starts_with("W/") {
        return false;
    }

    HeaderValue::from_str(validator)
        .ok()
        .and_then(|value| LastModified::decode(&mut std::iter::once(&value)).ok())
        .zip(http_date(resource.last_modified))
        .is_some_and(|(date, modified)| SystemTime::from(date) == SystemTime::from(LastModified::from(modified)))
}

/// Last second an HTTP-date can express, 9999-12-31T23:59:59Z.
const MAX_HTTP_DATE_SECS: u64 = 253_402_300_799;

/// `time` if it can be written as an HTTP-date. Times before 1970 or past
/// year 9999 have no representation, so they never validate.
fn http_date(time: SystemTime) -> Option<SystemTime> {
    let secs = time.duration_since(UNIX_EPOCH).ok()?.as_secs();
    (secs <= MAX_HTTP_DATE_SECS).then_some(time)
}

/// `inline` disposition naming the file, so browsers render instead of download.
///
/// Anything that is not printable ASCII is replaced in `filename` and the
/// original is carried in `filename*` (RFC 6266).
pub fn inline_disposition(filename: &str) -> String {
    if filename.is_empty() {
        return "inline".to_string();
    }

    let fallback: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c == ' ' || c.is_ascii_graphic() => c,
            _ => '_',
        })
        .collect();

    if fallback == filename {
        format!("inline; filename=\"{fallback}\"")
    } else {
        format!("inline; filename=\"{fallback}\"; filename*=UTF-8''{}", urlencoding::encode(filename))
    }
}
