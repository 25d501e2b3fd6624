use std::convert::Infallible;
use std::time::SystemTime;

use axum::extract::FromRequestParts;
use axum::http::header::{HeaderName, IF_NONE_MATCH, IF_RANGE, RANGE};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum_extra::headers::{HeaderMapExt, IfModifiedSince};

/// The request headers the responder looks at.
///
/// Values that are not valid visible ASCII are dropped, which makes a
/// garbled validator a cache miss and a garbled `Range` a full response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeRequest {
    pub range: Option<String>,
    pub if_none_match: Option<String>,
    pub if_modified_since: Option<SystemTime>,
    /// `If-Range`, either an entity tag or an HTTP-date.
    pub if_range: Option<String>,
}

impl RangeRequest {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let text = |name: HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.trim().to_string())
        };

        RangeRequest {
            range: text(RANGE),
            if_none_match: text(IF_NONE_MATCH),
            if_modified_since: headers.typed_get::<IfModifiedSince>().map(SystemTime::from),
            if_range: text(IF_RANGE),
        }
    }

    pub fn with_range(mut self, range: impl Into<String>) -> Self {
        self.range = Some(range.into());
        self
    }

    pub fn with_if_none_match(mut self, etag: impl Into<String>) -> Self {
        self.if_none_match = Some(etag.into());
        self
    }

    pub fn with_if_modified_since(mut self, since: SystemTime) -> Self {
        self.if_modified_since = Some(since);
        self
    }

    pub fn with_if_range(mut self, validator: impl Into<String>) -> Self {
        self.if_range = Some(validator.into());
        self
    }
}

impl<S: Send + Sync> FromRequestParts<S> for RangeRequest {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(RangeRequest::from_headers(&parts.headers))
    }
}
