use axum::http::header::{HeaderName, InvalidHeaderValue};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::range::ByteWindow;

/// Reasons a `Range` header could not be turned into a byte window.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeParseError {
    /// Header has no `unit=ranges` structure at all.
    #[error("malformed range header: {0:?}")]
    Malformed(String),
    /// Unit other than `bytes`.
    #[error("unsupported range unit: {0:?}")]
    UnsupportedUnit(String),
    /// `bytes=` followed by no range specs.
    #[error("empty byte range set")]
    EmptySet,
    /// A byte-range-spec that does not match the grammar.
    #[error("invalid byte range spec: {0:?}")]
    InvalidSpec(String),
    /// `last-byte-pos` written before `first-byte-pos`.
    #[error("inverted byte range: {start}-{end}")]
    Inverted { start: u64, end: u64 },
    /// `bytes=-0`.
    #[error("zero-length suffix range")]
    ZeroSuffix,
    /// Every spec in the set started past the end of the resource.
    #[error("no satisfiable range for {total_size} bytes")]
    Unsatisfiable { total_size: u64 },
}

impl RangeParseError {
    /// Whether the header should be ignored rather than answered with 416.
    ///
    /// Headers that are not byte ranges at all fall back to the full
    /// resource so lenient clients keep working.
    pub fn is_lenient(&self) -> bool {
        matches!(self, RangeParseError::Malformed(_) | RangeParseError::UnsupportedUnit(_))
    }
}

/// Failure to assemble a response head from a descriptor.
#[derive(Debug, Error)]
pub enum RespondError {
    #[error("invalid value for {name} header")]
    InvalidHeader {
        name: HeaderName,
        #[source]
        source: InvalidHeaderValue,
    },
    #[error("cannot express {window:?} of {total_size} bytes as a content range")]
    InvalidContentRange { window: ByteWindow, total_size: u64 },
}

impl RespondError {
    pub(crate) fn invalid_header(name: HeaderName) -> impl FnOnce(InvalidHeaderValue) -> Self {
        move |source| RespondError::InvalidHeader { name, source }
    }
}

impl IntoResponse for RespondError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "failed to build range response");
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lenient_classification() {
        assert!(RangeParseError::Malformed("nope".into()).is_lenient());
        assert!(RangeParseError::UnsupportedUnit("items".into()).is_lenient());
        assert!(!RangeParseError::EmptySet.is_lenient());
        assert!(!RangeParseError::ZeroSuffix.is_lenient());
        assert!(!RangeParseError::InvalidSpec("a-b".into()).is_lenient());
        assert!(!RangeParseError::Inverted { start: 5, end: 1 }.is_lenient());
        assert!(!RangeParseError::Unsatisfiable { total_size: 10 }.is_lenient());
    }

    #[test]
    fn test_respond_error_is_500() {
        let source = axum::http::HeaderValue::from_str("bad\nvalue").unwrap_err();
        let err = RespondError::invalid_header(axum::http::header::ETAG)(source);
        assert_eq!("invalid value for etag header", err.to_string());
        assert_eq!(StatusCode::INTERNAL_SERVER_ERROR, err.into_response().status());

        let err = RespondError::InvalidContentRange {
            window: ByteWindow::new(0, 9, 10).unwrap(),
            total_size: 10,
        };
        assert_eq!(StatusCode::INTERNAL_SERVER_ERROR, err.into_response().status());
    }
}
