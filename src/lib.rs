//! # axum-range-responder
//!
//! HTTP range and conditional responses for media served through [`axum`][1].
//!
//! The decision about how to answer a request lives in [`RangeResponder`],
//! a pure function of a [`ResourceDescriptor`] (what storage knows about the
//! file) and a [`RangeRequest`] (the `Range`, `If-None-Match`,
//! `If-Modified-Since` and `If-Range` headers). It yields a
//! [`ResponseDecision`], the header set, and the [`ByteWindow`] to stream.
//!
//! [`Ranged`] glues that to a body: any type implementing both
//! [`AsyncRead`] and [`AsyncSeekStart`] can be used through the
//! [`KnownSize`] adapter, with special cased support for
//! [`tokio::fs::File`], see [`KnownSize::file`].
//!
//! [`AsyncSeekStart`] is a trait defined by this crate which only allows
//! seeking from the start of a file. It is automatically implemented for any
//! type implementing [`AsyncSeek`].
//!
//! ```
//! use axum::Router;
//! use axum::extract::Path;
//! use axum::http::{Method, StatusCode};
//! use axum::response::{IntoResponse, Response};
//! use axum::routing::get;
//!
//! use axum_range_responder::{KnownSize, RangeRequest, Ranged, ResourceDescriptor};
//!
//! async fn media(method: Method, Path(name): Path<String>, request: RangeRequest) -> Response {
//!     let path = std::path::Path::new("uploads").join(&name);
//!     let Ok(file) = tokio::fs::File::open(&path).await else {
//!         return StatusCode::NOT_FOUND.into_response();
//!     };
//!     let descriptor = match file.metadata().await {
//!         Ok(metadata) => ResourceDescriptor::from_metadata(&metadata, name),
//!         Err(e) => Err(e),
//!     };
//!     match (descriptor, KnownSize::file(file).await) {
//!         (Ok(descriptor), Ok(body)) => Ranged::new(descriptor, request, body)
//!             .head_only(method == Method::HEAD)
//!             .into_response(),
//!         _ => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
//!     }
//! }
//!
//! let _app = Router::<()>::new().route("/media/{name}", get(media));
//! ```
//!
//! [1]: https://docs.rs/axum

mod config;
mod descriptor;
mod error;
mod file;
mod range;
mod request;
mod responder;
mod stream;

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::response::{IntoResponse, Response};
use tokio::io::{AsyncRead, AsyncSeek};

pub use config::{CacheConfig, CacheTier, ResponderConfig};
pub use descriptor::{range_capable, strong_etag, ResourceDescriptor};
pub use error::{RangeParseError, RespondError};
pub use file::KnownSize;
pub use range::{parse_range_header, ByteWindow};
pub use request::RangeRequest;
pub use responder::{inline_disposition, RangeResponder, ResponseDecision, ResponseHead};
pub use stream::RangedStream;

/// [`AsyncSeek`] narrowed to only allow seeking from start.
pub trait AsyncSeekStart {
    /// Same semantics as [`AsyncSeek::start_seek`], always passing position as the `SeekFrom::Start` variant.
    fn start_seek(self: Pin<&mut Self>, position: u64) -> io::Result<()>;

    /// Same semantics as [`AsyncSeek::poll_complete`], returning `()` instead of the new stream position.
    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>>;
}

impl<T: AsyncSeek> AsyncSeekStart for T {
    fn start_seek(self: Pin<&mut Self>, position: u64) -> io::Result<()> {
        AsyncSeek::start_seek(self, io::SeekFrom::Start(position))
    }

    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        AsyncSeek::poll_complete(self, cx).map_ok(|_| ())
    }
}

/// An [`AsyncRead`] and [`AsyncSeekStart`] with a fixed known byte size.
pub trait RangeBody: AsyncRead + AsyncSeekStart {
    /// The total size of the underlying file.
    ///
    /// This should not change for the lifetime of the object once queried.
    /// Behaviour is not guaranteed if it does change.
    fn byte_size(&self) -> u64;
}

/// The main responder type. Implements [`IntoResponse`].
#[derive(Debug)]
pub struct Ranged<B: RangeBody + Send + 'static> {
    responder: RangeResponder,
    resource: ResourceDescriptor,
    request: RangeRequest,
    body: B,
    head_only: bool,
}

impl<B: RangeBody + Send + 'static> Ranged<B> {
    /// Construct a response for `request` over `body`, described by `resource`.
    ///
    /// Uses a [`RangeResponder`] with default settings, see [`Ranged::responder`].
    pub fn new(resource: ResourceDescriptor, request: RangeRequest, body: B) -> Self {
        Ranged {
            responder: RangeResponder::default(),
            resource,
            request,
            body,
            head_only: false,
        }
    }

    /// Use a configured responder instead of the default one.
    pub fn responder(mut self, responder: RangeResponder) -> Self {
        self.responder = responder;
        self
    }

    /// Answer with headers only, as for a `HEAD` request.
    pub fn head_only(mut self, head_only: bool) -> Self {
        self.head_only = head_only;
        self
    }

    /// Responds to the request, returning headers and body as
    /// [`RangedResponse`]. Fails only when the descriptor holds values that
    /// cannot be sent as header values.
    pub fn try_respond(self) -> Result<RangedResponse<B>, RespondError> {
        if self.body.byte_size() != self.resource.total_size {
            tracing::warn!(
                descriptor = self.resource.total_size,
                body = self.body.byte_size(),
                "resource size disagrees with body size"
            );
        }

        let head = self.responder.respond(&self.resource, &self.request)?;
        let stream = match head.body {
            Some(window) if !self.head_only => Some(RangedStream::window(self.body, window)),
            _ => None,
        };

        Ok(RangedResponse { head, stream })
    }
}

impl<B: RangeBody + Send + 'static> IntoResponse for Ranged<B> {
    fn into_response(self) -> Response {
        self.try_respond().into_response()
    }
}

/// Data type containing computed headers and body for a range response. Implements [`IntoResponse`].
#[derive(Debug)]
pub struct RangedResponse<B> {
    pub head: ResponseHead,
    /// `None` for 304, 416, `HEAD` and empty resources.
    pub stream: Option<RangedStream<B>>,
}

impl<B: RangeBody + Send + 'static> IntoResponse for RangedResponse<B> {
    fn into_response(self) -> Response {
        let body = match self.stream {
            Some(stream) => axum::body::Body::new(stream),
            None => axum::body::Body::empty(),
        };

        let mut response = Response::new(body);
        *response.status_mut() = self.head.status;
        *response.headers_mut() = self.head.headers;
        response
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::time::{Duration, UNIX_EPOCH};

    use assert_matches::assert_matches;
    use axum::body::to_bytes;
    use axum::http::{HeaderValue, StatusCode};
    use bytes::Bytes;
    use tokio::fs::File;

    use super::*;

    const CONTENT: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
    const ETAG: &str = "\"abc-3e\"";

    fn descriptor(content_type: &str) -> ResourceDescriptor {
        let modified = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        ResourceDescriptor::new(CONTENT.len() as u64, content_type, modified, ETAG, "alphabet.webm")
    }

    fn body() -> KnownSize<Cursor<&'static [u8]>> {
        KnownSize::sized(Cursor::new(CONTENT.as_bytes()), CONTENT.len() as u64)
    }

    fn ranged(header: &str) -> RangeRequest {
        RangeRequest::default().with_range(header)
    }

    async fn send(ranged: Ranged<impl RangeBody + Send + 'static>) -> (StatusCode, axum::http::HeaderMap, Bytes) {
        let response = ranged.into_response();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, body)
    }

    #[tokio::test]
    async fn test_full_response() {
        let (status, head, body) = send(Ranged::new(descriptor("video/webm"), RangeRequest::default(), body())).await;

        assert_eq!(StatusCode::OK, status);
        assert_eq!(Some(&HeaderValue::from_static("bytes")), head.get("accept-ranges"));
        assert_eq!(Some(&HeaderValue::from_static("62")), head.get("content-length"));
        assert_eq!(None, head.get("content-range"));
        assert_eq!(CONTENT.as_bytes(), &body[..]);
    }

    #[tokio::test]
    async fn test_partial_response() {
        let (status, head, body) = send(Ranged::new(descriptor("video/webm"), ranged("bytes=10-19"), body())).await;

        assert_eq!(StatusCode::PARTIAL_CONTENT, status);
        assert_eq!(Some(&HeaderValue::from_static("bytes 10-19/62")), head.get("content-range"));
        assert_eq!(Some(&HeaderValue::from_static("10")), head.get("content-length"));
        assert_eq!(b"ABCDEFGHIJ", &body[..]);
    }

    #[tokio::test]
    async fn test_suffix_and_open_ranges() {
        let (_, _, suffix) = send(Ranged::new(descriptor("video/webm"), ranged("bytes=-5"), body())).await;
        assert_eq!(b"vwxyz", &suffix[..]);

        let (_, head, open) = send(Ranged::new(descriptor("video/webm"), ranged("bytes=50-"), body())).await;
        assert_eq!(Some(&HeaderValue::from_static("bytes 50-61/62")), head.get("content-range"));
        assert_eq!(b"opqrstuvwxyz", &open[..]);
    }

    #[tokio::test]
    async fn test_coalesced_ranges() {
        let (status, head, body) = send(Ranged::new(descriptor("video/webm"), ranged("bytes=0-4,3-9"), body())).await;
        assert_eq!(StatusCode::PARTIAL_CONTENT, status);
        assert_eq!(Some(&HeaderValue::from_static("bytes 0-9/62")), head.get("content-range"));
        assert_eq!(b"0123456789", &body[..]);
    }

    #[tokio::test]
    async fn test_not_satisfiable_response() {
        let (status, head, body) = send(Ranged::new(descriptor("video/webm"), ranged("bytes=99-"), body())).await;

        assert_eq!(StatusCode::RANGE_NOT_SATISFIABLE, status);
        assert_eq!(Some(&HeaderValue::from_static("bytes */62")), head.get("content-range"));
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_not_modified_response() {
        let request = ranged("bytes=0-9").with_if_none_match(ETAG);
        let (status, head, body) = send(Ranged::new(descriptor("video/webm"), request, body())).await;

        assert_eq!(StatusCode::NOT_MODIFIED, status);
        assert_eq!(Some(&HeaderValue::from_static(ETAG)), head.get("etag"));
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_range_serves_everything() {
        let (status, head, body) = send(Ranged::new(descriptor("video/webm"), ranged("pages=1-2"), body())).await;

        assert_eq!(StatusCode::OK, status);
        assert_eq!(Some(&HeaderValue::from_static("62")), head.get("content-length"));
        assert_eq!(CONTENT.as_bytes(), &body[..]);
    }

    #[tokio::test]
    async fn test_range_ignored_without_support() {
        let (status, head, body) = send(Ranged::new(descriptor("application/zip"), ranged("bytes=0-9"), body())).await;

        assert_eq!(StatusCode::OK, status);
        assert_eq!(None, head.get("accept-ranges"));
        assert_eq!(CONTENT.as_bytes(), &body[..]);
    }

    #[tokio::test]
    async fn test_head_only() {
        let ranged = Ranged::new(descriptor("video/webm"), ranged("bytes=0-9"), body()).head_only(true);
        let response = ranged.try_respond().unwrap();
        assert!(response.stream.is_none());

        let (status, head, body) = {
            let response = response.into_response();
            let status = response.status();
            let head = response.headers().clone();
            (status, head, to_bytes(response.into_body(), usize::MAX).await.unwrap())
        };
        assert_eq!(StatusCode::PARTIAL_CONTENT, status);
        assert_eq!(Some(&HeaderValue::from_static("10")), head.get("content-length"));
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_configured_responder() {
        let mut config = ResponderConfig::default();
        config.cache.media_max_age = 60;
        let responder = RangeResponder::new(config);

        let (_, head, _) = send(Ranged::new(descriptor("video/webm"), RangeRequest::default(), body()).responder(responder)).await;
        assert_eq!(
            Some(&HeaderValue::from_static("public, max-age=60, immutable")),
            head.get("cache-control")
        );
    }

    #[tokio::test]
    async fn test_invalid_header_values() {
        let mut resource = descriptor("video/webm");
        resource.original_filename = "line\nbreak.webm".to_string();
        let (status, head, _) = send(Ranged::new(resource, RangeRequest::default(), body())).await;

        assert_eq!(StatusCode::OK, status);
        assert_eq!(
            Some(&HeaderValue::from_static("inline; filename=\"line_break.webm\"; filename*=UTF-8''line%0Abreak.webm")),
            head.get("content-disposition")
        );

        let mut resource = descriptor("video/webm");
        resource.content_type = "video/webm\r\nx-injected: 1".to_string();
        let err = Ranged::new(resource, RangeRequest::default(), body()).try_respond().unwrap_err();
        assert_matches!(err, RespondError::InvalidHeader { .. });

        let mut resource = descriptor("video/webm");
        resource.etag = "\"\u{7f}\"".to_string();
        let (status, _, body) = send(Ranged::new(resource, RangeRequest::default(), body())).await;
        assert_eq!(StatusCode::INTERNAL_SERVER_ERROR, status);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_file_body() {
        let file = File::open("test/fixture.txt").await.unwrap();
        let metadata = file.metadata().await.unwrap();
        let resource = ResourceDescriptor::from_metadata(&metadata, "fixture.mp3").unwrap();
        let body = KnownSize::file(file).await.unwrap();

        let (status, head, body) = send(Ranged::new(resource, ranged("bytes=30-53"), body)).await;
        assert_eq!(StatusCode::PARTIAL_CONTENT, status);
        assert_eq!(Some(&HeaderValue::from_static("bytes 30-53/54")), head.get("content-range"));
        assert_eq!(Some(&HeaderValue::from_static("inline; filename=\"fixture.mp3\"")), head.get("content-disposition"));
        assert_eq!(b"test range requests on!\n", &body[..]);
    }

    #[tokio::test]
    async fn test_concurrent_ranges_over_one_file() {
        let ranges = [("bytes=0-4", "Hello"), ("bytes=6-10", "world"), ("bytes=-9", "ests on!\n"), ("bytes=30-33", "test")];

        let tasks = ranges.map(|(range, _)| {
            tokio::spawn(async move {
                let file = File::open("test/fixture.txt").await.unwrap();
                let metadata = file.metadata().await.unwrap();
                let resource = ResourceDescriptor::from_metadata(&metadata, "fixture.mp4").unwrap();
                let body = KnownSize::file(file).await.unwrap();
                send(Ranged::new(resource, ranged(range), body)).await.2
            })
        });

        for ((_, expected), task) in ranges.iter().zip(tasks) {
            assert_eq!(expected.as_bytes(), &task.await.unwrap()[..]);
        }
    }
}
