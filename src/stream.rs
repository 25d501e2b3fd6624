use std::io;
use std::mem;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures::Stream;
use http_body::{Body, Frame, SizeHint};
use pin_project::{pin_project, pinned_drop};
use tokio::io::ReadBuf;

use crate::range::ByteWindow;
use crate::RangeBody;

const IO_BUFFER_SIZE: usize = 64 * 1024;

/// Response body stream over one window of a [`RangeBody`]. Implements
/// [`Stream`] and [`Body`].
///
/// Headers are already on the wire by the time this is polled, so a read
/// error ends the body early instead of changing the status. The error is
/// logged and yielded once, after which the stream is finished. Dropping the
/// stream (the client went away) drops the underlying reader.
#[pin_project(PinnedDrop)]
pub struct RangedStream<B> {
    state: StreamState,
    start: u64,
    length: u64,
    remaining: u64,
    #[pin]
    body: B,
}

impl<B: RangeBody + Send + 'static> RangedStream<B> {
    pub(crate) fn new(body: B, start: u64, length: u64) -> Self {
        RangedStream {
            state: StreamState::Seek,
            start,
            length,
            remaining: length,
            body,
        }
    }

    /// Streams exactly the bytes of `window`.
    pub fn window(body: B, window: ByteWindow) -> Self {
        RangedStream::new(body, window.start(), window.len())
    }
}

impl<B> std::fmt::Debug for RangedStream<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RangedStream")
            .field("state", &self.state)
            .field("start", &self.start)
            .field("remaining", &self.remaining)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
enum StreamState {
    Seek,
    Seeking,
    Reading { buffer: BytesMut },
    Done,
}

impl<B: RangeBody> Body for RangedStream<B> {
    type Data = Bytes;
    type Error = io::Error;

    fn size_hint(&self) -> SizeHint {
        SizeHint::with_exact(self.remaining)
    }

    fn is_end_stream(&self) -> bool {
        matches!(self.state, StreamState::Done)
    }

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>)
        -> Poll<Option<io::Result<Frame<Bytes>>>>
    {
        self.poll_next(cx).map(|item| item.map(|result| result.map(Frame::data)))
    }
}

impl<B: RangeBody> Stream for RangedStream<B> {
    type Item = io::Result<Bytes>;

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>
    ) -> Poll<Option<io::Result<Bytes>>> {
        let mut this = self.project();

        if *this.remaining == 0 {
            *this.state = StreamState::Done;
        }

        if let StreamState::Seek = *this.state {
            if let Err(e) = this.body.as_mut().start_seek(*this.start) {
                return abort(this.state, e, *this.start, *this.remaining);
            }
            *this.state = StreamState::Seeking;
        }

        if let StreamState::Seeking = *this.state {
            match this.body.as_mut().poll_complete(cx) {
                Poll::Pending => { return Poll::Pending; }
                Poll::Ready(Err(e)) => { return abort(this.state, e, *this.start, *this.remaining); }
                Poll::Ready(Ok(())) => {
                    *this.state = StreamState::Reading { buffer: allocate_buffer() };
                }
            }
        }

        if let StreamState::Reading { buffer } = this.state {
            let uninit = buffer.spare_capacity_mut();

            // read no further than the end of the window
            let nbytes = std::cmp::min(
                uninit.len(),
                usize::try_from(*this.remaining).unwrap_or(usize::MAX),
            );

            let mut read_buf = ReadBuf::uninit(&mut uninit[0..nbytes]);

            match this.body.as_mut().poll_read(cx, &mut read_buf) {
                Poll::Pending => { return Poll::Pending; }
                Poll::Ready(Err(e)) => { return abort(this.state, e, *this.start, *this.remaining); }
                Poll::Ready(Ok(())) => {
                    let n = read_buf.filled().len();
                    if n == 0 {
                        let e = io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "resource ended before the end of the byte window",
                        );
                        return abort(this.state, e, *this.start, *this.remaining);
                    }

                    // SAFETY: poll_read initialized the first `n` bytes of
                    // the spare capacity, and `buffer.len()` is 0 here
                    unsafe { buffer.set_len(buffer.len() + n); }

                    let chunk = mem::replace(buffer, allocate_buffer());

                    // n <= remaining because of the min above
                    *this.remaining -= n as u64;
                    if *this.remaining == 0 {
                        *this.state = StreamState::Done;
                    }

                    return Poll::Ready(Some(Ok(chunk.freeze())));
                }
            }
        }

        Poll::Ready(None)
    }
}

#[pinned_drop]
impl<B> PinnedDrop for RangedStream<B> {
    fn drop(self: Pin<&mut Self>) {
        if self.remaining > 0 && !matches!(self.state, StreamState::Done) {
            tracing::debug!(
                start = self.start,
                length = self.length,
                unsent = self.remaining,
                "range stream dropped before completion"
            );
        }
    }
}

/// Ends the stream after a read failure. The status line is already sent,
/// so all that is left is to log and cut the body short.
fn abort(state: &mut StreamState, error: io::Error, start: u64, remaining: u64) -> Poll<Option<io::Result<Bytes>>> {
    tracing::error!(%error, start, remaining, "aborting range stream after read failure");
    *state = StreamState::Done;
    Poll::Ready(Some(Err(error)))
}

fn allocate_buffer() -> BytesMut {
    BytesMut::with_capacity(IO_BUFFER_SIZE)
}
