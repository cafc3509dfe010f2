//! Response body interception
//!
//! `CapturingBody` sits between the upstream response body and the client.
//! Every data frame is forwarded untouched and in order while a copy of its
//! bytes is appended to a buffer. When the stream ends, fails, or is dropped
//! because the client went away, the buffered bytes are handed to a
//! completion callback exactly once.

use crate::infrastructure::log_messages::request_processing as messages;
use crate::proxy::headers::{CONTENT_ENCODING, GZIP_ENCODING};
use crate::proxy::sanitizer::sanitize;
use bytes::{Bytes, BytesMut};
use flate2::read::MultiGzDecoder;
use http::HeaderMap;
use http_body::{Body, Frame, SizeHint};
use pin_project_lite::pin_project;
use std::io::Read;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tracing::warn;

/// Raw bytes observed on a response stream
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapturedBody {
    pub bytes: Bytes,
    /// Upstream declared `content-encoding: gzip`
    pub gzip: bool,
    /// The stream reached its end rather than failing or being dropped
    pub complete: bool,
}

impl CapturedBody {
    /// Decode and sanitize the captured copy for persistence
    ///
    /// A gzip body that cannot be decompressed yields an empty string.
    pub fn into_text(self) -> String {
        match decode_captured(&self.bytes, self.gzip) {
            Ok(text) => sanitize(&text),
            Err(error) => {
                warn!(
                    error = %error,
                    complete = self.complete,
                    "{}",
                    messages::CAPTURE_DECODE_FAILED
                );
                String::new()
            }
        }
    }
}

/// Turn captured bytes into text, gunzipping first when declared
pub fn decode_captured(bytes: &[u8], gzip: bool) -> std::io::Result<String> {
    if !gzip {
        return Ok(String::from_utf8_lossy(bytes).into_owned());
    }

    let mut decoded = Vec::new();
    MultiGzDecoder::new(bytes).read_to_end(&mut decoded)?;
    Ok(String::from_utf8_lossy(&decoded).into_owned())
}

/// Whether the response headers declare a gzip content encoding
pub fn is_gzip_encoded(headers: &HeaderMap) -> bool {
    headers
        .get_all(CONTENT_ENCODING)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .any(|coding| {
            coding.eq_ignore_ascii_case(GZIP_ENCODING) || coding.eq_ignore_ascii_case("x-gzip")
        })
}

type CompletionCallback = Box<dyn FnOnce(CapturedBody) + Send + 'static>;

/// Buffer plus one-shot completion callback
///
/// Dropping an unfinished capture flushes whatever was buffered, so a client
/// disconnect still produces a (partial) body.
pub struct ResponseCapture {
    buffer: BytesMut,
    gzip: bool,
    on_complete: Option<CompletionCallback>,
}

impl ResponseCapture {
    pub fn new(gzip: bool, on_complete: impl FnOnce(CapturedBody) + Send + 'static) -> Self {
        Self {
            buffer: BytesMut::new(),
            gzip,
            on_complete: Some(Box::new(on_complete)),
        }
    }

    fn record(&mut self, chunk: &[u8]) {
        if self.on_complete.is_some() {
            self.buffer.extend_from_slice(chunk);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.on_complete.is_none()
    }

    fn finish(&mut self, complete: bool) {
        if let Some(on_complete) = self.on_complete.take() {
            if !complete {
                warn!(captured_bytes = self.buffer.len(), "{}", messages::CAPTURE_INCOMPLETE);
            }
            let bytes = std::mem::take(&mut self.buffer).freeze();
            on_complete(CapturedBody {
                bytes,
                gzip: self.gzip,
                complete,
            });
        }
    }
}

impl Drop for ResponseCapture {
    fn drop(&mut self) {
        self.finish(false);
    }
}

impl std::fmt::Debug for ResponseCapture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCapture")
            .field("buffered", &self.buffer.len())
            .field("gzip", &self.gzip)
            .field("finished", &self.is_finished())
            .finish()
    }
}

pin_project! {
    /// Body decorator that mirrors every data frame into a `ResponseCapture`
    pub struct CapturingBody<B> {
        #[pin]
        inner: B,
        capture: ResponseCapture,
    }
}

impl<B> CapturingBody<B>
where
    B: Body<Data = Bytes>,
{
    pub fn new(
        body: B,
        gzip: bool,
        on_complete: impl FnOnce(CapturedBody) + Send + 'static,
    ) -> Self {
        Self {
            inner: body,
            capture: ResponseCapture::new(gzip, on_complete),
        }
    }
}

impl<B> Body for CapturingBody<B>
where
    B: Body<Data = Bytes>,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.project();

        match ready!(this.inner.poll_frame(cx)) {
            Some(Ok(frame)) => {
                if let Some(data) = frame.data_ref() {
                    this.capture.record(data);
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Some(Err(error)) => {
                this.capture.finish(false);
                Poll::Ready(Some(Err(error)))
            }
            None => {
                this.capture.finish(true);
                Poll::Ready(None)
            }
        }
    }

    // The end is only reported once it has been observed through
    // `poll_frame`, so the completion callback always runs there.
    fn is_end_stream(&self) -> bool {
        self.capture.is_finished() && self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
