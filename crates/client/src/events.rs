//! `text/event-stream` responses as a stream of decoded frames.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use fleet_core::{FrameDecoder, StreamEvent, WaitError};
use futures::stream::{BoxStream, Stream, StreamExt};
use tracing::trace;

use crate::error::ClientError;

/// Pulls body chunks on demand and yields every complete frame.
///
/// Bytes after the last terminator are dropped when the body ends. A read
/// error is yielded once and ends the stream.
pub struct SseStream {
    chunks: BoxStream<'static, Result<Bytes, WaitError>>,
    decoder: FrameDecoder,
    done: bool,
}

impl SseStream {
    pub fn new(response: reqwest::Response) -> Self {
        Self::from_chunks(
            response
                .bytes_stream()
                .map(|chunk| chunk.map_err(|e| ClientError::Http(e).into())),
        )
    }

    pub fn from_chunks<S>(chunks: S) -> Self
    where
        S: Stream<Item = Result<Bytes, WaitError>> + Send + 'static,
    {
        Self {
            chunks: chunks.boxed(),
            decoder: FrameDecoder::new(),
            done: false,
        }
    }
}

impl Stream for SseStream {
    type Item = Result<StreamEvent, WaitError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(event) = self.decoder.next_event() {
                return Poll::Ready(Some(Ok(event)));
            }
            if self.done {
                return Poll::Ready(None);
            }
            match self.chunks.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => self.decoder.push(&chunk),
                Poll::Ready(Some(Err(err))) => {
                    self.done = true;
                    return Poll::Ready(Some(Err(err)));
                }
                Poll::Ready(None) => {
                    trace!(leftover = self.decoder.buffered(), "event stream closed");
                    self.done = true;
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
