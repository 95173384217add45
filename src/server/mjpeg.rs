//! MJPEG multipart framing
//!
//! Each frame goes out as one part of a `multipart/x-mixed-replace`
//! stream. Browsers render this natively: `<img src="/cam/cam0/stream">`
//! updates in place without any client-side code.

use bytes::{BufMut, Bytes, BytesMut};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

use crate::capture::VideoFrame;

/// Part boundary; must not occur inside JPEG payloads
pub const BOUNDARY: &str = "frame";

/// Value of the response `Content-Type` header
pub fn content_type() -> String {
    format!("multipart/x-mixed-replace; boundary={}", BOUNDARY)
}

/// Encode one frame as a multipart part: boundary line, part headers,
/// payload, trailing CRLF
pub fn part_bytes(frame: &VideoFrame) -> Bytes {
    let header = format!(
        "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        BOUNDARY,
        frame.len()
    );

    let mut part = BytesMut::with_capacity(header.len() + frame.len() + 2);
    part.put_slice(header.as_bytes());
    part.put_slice(&frame.data);
    part.put_slice(b"\r\n");
    part.freeze()
}

/// Turn a frame subscription into a stream of multipart body chunks
///
/// A receiver that lags skips ahead to newer frames; there is no replay.
/// The stream runs until the consumer drops it.
pub fn part_stream(
    rx: broadcast::Receiver<VideoFrame>,
) -> impl Stream<Item = Result<Bytes, std::convert::Infallible>> + Send {
    BroadcastStream::new(rx).filter_map(|recv| match recv {
        Ok(frame) => Some(Ok(part_bytes(&frame))),
        // Lagged: drop the stale window and pick up the next frame.
        Err(_) => None,
    })
}
