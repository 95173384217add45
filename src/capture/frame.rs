//! Broadcast frame type

use bytes::Bytes;

/// One encoded frame as pulled from a capture device
///
/// Cheap to clone: the payload is reference counted, so broadcasting to N
/// subscribers never copies the pixel data.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Encoded frame payload (MJPEG: one complete JPEG image)
    pub data: Bytes,
    /// Zero-based position in the pump run that emitted this frame;
    /// resets when the capture loop restarts
    pub sequence: u64,
}

impl VideoFrame {
    /// Create a frame
    pub fn new(data: Bytes, sequence: u64) -> Self {
        Self { data, sequence }
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
