//! Capture device abstraction
//!
//! The actual ioctl layer (V4L2 or otherwise) lives outside this crate.
//! Everything here talks to a [`CaptureDevice`]: an exclusively owned
//! handle that negotiates a pixel format, turns streaming on and off, and
//! yields one encoded frame per [`CaptureDevice::next_frame`] call.

pub mod pattern;

pub use pattern::TestPatternDevice;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Serialize, Serializer};

use crate::error::Result;

/// Four-character pixel format code, as reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelFormat(pub [u8; 4]);

impl PixelFormat {
    /// Motion-JPEG, the only format the server negotiates
    pub const MJPEG: PixelFormat = PixelFormat(*b"MJPG");

    /// Uncompressed YUV 4:2:2, common on cheap webcams
    pub const YUYV: PixelFormat = PixelFormat(*b"YUYV");

    /// Raw fourcc bytes
    pub fn fourcc(&self) -> [u8; 4] {
        self.0
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for b in self.0 {
            write!(f, "{}", b as char)?;
        }
        Ok(())
    }
}

impl Serialize for PixelFormat {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

/// Negotiated frame format of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrameFormat {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Pixel format fourcc
    #[serde(rename = "pixelFormat")]
    pub pixel_format: PixelFormat,
}

impl FrameFormat {
    /// Motion-JPEG format at the given resolution
    pub fn mjpeg(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixel_format: PixelFormat::MJPEG,
        }
    }
}

/// One physical capture device
///
/// Exclusively owned by its [`CaptureLoop`](crate::capture::CaptureLoop)
/// for the lifetime of the camera entry. `next_frame` may suspend
/// indefinitely; it is the natural backpressure point of the pump.
#[async_trait]
pub trait CaptureDevice: Send + 'static {
    /// Request the given format; the device may negotiate something else,
    /// which a subsequent [`query_format`](Self::query_format) reveals
    fn set_format(&mut self, format: FrameFormat) -> Result<()>;

    /// Currently negotiated format
    fn query_format(&self) -> Result<FrameFormat>;

    /// Turn streaming on
    fn start(&mut self) -> Result<()>;

    /// Turn streaming off
    fn stop(&mut self) -> Result<()>;

    /// Pull the next encoded frame; may suspend indefinitely
    async fn next_frame(&mut self) -> Result<Bytes>;

    /// Release the underlying handle; best-effort, called once on teardown
    fn close(&mut self);
}
