//! Synthetic capture device
//!
//! Generates a moving grayscale gradient, encoded as MJPEG, at a fixed
//! rate. Used by the demo binary and by tests that need real JPEG frames
//! without camera hardware. Always negotiates exactly the requested
//! format.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::GrayImage;

use crate::error::{Error, Result};

use super::{CaptureDevice, FrameFormat};

/// Hardware-free device producing test-pattern JPEG frames
pub struct TestPatternDevice {
    format: FrameFormat,
    interval: Duration,
    ticks: u64,
    streaming: bool,
    open: bool,
}

impl TestPatternDevice {
    /// Create a pattern source emitting `fps` frames per second
    pub fn new(fps: u32) -> Self {
        Self {
            format: FrameFormat::mjpeg(320, 240),
            interval: Duration::from_millis(1000 / u64::from(fps.max(1))),
            ticks: 0,
            streaming: false,
            open: true,
        }
    }

    fn render(&self) -> Result<Bytes> {
        let shift = (self.ticks * 8) as u32;
        let img = GrayImage::from_fn(self.format.width, self.format.height, |x, y| {
            image::Luma([((x + y + shift) % 256) as u8])
        });

        let mut out = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut out, 80);
        encoder
            .encode_image(&image::DynamicImage::ImageLuma8(img))
            .map_err(Error::device)?;

        Ok(Bytes::from(out))
    }
}

#[async_trait]
impl CaptureDevice for TestPatternDevice {
    fn set_format(&mut self, format: FrameFormat) -> Result<()> {
        if !self.open {
            return Err(Error::Device("device is closed".to_string()));
        }
        self.format = format;
        Ok(())
    }

    fn query_format(&self) -> Result<FrameFormat> {
        if !self.open {
            return Err(Error::Device("device is closed".to_string()));
        }
        Ok(self.format)
    }

    fn start(&mut self) -> Result<()> {
        if !self.open {
            return Err(Error::Device("device is closed".to_string()));
        }
        self.streaming = true;
        self.ticks = 0;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.streaming = false;
        Ok(())
    }

    async fn next_frame(&mut self) -> Result<Bytes> {
        if !self.streaming {
            return Err(Error::Device("device is not streaming".to_string()));
        }

        tokio::time::sleep(self.interval).await;
        let frame = self.render()?;
        self.ticks += 1;
        Ok(frame)
    }

    fn close(&mut self) {
        self.streaming = false;
        self.open = false;
    }
}
