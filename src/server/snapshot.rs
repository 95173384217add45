//! Snapshot frame selection and JPEG re-encoding

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::ImageFormat;

use crate::capture::{CaptureLoop, VideoFrame};
use crate::device::CaptureDevice;
use crate::error::{Error, Result};

/// Wait for the snapshot's target frame
///
/// On a freshly started loop (frame counter still zero) the first
/// `warmup_frames` frames are waited for and dropped; compressed-frame
/// encoders often emit an unstable first frame. A loop that has already
/// been pumping skips the warm-up and takes the next frame directly.
pub async fn snapshot_frame<D: CaptureDevice>(
    cam: &CaptureLoop<D>,
    warmup_frames: u32,
) -> Result<VideoFrame> {
    if cam.frames() == 0 {
        for _ in 0..warmup_frames {
            cam.next_frame().await?;
        }
    }

    cam.next_frame().await
}

/// Re-encode one JPEG frame at the given quality
///
/// CPU-bound; callers run it on a blocking thread.
pub fn reencode_jpeg(data: &[u8], quality: u8) -> Result<Bytes> {
    let img = image::load_from_memory_with_format(data, ImageFormat::Jpeg)
        .map_err(|e| Error::Internal(format!("failed to decode frame: {}", e)))?;

    let mut out = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut out, quality);
    encoder
        .encode_image(&img)
        .map_err(|e| Error::Internal(format!("failed to encode snapshot: {}", e)))?;

    Ok(Bytes::from(out))
}
