//! Per-camera registry entry

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};

use crate::capture::CaptureLoop;
use crate::device::{CaptureDevice, FrameFormat};
use crate::error::{Error, Result};

/// One registered camera: name, source path, device and capture loop
///
/// The device is shared between the entry (format negotiation) and the
/// capture loop (the pump); nothing else touches it. The negotiated
/// format is cached entry-side so queries answer immediately while the
/// pump holds the device across a frame pull.
pub struct CameraEntry<D> {
    name: String,
    path: String,
    device: Arc<Mutex<D>>,
    capture: Arc<CaptureLoop<D>>,
    format: RwLock<Option<FrameFormat>>,
}

impl<D: CaptureDevice> CameraEntry<D> {
    /// Wrap an opened device into an entry with an idle capture loop
    pub fn new(name: String, path: String, device: D, broadcast_capacity: usize) -> Self {
        let device = Arc::new(Mutex::new(device));
        let capture = Arc::new(CaptureLoop::new(Arc::clone(&device), broadcast_capacity));

        Self {
            name,
            path,
            device,
            capture,
            format: RwLock::new(None),
        }
    }

    /// Logical camera name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Source device path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The entry's capture loop
    pub fn capture(&self) -> &Arc<CaptureLoop<D>> {
        &self.capture
    }

    /// Negotiate `width`x`height` MJPEG on the device
    ///
    /// The device must accept exactly the requested codec and dimensions;
    /// there is no best-effort fallback. On a mismatch the cache reflects
    /// whatever the device actually negotiated, so subsequent queries see
    /// the device's real state rather than the rejected request.
    pub async fn configure(&self, width: u32, height: u32) -> Result<()> {
        let requested = FrameFormat::mjpeg(width, height);

        let mut device = self.device.lock().await;
        *self.format.write().await = None;
        device.set_format(requested)?;

        let negotiated = device.query_format()?;
        *self.format.write().await = Some(negotiated);
        drop(device);

        if negotiated.pixel_format != requested.pixel_format {
            return Err(Error::Internal(format!(
                "camera {} does not support the MJPG format",
                self.name
            )));
        }
        if negotiated.width != width || negotiated.height != height {
            return Err(Error::Internal(format!(
                "camera {} does not support the requested resolution",
                self.name
            )));
        }

        Ok(())
    }

    /// The device's currently negotiated format
    ///
    /// Served from the entry's cache when warm; only a cold query (no
    /// configure yet) touches the device, which may mean waiting out an
    /// in-flight frame pull.
    pub async fn query_format(&self) -> Result<FrameFormat> {
        if let Some(format) = *self.format.read().await {
            return Ok(format);
        }

        let device = self.device.lock().await;
        let format = device.query_format()?;
        *self.format.write().await = Some(format);

        Ok(format)
    }

    /// Release the underlying device handle; called once on teardown
    pub async fn close_device(&self) {
        self.device.lock().await.close();
    }

    /// Projection for the camera listing endpoint
    pub fn listing(&self) -> CameraListing {
        CameraListing {
            name: self.name.clone(),
            path: self.path.clone(),
            format_url: format!("/cam/{}", self.name),
            stream_url: format!("/cam/{}/stream", self.name),
            snapshot_url: format!("/cam/{}/snapshot", self.name),
        }
    }
}

/// Externally addressable description of one registered camera
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CameraListing {
    /// Logical camera name
    pub name: String,
    /// Source device path
    pub path: String,
    /// Format query endpoint
    #[serde(rename = "formatUrl")]
    pub format_url: String,
    /// MJPEG multipart stream endpoint
    #[serde(rename = "streamUrl")]
    pub stream_url: String,
    /// Single-frame snapshot endpoint
    #[serde(rename = "snapshotUrl")]
    pub snapshot_url: String,
}
