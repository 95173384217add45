//! Camera registry implementation
//!
//! The central registry that owns every camera entry, mediates device
//! configuration and reacts to fatal pump errors.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, RwLock};

use crate::capture::CaptureLoop;
use crate::device::{CaptureDevice, FrameFormat};
use crate::error::{Error, Result};

use super::entry::{CameraEntry, CameraListing};

/// Device opener installed at registry construction
///
/// Keeps the actual ioctl layer out of this crate: whoever builds the
/// registry decides how a path becomes a device handle.
pub type DeviceOpener<D> = dyn Fn(&str) -> Result<D> + Send + Sync;

/// Central registry for all cameras of one server process
///
/// Names are unique at any point in time; a name removed by the error
/// path is immediately available again. Read-heavy via `RwLock`: every
/// HTTP-facing operation is a lookup, the map is only written by `open`
/// and by teardown.
pub struct CameraRegistry<D> {
    /// Map of camera name to entry
    cameras: RwLock<HashMap<String, Arc<CameraEntry<D>>>>,

    /// Turns a source path into an opened device handle
    opener: Box<DeviceOpener<D>>,

    /// Fan-out capacity for each entry's capture loop
    broadcast_capacity: usize,

    /// Raised once by the fault path; the hosting binary observes it
    shutdown_tx: watch::Sender<bool>,

    /// Guards the teardown so a fault is acted on exactly once
    teardown_started: AtomicBool,
}

impl<D: CaptureDevice> CameraRegistry<D> {
    /// Create an empty registry around a device opener
    pub fn new<F>(opener: F) -> Self
    where
        F: Fn(&str) -> Result<D> + Send + Sync + 'static,
    {
        Self {
            cameras: RwLock::new(HashMap::new()),
            opener: Box::new(opener),
            broadcast_capacity: 16,
            shutdown_tx: watch::channel(false).0,
            teardown_started: AtomicBool::new(false),
        }
    }

    /// Set the per-camera broadcast channel capacity
    pub fn broadcast_capacity(mut self, capacity: usize) -> Self {
        self.broadcast_capacity = capacity;
        self
    }

    /// Observe the fatal-error shutdown signal
    ///
    /// A capture failure on any camera tears the whole service down; the
    /// registry raises this signal instead of exiting the process itself,
    /// leaving the final exit to the hosting binary.
    pub fn shutdown_watch(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Open a device and register it
    ///
    /// The name defaults to the final segment of `path`. Unlike lookup
    /// operations this fails with [`Error::Conflict`] on a duplicate
    /// name. Returns the assigned name.
    pub async fn open(self: &Arc<Self>, path: &str, name: Option<&str>) -> Result<String> {
        let name = match name {
            Some(name) => name.to_string(),
            None => basename(path).to_string(),
        };

        tracing::info!(camera = %name, path = %path, "Opening camera");

        let mut cameras = self.cameras.write().await;
        if cameras.contains_key(&name) {
            return Err(Error::Conflict(name));
        }

        let device = (self.opener)(path)?;
        let entry = Arc::new(CameraEntry::new(
            name.clone(),
            path.to_string(),
            device,
            self.broadcast_capacity,
        ));

        self.spawn_fault_listener(&entry);
        cameras.insert(name.clone(), entry);

        Ok(name)
    }

    /// Negotiate `width`x`height` MJPEG on a registered camera
    pub async fn configure(&self, name: &str, width: u32, height: u32) -> Result<()> {
        tracing::info!(camera = %name, width, height, "Setting camera resolution");

        let entry = self.get(name).await?;
        entry.configure(width, height).await
    }

    /// The camera's currently negotiated format
    pub async fn query_format(&self, name: &str) -> Result<FrameFormat> {
        let entry = self.get(name).await?;
        entry.query_format().await
    }

    /// Acquire the camera's capture loop, starting it if idle
    ///
    /// Concurrent acquires are safe: starting an already-running loop is
    /// a no-op. The caller subscribes to the returned loop and must pair
    /// this with a [`release`](Self::release) when done.
    pub async fn acquire(&self, name: &str) -> Result<Arc<CaptureLoop<D>>> {
        let entry = self.get(name).await?;
        let capture = entry.capture();

        if !capture.is_running() {
            tracing::debug!(camera = %name, "Starting capture loop on demand");
        }
        capture.start();

        Ok(Arc::clone(capture))
    }

    /// Release one consumer's claim on the camera's capture loop
    ///
    /// Stops the loop iff it is running and has zero live subscribers at
    /// this very moment. Callers must drop their subscription before
    /// releasing, or the demand check will count them as still active.
    pub async fn release(&self, name: &str) -> Result<()> {
        let entry = self.get(name).await?;
        let capture = entry.capture();

        if capture.is_running() && capture.subscriber_count() == 0 {
            tracing::debug!(camera = %name, "No subscribers left, stopping capture loop");
            capture.stop();
        }

        Ok(())
    }

    /// List every registered camera with its derived endpoints
    ///
    /// Pure projection, no side effects. Sorted by name for stable output.
    pub async fn list(&self) -> Vec<CameraListing> {
        let cameras = self.cameras.read().await;

        let mut listings: Vec<CameraListing> =
            cameras.values().map(|entry| entry.listing()).collect();
        listings.sort_by(|a, b| a.name.cmp(&b.name));
        listings
    }

    /// Number of registered cameras
    pub async fn camera_count(&self) -> usize {
        self.cameras.read().await.len()
    }

    /// Tear down every entry and raise the shutdown signal
    ///
    /// Stops each loop and waits for its pump to terminate, closes each
    /// device, and clears the map. Runs at most once; later calls (e.g. a
    /// second camera faulting during teardown) are no-ops.
    pub async fn shutdown(&self) {
        if self.teardown_started.swap(true, Ordering::SeqCst) {
            return;
        }

        let entries: Vec<Arc<CameraEntry<D>>> = {
            let mut cameras = self.cameras.write().await;
            cameras.drain().map(|(_, entry)| entry).collect()
        };

        for entry in entries {
            tracing::info!(camera = %entry.name(), "Closing camera");
            entry.capture().stop_and_wait().await;
            entry.close_device().await;
        }

        let _ = self.shutdown_tx.send(true);
    }

    async fn get(&self, name: &str) -> Result<Arc<CameraEntry<D>>> {
        let cameras = self.cameras.read().await;
        cameras
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound("camera".to_string()))
    }

    /// Installed at open time: a pump fault on any camera is fatal to the
    /// whole service
    fn spawn_fault_listener(self: &Arc<Self>, entry: &Arc<CameraEntry<D>>) {
        let registry = Arc::clone(self);
        let name = entry.name().to_string();
        let mut fault_rx = entry.capture().fault_watch();

        tokio::spawn(async move {
            loop {
                if fault_rx.changed().await.is_err() {
                    return;
                }

                // The watch also fires when a restart clears the fault.
                let fault = fault_rx.borrow_and_update().clone();
                if let Some(err) = fault {
                    tracing::error!(
                        camera = %name,
                        error = %err,
                        "Camera encountered an error, shutting down"
                    );
                    registry.shutdown().await;
                    return;
                }
            }
        });
    }
}

/// Final path segment, the default camera name
fn basename(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return path;
    }
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}
