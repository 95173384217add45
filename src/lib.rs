//! On-demand MJPEG camera streaming server
//!
//! Exposes video capture devices over HTTP: a format query, a continuous
//! MJPEG multipart stream and a single-frame snapshot. The core is the
//! camera stream multiplexer: each device gets one reference-counted
//! capture loop that starts when the first consumer acquires it, fans
//! every frame out to all current subscribers, and stops when the last
//! subscriber is gone.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use camserve_rs::{CameraRegistry, ServerConfig, TestPatternDevice};
//!
//! #[tokio::main]
//! async fn main() -> camserve_rs::Result<()> {
//!     let registry = Arc::new(CameraRegistry::new(|_path| Ok(TestPatternDevice::new(30))));
//!
//!     registry.open("/dev/video0", Some("cam0")).await?;
//!     registry.configure("cam0", 640, 480).await?;
//!
//!     camserve_rs::run_server(ServerConfig::default(), registry).await
//! }
//! ```

pub mod capture;
pub mod device;
pub mod error;
pub mod registry;
pub mod server;

pub use capture::{CaptureLoop, LoopState, VideoFrame};
pub use device::{CaptureDevice, FrameFormat, PixelFormat, TestPatternDevice};
pub use error::{Error, Result};
pub use registry::{CameraListing, CameraRegistry};
pub use server::{
    bootstrap_cameras, create_router, run_server, CameraSpec, Resolution, ResolutionOverride,
    ServerConfig,
};
