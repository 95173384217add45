//! Camera server demo
//!
//! Serves synthetic test-pattern cameras over HTTP, no hardware needed:
//!
//! ```text
//! cargo run --example camserve -- -c cam0:/dev/video0 -c /dev/video1 -r 640x480
//! ```
//!
//! Then open http://127.0.0.1:8080/cam/cam0/stream in a browser. A real
//! deployment provides a `CaptureDevice` implementation backed by the
//! platform's capture API in place of `TestPatternDevice`.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use camserve_rs::{
    bootstrap_cameras, run_server, CameraRegistry, CameraSpec, Resolution, ResolutionOverride,
    ServerConfig, TestPatternDevice,
};

#[derive(Parser, Debug)]
#[command(version, about = "On-demand MJPEG camera streaming server")]
struct Args {
    /// Address to run the server on
    #[arg(short, long, default_value = "0.0.0.0")]
    address: IpAddr,

    /// Port to run the server on
    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// Cameras to serve; prepend an alternative name with a colon
    /// (e.g. 'webcam:/dev/video0')
    #[arg(short, long = "camera", required = true)]
    cameras: Vec<CameraSpec>,

    /// Resolution to negotiate on every camera (WxH)
    #[arg(short, long)]
    resolution: Option<Resolution>,

    /// Per-camera resolution override (name=WxH), beats --resolution
    #[arg(long = "camera-resolution")]
    camera_resolutions: Vec<ResolutionOverride>,

    /// Frame rate of the synthetic test pattern
    #[arg(long, default_value_t = 15)]
    fps: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let fps = args.fps;

    let config = ServerConfig::with_addr(SocketAddr::new(args.address, args.port));
    let registry = Arc::new(
        CameraRegistry::new(move |_path| Ok(TestPatternDevice::new(fps)))
            .broadcast_capacity(config.broadcast_capacity),
    );

    let names = bootstrap_cameras(
        &registry,
        &args.cameras,
        args.resolution,
        &args.camera_resolutions,
    )
    .await?;
    info!(cameras = names.len(), "Cameras ready: {}", names.join(", "));

    run_server(config, registry).await?;

    Ok(())
}
