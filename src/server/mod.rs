//! HTTP surface
//!
//! Thin axum layer over the registry: a camera listing, a format query,
//! the MJPEG multipart stream and a single-frame snapshot. All the real
//! work happens in [`registry`](crate::registry) and
//! [`capture`](crate::capture); handlers only acquire, subscribe and
//! release.

pub mod bootstrap;
pub mod config;
pub mod mjpeg;
pub mod routes;
pub mod snapshot;

pub use bootstrap::{bootstrap_cameras, CameraSpec, Resolution, ResolutionOverride};
pub use config::ServerConfig;
pub use routes::create_router;

use std::sync::Arc;

use crate::device::CaptureDevice;
use crate::error::Result;
use crate::registry::CameraRegistry;

/// Run the HTTP server until it fails or the registry signals shutdown
///
/// The shutdown signal fires when any camera's pump faults; the whole
/// service goes down with it.
pub async fn run_server<D: CaptureDevice>(
    config: ServerConfig,
    registry: Arc<CameraRegistry<D>>,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "Camera server listening");

    let app = create_router(Arc::clone(&registry), config);
    let mut shutdown = registry.shutdown_watch();

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|fired| *fired).await;
            tracing::info!("Shutdown signal received, stopping server");
        })
        .await?;

    Ok(())
}
