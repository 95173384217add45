//! HTTP route handlers
//!
//! Handlers translate between HTTP and the registry: lookups map to 404,
//! recognized internal failures to a structured 500 body, and anything
//! else to a plain diagnostic. The stream handler is the only one with a
//! standing subscription; it unsubscribes and releases when the client
//! disconnects.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;
use tokio_stream::Stream;

use crate::device::CaptureDevice;
use crate::error::Error;
use crate::registry::CameraRegistry;

use super::config::ServerConfig;
use super::{mjpeg, snapshot};

/// Shared state behind every handler
pub struct AppState<D> {
    /// The camera registry
    pub registry: Arc<CameraRegistry<D>>,
    /// Server configuration (snapshot defaults)
    pub config: ServerConfig,
}

impl<D> Clone for AppState<D> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            config: self.config.clone(),
        }
    }
}

/// Create the application router
pub fn create_router<D: CaptureDevice>(
    registry: Arc<CameraRegistry<D>>,
    config: ServerConfig,
) -> Router {
    Router::new()
        .route("/cams", get(list_cameras::<D>))
        .route("/cam/:name", get(camera_format::<D>))
        .route("/cam/:name/stream", get(camera_stream::<D>))
        .route("/cam/:name/snapshot", get(camera_snapshot::<D>))
        .with_state(AppState { registry, config })
}

/// Error wrapper carrying the HTTP mapping
struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.0.to_string();

        match self.0 {
            Error::NotFound(_) => {
                (StatusCode::NOT_FOUND, Json(json!({ "error": message }))).into_response()
            }
            Error::Conflict(_) => {
                (StatusCode::CONFLICT, Json(json!({ "error": message }))).into_response()
            }
            Error::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": message })),
            )
                .into_response(),
            // Unclassified failures go out as a bare diagnostic.
            _ => (StatusCode::INTERNAL_SERVER_ERROR, message).into_response(),
        }
    }
}

/// GET /cams
async fn list_cameras<D: CaptureDevice>(State(state): State<AppState<D>>) -> Response {
    Json(state.registry.list().await).into_response()
}

/// GET /cam/:name
async fn camera_format<D: CaptureDevice>(
    State(state): State<AppState<D>>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let format = state.registry.query_format(&name).await?;
    Ok(Json(format).into_response())
}

/// GET /cam/:name/stream
async fn camera_stream<D: CaptureDevice>(
    State(state): State<AppState<D>>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let cam = state.registry.acquire(&name).await?;
    let rx = cam.subscribe();

    tracing::debug!(camera = %name, "Stream consumer connected");

    let stream = ReleaseOnDisconnect {
        inner: Some(mjpeg::part_stream(rx)),
        registry: Arc::clone(&state.registry),
        name,
    };

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, mjpeg::content_type())
        .header(
            header::CACHE_CONTROL,
            "no-cache, no-store, max-age=0, must-revalidate",
        )
        .header(header::PRAGMA, "no-cache")
        .body(Body::from_stream(stream))
        .map_err(Error::internal)?;

    Ok(response)
}

#[derive(Debug, Deserialize)]
struct SnapshotParams {
    #[serde(rename = "warmup-frames")]
    warmup_frames: Option<u32>,
    quality: Option<u8>,
}

/// GET /cam/:name/snapshot
async fn camera_snapshot<D: CaptureDevice>(
    State(state): State<AppState<D>>,
    Path(name): Path<String>,
    Query(params): Query<SnapshotParams>,
) -> Result<Response, ApiError> {
    let warmup = params.warmup_frames.unwrap_or(state.config.warmup_frames);
    let quality = params
        .quality
        .unwrap_or(state.config.snapshot_quality)
        .clamp(1, 100);

    let cam = state.registry.acquire(&name).await?;
    let frame = snapshot::snapshot_frame(cam.as_ref(), warmup).await;

    // Release immediately: the transient subscription is already gone, so
    // a lone snapshot stops the loop right after its frame is delivered.
    // A fault while we waited may have torn the entry down; the frame
    // error below carries the cause, so an unknown name is not reported.
    if let Err(err) = state.registry.release(&name).await {
        if !matches!(err, Error::NotFound(_)) {
            return Err(err.into());
        }
    }
    let frame = frame?;

    let jpeg = tokio::task::spawn_blocking(move || snapshot::reencode_jpeg(&frame.data, quality))
        .await
        .map_err(Error::internal)??;

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "image/jpeg")
        .header(header::CONTENT_LENGTH, jpeg.len())
        .body(Body::from(jpeg))
        .map_err(Error::internal)?;

    Ok(response)
}

/// Body stream that unsubscribes and releases on client disconnect
///
/// Dropping the inner stream drops the broadcast receiver first, then the
/// release runs on a spawned task, so the registry's demand check never
/// counts the departing consumer.
struct ReleaseOnDisconnect<S, D: CaptureDevice> {
    inner: Option<S>,
    registry: Arc<CameraRegistry<D>>,
    name: String,
}

impl<S, D> Stream for ReleaseOnDisconnect<S, D>
where
    S: Stream<Item = Result<Bytes, std::convert::Infallible>> + Unpin,
    D: CaptureDevice,
{
    type Item = Result<Bytes, std::convert::Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.get_mut().inner.as_mut() {
            Some(inner) => Pin::new(inner).poll_next(cx),
            None => Poll::Ready(None),
        }
    }
}

impl<S, D: CaptureDevice> Drop for ReleaseOnDisconnect<S, D> {
    fn drop(&mut self) {
        // Unsubscribe before the release call sees the demand count.
        self.inner = None;

        let registry = Arc::clone(&self.registry);
        let name = std::mem::take(&mut self.name);

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                tracing::debug!(camera = %name, "Stream consumer disconnected");
                let _ = registry.release(&name).await;
            });
        }
    }
}
