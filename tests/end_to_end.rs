//! End-to-end exercise of the public API: bootstrap, format query, MJPEG
//! stream and snapshot against synthetic pattern devices.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use tokio_stream::StreamExt;
use tower::ServiceExt;

use camserve_rs::{
    create_router, CameraRegistry, FrameFormat, LoopState, ServerConfig, TestPatternDevice,
};

fn registry() -> Arc<CameraRegistry<TestPatternDevice>> {
    Arc::new(CameraRegistry::new(|_path| Ok(TestPatternDevice::new(100))))
}

fn request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn wait_for_idle(cam: &camserve_rs::CaptureLoop<TestPatternDevice>) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while cam.state() != LoopState::Idle {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("capture loop did not stop");
}

#[tokio::test]
async fn test_open_configure_stream_snapshot() {
    let registry = registry();

    // Bootstrap: open and negotiate, exactly as the CLI layer would.
    let name = registry.open("/dev/video0", Some("cam0")).await.unwrap();
    assert_eq!(name, "cam0");
    registry.configure("cam0", 640, 480).await.unwrap();
    assert_eq!(
        registry.query_format("cam0").await.unwrap(),
        FrameFormat::mjpeg(640, 480)
    );

    let router = create_router(Arc::clone(&registry), ServerConfig::default());
    let cam = registry.acquire("cam0").await.unwrap();

    // Format endpoint reflects the negotiated format.
    let response = router
        .clone()
        .oneshot(request("/cam/cam0"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let format: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(format["width"], 640);
    assert_eq!(format["height"], 480);
    assert_eq!(format["pixelFormat"], "MJPG");

    // Live stream: at least one multipart part with non-empty JPEG bytes.
    let response = router
        .clone()
        .oneshot(request("/cam/cam0/stream"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let mut body = response.into_body().into_data_stream();
    let part = body.next().await.unwrap().unwrap();
    assert!(part.starts_with(b"--frame\r\nContent-Type: image/jpeg\r\n"));
    let payload_start = part
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|i| i + 4)
        .unwrap();
    assert_eq!(&part[payload_start..payload_start + 2], &[0xFF, 0xD8]);

    // Client disconnect: with no other subscriber the loop goes idle.
    drop(body);
    wait_for_idle(&cam).await;

    // Snapshot restarts the loop, takes its frame and stops it again.
    let response = router
        .oneshot(request("/cam/cam0/snapshot?warmup-frames=2"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
    let jpeg = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&jpeg[0..2], &[0xFF, 0xD8]);
    wait_for_idle(&cam).await;
}

#[tokio::test]
async fn test_snapshot_rides_along_running_stream() {
    let registry = registry();
    registry.open("/dev/video0", Some("cam0")).await.unwrap();

    let router = create_router(Arc::clone(&registry), ServerConfig::default());
    let cam = registry.acquire("cam0").await.unwrap();

    // Standing stream subscriber.
    let response = router
        .clone()
        .oneshot(request("/cam/cam0/stream"))
        .await
        .unwrap();
    let mut stream_body = response.into_body().into_data_stream();
    let _ = stream_body.next().await.unwrap().unwrap();

    // A snapshot releasing next to a live stream must not stop the loop.
    let response = router
        .oneshot(request("/cam/cam0/snapshot?warmup-frames=0"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(cam.state(), LoopState::Running);
    let _ = stream_body.next().await.unwrap().unwrap();

    drop(stream_body);
    wait_for_idle(&cam).await;
}

#[tokio::test]
async fn test_unknown_camera_has_no_side_effects() {
    let registry = registry();
    registry.open("/dev/video0", Some("cam0")).await.unwrap();
    let router = create_router(Arc::clone(&registry), ServerConfig::default());

    for uri in ["/cam/ghost", "/cam/ghost/stream", "/cam/ghost/snapshot"] {
        let response = router.clone().oneshot(request(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "uri {uri}");
    }

    // The registered camera is untouched.
    assert_eq!(registry.camera_count().await, 1);
    let cam = registry.acquire("cam0").await.unwrap();
    registry.release("cam0").await.unwrap();
    wait_for_idle(&cam).await;
}
