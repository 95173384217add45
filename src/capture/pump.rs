//! Capture loop implementation
//!
//! The pump runs as a detached tokio task: `start()` returns immediately
//! and the task proceeds independently, pulling one frame at a time from
//! the device and broadcasting it to every current subscriber. The device
//! pull is the only backpressure point; there is no frame buffering beyond
//! the broadcast channel's lag window, and a subscriber that joins
//! mid-pump only sees frames emitted after its subscription.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, watch, Mutex};

use crate::device::CaptureDevice;
use crate::error::{Error, Result};

use super::frame::VideoFrame;

/// Lifecycle state of a capture loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// No pump active
    Idle,
    /// Pump active, frames flowing
    Running,
    /// Stop requested, pump finishing its in-flight pull
    Stopping,
}

/// On-demand frame pump for one capture device
///
/// At most one pump is active per loop at a time; `start()` while already
/// running is a no-op. A pull failure is fatal to the loop instance: the
/// device is stopped, the fault is recorded, and the owning registry
/// reacts through [`fault_watch`](CaptureLoop::fault_watch).
#[derive(Debug)]
pub struct CaptureLoop<D> {
    /// Shared with the registry entry for format negotiation and queries
    device: Arc<Mutex<D>>,

    /// Fan-out channel; the live receiver set IS the subscriber set
    frames_tx: broadcast::Sender<VideoFrame>,

    /// Lifecycle state; reaching `Idle` doubles as the stop-completed signal
    state_tx: watch::Sender<LoopState>,

    /// Set at most once per run when the pump fails; cleared on start
    fault_tx: watch::Sender<Option<Arc<Error>>>,

    /// Checked by the pump before and after every pull
    stop_signal: AtomicBool,

    /// Frames emitted by the current run; reset on each start
    frame_count: AtomicU64,
}

impl<D: CaptureDevice> CaptureLoop<D> {
    /// Create an idle loop around a device
    pub fn new(device: Arc<Mutex<D>>, broadcast_capacity: usize) -> Self {
        let (frames_tx, _) = broadcast::channel(broadcast_capacity);
        let (state_tx, _) = watch::channel(LoopState::Idle);
        let (fault_tx, _) = watch::channel(None);

        Self {
            device,
            frames_tx,
            state_tx,
            fault_tx,
            stop_signal: AtomicBool::new(false),
            frame_count: AtomicU64::new(0),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> LoopState {
        *self.state_tx.borrow()
    }

    /// Whether a pump is active (running or winding down)
    pub fn is_running(&self) -> bool {
        self.state() != LoopState::Idle
    }

    /// Frames emitted since the most recent start
    pub fn frames(&self) -> u64 {
        self.frame_count.load(Ordering::SeqCst)
    }

    /// Live subscriber count, recomputed from the broadcast channel
    pub fn subscriber_count(&self) -> usize {
        self.frames_tx.receiver_count()
    }

    /// The pump fault of the current run, if any
    pub fn fault(&self) -> Option<Arc<Error>> {
        self.fault_tx.borrow().clone()
    }

    /// Watch for pump faults; used by the registry's error listener
    pub fn fault_watch(&self) -> watch::Receiver<Option<Arc<Error>>> {
        self.fault_tx.subscribe()
    }

    /// Register a standing subscription to the frame broadcast
    ///
    /// The receiver only observes frames emitted after this call. Dropping
    /// it removes the subscriber from the demand count.
    pub fn subscribe(&self) -> broadcast::Receiver<VideoFrame> {
        self.frames_tx.subscribe()
    }

    /// Start the pump if the loop is idle
    ///
    /// Resets the frame counter, clears any pending stop signal and fault,
    /// and spawns the pump as a detached task; the caller does not wait
    /// for it. Device start-up failures surface through the fault watch,
    /// not through this call. No-op while the pump is already active.
    pub fn start(self: &Arc<Self>) {
        let started = self.state_tx.send_if_modified(|state| {
            if *state != LoopState::Idle {
                return false;
            }

            // Reset before `Running` becomes observable: a stop() issued
            // by a racing release that sees the new state must land after
            // this clear, never be erased by it.
            self.stop_signal.store(false, Ordering::SeqCst);
            self.frame_count.store(0, Ordering::SeqCst);
            self.fault_tx.send_replace(None);

            *state = LoopState::Running;
            true
        });

        if !started {
            return;
        }

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run_pump().await;
        });
    }

    /// Request the pump to terminate after its in-flight pull completes
    ///
    /// Does not block; safe to call multiple times or while idle.
    pub fn stop(&self) {
        self.stop_signal.store(true, Ordering::SeqCst);
        self.state_tx.send_if_modified(|state| {
            if *state == LoopState::Running {
                *state = LoopState::Stopping;
                true
            } else {
                false
            }
        });
    }

    /// Request stop and suspend until the pump has fully terminated
    ///
    /// Only used for full shutdown; per-consumer release goes through the
    /// registry's demand-recomputed policy instead.
    pub async fn stop_and_wait(&self) {
        self.stop();

        let mut state_rx = self.state_tx.subscribe();
        while *state_rx.borrow_and_update() != LoopState::Idle {
            if state_rx.changed().await.is_err() {
                break;
            }
        }
    }

    /// Wait for the next frame broadcast after this call
    ///
    /// No backlog: frames emitted before the call are never returned. If
    /// the pump fails before a frame arrives the wait fails with the
    /// pump's error; if the pump stops normally it fails with
    /// [`Error::LoopStopped`].
    pub async fn next_frame(&self) -> Result<VideoFrame> {
        let mut frames_rx = self.frames_tx.subscribe();
        let mut state_rx = self.state_tx.subscribe();

        // The pump may already be gone by the time we subscribe.
        if *state_rx.borrow_and_update() == LoopState::Idle {
            return Err(self.exit_error());
        }

        loop {
            tokio::select! {
                recv = frames_rx.recv() => match recv {
                    Ok(frame) => return Ok(frame),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return Err(Error::LoopStopped),
                },
                changed = state_rx.changed() => {
                    if changed.is_err() || *state_rx.borrow_and_update() == LoopState::Idle {
                        return Err(self.exit_error());
                    }
                }
            }
        }
    }

    fn exit_error(&self) -> Error {
        match self.fault() {
            Some(err) => Error::PumpFailed(err),
            None => Error::LoopStopped,
        }
    }

    async fn run_pump(&self) {
        if let Err(err) = self.device.lock().await.start() {
            tracing::error!(error = %err, "Device failed to start streaming");
            self.finish(Some(err));
            return;
        }

        tracing::debug!("Pump started");

        let result = loop {
            if self.stop_signal.load(Ordering::SeqCst) {
                break Ok(());
            }

            // The lock is held for the whole pull; anything else needing
            // the device waits it out. Format queries are served from the
            // registry entry's cache instead of contending here.
            let pulled = self.device.lock().await.next_frame().await;

            match pulled {
                Ok(data) => {
                    // A stop may have been requested while we were waiting;
                    // the in-flight frame is discarded in that case.
                    if self.stop_signal.load(Ordering::SeqCst) {
                        break Ok(());
                    }

                    let sequence = self.frame_count.fetch_add(1, Ordering::SeqCst);
                    let _ = self.frames_tx.send(VideoFrame::new(data, sequence));
                }
                Err(err) => break Err(err),
            }
        };

        if let Err(err) = self.device.lock().await.stop() {
            tracing::warn!(error = %err, "Device failed to stop streaming");
        }

        match result {
            Ok(()) => {
                tracing::debug!(frames = self.frames(), "Pump stopped");
                self.finish(None);
            }
            Err(err) => {
                tracing::error!(error = %err, frames = self.frames(), "Pump failed");
                self.finish(Some(err));
            }
        }
    }

    /// Record the outcome and transition to `Idle`; fault before state so
    /// waiters observing `Idle` always see the cause
    fn finish(&self, fault: Option<Error>) {
        if let Some(err) = fault {
            self.fault_tx.send_replace(Some(Arc::new(err)));
        }
        self.state_tx.send_replace(LoopState::Idle);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use bytes::Bytes;

    use crate::device::FrameFormat;

    use super::*;

    /// Scripted device: yields numbered frames on a short interval,
    /// optionally failing after a fixed number of pulls.
    struct MockDevice {
        pulls: u64,
        fail_after: Option<u64>,
        streaming: bool,
    }

    impl MockDevice {
        fn new() -> Self {
            Self {
                pulls: 0,
                fail_after: None,
                streaming: false,
            }
        }

        fn failing_after(pulls: u64) -> Self {
            Self {
                fail_after: Some(pulls),
                ..Self::new()
            }
        }
    }

    #[async_trait]
    impl CaptureDevice for MockDevice {
        fn set_format(&mut self, _format: FrameFormat) -> Result<()> {
            Ok(())
        }

        fn query_format(&self) -> Result<FrameFormat> {
            Ok(FrameFormat::mjpeg(640, 480))
        }

        fn start(&mut self) -> Result<()> {
            self.streaming = true;
            Ok(())
        }

        fn stop(&mut self) -> Result<()> {
            self.streaming = false;
            Ok(())
        }

        async fn next_frame(&mut self) -> Result<Bytes> {
            assert!(self.streaming, "pull on a device that is not streaming");
            tokio::time::sleep(Duration::from_millis(1)).await;

            if self.fail_after == Some(self.pulls) {
                return Err(Error::Device("transfer aborted".to_string()));
            }

            let frame = Bytes::from(format!("frame-{}", self.pulls));
            self.pulls += 1;
            Ok(frame)
        }

        fn close(&mut self) {}
    }

    fn new_loop(device: MockDevice) -> Arc<CaptureLoop<MockDevice>> {
        Arc::new(CaptureLoop::new(Arc::new(Mutex::new(device)), 16))
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let cam = new_loop(MockDevice::new());

        cam.start();
        cam.start();
        assert_eq!(cam.state(), LoopState::Running);

        // A single pump: consecutive frames have consecutive sequence
        // numbers, with no duplicates from a second pump interleaving.
        let mut rx = cam.subscribe();
        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(second.sequence, first.sequence + 1);

        cam.stop_and_wait().await;
        assert_eq!(cam.state(), LoopState::Idle);
    }

    #[tokio::test]
    async fn test_next_frame_has_no_backlog() {
        let cam = new_loop(MockDevice::new());
        cam.start();

        // Let a few frames go by before asking.
        while cam.frames() < 3 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        let frame = cam.next_frame().await.unwrap();
        assert!(frame.sequence >= 2, "got replayed frame {}", frame.sequence);

        cam.stop_and_wait().await;
    }

    #[tokio::test]
    async fn test_restart_resets_frame_counter() {
        let cam = new_loop(MockDevice::new());

        cam.start();
        let first_run = cam.next_frame().await.unwrap();
        assert_eq!(first_run.sequence, 0);
        cam.stop_and_wait().await;

        cam.start();
        let second_run = cam.next_frame().await.unwrap();
        assert_eq!(second_run.sequence, 0);
        cam.stop_and_wait().await;
    }

    #[tokio::test]
    async fn test_pull_failure_faults_loop() {
        let cam = new_loop(MockDevice::failing_after(2));
        cam.start();

        // The first two pulls succeed, the third fails; keep asking until
        // the fault surfaces.
        let err = loop {
            match cam.next_frame().await {
                Ok(frame) => assert!(frame.sequence < 2),
                Err(err) => break err,
            }
        };
        assert!(matches!(err, Error::PumpFailed(_)), "got {err:?}");

        // The loop wound itself down.
        cam.stop_and_wait().await;
        assert_eq!(cam.state(), LoopState::Idle);
        assert!(cam.fault().is_some());
    }

    #[tokio::test]
    async fn test_next_frame_fails_when_idle() {
        let cam = new_loop(MockDevice::new());
        let err = cam.next_frame().await.unwrap_err();
        assert!(matches!(err, Error::LoopStopped));
    }

    #[tokio::test]
    async fn test_subscriber_count_is_live() {
        let cam = new_loop(MockDevice::new());
        assert_eq!(cam.subscriber_count(), 0);

        let rx1 = cam.subscribe();
        let rx2 = cam.subscribe();
        assert_eq!(cam.subscriber_count(), 2);

        drop(rx1);
        assert_eq!(cam.subscriber_count(), 1);
        drop(rx2);
        assert_eq!(cam.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_stale_stop_cleared_on_start() {
        let cam = new_loop(MockDevice::new());

        // A stop against an idle loop is a no-op; the next start must not
        // inherit its signal.
        cam.stop();
        cam.start();

        let frame = cam.next_frame().await.unwrap();
        assert_eq!(frame.sequence, 0);

        cam.stop_and_wait().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stop_racing_start_always_lands() {
        // A releaser that observes the loop running and stops it must win
        // even when the stop lands mid-start on another thread.
        for _ in 0..200 {
            let cam = new_loop(MockDevice::new());

            let starter = {
                let cam = Arc::clone(&cam);
                tokio::spawn(async move {
                    cam.start();
                })
            };
            let stopper = {
                let cam = Arc::clone(&cam);
                tokio::spawn(async move {
                    if cam.is_running() {
                        cam.stop();
                        true
                    } else {
                        false
                    }
                })
            };

            starter.await.unwrap();
            let stopped = stopper.await.unwrap();

            if !stopped {
                cam.stop();
            }
            tokio::time::timeout(Duration::from_secs(2), async {
                let mut state_rx = cam.state_tx.subscribe();
                while *state_rx.borrow_and_update() != LoopState::Idle {
                    if state_rx.changed().await.is_err() {
                        break;
                    }
                }
            })
            .await
            .expect("stop request was lost");
        }
    }

    #[tokio::test]
    async fn test_fault_cleared_on_restart() {
        let cam = new_loop(MockDevice::failing_after(0));
        cam.start();

        let err = cam.next_frame().await.unwrap_err();
        assert!(matches!(err, Error::PumpFailed(_)));
        cam.stop_and_wait().await;

        // The mock keeps failing; the restart must still go through and
        // produce a fresh fault rather than replaying the stale one.
        cam.start();
        let err = cam.next_frame().await.unwrap_err();
        assert!(matches!(err, Error::PumpFailed(_)));
        cam.stop_and_wait().await;
    }
}
