//! Per-device capture loop
//!
//! A [`CaptureLoop`] owns one capture device and multiplexes its frame
//! stream to any number of concurrent consumers. It uses
//! `tokio::sync::broadcast` for zero-copy fan-out: `bytes::Bytes` is
//! reference counted, so every subscriber shares one allocation per frame.
//!
//! # Architecture
//!
//! ```text
//!                 Arc<CaptureLoop<D>>
//!            ┌──────────────────────────┐
//!            │ device: Arc<Mutex<D>>    │
//!            │ frames: broadcast::Tx    │◄── pump task (detached)
//!            │ state:  watch::Tx        │
//!            │ fault:  watch::Tx        │
//!            └────────────┬─────────────┘
//!                         │
//!          ┌──────────────┼──────────────┐
//!          ▼              ▼              ▼
//!     [stream sub]   [stream sub]   [snapshot]
//!     rx.recv()      rx.recv()      next_frame()
//! ```
//!
//! The pump is started lazily by the registry when the first consumer
//! acquires the camera and stopped when the last live subscriber is gone.

pub mod frame;
pub mod pump;

pub use frame::VideoFrame;
pub use pump::{CaptureLoop, LoopState};
