//! Crate-wide error types
//!
//! One taxonomy shared by the device layer, the capture loop, the registry
//! and the HTTP surface. Synchronous failures (unknown name, format
//! mismatch) are returned directly to the caller; asynchronous pump
//! failures travel through the capture loop's fault channel instead.

use std::sync::Arc;

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for camera server operations
#[derive(Debug, Clone)]
pub enum Error {
    /// Named entity (camera) is not registered
    NotFound(String),
    /// A camera with this name is already registered
    Conflict(String),
    /// Format negotiation or other unexpected internal failure
    Internal(String),
    /// Device-level failure (open, ioctl, frame pull)
    Device(String),
    /// The capture loop is not running and no frame can be delivered
    LoopStopped,
    /// The capture loop's pump failed; carries the original device error
    PumpFailed(Arc<Error>),
}

impl Error {
    /// Device error from any displayable source
    pub fn device(err: impl std::fmt::Display) -> Self {
        Error::Device(err.to_string())
    }

    /// Internal error from any displayable source
    pub fn internal(err: impl std::fmt::Display) -> Self {
        Error::Internal(err.to_string())
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::NotFound(entity) => write!(f, "{} not found", entity),
            Error::Conflict(name) => write!(f, "camera {} is already registered", name),
            Error::Internal(msg) => write!(f, "internal error: {}", msg),
            Error::Device(msg) => write!(f, "device error: {}", msg),
            Error::LoopStopped => write!(f, "capture loop is not running"),
            Error::PumpFailed(err) => write!(f, "capture loop failed: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::PumpFailed(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Device(err.to_string())
    }
}
