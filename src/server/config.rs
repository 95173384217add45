//! Server configuration

use std::net::SocketAddr;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Fan-out capacity of each camera's broadcast channel; slow stream
    /// consumers that fall this many frames behind skip to newer frames
    pub broadcast_capacity: usize,

    /// Warm-up frames discarded by a snapshot on a freshly started loop,
    /// unless the request overrides it
    pub warmup_frames: u32,

    /// JPEG quality for re-encoded snapshots, unless the request
    /// overrides it
    pub snapshot_quality: u8,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".parse().unwrap(),
            broadcast_capacity: 16,
            warmup_frames: 2,
            snapshot_quality: 80,
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the broadcast channel capacity
    pub fn broadcast_capacity(mut self, capacity: usize) -> Self {
        self.broadcast_capacity = capacity.max(1);
        self
    }

    /// Set the default snapshot warm-up frame count
    pub fn warmup_frames(mut self, frames: u32) -> Self {
        self.warmup_frames = frames;
        self
    }

    /// Set the default snapshot JPEG quality (1-100)
    pub fn snapshot_quality(mut self, quality: u8) -> Self {
        self.snapshot_quality = quality.clamp(1, 100);
        self
    }
}
