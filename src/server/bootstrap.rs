//! Startup camera configuration
//!
//! Cameras are declared on the command line as `path` or `name:path`
//! strings, with an optional global resolution and per-camera overrides.
//! The hosting binary parses its arguments into these types and calls
//! [`bootstrap_cameras`] once before the HTTP layer starts accepting
//! connections.

use std::str::FromStr;
use std::sync::Arc;

use crate::device::CaptureDevice;
use crate::error::{Error, Result};
use crate::registry::CameraRegistry;

/// One camera declaration: a device path plus an optional name
///
/// Parsed from `"/dev/video0"` or `"webcam:/dev/video0"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraSpec {
    /// Source device path
    pub path: String,
    /// Explicit name; the registry derives one from the path if absent
    pub name: Option<String>,
}

impl FromStr for CameraSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(Error::Internal("empty camera declaration".to_string()));
        }

        match s.split_once(':') {
            Some((name, path)) if !name.is_empty() && !path.is_empty() => Ok(Self {
                path: path.to_string(),
                name: Some(name.to_string()),
            }),
            Some(_) => Err(Error::Internal(format!("invalid camera declaration: {}", s))),
            None => Ok(Self {
                path: s.to_string(),
                name: None,
            }),
        }
    }
}

/// A `WxH` resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl FromStr for Resolution {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::Internal(format!("invalid resolution: {}", s));

        let (width, height) = s.split_once('x').ok_or_else(invalid)?;
        let width = width.parse().map_err(|_| invalid())?;
        let height = height.parse().map_err(|_| invalid())?;

        if width == 0 || height == 0 {
            return Err(invalid());
        }

        Ok(Self { width, height })
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Per-camera resolution override, parsed from `name=WxH`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionOverride {
    /// Camera name the override applies to
    pub name: String,
    /// Resolution to negotiate
    pub resolution: Resolution,
}

impl FromStr for ResolutionOverride {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (name, resolution) = s
            .split_once('=')
            .ok_or_else(|| Error::Internal(format!("invalid resolution override: {}", s)))?;

        if name.is_empty() {
            return Err(Error::Internal(format!(
                "invalid resolution override: {}",
                s
            )));
        }

        Ok(Self {
            name: name.to_string(),
            resolution: resolution.parse()?,
        })
    }
}

/// Open and configure every declared camera
///
/// A per-camera override beats the global resolution; a camera with
/// neither is left at the device's current format. Returns the assigned
/// names in declaration order. Any failure aborts the bootstrap: a
/// camera that cannot deliver what was asked of it should stop the
/// service before it starts serving.
pub async fn bootstrap_cameras<D: CaptureDevice>(
    registry: &Arc<CameraRegistry<D>>,
    cameras: &[CameraSpec],
    resolution: Option<Resolution>,
    overrides: &[ResolutionOverride],
) -> Result<Vec<String>> {
    let mut names = Vec::with_capacity(cameras.len());

    for camera in cameras {
        let name = registry.open(&camera.path, camera.name.as_deref()).await?;

        let wanted = overrides
            .iter()
            .find(|o| o.name == name)
            .map(|o| o.resolution)
            .or(resolution);

        if let Some(res) = wanted {
            registry.configure(&name, res.width, res.height).await?;
        }

        names.push(name);
    }

    Ok(names)
}
