#[cfg(target_os = "windows")]
pub mod nextwindow_discovery;
#[cfg(target_os = "linux")]
pub mod udev_discovery;

use std::fmt;
use std::path::PathBuf;

/// Where a discovered panel can be opened from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceLocator {
    /// An input event node.
    Path(PathBuf),
    /// A panel serial number known to the vendor SDK.
    Serial(u32),
}

impl fmt::Display for DeviceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceLocator::Path(path) => write!(f, "{}", path.display()),
            DeviceLocator::Serial(serial) => write!(f, "serial {}", serial),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub locator: DeviceLocator,
}

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("device enumeration failed: {0}")]
    Enumeration(String),
    #[error("no touchscreen found")]
    NotFound,
}

pub trait DeviceDiscovery {
    fn find_touchscreens() -> Result<Vec<DeviceInfo>, DiscoveryError>;
}
