#[cfg(target_os = "linux")]
pub mod evdev_backend;
#[cfg(target_os = "windows")]
pub mod nextwindow_backend;
#[cfg(target_os = "windows")]
pub mod nwsdk;
pub mod replay_backend;

use crate::multitouch::{DisplaySize, TouchTick};

#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("open failed: {0}")]
    OpenFailed(String),
    #[error("grab failed: {0}")]
    GrabFailed(String),
    #[error("read error: {0}")]
    ReadError(String),
    #[error("touch source closed")]
    Closed,
}

/// A source of hardware ticks, polled from the input worker thread.
pub trait InputBackend: Send + 'static {
    /// Take exclusive use of the device, where the platform supports it.
    fn grab(&mut self) -> Result<(), InputError>;

    /// Next tick if one is ready. `Ok(None)` means nothing arrived yet;
    /// `Err(InputError::Closed)` means the source is exhausted.
    fn poll_tick(&mut self) -> Result<Option<TouchTick>, InputError>;

    /// Coordinate space reported by the device itself, if it knows one.
    fn display_size(&self) -> Option<DisplaySize> {
        None
    }
}
