use super::{InputBackend, InputError};
use crate::multitouch::{MtSlotTracker, TouchTick};
use evdev::Device;
use std::collections::VecDeque;
use std::io;
use std::os::fd::AsRawFd;
use std::path::Path;
use tracing::{info, trace};

/// Upper bound on one blocking wait, so the worker notices shutdown.
const POLL_TIMEOUT_MS: i32 = 100;

/// Linux touchscreen backend. Reads multitouch protocol B events from an
/// evdev node and turns each synchronized frame into a tick.
pub struct EvdevBackend {
    device: Device,
    tracker: MtSlotTracker,
    ready: VecDeque<TouchTick>,
}

impl EvdevBackend {
    pub fn open(device_path: &Path) -> Result<Self, InputError> {
        let device = Device::open(device_path)
            .map_err(|e| InputError::OpenFailed(format!("{}: {}", device_path.display(), e)))?;
        info!(
            path = %device_path.display(),
            name = device.name().unwrap_or("unnamed"),
            "opened touchscreen"
        );

        Ok(Self {
            device,
            tracker: MtSlotTracker::new(),
            ready: VecDeque::new(),
        })
    }

    fn wait_readable(&self) -> io::Result<bool> {
        let mut pollfd = libc::pollfd {
            fd: self.device.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let ret = unsafe { libc::poll(&mut pollfd, 1, POLL_TIMEOUT_MS) };
        if ret < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(false);
            }
            return Err(err);
        }
        Ok(ret > 0)
    }
}

impl InputBackend for EvdevBackend {
    fn grab(&mut self) -> Result<(), InputError> {
        self.device
            .grab()
            .map_err(|e| InputError::GrabFailed(e.to_string()))
    }

    fn poll_tick(&mut self) -> Result<Option<TouchTick>, InputError> {
        if let Some(tick) = self.ready.pop_front() {
            return Ok(Some(tick));
        }
        if !self
            .wait_readable()
            .map_err(|e| InputError::ReadError(e.to_string()))?
        {
            return Ok(None);
        }
        match self.device.fetch_events() {
            Ok(events) => {
                for event in events {
                    trace!(
                        ty = event.event_type().0,
                        code = event.code(),
                        value = event.value(),
                        "evdev"
                    );
                    if let Some(tick) =
                        self.tracker
                            .process(event.event_type().0, event.code(), event.value())
                    {
                        self.ready.push_back(tick);
                    }
                }
                Ok(self.ready.pop_front())
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(InputError::ReadError(e.to_string())),
        }
    }
}
