use super::nwsdk::{self, Sdk, RM_MULTITOUCH, SUCCESS};
use super::{InputBackend, InputError};
use crate::clock::Clock;
use crate::multitouch::{
    DeviceStatus, DisplaySize, HardwareState, SlotReport, SlotSet, TouchTick,
};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Ticks buffered between the SDK callback and the input worker.
const TICK_QUEUE_DEPTH: usize = 256;

/// Where the SDK callback delivers ticks, stamped on arrival.
struct TickSink {
    tx: mpsc::SyncSender<TouchTick>,
    clock: Arc<dyn Clock>,
}

/// The SDK callback carries no user pointer, so it reaches the open backend
/// through this slot.
static TICK_SINK: Mutex<Option<TickSink>> = Mutex::new(None);

/// NextWindow panel backend. The SDK pushes packets on its own thread; they
/// are read out into ticks there and queued for `poll_tick`.
pub struct NextWindowBackend {
    sdk: &'static Sdk,
    serial: u32,
    tick_rx: mpsc::Receiver<TouchTick>,
    display: Option<DisplaySize>,
}

impl NextWindowBackend {
    /// Ticks are stamped with `clock` as the SDK hands them over.
    pub fn open(serial: u32, clock: Arc<dyn Clock>) -> Result<Self, InputError> {
        let sdk = nwsdk::sdk().map_err(InputError::OpenFailed)?;
        let (tx, rx) = mpsc::sync_channel(TICK_QUEUE_DEPTH);
        *TICK_SINK.lock().unwrap_or_else(PoisonError::into_inner) = Some(TickSink { tx, clock });

        let device_id = sdk.open_device(serial, receive_touch_info);
        if device_id != SUCCESS {
            TICK_SINK.lock().unwrap_or_else(PoisonError::into_inner).take();
            return Err(InputError::OpenFailed(format!(
                "panel {} did not open (status {})",
                serial, device_id
            )));
        }
        if sdk.set_report_mode(device_id, RM_MULTITOUCH) != SUCCESS {
            warn!(serial, "could not switch panel to multitouch reports");
        }

        let display = sdk
            .display_info(0)
            .map(|info| DisplaySize::new(info.display_rect.right, info.display_rect.bottom));
        info!(serial, ?display, "opened NextWindow panel");

        Ok(Self {
            sdk,
            serial,
            tick_rx: rx,
            display,
        })
    }
}

impl Drop for NextWindowBackend {
    fn drop(&mut self) {
        self.sdk.close_device(self.serial);
        TICK_SINK.lock().unwrap_or_else(PoisonError::into_inner).take();
    }
}

impl InputBackend for NextWindowBackend {
    fn grab(&mut self) -> Result<(), InputError> {
        // The SDK already owns the panel.
        Ok(())
    }

    fn poll_tick(&mut self) -> Result<Option<TouchTick>, InputError> {
        match self.tick_rx.try_recv() {
            Ok(tick) => Ok(Some(tick)),
            Err(mpsc::TryRecvError::Empty) => Ok(None),
            Err(mpsc::TryRecvError::Disconnected) => Err(InputError::Closed),
        }
    }

    fn display_size(&self) -> Option<DisplaySize> {
        self.display
    }
}

unsafe extern "system" fn receive_touch_info(
    device_id: u32,
    status: u32,
    packet_id: u32,
    touches: u32,
    _ghost_touches: u32,
) {
    let guard = TICK_SINK.lock().unwrap_or_else(PoisonError::into_inner);
    let Some(sink) = guard.as_ref() else {
        return;
    };
    let received_ms = sink.clock.now_ms();
    let tick = read_tick(device_id, DeviceStatus::from(status), packet_id, touches)
        .stamped(received_ms);
    if let Err(mpsc::TrySendError::Full(_)) = sink.tx.try_send(tick) {
        warn!("touch queue full, dropping packet {}", packet_id);
    }
}

fn read_tick(device_id: u32, status: DeviceStatus, packet_id: u32, touches: u32) -> TouchTick {
    if status != DeviceStatus::TouchInfo {
        info!(?status, "panel status changed");
        return TouchTick::status(status);
    }
    let Ok(sdk) = nwsdk::sdk() else {
        return TouchTick::touches(Vec::new());
    };

    let mut reports = Vec::new();
    for slot in SlotSet::from_bits(touches).iter() {
        let Some(point) = sdk.touch(device_id, packet_id, 1 << slot) else {
            debug!(slot, packet_id, "no touch data for slot");
            continue;
        };
        match HardwareState::try_from(point.touch_event_type) {
            Ok(state) => reports.push(SlotReport::new(
                slot,
                state,
                point.touch_pos.x,
                point.touch_pos.y,
            )),
            Err(code) => warn!(slot, code, "unknown touch event type"),
        }
    }
    TouchTick::touches(reports)
}
