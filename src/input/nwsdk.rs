//! Runtime bindings to the NextWindow multi-touch SDK (`NWMultiTouch.dll`).
//!
//! The DLL is loaded once per process and stays loaded; its entry points use
//! the C calling convention, while the touch callback it invokes is stdcall.

use std::sync::OnceLock;
use windows::core::{w, PCSTR};
use windows::Win32::Foundation::HMODULE;
use windows::Win32::System::LibraryLoader::{GetProcAddress, LoadLibraryW};

pub const SUCCESS: u32 = 1;
pub const RM_MULTITOUCH: u32 = 2;

#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct NwPoint {
    pub x: f32,
    pub y: f32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct NwRect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct NwTouchPoint {
    pub touch_id: u32,
    pub touch_type: u32,
    pub touch_start: i64,
    pub touch_pos: NwPoint,
    pub velocity: f32,
    pub acceleration: f32,
    pub touch_area: f32,
    pub touch_event_type: u32,
    pub confidence_level: u32,
    pub height: f32,
    pub width: f32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct NwDisplayInfo {
    pub device_no: u32,
    pub display_rect: NwRect,
    pub display_work_rect: NwRect,
    pub is_primary: bool,
    pub device_name: [u8; 32],
}

/// `(device_id, status, packet_id, touches, ghost_touches)`
pub type TouchCallback = unsafe extern "system" fn(u32, u32, u32, u32, u32);

type OpenDeviceFn = unsafe extern "C" fn(u32, TouchCallback) -> u32;
type CloseDeviceFn = unsafe extern "C" fn(u32);
type DeviceCountFn = unsafe extern "C" fn() -> u32;
type DeviceIdFn = unsafe extern "C" fn(u32) -> u32;
type DisplayInfoFn = unsafe extern "C" fn(u32, *mut NwDisplayInfo) -> u32;
type SetReportModeFn = unsafe extern "C" fn(u32, u32) -> u32;
type GetTouchFn = unsafe extern "C" fn(u32, u32, *mut NwTouchPoint, u32, u32) -> u32;

pub struct Sdk {
    open_device: OpenDeviceFn,
    close_device: CloseDeviceFn,
    device_count: DeviceCountFn,
    device_id: DeviceIdFn,
    display_info: DisplayInfoFn,
    set_report_mode: SetReportModeFn,
    get_touch: GetTouchFn,
}

/// The process-wide SDK, loaded on first use.
pub fn sdk() -> Result<&'static Sdk, String> {
    static SDK: OnceLock<Result<Sdk, String>> = OnceLock::new();
    SDK.get_or_init(Sdk::load).as_ref().map_err(Clone::clone)
}

/// `name` must be nul-terminated.
unsafe fn export(
    module: HMODULE,
    name: &'static str,
) -> Result<unsafe extern "system" fn() -> isize, String> {
    GetProcAddress(module, PCSTR(name.as_ptr()))
        .ok_or_else(|| format!("NWMultiTouch.dll has no export {}", name.trim_end_matches('\0')))
}

impl Sdk {
    fn load() -> Result<Self, String> {
        unsafe {
            let module = LoadLibraryW(w!("NWMultiTouch.dll"))
                .map_err(|e| format!("loading NWMultiTouch.dll: {}", e))?;
            Ok(Self {
                open_device: std::mem::transmute::<_, OpenDeviceFn>(export(module, "OpenDevice\0")?),
                close_device: std::mem::transmute::<_, CloseDeviceFn>(export(
                    module,
                    "CloseDevice\0",
                )?),
                device_count: std::mem::transmute::<_, DeviceCountFn>(export(
                    module,
                    "GetConnectedDeviceCount\0",
                )?),
                device_id: std::mem::transmute::<_, DeviceIdFn>(export(
                    module,
                    "GetConnectedDeviceID\0",
                )?),
                display_info: std::mem::transmute::<_, DisplayInfoFn>(export(
                    module,
                    "GetConnectedDisplayInfo\0",
                )?),
                set_report_mode: std::mem::transmute::<_, SetReportModeFn>(export(
                    module,
                    "SetReportMode\0",
                )?),
                get_touch: std::mem::transmute::<_, GetTouchFn>(export(module, "GetTouch\0")?),
            })
        }
    }

    pub fn device_count(&self) -> u32 {
        unsafe { (self.device_count)() }
    }

    /// Serial number of the `index`th connected panel.
    pub fn device_serial(&self, index: u32) -> u32 {
        unsafe { (self.device_id)(index) }
    }

    /// Returns the SDK's device id for the opened panel.
    pub fn open_device(&self, serial: u32, callback: TouchCallback) -> u32 {
        unsafe { (self.open_device)(serial, callback) }
    }

    pub fn close_device(&self, serial: u32) {
        unsafe { (self.close_device)(serial) }
    }

    pub fn display_info(&self, index: u32) -> Option<NwDisplayInfo> {
        let mut info = NwDisplayInfo::default();
        let status = unsafe { (self.display_info)(index, &mut info) };
        (status == SUCCESS).then_some(info)
    }

    pub fn set_report_mode(&self, device_id: u32, mode: u32) -> u32 {
        unsafe { (self.set_report_mode)(device_id, mode) }
    }

    /// Touch data for one bit of a packet's touch mask.
    pub fn touch(&self, device_id: u32, packet_id: u32, bit: u32) -> Option<NwTouchPoint> {
        let mut point = NwTouchPoint::default();
        let status = unsafe { (self.get_touch)(device_id, packet_id, &mut point, bit, 0) };
        (status == SUCCESS).then_some(point)
    }
}
