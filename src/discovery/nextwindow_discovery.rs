use super::{DeviceDiscovery, DeviceInfo, DeviceLocator, DiscoveryError};
use crate::input::nwsdk;

/// Lists the panels the NextWindow SDK reports as connected.
pub struct NextWindowDiscovery;

impl DeviceDiscovery for NextWindowDiscovery {
    fn find_touchscreens() -> Result<Vec<DeviceInfo>, DiscoveryError> {
        let sdk = nwsdk::sdk().map_err(DiscoveryError::Enumeration)?;
        let results: Vec<DeviceInfo> = (0..sdk.device_count())
            .map(|index| DeviceInfo {
                name: format!("NextWindow panel {}", index),
                locator: DeviceLocator::Serial(sdk.device_serial(index)),
            })
            .collect();

        if results.is_empty() {
            Err(DiscoveryError::NotFound)
        } else {
            Ok(results)
        }
    }
}
