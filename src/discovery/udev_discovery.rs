use super::{DeviceDiscovery, DeviceInfo, DeviceLocator, DiscoveryError};
use std::path::PathBuf;
use tracing::debug;

pub struct UdevDiscovery;

impl DeviceDiscovery for UdevDiscovery {
    fn find_touchscreens() -> Result<Vec<DeviceInfo>, DiscoveryError> {
        let mut enumerator =
            udev::Enumerator::new().map_err(|e| DiscoveryError::Enumeration(e.to_string()))?;

        enumerator
            .match_subsystem("input")
            .map_err(|e| DiscoveryError::Enumeration(e.to_string()))?;

        enumerator
            .match_property("ID_INPUT_TOUCHSCREEN", "1")
            .map_err(|e| DiscoveryError::Enumeration(e.to_string()))?;

        let mut results = Vec::new();

        for device in enumerator
            .scan_devices()
            .map_err(|e| DiscoveryError::Enumeration(e.to_string()))?
        {
            let syspath = device.syspath().to_string_lossy().to_string();
            if !syspath.contains("/event") {
                continue;
            }

            if let Some(devnode) = device.devnode() {
                let name = device
                    .parent()
                    .and_then(|parent| {
                        parent
                            .property_value("NAME")
                            .map(|v| v.to_string_lossy().trim_matches('"').to_string())
                    })
                    .unwrap_or_else(|| "touchscreen".to_string());
                debug!(devnode = %devnode.display(), name, "found touchscreen");
                results.push(DeviceInfo {
                    name,
                    locator: DeviceLocator::Path(PathBuf::from(devnode)),
                });
            }
        }

        if results.is_empty() {
            Err(DiscoveryError::NotFound)
        } else {
            Ok(results)
        }
    }
}
