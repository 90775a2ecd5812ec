pub mod adb;
pub mod stub;

use std::path::PathBuf;
use std::time::Duration;

use crate::error::DeviceError;
use crate::types::*;

/// Device control channel: enumerate, screenshot, tap, clean up.
pub trait DeviceGateway {
    fn list_devices(&self) -> Result<Vec<DeviceId>, DeviceError>;
    fn capture(&self, device: &DeviceId) -> Result<Capture, DeviceError>;
    fn tap(&self, device: &DeviceId, point: ScreenPoint) -> Result<(), DeviceError>;
    /// Remove local and on-device capture artifacts.
    fn cleanup(&self, device: &DeviceId) -> Result<(), DeviceError>;
}

/// Where captures go and how long any single device command may take.
#[derive(Debug, Clone)]
pub struct GatewayOptions {
    pub tmp_dir: PathBuf,
    pub command_timeout: Duration,
}

/// Create the gateway for this run: the real adb channel (which must be
/// installed), or the stub device.
pub fn create_gateway(force_stub: bool, options: GatewayOptions) -> Result<Box<dyn DeviceGateway>, DeviceError> {
    if force_stub {
        log::info!("using stub device, no taps reach real hardware");
        return Ok(Box::new(stub::StubGateway::new()));
    }
    let adb = adb::AdbGateway::new(options);
    adb.check_installed()?;
    Ok(Box::new(adb))
}

/// Pick the device to drive. Several devices and no explicit index means
/// the first one, with a warning.
pub fn select_device(devices: &[DeviceId], index: Option<usize>) -> Result<DeviceId, DeviceError> {
    if devices.is_empty() {
        return Err(DeviceError::NoDevices);
    }
    match index {
        Some(i) => devices
            .get(i)
            .cloned()
            .ok_or(DeviceError::NoSuchDevice { index: i, count: devices.len() }),
        None => {
            if devices.len() > 1 {
                log::warn!("multiple devices found, using first one: {}", devices[0]);
            }
            Ok(devices[0].clone())
        }
    }
}
