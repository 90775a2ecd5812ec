use std::io::Cursor;

use image::{DynamicImage, GrayImage, ImageOutputFormat, Luma};

use crate::error::DeviceError;
use crate::types::*;
use super::DeviceGateway;

const STUB_SERIAL: &str = "stub-0";
const SCREEN_W: u32 = 1080;
const SCREEN_H: u32 = 1920;

/// Fake device for dry runs: one device, a blank screen, taps that always land.
pub struct StubGateway {
    screen: Vec<u8>,
}

impl StubGateway {
    pub fn new() -> Self {
        let blank = GrayImage::from_pixel(SCREEN_W, SCREEN_H, Luma([32]));
        let mut out = Cursor::new(Vec::new());
        if let Err(e) = DynamicImage::ImageLuma8(blank).write_to(&mut out, ImageOutputFormat::Png) {
            log::error!(target: "stub", "failed to render stub screen: {}", e);
        }
        Self { screen: out.into_inner() }
    }
}

impl Default for StubGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceGateway for StubGateway {
    fn list_devices(&self) -> Result<Vec<DeviceId>, DeviceError> {
        log::info!(target: "stub", "list_devices()");
        Ok(vec![DeviceId(STUB_SERIAL.into())])
    }

    fn capture(&self, device: &DeviceId) -> Result<Capture, DeviceError> {
        log::info!(target: "stub", "capture({})", device);
        if self.screen.is_empty() {
            return Err(DeviceError::CaptureUnavailable("stub screen was not rendered".into()));
        }
        Ok(Capture { data: self.screen.clone(), artifact: None })
    }

    fn tap(&self, device: &DeviceId, point: ScreenPoint) -> Result<(), DeviceError> {
        log::info!(target: "stub", "tap({}, {})", device, point);
        Ok(())
    }

    fn cleanup(&self, device: &DeviceId) -> Result<(), DeviceError> {
        log::info!(target: "stub", "cleanup({})", device);
        Ok(())
    }
}
