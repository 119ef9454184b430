// thin wrapper around openpnp_capture
use std::time::{Duration, Instant};

use image::{DynamicImage, RgbImage};
use openpnp_capture_sys as openpnp_sys;
use openpnp_sys::{CapContext, CapFormatInfo, CapPropertyID, CapStream};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::pipeline::FrameSource;

const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Manual camera settings applied after the stream is opened. `None` keeps
/// the driver's value.
#[derive(Debug, Clone, Default)]
pub struct CameraSettings {
    pub exposure: Option<i32>,
    pub auto_exposure: Option<bool>,
    pub gain: Option<i32>,
    pub brightness: Option<i32>,
}

/// RGB frames from a local camera. A frame that does not arrive within
/// `frame_timeout` ends the stream.
pub struct WebcamSource {
    ctx: CapContext,
    stream: CapStream,
    width: u32,
    height: u32,
    frame_timeout: Duration,
}

impl WebcamSource {
    pub fn open(
        device: u32,
        format: i32,
        settings: &CameraSettings,
        frame_timeout: Duration,
    ) -> Result<Self> {
        let ctx = unsafe { openpnp_sys::Cap_createContext() };
        if ctx.is_null() {
            return Err(Error::unavailable("camera", "could not create capture context"));
        }

        let device_count = unsafe { openpnp_sys::Cap_getDeviceCount(ctx) };
        if device >= device_count {
            unsafe { openpnp_sys::Cap_releaseContext(ctx) };
            return Err(Error::unavailable(
                "camera",
                format!("device {device} not found ({device_count} available)"),
            ));
        }

        let mut info: CapFormatInfo = unsafe { std::mem::zeroed() };
        let res = unsafe { openpnp_sys::Cap_getFormatInfo(ctx, device, format, &mut info) };
        if res != openpnp_sys::CAPRESULT_OK {
            unsafe { openpnp_sys::Cap_releaseContext(ctx) };
            return Err(Error::unavailable(
                "camera",
                format!("format {format} not supported by device {device}"),
            ));
        }

        let stream = unsafe { openpnp_sys::Cap_openStream(ctx, device, format) };
        if stream < 0 {
            unsafe { openpnp_sys::Cap_releaseContext(ctx) };
            return Err(Error::unavailable("camera", format!("could not open device {device}")));
        }

        info!(
            device,
            width = info.width,
            height = info.height,
            fps = info.fps,
            "camera opened"
        );

        let source = Self {
            ctx,
            stream,
            width: info.width,
            height: info.height,
            frame_timeout,
        };
        source.apply(settings);
        Ok(source)
    }

    fn apply(&self, settings: &CameraSettings) {
        if let Some(auto) = settings.auto_exposure {
            set_camera_auto_property(self.ctx, self.stream, openpnp_sys::CAPPROPID_EXPOSURE, auto);
        }
        // manual exposure is ignored by most drivers while auto exposure is on
        if let Some(exposure) = settings.exposure {
            set_camera_property(self.ctx, self.stream, openpnp_sys::CAPPROPID_EXPOSURE, exposure);
        }
        if let Some(gain) = settings.gain {
            set_camera_property(self.ctx, self.stream, openpnp_sys::CAPPROPID_GAIN, gain);
        }
        if let Some(brightness) = settings.brightness {
            set_camera_property(
                self.ctx,
                self.stream,
                openpnp_sys::CAPPROPID_BRIGHTNESS,
                brightness,
            );
        }
    }

    fn wait_for_frame(&self) -> bool {
        let deadline = Instant::now() + self.frame_timeout;
        while unsafe { openpnp_sys::Cap_hasNewFrame(self.ctx, self.stream) } == 0 {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
        true
    }
}

impl FrameSource for WebcamSource {
    fn next_frame(&mut self) -> Option<DynamicImage> {
        if !self.wait_for_frame() {
            warn!(timeout = ?self.frame_timeout, "no frame from camera, ending stream");
            return None;
        }

        let mut buffer = vec![0u8; (self.width * self.height * 3) as usize];
        let res = unsafe {
            openpnp_sys::Cap_captureFrame(
                self.ctx,
                self.stream,
                buffer.as_mut_ptr().cast(),
                buffer.len() as u32,
            )
        };
        if res != openpnp_sys::CAPRESULT_OK {
            warn!(result = res, "camera read failed, ending stream");
            return None;
        }

        RgbImage::from_raw(self.width, self.height, buffer).map(DynamicImage::ImageRgb8)
    }
}

impl Drop for WebcamSource {
    fn drop(&mut self) {
        unsafe {
            openpnp_sys::Cap_closeStream(self.ctx, self.stream);
            openpnp_sys::Cap_releaseContext(self.ctx);
        }
        debug!("camera released");
    }
}

fn set_camera_property(ctx: CapContext, stream: CapStream, property: CapPropertyID, value: i32) {
    let res = unsafe { openpnp_sys::Cap_setProperty(ctx, stream, property, value) };
    if res != openpnp_sys::CAPRESULT_OK {
        warn!(property, value, result = res, "error setting camera property");
    }
}

fn set_camera_auto_property(
    ctx: CapContext,
    stream: CapStream,
    property: CapPropertyID,
    value: bool,
) {
    let res = unsafe { openpnp_sys::Cap_setAutoProperty(ctx, stream, property, value as u32) };
    if res != openpnp_sys::CAPRESULT_OK {
        warn!(property, value, result = res, "error setting camera auto property");
    }
}
