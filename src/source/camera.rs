// A live capture device. Frames arrive as fast as the device delivers them and the
// stream never runs out, so there is no cursor, no looping and no pre-computed average.

use crate::core_modules::frame::{Frame, FrameStamp};
use crate::core_modules::geometry::Resolution;
use crate::error::{MonitorError, Result};
use crate::source::{CaptureOptions, FrameSource};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

const DEFAULT_CAMERA_RESOLUTION: Resolution = Resolution {
    width: 640,
    height: 480,
};

/// Driver seam for a physical camera.
pub trait CameraDevice {
    /// Requests a capture size. Devices may round to the nearest supported mode.
    fn set_resolution(&mut self, resolution: Resolution) -> Result<()>;

    /// Blocks until the next frame is available.
    fn grab(&mut self) -> Result<Frame>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub device_index: u32,
    pub resolution: Resolution,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            resolution: DEFAULT_CAMERA_RESOLUTION,
        }
    }
}

pub struct LiveCamera<D: CameraDevice> {
    device: D,
    config: CameraConfig,
    resolution: Resolution,
    frames_captured: u64,
}

impl<D: CameraDevice> LiveCamera<D> {
    pub fn open(mut device: D, config: CameraConfig) -> Result<Self> {
        device.set_resolution(config.resolution)?;
        log::info!(
            "camera {}: opened at {}",
            config.device_index,
            config.resolution
        );
        Ok(Self {
            device,
            resolution: config.resolution,
            config,
            frames_captured: 0,
        })
    }

    pub fn device_index(&self) -> u32 {
        self.config.device_index
    }

    pub fn frames_captured(&self) -> u64 {
        self.frames_captured
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn into_device(self) -> D {
        self.device
    }
}

impl<D: CameraDevice> FrameSource for LiveCamera<D> {
    fn capture(&mut self, options: CaptureOptions) -> Result<Frame> {
        let frame = self.device.grab().map_err(|e| match e {
            MonitorError::Capture(_) => e,
            other => MonitorError::Capture(other.to_string()),
        })?;

        if frame.resolution() != self.resolution {
            log::warn!(
                "camera {}: delivered {} instead of {}",
                self.config.device_index,
                frame.resolution(),
                self.resolution
            );
            self.resolution = frame.resolution();
        }
        self.frames_captured += 1;

        if options.include_timestamp {
            Ok(frame.with_stamp(FrameStamp::Wall(SystemTime::now())))
        } else {
            Ok(frame)
        }
    }

    fn resolution(&self) -> Resolution {
        self.resolution
    }

    fn is_at_end(&self) -> bool {
        false
    }

    fn rewind(&mut self) {}

    fn total_frame_count(&self) -> u64 {
        0
    }

    fn set_output_resolution(&mut self, resolution: Resolution) -> Result<()> {
        self.device.set_resolution(resolution)?;
        self.resolution = resolution;
        log::info!(
            "camera {}: resolution set to {}",
            self.config.device_index,
            resolution
        );
        Ok(())
    }
}
