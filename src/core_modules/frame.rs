// THEORY:
// A `Frame` is one captured image sample. It is immutable once produced: every
// transformation (difference, crop, resample) returns a new `Frame`. The pixel storage
// is an `image::RgbImage` held behind an `Arc`, so the monitor can keep the current
// frame, the previous frame and the reference frame around without copying buffers.
//
// `FrameAccumulator` is the floating-point running sum used to build an averaged
// reference. It lives next to `Frame` because both the reference model (streaming
// sources) and the materialized sources (pre-computed averages) need it.

use crate::core_modules::geometry::{Rect, Resolution};
use crate::core_modules::pixel::pixel::{CHANNELS, Pixel};
use crate::error::{MonitorError, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Capture metadata a rendering collaborator may overlay on the frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameStamp {
    /// Wall-clock time the frame was grabbed from a live device.
    Wall(SystemTime),
    /// Position within a finite source.
    Position { millis: f64, index: u64, total: u64 },
    /// Modification time of the file the frame was read from.
    FileModified(SystemTime),
}

impl fmt::Display for FrameStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let epoch_secs = |t: &SystemTime| t.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
        match self {
            FrameStamp::Wall(t) | FrameStamp::FileModified(t) => write!(f, "{}", epoch_secs(t)),
            FrameStamp::Position { millis, index, total } => write!(f, "{millis} - {index}/{total}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Frame {
    image: Arc<RgbImage>,
    stamp: Option<FrameStamp>,
}

impl PartialEq for Frame {
    fn eq(&self, other: &Self) -> bool {
        self.image.as_raw() == other.image.as_raw()
            && self.image.dimensions() == other.image.dimensions()
    }
}

impl Frame {
    pub fn from_image(image: RgbImage) -> Self {
        Self {
            image: Arc::new(image),
            stamp: None,
        }
    }

    /// Builds a frame from a packed RGB buffer as handed over by a backend.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * CHANNELS;
        if data.len() != expected {
            return Err(MonitorError::Capture(format!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                data.len()
            )));
        }
        RgbImage::from_raw(width, height, data)
            .map(Self::from_image)
            .ok_or_else(|| MonitorError::Capture("RGB frame buffer rejected".to_string()))
    }

    /// A frame where every pixel has the same value.
    pub fn filled(resolution: Resolution, pixel: Pixel) -> Self {
        Self::from_image(RgbImage::from_pixel(
            resolution.width,
            resolution.height,
            pixel.into(),
        ))
    }

    pub fn with_stamp(&self, stamp: FrameStamp) -> Self {
        Self {
            image: Arc::clone(&self.image),
            stamp: Some(stamp),
        }
    }

    pub fn stamp(&self) -> Option<&FrameStamp> {
        self.stamp.as_ref()
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width(), self.height())
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn pixel(&self, x: u32, y: u32) -> Pixel {
        (*self.image.get_pixel(x, y)).into()
    }

    /// Iterates `(x, y, pixel)` in row-major order.
    pub fn pixels(&self) -> impl Iterator<Item = (u32, u32, Pixel)> + '_ {
        self.image
            .enumerate_pixels()
            .map(|(x, y, rgb)| (x, y, Pixel::from(*rgb)))
    }

    /// Per-channel absolute difference against another frame of the same size.
    pub fn abs_diff(&self, other: &Frame) -> Result<Frame> {
        if self.resolution() != other.resolution() {
            return Err(MonitorError::ResolutionMismatch {
                expected: self.resolution(),
                actual: other.resolution(),
            });
        }
        let image = RgbImage::from_fn(self.width(), self.height(), |x, y| {
            self.pixel(x, y).abs_diff(&other.pixel(x, y)).into()
        });
        Ok(Frame::from_image(image))
    }

    /// Copies out the pixels covered by `rect`.
    pub fn crop(&self, rect: &Rect) -> Result<Frame> {
        if rect.is_degenerate() || !rect.fits_within(self.resolution()) {
            return Err(MonitorError::OutOfBounds {
                rect: *rect,
                width: self.width(),
                height: self.height(),
            });
        }
        let view = imageops::crop_imm(
            &*self.image,
            rect.x1,
            rect.y1,
            rect.width(),
            rect.height(),
        );
        Ok(Frame::from_image(view.to_image()))
    }

    /// Nearest-neighbor resample. Returns a cheap clone when the size already matches.
    pub fn resized(&self, target: Resolution) -> Frame {
        if target == self.resolution() {
            return self.clone();
        }
        let image = imageops::resize(
            &*self.image,
            target.width,
            target.height,
            FilterType::Nearest,
        );
        Frame {
            image: Arc::new(image),
            stamp: self.stamp.clone(),
        }
    }
}

/// Per-channel floating-point running sum over frames of one resolution.
#[derive(Debug, Clone)]
pub struct FrameAccumulator {
    resolution: Resolution,
    sum: Vec<f64>,
    count: usize,
}

impl FrameAccumulator {
    pub fn new(resolution: Resolution) -> Self {
        Self {
            resolution,
            sum: vec![0.0; resolution.pixel_count() * CHANNELS],
            count: 0,
        }
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn add(&mut self, frame: &Frame) -> Result<()> {
        if frame.resolution() != self.resolution {
            return Err(MonitorError::ResolutionMismatch {
                expected: self.resolution,
                actual: frame.resolution(),
            });
        }
        for (acc, &v) in self.sum.iter_mut().zip(frame.image().as_raw().iter()) {
            *acc += v as f64;
        }
        self.count += 1;
        Ok(())
    }

    /// Divides the running sum by `divisor` and rounds every channel to the nearest value.
    pub fn mean(&self, divisor: usize) -> Result<Frame> {
        if divisor == 0 {
            return Err(MonitorError::InvalidConfig(
                "cannot average zero frames".to_string(),
            ));
        }
        let data = self
            .sum
            .iter()
            .map(|s| (s / divisor as f64).round().clamp(0.0, 255.0) as u8)
            .collect();
        Frame::from_raw(self.resolution.width, self.resolution.height, data)
    }
}
