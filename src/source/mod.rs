//! Frame sources.
//!
//! This module defines the capability set the monitor consumes and three sources
//! that implement it:
//! - `LiveCamera`: a capture device, unbounded, never exhausts
//! - `RecordedVideo`: a decoded video file with a playback cursor
//! - `ImageSequence`: a folder of still images (or frames already in memory)
//!
//! Device drivers and video codecs are not part of this crate. `LiveCamera` and
//! `RecordedVideo` wrap the `CameraDevice` and `VideoDecoder` backend traits; only the
//! image-folder reader is concrete, since the `image` crate already decodes stills.
//!
//! Finite sources share one `Cursor`. It advances by `step` on every capture, and when
//! looping is enabled a capture at the end wraps back to `start` before reading.
//! `is_at_end` is a pure query; `rewind` is the explicit reset.

pub mod camera;
pub mod image_sequence;
pub mod video;

pub use camera::{CameraConfig, CameraDevice, LiveCamera};
pub use image_sequence::ImageSequence;
pub use video::{RecordedVideo, VideoDecoder};

use crate::core_modules::frame::{Frame, FrameAccumulator};
use crate::core_modules::geometry::Resolution;
use crate::error::{MonitorError, Result};
use serde::{Deserialize, Serialize};

/// Per-call capture options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureOptions {
    /// Attach a `FrameStamp` to the returned frame.
    pub include_timestamp: bool,
}

impl CaptureOptions {
    pub fn stamped() -> Self {
        Self {
            include_timestamp: true,
        }
    }
}

/// Everything the monitor needs from wherever frames come from.
pub trait FrameSource {
    /// Produces the next frame. Blocks on device or file I/O.
    fn capture(&mut self, options: CaptureOptions) -> Result<Frame>;

    fn resolution(&self) -> Resolution;

    /// True once a non-looping finite source has no usable frame left.
    fn is_at_end(&self) -> bool;

    /// Moves the cursor back to the first usable frame.
    fn rewind(&mut self);

    /// Number of frames in the underlying sequence, 0 for unbounded sources.
    fn total_frame_count(&self) -> u64;

    fn set_output_resolution(&mut self, resolution: Resolution) -> Result<()>;

    /// Turns looping on or off and returns the resulting mode.
    fn set_loop(&mut self, _enabled: bool) -> bool {
        false
    }

    /// Mean of `count` equally spaced frames across the whole usable sequence, without
    /// moving the cursor. Streaming sources return `None`.
    fn average_frames(&mut self, _count: usize) -> Result<Option<Frame>> {
        Ok(None)
    }
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn capture(&mut self, options: CaptureOptions) -> Result<Frame> {
        (**self).capture(options)
    }
    fn resolution(&self) -> Resolution {
        (**self).resolution()
    }
    fn is_at_end(&self) -> bool {
        (**self).is_at_end()
    }
    fn rewind(&mut self) {
        (**self).rewind()
    }
    fn total_frame_count(&self) -> u64 {
        (**self).total_frame_count()
    }
    fn set_output_resolution(&mut self, resolution: Resolution) -> Result<()> {
        (**self).set_output_resolution(resolution)
    }
    fn set_loop(&mut self, enabled: bool) -> bool {
        (**self).set_loop(enabled)
    }
    fn average_frames(&mut self, count: usize) -> Result<Option<Frame>> {
        (**self).average_frames(count)
    }
}

/// Playback window for a finite source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceConfig {
    pub start: u64,
    /// Exclusive end index; `None` or out-of-range values mean "through the last frame".
    pub end: Option<u64>,
    pub step: u64,
    pub loop_enabled: bool,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            start: 0,
            end: None,
            step: 1,
            loop_enabled: false,
        }
    }
}

/// Playback position within a finite, ordered frame source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    current: u64,
    start: u64,
    end: u64,
    step: u64,
    loop_enabled: bool,
    total: u64,
}

impl Cursor {
    pub fn new(total: u64, config: &SequenceConfig) -> Self {
        let end = match config.end {
            Some(end) if end > 0 && end <= total => end,
            _ => total,
        };
        let start = config.start.min(end);
        Self {
            current: start,
            start,
            end,
            step: config.step.max(1),
            loop_enabled: config.loop_enabled,
            total,
        }
    }

    pub fn current(&self) -> u64 {
        self.current
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn loop_enabled(&self) -> bool {
        self.loop_enabled
    }

    pub fn set_loop(&mut self, enabled: bool) {
        self.loop_enabled = enabled;
    }

    pub fn is_at_end(&self) -> bool {
        !self.loop_enabled && self.current >= self.end
    }

    pub fn rewind(&mut self) {
        self.current = self.start;
    }

    /// Index of the frame the next capture should read, wrapping when looping.
    pub fn next_index(&mut self) -> Result<u64> {
        if self.current >= self.end {
            if self.loop_enabled && self.start < self.end {
                log::debug!("cursor: wrapping from {} to {}", self.current, self.start);
                self.current = self.start;
            } else {
                return Err(MonitorError::SourceExhausted);
            }
        }
        Ok(self.current)
    }

    /// Moves forward by `step`, never past `end`.
    pub fn advance(&mut self) {
        self.current = self.current.saturating_add(self.step).min(self.end);
    }

    /// Every index a full pass would visit.
    pub fn usable_indices(&self) -> impl Iterator<Item = u64> {
        (self.start..self.end).step_by(self.step as usize)
    }

    /// Up to `count` indices spread evenly over the usable range.
    pub fn sample_indices(&self, count: usize) -> Vec<u64> {
        let usable: Vec<u64> = self.usable_indices().collect();
        if usable.is_empty() || count == 0 {
            return Vec::new();
        }
        let stride = (usable.len() / count).max(1);
        usable.into_iter().step_by(stride).take(count).collect()
    }
}

/// Averages the frames at `cursor.sample_indices(count)` using `read` for random access.
pub(crate) fn average_sampled<F>(
    cursor: &Cursor,
    count: usize,
    resolution: Resolution,
    mut read: F,
) -> Result<Frame>
where
    F: FnMut(u64) -> Result<Frame>,
{
    let indices = cursor.sample_indices(count);
    if indices.is_empty() {
        return Err(MonitorError::InvalidConfig(
            "no frames available to average".to_string(),
        ));
    }
    let mut acc = FrameAccumulator::new(resolution);
    for index in &indices {
        acc.add(&read(*index)?)?;
    }
    log::debug!("source: averaged {} sampled frames", indices.len());
    acc.mean(acc.count())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn looping(total: u64) -> Cursor {
        Cursor::new(
            total,
            &SequenceConfig {
                loop_enabled: true,
                ..SequenceConfig::default()
            },
        )
    }

    #[test]
    fn constructor_normalizes_the_window() {
        let c = Cursor::new(
            50,
            &SequenceConfig {
                start: 80,
                end: Some(0),
                step: 0,
                loop_enabled: false,
            },
        );
        assert_eq!(c.end(), 50);
        assert_eq!(c.start(), 50);
        assert_eq!(c.step(), 1);
        assert!(c.is_at_end());

        let c = Cursor::new(
            50,
            &SequenceConfig {
                end: Some(900),
                ..SequenceConfig::default()
            },
        );
        assert_eq!(c.end(), 50);
    }

    #[test]
    fn exhausts_without_looping() {
        let mut c = Cursor::new(3, &SequenceConfig::default());
        for expected in 0..3 {
            assert!(!c.is_at_end());
            assert_eq!(c.next_index().unwrap(), expected);
            c.advance();
        }
        assert!(c.is_at_end());
        assert!(matches!(c.next_index(), Err(MonitorError::SourceExhausted)));
    }

    #[test]
    fn wraps_when_looping_and_query_is_pure() {
        let mut c = looping(10);
        for _ in 0..10 {
            c.next_index().unwrap();
            c.advance();
        }
        assert!(!c.is_at_end());
        assert!(!c.is_at_end());
        assert_eq!(c.current(), 10);
        assert_eq!(c.next_index().unwrap(), 0);
    }

    #[test]
    fn step_skips_frames() {
        let mut c = Cursor::new(
            10,
            &SequenceConfig {
                start: 1,
                step: 4,
                ..SequenceConfig::default()
            },
        );
        let mut seen = Vec::new();
        while let Ok(i) = c.next_index() {
            seen.push(i);
            c.advance();
        }
        assert_eq!(seen, vec![1, 5, 9]);
        assert_eq!(c.current(), 10);
        c.rewind();
        assert_eq!(c.current(), 1);
    }

    #[test]
    fn samples_are_evenly_spread() {
        let c = Cursor::new(100, &SequenceConfig::default());
        assert_eq!(c.sample_indices(4), vec![0, 25, 50, 75]);
        let short = Cursor::new(3, &SequenceConfig::default());
        assert_eq!(short.sample_indices(10), vec![0, 1, 2]);
    }
}
