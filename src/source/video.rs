// A recorded video played back through a `Cursor`. Decoding is delegated to a
// `VideoDecoder`; this type owns playback: the start/end/step window, looping, the
// output size and the averaged background.
//
// Decoders read sequentially, so the source tracks where the decoder currently sits
// and only seeks when the next wanted index is not the one it would read anyway.

use crate::core_modules::frame::{Frame, FrameStamp};
use crate::core_modules::geometry::Resolution;
use crate::error::{MonitorError, Result};
use crate::source::{average_sampled, CaptureOptions, Cursor, FrameSource, SequenceConfig};

/// Codec seam for recorded video.
pub trait VideoDecoder {
    fn native_resolution(&self) -> Resolution;

    fn frame_count(&self) -> u64;

    /// Positions the decoder so the next `read_frame` returns frame `index`.
    fn seek(&mut self, index: u64) -> Result<()>;

    /// Decodes the frame at the current position and moves past it.
    fn read_frame(&mut self) -> Result<Frame>;

    /// Media time of the most recently decoded frame.
    fn position_millis(&self) -> f64;
}

pub struct RecordedVideo<D: VideoDecoder> {
    decoder: D,
    cursor: Cursor,
    output: Resolution,
    /// Index the decoder would return next, if known.
    decoder_position: Option<u64>,
}

impl<D: VideoDecoder> RecordedVideo<D> {
    pub fn open(decoder: D, config: SequenceConfig) -> Result<Self> {
        let total = decoder.frame_count();
        if total == 0 {
            return Err(MonitorError::InvalidConfig(
                "video contains no frames".to_string(),
            ));
        }
        let cursor = Cursor::new(total, &config);
        let output = decoder.native_resolution();
        log::info!(
            "video: {} frames at {}, playing {}..{} step {}",
            total,
            output,
            cursor.start(),
            cursor.end(),
            cursor.step()
        );
        Ok(Self {
            decoder,
            cursor,
            output,
            decoder_position: Some(0),
        })
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    pub fn native_resolution(&self) -> Resolution {
        self.decoder.native_resolution()
    }

    fn read_at(&mut self, index: u64) -> Result<Frame> {
        if self.decoder_position != Some(index) {
            self.decoder.seek(index)?;
        }
        match self.decoder.read_frame() {
            Ok(frame) => {
                self.decoder_position = Some(index + 1);
                Ok(frame.resized(self.output))
            }
            Err(e) => {
                self.decoder_position = None;
                Err(match e {
                    MonitorError::Capture(_) => e,
                    other => MonitorError::Capture(format!("frame {index}: {other}")),
                })
            }
        }
    }
}

impl<D: VideoDecoder> FrameSource for RecordedVideo<D> {
    fn capture(&mut self, options: CaptureOptions) -> Result<Frame> {
        let index = self.cursor.next_index()?;
        let frame = self.read_at(index)?;
        self.cursor.advance();

        if options.include_timestamp {
            Ok(frame.with_stamp(FrameStamp::Position {
                millis: self.decoder.position_millis(),
                index,
                total: self.cursor.total(),
            }))
        } else {
            Ok(frame)
        }
    }

    fn resolution(&self) -> Resolution {
        self.output
    }

    fn is_at_end(&self) -> bool {
        self.cursor.is_at_end()
    }

    fn rewind(&mut self) {
        self.cursor.rewind();
    }

    fn total_frame_count(&self) -> u64 {
        self.cursor.total()
    }

    fn set_output_resolution(&mut self, resolution: Resolution) -> Result<()> {
        if resolution.width == 0 || resolution.height == 0 {
            return Err(MonitorError::InvalidConfig(format!(
                "invalid output resolution {resolution}"
            )));
        }
        self.output = resolution;
        Ok(())
    }

    fn set_loop(&mut self, enabled: bool) -> bool {
        self.cursor.set_loop(enabled);
        enabled
    }

    fn average_frames(&mut self, count: usize) -> Result<Option<Frame>> {
        let cursor = self.cursor.clone();
        let output = self.output;
        let mean = average_sampled(&cursor, count, output, |index| self.read_at(index))?;
        Ok(Some(mean))
    }
}
