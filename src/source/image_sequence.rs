// An ordered sequence of still images played back like a recorded video. The frames
// come either from a folder on disk (read lazily, one file per capture) or from a
// vector already in memory.
//
// Folder order is the lexical order of file names, so numbered captures such as
// `frame_0001.jpg` play in sequence. Only `.tif`, `.tiff`, `.jpg`, `.jpeg` and `.png`
// files are picked up; anything else in the folder is ignored.

use crate::core_modules::frame::{Frame, FrameStamp};
use crate::core_modules::geometry::Resolution;
use crate::error::{MonitorError, Result};
use crate::source::{average_sampled, CaptureOptions, Cursor, FrameSource, SequenceConfig};
use std::fs;
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: [&str; 5] = ["tif", "tiff", "jpg", "jpeg", "png"];

enum SequenceBackend {
    Folder(Vec<PathBuf>),
    Memory(Vec<Frame>),
}

pub struct ImageSequence {
    backend: SequenceBackend,
    cursor: Cursor,
    native: Resolution,
    output: Resolution,
}

impl ImageSequence {
    /// Lists the image files in `dir`. The first file fixes the native resolution.
    pub fn open<P: AsRef<Path>>(dir: P, config: SequenceConfig) -> Result<Self> {
        let dir = dir.as_ref();
        let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && is_image_file(path))
            .collect();
        paths.sort();

        let first = paths.first().ok_or_else(|| {
            MonitorError::InvalidConfig(format!("no images found in {}", dir.display()))
        })?;
        let (width, height) = image::image_dimensions(first)?;
        let native = Resolution::new(width, height);

        let cursor = Cursor::new(paths.len() as u64, &config);
        log::info!(
            "sequence: {} images in {} at {}",
            paths.len(),
            dir.display(),
            native
        );
        Ok(Self {
            backend: SequenceBackend::Folder(paths),
            cursor,
            native,
            output: native,
        })
    }

    /// Plays back frames that are already decoded. All frames must share one size.
    pub fn from_frames(frames: Vec<Frame>, config: SequenceConfig) -> Result<Self> {
        let native = frames
            .first()
            .map(Frame::resolution)
            .ok_or_else(|| MonitorError::InvalidConfig("frame list is empty".to_string()))?;
        if let Some(odd) = frames.iter().find(|f| f.resolution() != native) {
            return Err(MonitorError::ResolutionMismatch {
                expected: native,
                actual: odd.resolution(),
            });
        }

        let cursor = Cursor::new(frames.len() as u64, &config);
        Ok(Self {
            backend: SequenceBackend::Memory(frames),
            cursor,
            native,
            output: native,
        })
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    pub fn native_resolution(&self) -> Resolution {
        self.native
    }

    /// The files backing a folder sequence.
    pub fn paths(&self) -> Option<&[PathBuf]> {
        match &self.backend {
            SequenceBackend::Folder(paths) => Some(paths),
            SequenceBackend::Memory(_) => None,
        }
    }

    fn load(&self, index: u64, include_timestamp: bool) -> Result<Frame> {
        let i = index as usize;
        let frame = match &self.backend {
            SequenceBackend::Folder(paths) => {
                let path = &paths[i];
                let frame = Frame::from_image(image::open(path)?.to_rgb8());
                if include_timestamp {
                    let modified = fs::metadata(path)?.modified()?;
                    frame.with_stamp(FrameStamp::FileModified(modified))
                } else {
                    frame
                }
            }
            SequenceBackend::Memory(frames) => {
                let frame = frames[i].clone();
                if include_timestamp {
                    frame.with_stamp(FrameStamp::Position {
                        millis: 0.0,
                        index,
                        total: self.cursor.total(),
                    })
                } else {
                    frame
                }
            }
        };
        Ok(frame.resized(self.output))
    }
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

impl FrameSource for ImageSequence {
    fn capture(&mut self, options: CaptureOptions) -> Result<Frame> {
        let index = self.cursor.next_index()?;
        let frame = self.load(index, options.include_timestamp)?;
        self.cursor.advance();
        Ok(frame)
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
        let mean = average_sampled(&self.cursor, count, self.output, |index| {
            self.load(index, false)
        })?;
        Ok(Some(mean))
    }
}
