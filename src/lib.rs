// THEORY:
// This file is the main entry point for the `vial_monitor` library crate. It defines
// the public API exposed to whatever drives the monitor (a GUI, a batch script, a
// lab acquisition loop).
//
// The primary goal is to export `Monitor` and its associated data structures
// (`MonitorConfig`, `Extraction`, the frame sources) as one high-level interface for
// multi-region motion tracking. The analysis building blocks live in `core_modules`
// and stay public so a caller can reuse, for example, the position extractor on a
// difference image it produced itself.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod parallel_pipeline;
pub mod pipeline;
pub mod source;

pub use config::{ChannelMode, KMeansConfig, MonitorConfig};
pub use core_modules::clustering::{Clusterer, KMeans};
pub use core_modules::frame::{Frame, FrameStamp};
pub use core_modules::geometry::{CoordinateSpace, Point, Rect, Resolution};
pub use core_modules::region::{CropRegion, RegionSet};
pub use error::{MonitorError, Result};
pub use parallel_pipeline::WorkerPool;
pub use pipeline::{Extraction, Monitor, RegionFailure};
pub use source::{CaptureOptions, FrameSource, SequenceConfig};
