// THEORY:
// Every fallible operation in the crate reports through one error type. The variants
// mirror the failure modes a monitoring session can actually hit: a recorded source
// running dry, a backend failing mid-capture, a region that no longer fits the frame,
// a corrupt region record, or a bad index. The caller decides what is fatal; the core
// never retries and never swallows an error into a boolean.

use crate::core_modules::geometry::{Rect, Resolution};
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MonitorError>;

#[derive(Debug, Error)]
pub enum MonitorError {
    /// A recorded source has no further frames and is not looping.
    #[error("frame source exhausted")]
    SourceExhausted,

    /// The acquisition backend failed while producing a frame.
    #[error("capture failed: {0}")]
    Capture(String),

    /// A region rectangle falls outside the image it is applied to.
    #[error("region {rect} lies outside a {width}x{height} image")]
    OutOfBounds { rect: Rect, width: u32, height: u32 },

    /// Persisted region data is corrupt or inconsistent.
    #[error("malformed region record: {0}")]
    Format(String),

    #[error("region index {index} out of range (have {len})")]
    Index { index: usize, len: usize },

    #[error("invalid region: {0}")]
    InvalidRegion(String),

    #[error("resolution mismatch: expected {expected}, got {actual}")]
    ResolutionMismatch {
        expected: Resolution,
        actual: Resolution,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Extraction was requested before any difference image was computed.
    #[error("no difference image has been computed yet")]
    NoDifference,

    #[error("no frame has been captured yet")]
    NoFrame,

    /// The parallel extractor's workers have stopped.
    #[error("worker pool unavailable")]
    PoolClosed,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),
}
