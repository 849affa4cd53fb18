// Tunable behavior of the monitoring pipeline. Every field has a default, so a JSON
// file only needs to name what it changes.

use crate::error::{MonitorError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub use crate::core_modules::pixel::pixel::ChannelMode;

const DEFAULT_THRESHOLD: u8 = 35;
const DEFAULT_AVERAGE_FRAMES: usize = 100;
const DEFAULT_MAX_ITERATIONS: usize = 100;
const DEFAULT_RESTARTS: usize = 20;
const DEFAULT_TOLERANCE: f64 = 1e-5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KMeansConfig {
    pub max_iterations: usize,
    pub restarts: usize,
    /// Minimum drop in mean distortion for another iteration to run.
    pub tolerance: f64,
    /// Fixes the random seeding; `None` draws from OS entropy.
    pub seed: Option<u64>,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            restarts: DEFAULT_RESTARTS,
            tolerance: DEFAULT_TOLERANCE,
            seed: None,
        }
    }
}

/// Configuration for a `Monitor`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Difference intensity a pixel must exceed to count as motion.
    pub threshold: u8,
    /// Frames averaged into the background when averaging is enabled without a count.
    pub average_frames: usize,
    pub channel: ChannelMode,
    pub clustering: KMeansConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            average_frames: DEFAULT_AVERAGE_FRAMES,
            channel: ChannelMode::default(),
            clustering: KMeansConfig::default(),
        }
    }
}

impl MonitorConfig {
    /// Load from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        let cfg: MonitorConfig =
            serde_json::from_str(&data).map_err(|e| MonitorError::InvalidConfig(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.average_frames == 0 {
            return Err(MonitorError::InvalidConfig(
                "average_frames must be at least 1".to_string(),
            ));
        }
        if self.clustering.tolerance.is_nan() || self.clustering.tolerance < 0.0 {
            return Err(MonitorError::InvalidConfig(
                "clustering.tolerance must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}
