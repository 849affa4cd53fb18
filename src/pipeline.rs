// THEORY:
// The `pipeline` module is the top-level API of the crate. A `Monitor` ties one frame
// source, one reference model and one set of regions together and exposes the loop a
// caller drives frame by frame:
//
// 1.  **Capture**: pull the next frame from the source.
// 2.  **Difference**: compare it against the reference (the averaged background, or
//     the previous frame) *before* the new frame is folded into the reference.
// 3.  **Extraction**: for every region, crop the difference image and estimate where
//     its subjects are.
//
// The monitor is single-threaded and pull-based. Nothing happens between calls; the
// caller decides the pacing. Per-region extraction is pure, so `extract_all_parallel`
// can hand the regions to a `WorkerPool` and get back exactly what `extract_all` would
// have produced.
//
// Failures are isolated per region: one region that no longer fits the frame does not
// stop the others from reporting.
//
// A live device may deliver frames of a different size than requested, or switch
// modes mid-stream. The monitor follows the frames: held frames and the reference are
// dropped, averaging restarts, and the regions are rescaled onto the delivered size.

use crate::config::MonitorConfig;
use crate::core_modules::clustering::{Clusterer, KMeans};
use crate::core_modules::frame::Frame;
use crate::core_modules::geometry::{CoordinateSpace, Point, Resolution};
use crate::core_modules::position_extractor::position_extractor;
use crate::core_modules::reference::ReferenceModel;
use crate::core_modules::region::RegionSet;
use crate::error::{MonitorError, Result};
use crate::parallel_pipeline::WorkerPool;
use crate::source::{CaptureOptions, FrameSource};
use std::collections::BTreeMap;
use std::sync::Arc;

// Re-export key data structures for the public API.
pub use crate::core_modules::reference::ReferenceState;
pub use crate::core_modules::region::CropRegion;

/// One region that could not be processed, and why.
#[derive(Debug)]
pub struct RegionFailure {
    pub index: usize,
    pub error: MonitorError,
}

/// Positions for every region that succeeded, plus the ones that did not.
#[derive(Debug, Default)]
pub struct Extraction {
    pub positions: BTreeMap<usize, Vec<Point>>,
    pub failures: Vec<RegionFailure>,
}

impl Extraction {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed_indices(&self) -> Vec<usize> {
        self.failures.iter().map(|f| f.index).collect()
    }

    /// Every region failing with the same cause, e.g. before any difference exists.
    pub(crate) fn all_failed(len: usize, error: impl Fn() -> MonitorError) -> Self {
        Self {
            positions: BTreeMap::new(),
            failures: (0..len)
                .map(|index| RegionFailure {
                    index,
                    error: error(),
                })
                .collect(),
        }
    }

    pub(crate) fn record(&mut self, index: usize, result: Result<Vec<Point>>) {
        match result {
            Ok(points) => {
                self.positions.insert(index, points);
            }
            Err(error) => {
                log::warn!("monitor: region {index} failed: {error}");
                self.failures.push(RegionFailure { index, error });
            }
        }
    }
}

/// The main, top-level struct of the motion monitor.
pub struct Monitor<S: FrameSource> {
    source: S,
    config: MonitorConfig,
    clusterer: Arc<dyn Clusterer>,
    regions: RegionSet,
    reference: ReferenceModel,
    averaging_target: Option<usize>,
    current_frame: Option<Frame>,
    current_difference: Option<Frame>,
    frames_captured: u64,
    /// Size of the frames the source has been delivering.
    frame_resolution: Resolution,
}

impl<S: FrameSource> Monitor<S> {
    /// Wraps `source` with k-means clustering configured from `config`.
    pub fn new(source: S, config: MonitorConfig) -> Result<Self> {
        let clusterer: Arc<dyn Clusterer> = Arc::new(KMeans::new(config.clustering.clone()));
        Self::with_clusterer(source, config, clusterer)
    }

    pub fn with_clusterer(
        source: S,
        config: MonitorConfig,
        clusterer: Arc<dyn Clusterer>,
    ) -> Result<Self> {
        config.validate()?;
        let frame_resolution = source.resolution();
        let regions = RegionSet::new(frame_resolution);
        log::info!(
            "monitor: source at {}, threshold {}, {:?} channel",
            source.resolution(),
            config.threshold,
            config.channel
        );
        Ok(Self {
            source,
            config,
            clusterer,
            regions,
            reference: ReferenceModel::new(),
            averaging_target: None,
            current_frame: None,
            current_difference: None,
            frames_captured: 0,
            frame_resolution,
        })
    }

    /// Pulls the next frame and folds it into the reference model.
    pub fn capture(&mut self, options: CaptureOptions) -> Result<Frame> {
        let frame = self.source.capture(options)?;
        self.adopt_frame_size(&frame)?;
        self.reference.observe(&frame)?;
        self.frames_captured += 1;
        self.current_frame = Some(frame.clone());
        Ok(frame)
    }

    /// Captures a frame and stores its difference against the reference.
    pub fn compute_difference(&mut self, options: CaptureOptions) -> Result<Frame> {
        let frame = self.source.capture(options)?;
        self.adopt_frame_size(&frame)?;
        let difference = self.reference.diff(&frame)?;
        self.reference.observe(&frame)?;
        self.frames_captured += 1;
        self.current_frame = Some(frame);
        self.current_difference = Some(difference.clone());
        Ok(difference)
    }

    /// Positions for every region, keyed by region index.
    pub fn extract_all(&self, space: CoordinateSpace) -> Extraction {
        let Some(difference) = &self.current_difference else {
            return Extraction::all_failed(self.regions.len(), || MonitorError::NoDifference);
        };
        let mut extraction = Extraction::default();
        for (index, region) in self.regions.iter().enumerate() {
            extraction.record(index, self.extract_from(difference, region, space));
        }
        extraction
    }

    /// Same result as `extract_all`, computed on the pool's workers.
    pub async fn extract_all_parallel(&self, pool: &WorkerPool, space: CoordinateSpace) -> Extraction {
        match &self.current_difference {
            Some(difference) => pool.extract(difference, self.regions.as_slice(), space).await,
            None => Extraction::all_failed(self.regions.len(), || MonitorError::NoDifference),
        }
    }

    /// A worker pool sharing this monitor's threshold, channel and clusterer.
    pub fn spawn_worker_pool(&self) -> WorkerPool {
        WorkerPool::new(self.config.threshold, self.config.channel, Arc::clone(&self.clusterer))
    }

    pub fn extract_region(&self, index: usize, space: CoordinateSpace) -> Result<Vec<Point>> {
        let region = self.regions.region(index)?;
        let difference = self
            .current_difference
            .as_ref()
            .ok_or(MonitorError::NoDifference)?;
        self.extract_from(difference, region, space)
    }

    fn extract_from(&self, difference: &Frame, region: &CropRegion, space: CoordinateSpace) -> Result<Vec<Point>> {
        position_extractor::extract_in_space(
            difference,
            region,
            self.config.threshold,
            self.config.channel,
            self.clusterer.as_ref(),
            space,
        )
    }

    /// The pixels of one region, from the last frame or the last difference.
    pub fn crop_image(&self, index: usize, use_difference: bool) -> Result<Frame> {
        let region = self.regions.region(index)?;
        let image = if use_difference {
            self.current_difference
                .as_ref()
                .ok_or(MonitorError::NoDifference)?
        } else {
            self.current_frame.as_ref().ok_or(MonitorError::NoFrame)?
        };
        image.crop(&region.rect)
    }

    /// Starts averaging a background. `None` uses the configured frame count.
    pub fn enable_averaging(&mut self, count: Option<usize>) -> Result<()> {
        let target = count.unwrap_or(self.config.average_frames);
        self.reference.enable_averaging(target, &mut self.source)?;
        self.averaging_target = Some(target);
        Ok(())
    }

    pub fn disable_averaging(&mut self) {
        self.reference.disable_averaging();
        self.averaging_target = None;
    }

    pub fn is_averaging_enabled(&self) -> bool {
        self.reference.is_averaging_enabled()
    }

    pub fn reference_state(&self) -> &ReferenceState {
        self.reference.state()
    }

    /// Changes the output resolution and maps every region onto it.
    ///
    /// Frames held so far no longer match the new size, so the current frame, the
    /// difference and the reference are discarded. Averaging, if enabled, restarts.
    pub fn rescale_regions(&mut self, resolution: Resolution) -> Result<()> {
        let old = self.regions.bounds();
        let mut rescaled = self.regions.clone();
        rescaled.rescale(old, resolution)?;
        self.source.set_output_resolution(resolution)?;
        self.regions = rescaled;
        self.frame_resolution = resolution;
        self.reset_reference()?;
        log::info!("monitor: resolution changed from {} to {}", old, resolution);
        Ok(())
    }

    /// Follows a change in the size of delivered frames.
    ///
    /// If the regions cannot be rescaled (one would lose its area) they keep their
    /// layout and the mismatch surfaces per region at extraction time.
    fn adopt_frame_size(&mut self, frame: &Frame) -> Result<()> {
        let delivered = frame.resolution();
        if delivered == self.frame_resolution {
            return Ok(());
        }
        log::warn!(
            "monitor: frames changed size from {} to {}",
            self.frame_resolution,
            delivered
        );
        self.frame_resolution = delivered;

        let bounds = self.regions.bounds();
        if bounds != delivered {
            if let Err(e) = self.regions.rescale(bounds, delivered) {
                log::error!("monitor: regions kept at {bounds}: {e}");
            }
        }
        self.reset_reference()
    }

    /// Drops held frames and the reference, restarting averaging if it was enabled.
    fn reset_reference(&mut self) -> Result<()> {
        self.current_frame = None;
        self.current_difference = None;
        self.reference = ReferenceModel::new();
        if let Some(target) = self.averaging_target {
            self.reference.enable_averaging(target, &mut self.source)?;
        }
        Ok(())
    }

    pub fn set_threshold(&mut self, threshold: u8) {
        self.config.threshold = threshold;
    }

    pub fn threshold(&self) -> u8 {
        self.config.threshold
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn set_loop(&mut self, enabled: bool) -> bool {
        self.source.set_loop(enabled)
    }

    pub fn is_at_end(&self) -> bool {
        self.source.is_at_end()
    }

    pub fn regions(&self) -> &RegionSet {
        &self.regions
    }

    pub fn regions_mut(&mut self) -> &mut RegionSet {
        &mut self.regions
    }

    pub fn frames_captured(&self) -> u64 {
        self.frames_captured
    }

    pub fn resolution(&self) -> Resolution {
        self.source.resolution()
    }

    pub fn current_frame(&self) -> Option<&Frame> {
        self.current_frame.as_ref()
    }

    pub fn current_difference(&self) -> Option<&Frame> {
        self.current_difference.as_ref()
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }
}
