// THEORY:
// The `ReferenceModel` holds the "background" every new frame is compared against.
// It is the temporal memory of the pipeline, kept small: one explicit three-state
// machine.
//
// - `Disabled`: no averaged background. Motion is measured against the previous
//   frame, so only things that moved since the last capture light up.
// - `Accumulating`: a streaming source is being averaged. Each captured frame is
//   folded into a floating-point running sum until the target count is reached.
// - `Ready`: a fixed background frame is available and every new frame is compared
//   against it, so a subject that stops moving is still visible.
//
// Materialized sources (files, image folders) know all their frames up front, so they
// skip `Accumulating` entirely and jump straight to `Ready` with a pre-computed mean.
//
// The model also remembers the last frame it observed; that is the implicit reference
// outside of `Ready`. Frames must be observed exactly once, in capture order.
//
// A frame of a new size (a camera switching modes, a resolution change) cannot be
// compared with or folded into anything older. Accumulation restarts at the new size
// and the previous frame is simply replaced. A `Ready` reference of the wrong size is
// an error; the monitor resets the model before that can happen.

use crate::core_modules::frame::{Frame, FrameAccumulator};
use crate::error::{MonitorError, Result};
use crate::source::FrameSource;

#[derive(Debug, Clone)]
pub enum ReferenceState {
    Disabled,
    Accumulating {
        frames_seen: usize,
        target_count: usize,
        running_sum: FrameAccumulator,
    },
    Ready {
        reference_frame: Frame,
    },
}

#[derive(Debug, Clone)]
pub struct ReferenceModel {
    state: ReferenceState,
    last_frame: Option<Frame>,
}

impl Default for ReferenceModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ReferenceModel {
    pub fn new() -> Self {
        Self {
            state: ReferenceState::Disabled,
            last_frame: None,
        }
    }

    pub fn state(&self) -> &ReferenceState {
        &self.state
    }

    /// True while accumulating and once a reference is ready.
    pub fn is_averaging_enabled(&self) -> bool {
        !matches!(self.state, ReferenceState::Disabled)
    }

    pub fn reference_frame(&self) -> Option<&Frame> {
        match &self.state {
            ReferenceState::Ready { reference_frame } => Some(reference_frame),
            _ => None,
        }
    }

    pub fn last_frame(&self) -> Option<&Frame> {
        self.last_frame.as_ref()
    }

    /// Starts averaging `target_count` frames into a background reference.
    ///
    /// Streaming sources enter `Accumulating` and are folded in by `observe`.
    /// Materialized sources are sampled immediately and the model becomes `Ready`.
    pub fn enable_averaging(
        &mut self,
        target_count: usize,
        source: &mut dyn FrameSource,
    ) -> Result<()> {
        if target_count == 0 {
            return Err(MonitorError::InvalidConfig(
                "averaging needs at least one frame".to_string(),
            ));
        }

        match source.average_frames(target_count)? {
            Some(reference_frame) => {
                log::info!(
                    "reference: averaged {} frames of a materialized source",
                    target_count
                );
                self.state = ReferenceState::Ready { reference_frame };
            }
            None => {
                log::info!("reference: accumulating {} frames", target_count);
                self.state = ReferenceState::Accumulating {
                    frames_seen: 0,
                    target_count,
                    running_sum: FrameAccumulator::new(source.resolution()),
                };
            }
        }
        Ok(())
    }

    /// Installs a reference frame directly.
    pub fn set_reference(&mut self, reference_frame: Frame) {
        self.state = ReferenceState::Ready { reference_frame };
    }

    pub fn disable_averaging(&mut self) {
        if self.is_averaging_enabled() {
            log::info!("reference: averaging disabled");
        }
        self.state = ReferenceState::Disabled;
    }

    /// Records a freshly captured frame, folding it into the running sum if accumulating.
    pub fn observe(&mut self, frame: &Frame) -> Result<()> {
        if let ReferenceState::Accumulating {
            frames_seen,
            target_count,
            running_sum,
        } = &mut self.state
        {
            if running_sum.resolution() != frame.resolution() {
                log::warn!(
                    "reference: frame size changed from {} to {}, restarting accumulation",
                    running_sum.resolution(),
                    frame.resolution()
                );
                *running_sum = FrameAccumulator::new(frame.resolution());
                *frames_seen = 0;
            }
            running_sum.add(frame)?;
            *frames_seen += 1;
            log::debug!("reference: folded frame {}/{}", frames_seen, target_count);

            if *frames_seen == *target_count {
                let reference_frame = running_sum.mean(*target_count)?;
                log::info!("reference: background ready after {} frames", target_count);
                self.state = ReferenceState::Ready { reference_frame };
            }
        }
        self.last_frame = Some(frame.clone());
        Ok(())
    }

    /// Absolute difference between `frame` and the current reference.
    ///
    /// Outside of `Ready` the reference is the last observed frame; with nothing
    /// observed yet, or only frames of another size, the difference is all zero.
    pub fn diff(&self, frame: &Frame) -> Result<Frame> {
        match (&self.state, &self.last_frame) {
            (ReferenceState::Ready { reference_frame }, _) => frame.abs_diff(reference_frame),
            (_, Some(previous)) if previous.resolution() == frame.resolution() => {
                frame.abs_diff(previous)
            }
            (_, _) => frame.abs_diff(frame),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::geometry::Resolution;
    use crate::core_modules::pixel::pixel::Pixel;
    use crate::source::image_sequence::ImageSequence;
    use crate::source::{CaptureOptions, SequenceConfig};

    const RES: Resolution = Resolution {
        width: 4,
        height: 3,
    };

    fn flat(v: u8) -> Frame {
        Frame::filled(RES, Pixel::new(v, v, v))
    }

    /// A streaming stand-in: never materialized, so averaging accumulates.
    struct Stream;

    impl FrameSource for Stream {
        fn capture(&mut self, _options: CaptureOptions) -> Result<Frame> {
            Ok(flat(0))
        }
        fn resolution(&self) -> Resolution {
            RES
        }
        fn is_at_end(&self) -> bool {
            false
        }
        fn rewind(&mut self) {}
        fn total_frame_count(&self) -> u64 {
            0
        }
        fn set_output_resolution(&mut self, _resolution: Resolution) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn starts_disabled_and_diffs_against_previous_frame() {
        let mut model = ReferenceModel::new();
        assert!(!model.is_averaging_enabled());

        let first = flat(10);
        assert!(model.diff(&first).unwrap().pixels().all(|(_, _, p)| p == Pixel::default()));
        model.observe(&first).unwrap();

        let second = flat(50);
        let d = model.diff(&second).unwrap();
        assert!(d.pixels().all(|(_, _, p)| p == Pixel::new(40, 40, 40)));
    }

    #[test]
    fn constant_frames_average_to_the_constant() {
        let mut model = ReferenceModel::new();
        model.enable_averaging(5, &mut Stream).unwrap();
        for _ in 0..4 {
            model.observe(&flat(77)).unwrap();
            assert!(matches!(model.state(), ReferenceState::Accumulating { .. }));
        }
        model.observe(&flat(77)).unwrap();
        assert_eq!(model.reference_frame(), Some(&flat(77)));
    }

    #[test]
    fn half_dark_half_bright_averages_to_midpoint() {
        let n = 8;
        let mut model = ReferenceModel::new();
        model.enable_averaging(n, &mut Stream).unwrap();
        for _ in 0..n / 2 {
            model.observe(&flat(0)).unwrap();
        }
        for _ in 0..n / 2 {
            model.observe(&flat(255)).unwrap();
        }
        // 127.5 rounds to nearest.
        assert_eq!(model.reference_frame(), Some(&flat(128)));
    }

    #[test]
    fn ready_reference_is_used_for_diff() {
        let mut model = ReferenceModel::new();
        model.enable_averaging(1, &mut Stream).unwrap();
        model.observe(&flat(100)).unwrap();
        model.observe(&flat(30)).unwrap();

        let d = model.diff(&flat(90)).unwrap();
        assert!(d.pixels().all(|(_, _, p)| p == Pixel::new(10, 10, 10)));
    }

    #[test]
    fn accumulating_still_diffs_against_previous_frame() {
        let mut model = ReferenceModel::new();
        model.enable_averaging(10, &mut Stream).unwrap();
        model.observe(&flat(20)).unwrap();
        let d = model.diff(&flat(25)).unwrap();
        assert!(d.pixels().all(|(_, _, p)| p == Pixel::new(5, 5, 5)));
    }

    #[test]
    fn disable_discards_the_reference() {
        let mut model = ReferenceModel::new();
        model.enable_averaging(1, &mut Stream).unwrap();
        model.observe(&flat(100)).unwrap();
        assert!(model.reference_frame().is_some());

        model.disable_averaging();
        assert!(!model.is_averaging_enabled());
        assert!(model.reference_frame().is_none());
    }

    #[test]
    fn zero_target_is_rejected() {
        let mut model = ReferenceModel::new();
        assert!(matches!(
            model.enable_averaging(0, &mut Stream),
            Err(MonitorError::InvalidConfig(_))
        ));
        assert!(!model.is_averaging_enabled());
    }

    #[test]
    fn new_frame_size_restarts_accumulation() {
        let small = Resolution::new(2, 2);
        let mut model = ReferenceModel::new();
        model.enable_averaging(2, &mut Stream).unwrap();
        model.observe(&flat(50)).unwrap();

        model.observe(&Frame::filled(small, Pixel::new(10, 10, 10))).unwrap();
        match model.state() {
            ReferenceState::Accumulating {
                frames_seen,
                running_sum,
                ..
            } => {
                assert_eq!(*frames_seen, 1);
                assert_eq!(running_sum.resolution(), small);
            }
            other => panic!("unexpected state {other:?}"),
        }

        model.observe(&Frame::filled(small, Pixel::new(30, 30, 30))).unwrap();
        assert_eq!(
            model.reference_frame(),
            Some(&Frame::filled(small, Pixel::new(20, 20, 20)))
        );
    }

    #[test]
    fn previous_frame_of_another_size_gives_zero_difference() {
        let mut model = ReferenceModel::new();
        model.observe(&flat(200)).unwrap();

        let small = Frame::filled(Resolution::new(2, 2), Pixel::new(90, 90, 90));
        let d = model.diff(&small).unwrap();
        assert_eq!(d.resolution(), Resolution::new(2, 2));
        assert!(d.pixels().all(|(_, _, p)| p == Pixel::default()));

        model.observe(&small).unwrap();
        let moved = Frame::filled(Resolution::new(2, 2), Pixel::new(100, 100, 100));
        let d = model.diff(&moved).unwrap();
        assert!(d.pixels().all(|(_, _, p)| p == Pixel::new(10, 10, 10)));
    }

    #[test]
    fn materialized_source_is_ready_immediately() {
        let frames = vec![flat(0), flat(0), flat(200), flat(200)];
        let mut source = ImageSequence::from_frames(frames, SequenceConfig::default()).unwrap();
        let mut model = ReferenceModel::new();
        model.enable_averaging(4, &mut source).unwrap();
        assert_eq!(model.reference_frame(), Some(&flat(100)));
        // Sampling must not move the playback cursor.
        assert_eq!(source.cursor().current(), 0);
    }
}
