// THEORY:
// The position extractor is the spatial analysis step of the pipeline. Given the
// difference image, one region and the number of subjects that region holds, it
// answers "where are they right now?".
//
// Algorithm steps:
// 1.  **Crop**: cut the region out of the difference image. Nothing outside the
//     rectangle can influence the result.
// 2.  **Intensity**: collapse each pixel to one value (luma, or a single channel).
// 3.  **Thresholding**: every pixel strictly brighter than the threshold is a
//     candidate. No candidates means nothing moved, which is a normal empty answer.
// 4.  **Clustering**: group the candidates into at most `expected_count` clusters
//     (never more clusters than candidates) and take each center as a position.
// 5.  **Rounding**: centers are rounded to whole pixels.
// 6.  **Duplicate suppression**: if the last two positions are closer than
//     `MERGE_DISTANCE`, the last one is dropped. This is a single check on the final
//     pair only, not a sweep over all pairs.
//
// The extractor is stateless and pure, so regions can be processed in any order or in
// parallel.

use crate::core_modules::clustering::{Clusterer, Coordinate};
use crate::core_modules::frame::Frame;
use crate::core_modules::geometry::{CoordinateSpace, Point};
use crate::core_modules::pixel::pixel::ChannelMode;
use crate::core_modules::region::CropRegion;
use crate::error::Result;

/// Two positions closer than this (in pixels) are treated as the same subject.
pub const MERGE_DISTANCE: f64 = 10.0;

pub mod position_extractor {
    use super::*;

    /// Estimates subject positions inside `region`, in region-local coordinates.
    pub fn extract_positions(
        diff: &Frame,
        region: &CropRegion,
        threshold: u8,
        channel: ChannelMode,
        clusterer: &dyn Clusterer,
    ) -> Result<Vec<Point>> {
        let crop = diff.crop(&region.rect)?;

        let candidates: Vec<Coordinate> = crop
            .pixels()
            .filter(|(_, _, pixel)| pixel.intensity(channel) > threshold as f64)
            .map(|(x, y, _)| (x as f64, y as f64))
            .collect();

        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let k = region.expected_count.min(candidates.len());
        let mut positions: Vec<Point> = clusterer
            .cluster(&candidates, k)
            .into_iter()
            .map(|(x, y)| Point::new(round_coordinate(x), round_coordinate(y)))
            .collect();

        suppress_trailing_duplicate(&mut positions);
        log::trace!(
            "extractor: {} candidates in {} -> {} positions",
            candidates.len(),
            region.rect,
            positions.len()
        );
        Ok(positions)
    }

    /// Same as `extract_positions`, reported in the requested coordinate space.
    pub fn extract_in_space(
        diff: &Frame,
        region: &CropRegion,
        threshold: u8,
        channel: ChannelMode,
        clusterer: &dyn Clusterer,
        space: CoordinateSpace,
    ) -> Result<Vec<Point>> {
        let positions = extract_positions(diff, region, threshold, channel, clusterer)?;
        Ok(to_space(positions, region, space))
    }

    /// Translates region-local positions into `space`.
    pub fn to_space(positions: Vec<Point>, region: &CropRegion, space: CoordinateSpace) -> Vec<Point> {
        match space {
            CoordinateSpace::Local => positions,
            CoordinateSpace::Global => {
                let origin = region.rect.origin();
                positions.into_iter().map(|p| p.offset_by(origin)).collect()
            }
        }
    }

    /// Drops the last position if it sits within `MERGE_DISTANCE` of the one before it.
    pub fn suppress_trailing_duplicate(positions: &mut Vec<Point>) {
        let merge = matches!(
            positions.as_slice(),
            [.., previous, last] if is_duplicate_distance(previous.distance_to(last))
        );
        if merge {
            positions.pop();
        }
    }

    pub(crate) fn is_duplicate_distance(distance: f64) -> bool {
        distance < MERGE_DISTANCE
    }

    fn round_coordinate(v: f64) -> u32 {
        v.round().max(0.0) as u32
    }
}
