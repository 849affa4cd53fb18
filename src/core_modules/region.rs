// THEORY:
// The `region` module holds the spatial layout of an assay: an ordered list of
// rectangles ("crop regions"), each confining a known number of subjects. A region is
// a plain data container; all analysis happens in the position extractor.
//
// Key rules:
// 1.  **Positional identity**: a region is addressed by its index. Removing one shifts
//     every later region down by one. Callers that persist indices must re-read them.
// 2.  **Validated on entry**: a rectangle is accepted only if it has positive area and
//     fits inside the bounds the set was created for.
// 3.  **Atomic persistence**: the on-disk record is two parallel sequences
//     (rectangles, expected counts) plus an optional calibration resolution. A load
//     either replaces the whole set or leaves it exactly as it was.

use crate::core_modules::geometry::{Rect, Resolution};
use crate::error::{MonitorError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// A monitored rectangle and how many subjects it contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    pub rect: Rect,
    pub expected_count: usize,
}

impl CropRegion {
    pub fn new(rect: Rect, expected_count: usize) -> Self {
        Self {
            rect,
            expected_count,
        }
    }
}

/// Persisted form of a `RegionSet`.
#[derive(Debug, Serialize, Deserialize)]
struct RegionRecord {
    rectangles: Vec<[u32; 4]>,
    expected_counts: Vec<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    resolution: Option<[u32; 2]>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionSet {
    bounds: Resolution,
    regions: Vec<CropRegion>,
}

impl RegionSet {
    /// An empty set for frames of the given resolution.
    pub fn new(bounds: Resolution) -> Self {
        Self {
            bounds,
            regions: Vec::new(),
        }
    }

    pub fn bounds(&self) -> Resolution {
        self.bounds
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CropRegion> {
        self.regions.iter()
    }

    pub fn as_slice(&self) -> &[CropRegion] {
        &self.regions
    }

    /// Appends a region and returns its index.
    pub fn add_region(&mut self, rect: Rect, expected_count: usize) -> Result<usize> {
        validate(&rect, expected_count, self.bounds).map_err(MonitorError::InvalidRegion)?;
        self.regions.push(CropRegion::new(rect, expected_count));
        Ok(self.regions.len() - 1)
    }

    pub fn region(&self, index: usize) -> Result<&CropRegion> {
        self.regions.get(index).ok_or(MonitorError::Index {
            index,
            len: self.regions.len(),
        })
    }

    /// Removes the region at `index`; later regions move down by one.
    pub fn remove_region(&mut self, index: usize) -> Result<CropRegion> {
        if index >= self.regions.len() {
            return Err(MonitorError::Index {
                index,
                len: self.regions.len(),
            });
        }
        Ok(self.regions.remove(index))
    }

    pub fn set_expected_count(&mut self, index: usize, expected_count: usize) -> Result<()> {
        let len = self.regions.len();
        let region = self
            .regions
            .get_mut(index)
            .ok_or(MonitorError::Index { index, len })?;
        if expected_count == 0 {
            return Err(MonitorError::InvalidRegion(
                "expected count must be positive".to_string(),
            ));
        }
        region.expected_count = expected_count;
        Ok(())
    }

    /// Maps every rectangle calibrated at `old` onto `new` and adopts `new` as the bounds.
    ///
    /// Fails with `InvalidRegion` if any rectangle would lose its area or leave the new
    /// bounds; the set is unchanged in that case.
    pub fn rescale(&mut self, old: Resolution, new: Resolution) -> Result<()> {
        if old.width == 0 || old.height == 0 || new.width == 0 || new.height == 0 {
            return Err(MonitorError::InvalidConfig(format!(
                "cannot rescale regions from {old} to {new}"
            )));
        }
        let rescaled = self
            .regions
            .iter()
            .enumerate()
            .map(|(i, region)| {
                let rect = region.rect.rescaled(old, new);
                validate(&rect, region.expected_count, new).map_err(|reason| {
                    MonitorError::InvalidRegion(format!("region {i} at {new}: {reason}"))
                })?;
                Ok(CropRegion::new(rect, region.expected_count))
            })
            .collect::<Result<Vec<_>>>()?;
        self.regions = rescaled;
        self.bounds = new;
        log::debug!("regions: rescaled {} regions from {} to {}", self.regions.len(), old, new);
        Ok(())
    }

    /// Writes the set as JSON, recording the current bounds as the calibration size.
    pub fn save<W: Write>(&self, writer: W) -> Result<()> {
        let record = RegionRecord {
            rectangles: self.regions.iter().map(|r| r.rect.as_array()).collect(),
            expected_counts: self.regions.iter().map(|r| r.expected_count).collect(),
            resolution: Some([self.bounds.width, self.bounds.height]),
        };
        serde_json::to_writer_pretty(writer, &record)
            .map_err(|e| MonitorError::Format(e.to_string()))
    }

    /// Replaces the set with a persisted record. On any error the set is unchanged.
    pub fn load<R: Read>(&mut self, reader: R) -> Result<()> {
        let record: RegionRecord =
            serde_json::from_reader(reader).map_err(|e| MonitorError::Format(e.to_string()))?;
        let regions = self.regions_from_record(record)?;
        log::info!("regions: loaded {} regions", regions.len());
        self.regions = regions;
        Ok(())
    }

    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.save(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    pub fn load_from_path<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let reader = BufReader::new(File::open(path)?);
        self.load(reader)
    }

    fn regions_from_record(&self, record: RegionRecord) -> Result<Vec<CropRegion>> {
        if record.rectangles.len() != record.expected_counts.len() {
            return Err(MonitorError::Format(format!(
                "{} rectangles but {} expected counts",
                record.rectangles.len(),
                record.expected_counts.len()
            )));
        }

        let calibrated_at = match record.resolution {
            Some([0, _]) | Some([_, 0]) => {
                return Err(MonitorError::Format(
                    "calibration resolution must be non-zero".to_string(),
                ));
            }
            Some([width, height]) => Resolution::new(width, height),
            None => self.bounds,
        };

        record
            .rectangles
            .into_iter()
            .zip(record.expected_counts)
            .enumerate()
            .map(|(i, (coords, expected_count))| {
                let rect = Rect::from(coords).rescaled(calibrated_at, self.bounds);
                validate(&rect, expected_count, self.bounds)
                    .map_err(|reason| MonitorError::Format(format!("region {i}: {reason}")))?;
                Ok(CropRegion::new(rect, expected_count))
            })
            .collect()
    }
}

fn validate(rect: &Rect, expected_count: usize, bounds: Resolution) -> std::result::Result<(), String> {
    if rect.is_degenerate() {
        return Err(format!("rectangle {rect} has no area"));
    }
    if !rect.fits_within(bounds) {
        return Err(format!("rectangle {rect} exceeds {bounds} frame"));
    }
    if expected_count == 0 {
        return Err("expected count must be positive".to_string());
    }
    Ok(())
}
