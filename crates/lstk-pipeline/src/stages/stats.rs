//! Per-lesion statistics.

use std::marker::PhantomData;
use std::path::Path;

use burn::tensor::backend::Backend;
use lstk_core::lesion::{label_components, Region};
use serde::Serialize;

use super::StatsAggregator;
use crate::artifact::VolumeFile;
use crate::error::{PipelineError, Result};

/// One CSV row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LesionRecord {
    pub lesion_id: usize,
    /// Region name for annotated masks, `lesion` otherwise.
    pub region: String,
    pub voxels: usize,
    pub volume_mm3: f64,
}

/// Statistics for every lesion of one mask.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsTable {
    pub records: Vec<LesionRecord>,
}

impl StatsTable {
    pub fn lesion_count(&self) -> usize {
        self.records.len()
    }

    pub fn total_volume_mm3(&self) -> f64 {
        self.records.iter().map(|r| r.volume_mm3).sum()
    }

    /// Write the table as CSV with a header row, even when there are no lesions.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let io_error = |e: csv::Error| PipelineError::io(format!("cannot write {}", path.display()), e.into());

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(path)
            .map_err(io_error)?;
        writer
            .write_record(["lesion_id", "region", "voxels", "volume_mm3"])
            .map_err(io_error)?;
        for record in &self.records {
            writer.serialize(record).map_err(io_error)?;
        }
        writer
            .flush()
            .map_err(|e| PipelineError::io(format!("cannot write {}", path.display()), e))
    }
}

/// [`StatsAggregator`] computing component statistics in process.
#[derive(Debug, Clone)]
pub struct LesionStatsAggregator<B: Backend> {
    device: B::Device,
    _backend: PhantomData<B>,
}

impl<B: Backend> LesionStatsAggregator<B> {
    pub fn new(device: B::Device) -> Self {
        Self {
            device,
            _backend: PhantomData,
        }
    }
}

impl<B: Backend> StatsAggregator for LesionStatsAggregator<B> {
    /// Single-class masks are binarized first; multi-class masks keep one
    /// component set per label.
    fn compute_stats(&self, mask: &VolumeFile, multi_class: bool) -> Result<StatsTable> {
        let volume = mask.load::<B>(&self.device)?;
        let grid = volume.grid();
        let mut values = volume.voxels()?;
        if !multi_class {
            for v in values.iter_mut() {
                *v = if *v > 0.0 { 1.0 } else { 0.0 };
            }
        }

        let components = label_components(&values, grid.shape())?;
        let voxel_volume = grid.voxel_volume();
        let records = components
            .sizes
            .iter()
            .zip(&components.classes)
            .enumerate()
            .map(|(i, (&voxels, &class))| LesionRecord {
                lesion_id: i + 1,
                region: if multi_class {
                    Region::from_code(class).map_or_else(|| format!("label{class}"), |r| r.name().to_string())
                } else {
                    "lesion".to_string()
                },
                voxels,
                volume_mm3: voxels as f64 * voxel_volume,
            })
            .collect();
        Ok(StatsTable { records })
    }
}
