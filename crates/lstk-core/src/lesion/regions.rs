//! Anatomical region assignment for lesions.

use std::fmt;

use super::components::label_components;
use crate::error::{CoreError, Result};

/// Anatomical lesion location, encoded as the voxel value of the annotated
/// segmentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Region {
    Periventricular = 1,
    Juxtacortical = 2,
    Subcortical = 3,
    Infratentorial = 4,
}

impl Region {
    /// Regions in assignment precedence order. [`Region::Subcortical`] is the
    /// fallback and never appears in a region label map.
    pub const PRECEDENCE: [Region; 3] = [Region::Periventricular, Region::Juxtacortical, Region::Infratentorial];

    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Self::Periventricular),
            2 => Some(Self::Juxtacortical),
            3 => Some(Self::Subcortical),
            4 => Some(Self::Infratentorial),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Periventricular => "periventricular",
            Self::Juxtacortical => "juxtacortical",
            Self::Subcortical => "subcortical",
            Self::Infratentorial => "infratentorial",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Relabel every lesion of a binary `segmentation` with its [`Region`] code.
///
/// `region_labels` holds region codes (1, 2, 4; 0 elsewhere) on the same
/// grid. A lesion touching several regions takes the first one in
/// [`Region::PRECEDENCE`]; a lesion touching none is subcortical.
pub fn assign_regions(segmentation: &[f32], region_labels: &[f32], shape: [usize; 3]) -> Result<Vec<f32>> {
    if segmentation.len() != region_labels.len() {
        return Err(CoreError::grid_mismatch(
            "region assignment",
            format!("{} segmentation voxels vs {} region voxels", segmentation.len(), region_labels.len()),
        ));
    }

    let binary: Vec<f32> = segmentation.iter().map(|&v| if v > 0.0 { 1.0 } else { 0.0 }).collect();
    let components = label_components(&binary, shape)?;

    let mut touched = vec![[false; 5]; components.count()];
    for (&id, &region) in components.labels.iter().zip(region_labels) {
        let code = region.round() as i64;
        if id > 0 && (1..=4).contains(&code) {
            touched[id as usize - 1][code as usize] = true;
        }
    }

    let assigned: Vec<Region> = touched
        .iter()
        .map(|t| {
            Region::PRECEDENCE
                .into_iter()
                .find(|r| t[r.code() as usize])
                .unwrap_or(Region::Subcortical)
        })
        .collect();

    Ok(components
        .labels
        .iter()
        .map(|&id| match id {
            0 => 0.0,
            id => assigned[id as usize - 1].code() as f32,
        })
        .collect())
}
