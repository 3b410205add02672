//! Binarization and minimum lesion size filtering.

use super::components::label_components;
use crate::error::{CoreError, Result};
use tracing::debug;

/// `1.0` where `p >= threshold`, else `0.0`.
pub fn binarize(probabilities: &[f32], threshold: f32) -> Result<Vec<f32>> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(CoreError::invalid_parameter(format!(
            "probability threshold {threshold} outside [0, 1]"
        )));
    }
    Ok(probabilities
        .iter()
        .map(|&p| if p >= threshold { 1.0 } else { 0.0 })
        .collect())
}

/// Zero every 6-connected component with fewer than `min_voxels` voxels.
///
/// Returns the filtered mask and the number of components removed.
/// `min_voxels == 0` keeps everything.
pub fn remove_small_components(mask: &[f32], shape: [usize; 3], min_voxels: usize) -> Result<(Vec<f32>, usize)> {
    if min_voxels == 0 {
        return Ok((mask.to_vec(), 0));
    }

    let components = label_components(mask, shape)?;
    let keep: Vec<bool> = components.sizes.iter().map(|&s| s >= min_voxels).collect();
    let removed = keep.iter().filter(|k| !**k).count();
    debug!(
        components = components.count(),
        removed,
        min_voxels,
        "filtered lesion components by size"
    );

    let filtered = mask
        .iter()
        .zip(components.labels.iter())
        .map(|(&v, &id)| match id {
            0 => 0.0,
            id if keep[id as usize - 1] => v,
            _ => 0.0,
        })
        .collect();
    Ok((filtered, removed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binarize_is_inclusive() {
        let out = binarize(&[0.1, 0.5, 0.49, 1.0], 0.5).unwrap();
        assert_eq!(out, vec![0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_binarize_rejects_out_of_range() {
        assert!(binarize(&[0.1], 1.5).is_err());
    }

    #[test]
    fn test_small_components_removed() {
        // one 3-voxel lesion and one single voxel
        let mask = [1.0, 1.0, 1.0, 0.0, 1.0];
        let (out, removed) = remove_small_components(&mask, [1, 1, 5], 2).unwrap();
        assert_eq!(out, vec![1.0, 1.0, 1.0, 0.0, 0.0]);
        assert_eq!(removed, 1);
    }

    #[test]
    fn test_zero_minimum_keeps_all() {
        let mask = [1.0, 0.0, 1.0];
        let (out, removed) = remove_small_components(&mask, [1, 1, 3], 0).unwrap();
        assert_eq!(out, mask.to_vec());
        assert_eq!(removed, 0);
    }
}
