//! Intensity normalization for model input.

use crate::error::{CoreError, Result};

/// Linearly interpolated percentile of an ascending-sorted slice.
///
/// `q` is in percent. Returns `None` for an empty slice.
pub fn percentile(sorted: &[f32], q: f64) -> Option<f32> {
    if sorted.is_empty() {
        return None;
    }
    let rank = (q / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = (rank - lo as f64) as f32;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Clip to the `[low, high]` percentiles of the non-zero voxels, then rescale
/// non-zero voxels to `[0, 1]`.
///
/// Zero voxels are background after skull stripping and stay zero. A volume
/// with no non-zero voxels, or a constant one, is returned as zeros.
pub fn clip_and_rescale(values: &[f32], low: f64, high: f64) -> Result<Vec<f32>> {
    if !(0.0..=100.0).contains(&low) || !(0.0..=100.0).contains(&high) || low >= high {
        return Err(CoreError::invalid_parameter(format!(
            "clipping percentiles must satisfy 0 <= low < high <= 100, got {low} / {high}"
        )));
    }

    let mut brain: Vec<f32> = values.iter().copied().filter(|v| *v != 0.0).collect();
    brain.sort_by(|a, b| a.total_cmp(b));

    let (Some(lo), Some(hi)) = (percentile(&brain, low), percentile(&brain, high)) else {
        return Ok(vec![0.0; values.len()]);
    };
    let range = hi - lo;

    Ok(values
        .iter()
        .map(|&v| {
            if v == 0.0 || range <= f32::EPSILON {
                0.0
            } else {
                (v.clamp(lo, hi) - lo) / range
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_interpolates() {
        let sorted = [0.0, 10.0, 20.0, 30.0, 40.0];
        assert_eq!(percentile(&sorted, 50.0), Some(20.0));
        assert_eq!(percentile(&sorted, 12.5), Some(5.0));
        assert_eq!(percentile(&sorted, 100.0), Some(40.0));
        assert_eq!(percentile(&[], 50.0), None);
    }

    #[test]
    fn test_rescale_ignores_background() {
        let values = [0.0, 1.0, 2.0, 3.0, 0.0];
        let out = clip_and_rescale(&values, 0.0, 100.0).unwrap();
        assert_eq!(out, vec![0.0, 0.0, 0.5, 1.0, 0.0]);
    }

    #[test]
    fn test_outliers_are_clipped() {
        let mut values: Vec<f32> = (1..=100).map(|v| v as f32).collect();
        values.push(10_000.0);
        let out = clip_and_rescale(&values, 1.0, 99.0).unwrap();
        assert!(out.iter().all(|v| (0.0..=1.0).contains(v)));
        assert_eq!(*out.last().unwrap(), 1.0);
    }

    #[test]
    fn test_invalid_bounds() {
        assert!(clip_and_rescale(&[1.0], 60.0, 40.0).is_err());
        assert!(clip_and_rescale(&[1.0], -1.0, 40.0).is_err());
    }
}
