//! Ensemble averaging of per-model probability maps.

use burn::tensor::backend::Backend;

use crate::error::{CoreError, Result};
use crate::volume::{Role, Volume};

/// Voxelwise mean of probability maps that share a space and grid.
pub fn mean_probability<B: Backend>(maps: &[Volume<B>]) -> Result<Volume<B>> {
    let (first, rest) = maps
        .split_first()
        .ok_or_else(|| CoreError::invalid_parameter("ensemble needs at least one probability map"))?;

    first.ensure_role(&[Role::ProbabilityMap], "ensemble")?;
    let mut sum = first.image().data().clone();
    for map in rest {
        map.ensure_role(&[Role::ProbabilityMap], "ensemble")?;
        first.ensure_aligned_with(map, "ensemble")?;
        sum = sum + map.image().data().clone();
    }

    let mean = sum / maps.len() as f32;
    let image = crate::image::Image::from_grid(mean, &first.grid())?;
    Ok(Volume::new(image, first.space(), Role::ProbabilityMap))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{Grid, Image};
    use crate::spatial::{Direction3, Point3, Spacing3};
    use crate::volume::Space;
    use burn_ndarray::NdArray;

    type Backend = NdArray<f32>;

    fn map(values: Vec<f32>, space: Space) -> Volume<Backend> {
        let grid = Grid::new([1, 1, 3], Point3::origin(), Spacing3::uniform(1.0), Direction3::identity());
        let image = Image::from_voxels(values, &grid, &Default::default()).unwrap();
        Volume::new(image, space, Role::ProbabilityMap)
    }

    #[test]
    fn test_mean_of_three_models() {
        let maps = vec![
            map(vec![0.0, 0.3, 0.9], Space::Atlas),
            map(vec![0.3, 0.3, 0.6], Space::Atlas),
            map(vec![0.6, 0.3, 0.3], Space::Atlas),
        ];
        let out = mean_probability(&maps).unwrap().voxels().unwrap();
        for (v, e) in out.iter().zip([0.3, 0.3, 0.6]) {
            assert!((v - e).abs() < 1e-6);
        }
    }

    #[test]
    fn test_rejects_mixed_spaces() {
        let maps = vec![map(vec![0.0; 3], Space::Atlas), map(vec![0.0; 3], Space::NativeFlair)];
        assert!(mean_probability(&maps).unwrap_err().is_tag_mismatch());
    }

    #[test]
    fn test_rejects_empty() {
        assert!(mean_probability::<Backend>(&[]).is_err());
    }
}
