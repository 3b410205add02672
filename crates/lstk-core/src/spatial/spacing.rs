//! Voxel spacing.

use super::Vector;

/// Millimetres between neighbouring voxels, one component per index axis
/// (x, y, z), matching the affine column norms.
pub type Spacing<const D: usize> = Vector<D>;

impl<const D: usize> Spacing<D> {
    /// Isotropic spacing.
    pub fn uniform(mm: f64) -> Self {
        Self::new([mm; D])
    }

    /// Size of one voxel in mm³.
    pub fn voxel_volume(&self) -> f64 {
        self.0.iter().product()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anisotropic_flair_voxel() {
        let flair = Spacing::<3>::new([0.9, 0.9, 3.0]);
        assert!((flair.voxel_volume() - 2.43).abs() < 1e-12);
        assert_eq!(Spacing::<3>::uniform(1.0).voxel_volume(), 1.0);
    }
}
