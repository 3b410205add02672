//! Space- and role-tagged volumes.

use burn::tensor::backend::Backend;

use crate::error::{CoreError, Result};
use crate::filter::resample::resample_to_grid;
use crate::image::{Grid, Image};
use crate::transform::Transform;
use crate::volume::{Role, Space};

/// Grid comparison tolerance in millimetres (affine entries).
pub const GRID_TOLERANCE: f64 = 1e-3;

/// An [`Image`] that knows which space it lives in and what its values mean.
///
/// Operations that combine two volumes check both tags and the grid before
/// touching any voxel, so a volume can never be masked or compared against a
/// volume from another space without an explicit resampling step.
#[derive(Debug, Clone)]
pub struct Volume<B: Backend> {
    image: Image<B>,
    space: Space,
    role: Role,
}

impl<B: Backend> Volume<B> {
    pub fn new(image: Image<B>, space: Space, role: Role) -> Self {
        Self { image, space, role }
    }

    pub fn image(&self) -> &Image<B> {
        &self.image
    }

    pub fn into_image(self) -> Image<B> {
        self.image
    }

    pub fn space(&self) -> Space {
        self.space
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn grid(&self) -> Grid {
        self.image.grid()
    }

    /// Same voxels, different role.
    pub fn with_role(self, role: Role) -> Self {
        Self { role, ..self }
    }

    /// Copy the voxel values to host memory in `[Z, Y, X]` order.
    pub fn voxels(&self) -> Result<Vec<f32>> {
        self.image.voxels()
    }

    /// New volume on the same grid and space with replaced values and role.
    pub fn with_voxels(&self, values: Vec<f32>, role: Role) -> Result<Self> {
        Ok(Self::new(self.image.with_voxels(values)?, self.space, role))
    }

    /// Fail with [`CoreError::SpaceMismatch`] unless the volume is in `expected`.
    pub fn ensure_space(&self, expected: Space, context: &str) -> Result<()> {
        if self.space != expected {
            return Err(CoreError::space_mismatch(context, expected, self.space));
        }
        Ok(())
    }

    /// Fail with [`CoreError::RoleMismatch`] unless the role is one of `accepted`.
    pub fn ensure_role(&self, accepted: &[Role], context: &str) -> Result<()> {
        if !accepted.contains(&self.role) {
            return Err(CoreError::role_mismatch(context, accepted, self.role));
        }
        Ok(())
    }

    /// Fail unless `other` is in the same space and on the same grid.
    pub fn ensure_aligned_with(&self, other: &Volume<B>, context: &str) -> Result<()> {
        other.ensure_space(self.space, context)?;
        let a = self.grid();
        let b = other.grid();
        if !a.approx_eq(&b, GRID_TOLERANCE) {
            return Err(CoreError::grid_mismatch(context, a.describe_difference(&b)));
        }
        Ok(())
    }

    /// Zero every voxel outside `mask`.
    ///
    /// The mask must be a [`Role::Mask`] volume aligned with `self`. Masking an
    /// anatomical image yields a [`Role::BrainExtracted`] volume; other roles
    /// keep their role.
    pub fn apply_mask(&self, mask: &Volume<B>) -> Result<Self> {
        mask.ensure_role(&[Role::Mask], "apply mask")?;
        self.ensure_aligned_with(mask, "apply mask")?;

        let keep = mask.image.data().clone().greater_elem(0.0).float();
        let data = self.image.data().clone() * keep;
        let image = Image::new(
            data,
            *self.image.origin(),
            *self.image.spacing(),
            *self.image.direction(),
        );

        let role = match self.role {
            Role::Anatomical | Role::BrainExtracted => Role::BrainExtracted,
            other => other,
        };
        Ok(Self::new(image, self.space, role))
    }

    /// Resample onto `target` (a grid in `target_space`) using the
    /// interpolation policy of this volume's role.
    ///
    /// `transform` maps points of the target grid to points of this volume's
    /// grid. Voxels falling outside this volume's field of view are zero.
    pub fn resample<T: Transform<B>>(&self, target: &Grid, target_space: Space, transform: &T) -> Self {
        let image = resample_to_grid(&self.image, target, transform, self.role.interpolation());
        Self::new(image, target_space, self.role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::{Direction3, Point3, Spacing3};
    use burn_ndarray::NdArray;

    type Backend = NdArray<f32>;

    fn grid() -> Grid {
        Grid::new([2, 2, 2], Point3::origin(), Spacing3::uniform(1.0), Direction3::identity())
    }

    fn volume(values: Vec<f32>, space: Space, role: Role) -> Volume<Backend> {
        let device = Default::default();
        Volume::new(Image::from_voxels(values, &grid(), &device).unwrap(), space, role)
    }

    #[test]
    fn test_apply_mask_zeroes_background() {
        let flair = volume(vec![5.0; 8], Space::NativeFlair, Role::Anatomical);
        let mut mask_values = vec![0.0; 8];
        mask_values[0] = 1.0;
        mask_values[7] = 1.0;
        let mask = volume(mask_values, Space::NativeFlair, Role::Mask);

        let brain = flair.apply_mask(&mask).unwrap();
        assert_eq!(brain.role(), Role::BrainExtracted);
        let v = brain.voxels().unwrap();
        assert_eq!(v[0], 5.0);
        assert_eq!(v[1], 0.0);
        assert_eq!(v[7], 5.0);
    }

    #[test]
    fn test_apply_mask_rejects_other_space() {
        let flair = volume(vec![1.0; 8], Space::NativeFlair, Role::Anatomical);
        let mask = volume(vec![1.0; 8], Space::Atlas, Role::Mask);

        let err = flair.apply_mask(&mask).unwrap_err();
        assert_eq!(
            err,
            CoreError::space_mismatch("apply mask", Space::NativeFlair, Space::Atlas)
        );
    }

    #[test]
    fn test_apply_mask_requires_mask_role() {
        let flair = volume(vec![1.0; 8], Space::NativeFlair, Role::Anatomical);
        let seg = volume(vec![1.0; 8], Space::NativeFlair, Role::Segmentation);
        let err = flair.apply_mask(&seg).unwrap_err();
        assert!(matches!(err, CoreError::RoleMismatch { .. }));
    }

    #[test]
    fn test_ensure_space() {
        let seg = volume(vec![0.0; 8], Space::Atlas, Role::Segmentation);
        assert!(seg.ensure_space(Space::Atlas, "segment").is_ok());
        assert!(seg.ensure_space(Space::NativeFlair, "publish").is_err());
    }
}
