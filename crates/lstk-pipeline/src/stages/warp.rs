//! In-process application of affine transforms.

use std::path::Path;

use burn::tensor::backend::Backend;
use lstk_core::AffineTransform;
use tracing::debug;

use crate::artifact::{SpatialTransform, TransformKind, VolumeFile, WarpDirection};
use crate::error::{PipelineError, Result};

/// Resample `volume` through an affine `transform` onto the grid of the
/// target end, using the interpolation policy of the volume's role.
///
/// The matrix maps `to`-space points onto `from`-space points, which is
/// exactly the output-to-input mapping a forward warp needs. The inverse warp
/// uses its inverse.
pub fn apply_affine<B: Backend>(
    volume: &VolumeFile,
    transform: &SpatialTransform,
    direction: WarpDirection,
    output: &Path,
    device: &B::Device,
) -> Result<VolumeFile> {
    transform.check_source(volume, direction)?;

    let TransformKind::Affine { matrix } = &transform.kind else {
        return Err(PipelineError::external_tool(
            "warp",
            None,
            "deformable transforms cannot be applied in process",
        ));
    };

    let matrix = lstk_io::read_affine(matrix)?;
    let forward = AffineTransform::<B>::from_matrix(&matrix, device)?;
    let mapping = match direction {
        WarpDirection::Forward => forward,
        WarpDirection::Inverse => forward.inverse()?,
    };

    let target_grid = lstk_io::read_grid(transform.target_reference(direction))?;
    let target_space = transform.target_space(direction);

    let source = volume.load::<B>(device)?;
    let warped = source.resample(&target_grid, target_space, &mapping);
    debug!(
        input = %volume.path.display(),
        output = %output.display(),
        interpolation = ?volume.role.interpolation(),
        "applied affine transform"
    );
    VolumeFile::store(output, &warped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use lstk_core::spatial::{Direction3, Point3, Spacing3};
    use lstk_core::{Grid, Image, Role, Space, Volume};
    use nalgebra::Matrix4;
    use std::path::PathBuf;
    use tempfile::tempdir;

    type Backend = NdArray<f32>;

    fn write(path: PathBuf, grid: &Grid, values: Vec<f32>, space: Space, role: Role) -> VolumeFile {
        let image = Image::<Backend>::from_voxels(values, grid, &Default::default()).unwrap();
        VolumeFile::store(path, &Volume::new(image, space, role)).unwrap()
    }

    #[test]
    fn test_forward_and_inverse_land_on_reference_grids() {
        let dir = tempdir().unwrap();
        let native = Grid::new([3, 4, 5], Point3::new([-2.0, -2.0, -1.0]), Spacing3::uniform(1.0), Direction3::identity());
        let atlas = Grid::new([6, 6, 6], Point3::new([-3.0, -3.0, -3.0]), Spacing3::uniform(1.0), Direction3::identity());

        let t1 = write(dir.path().join("t1.nii.gz"), &native, vec![1.0; native.len()], Space::NativeT1, Role::Mask);
        let template = write(dir.path().join("atlas.nii.gz"), &atlas, vec![0.0; atlas.len()], Space::Atlas, Role::BrainExtracted);

        let matrix = dir.path().join("t1_to_mni.mat");
        let mut m = Matrix4::identity();
        m[(0, 3)] = 0.5;
        lstk_io::write_affine(&matrix, &m).unwrap();

        let transform = SpatialTransform {
            from: Space::NativeT1,
            to: Space::Atlas,
            from_reference: t1.path.clone(),
            to_reference: template.path.clone(),
            kind: TransformKind::Affine { matrix },
        };

        let device = Default::default();
        let in_atlas = apply_affine::<Backend>(&t1, &transform, WarpDirection::Forward, &dir.path().join("a.nii.gz"), &device).unwrap();
        assert_eq!(in_atlas.space, Space::Atlas);
        assert_eq!(in_atlas.role, Role::Mask);
        assert!(in_atlas.grid().unwrap().approx_eq(&atlas, 1e-4));

        let back = apply_affine::<Backend>(&in_atlas, &transform, WarpDirection::Inverse, &dir.path().join("b.nii.gz"), &device).unwrap();
        assert_eq!(back.space, Space::NativeT1);
        assert!(back.grid().unwrap().approx_eq(&native, 1e-4));
        let values = back.load::<Backend>(&device).unwrap().voxels().unwrap();
        assert!(values.iter().all(|v| *v == 0.0 || *v == 1.0));

        // a native-space volume cannot go backwards
        let err = apply_affine::<Backend>(&t1, &transform, WarpDirection::Inverse, &dir.path().join("c.nii.gz"), &device).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::SpaceMismatch);
    }
}
