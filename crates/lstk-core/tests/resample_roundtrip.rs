//! Forward then inverse warping of tagged volumes.

use burn_ndarray::NdArray;
use lstk_core::spatial::{Direction3, Point3, Spacing3};
use lstk_core::{AffineTransform, Grid, Image, Role, Space, Volume};
use nalgebra::{Matrix4, Rotation3};

type Backend = NdArray<f32>;

fn native_grid() -> Grid {
    Grid::new(
        [6, 7, 8],
        Point3::new([-4.0, -3.5, -3.0]),
        Spacing3::new([1.0, 1.0, 1.2]),
        Direction3::identity(),
    )
}

fn atlas_grid() -> Grid {
    Grid::new([9, 9, 9], Point3::new([-4.0, -4.0, -4.0]), Spacing3::uniform(1.0), Direction3::identity())
}

fn registration() -> Matrix4<f64> {
    let mut m = Rotation3::from_euler_angles(0.0, 0.0, 0.1).to_homogeneous();
    m[(0, 3)] = 0.5;
    m[(2, 3)] = -0.25;
    m
}

fn blob(grid: &Grid, role: Role) -> Volume<Backend> {
    let [d, h, w] = grid.shape();
    let mut values = vec![0.0f32; grid.len()];
    for z in 0..d {
        for y in 0..h {
            for x in 0..w {
                let inside = (2..5).contains(&z) && (2..5).contains(&y) && (2..6).contains(&x);
                values[(z * h + y) * w + x] = if inside { 1.0 } else { 0.0 };
            }
        }
    }
    let image = Image::from_voxels(values, grid, &Default::default()).unwrap();
    Volume::new(image, Space::NativeFlair, role)
}

#[test]
fn test_forward_then_inverse_restores_grid() {
    let device = Default::default();
    let forward = AffineTransform::<Backend>::from_matrix(&registration(), &device).unwrap();
    let inverse = forward.inverse().unwrap();

    let native = blob(&native_grid(), Role::BrainExtracted);
    let in_atlas = native.resample(&atlas_grid(), Space::Atlas, &forward);
    assert_eq!(in_atlas.space(), Space::Atlas);
    assert_eq!(in_atlas.grid(), atlas_grid());

    let back = in_atlas.resample(&native.grid(), Space::NativeFlair, &inverse);
    assert_eq!(back.space(), Space::NativeFlair);
    assert!(back.grid().approx_eq(&native.grid(), 1e-9));
    assert_eq!(back.image().shape(), native.image().shape());
}

#[test]
fn test_label_roundtrip_stays_binary() {
    let device = Default::default();
    let forward = AffineTransform::<Backend>::from_matrix(&registration(), &device).unwrap();
    let inverse = forward.inverse().unwrap();

    let seg = blob(&native_grid(), Role::Segmentation);
    let back = seg
        .resample(&atlas_grid(), Space::Atlas, &forward)
        .resample(&native_grid(), Space::NativeFlair, &inverse);

    let values = back.voxels().unwrap();
    assert!(values.iter().all(|v| *v == 0.0 || *v == 1.0));
    assert!(values.iter().any(|v| *v == 1.0));
}

#[test]
fn test_mask_from_other_space_is_rejected_until_warped() {
    let device = Default::default();
    let forward = AffineTransform::<Backend>::from_matrix(&registration(), &device).unwrap();
    let inverse = forward.inverse().unwrap();

    let flair = blob(&native_grid(), Role::Anatomical);
    let atlas_mask = blob(&native_grid(), Role::Mask).resample(&atlas_grid(), Space::Atlas, &forward);

    assert!(flair.apply_mask(&atlas_mask).unwrap_err().is_tag_mismatch());

    let native_mask = atlas_mask.resample(&native_grid(), Space::NativeFlair, &inverse);
    let brain = flair.apply_mask(&native_mask).unwrap();
    assert_eq!(brain.role(), Role::BrainExtracted);
}
