use burn::tensor::Tensor;
use burn_ndarray::NdArray;
use lstk_core::spatial::{Direction3, Point3, Spacing3};
use lstk_core::Grid;
use nalgebra::{Rotation3, Vector3};
use proptest::prelude::*;

type Backend = NdArray<f32>;

fn rotation(ax: f64, ay: f64, az: f64) -> Direction3 {
    let r = Rotation3::from_euler_angles(ax, ay, az);
    lstk_core::Direction(*r.matrix())
}

proptest! {
    #[test]
    fn test_affine_roundtrip(
        ox in -100.0f64..100.0, oy in -100.0f64..100.0, oz in -100.0f64..100.0,
        sx in 0.1f64..5.0, sy in 0.1f64..5.0, sz in 0.1f64..5.0,
        ax in -3.1f64..3.1, ay in -1.5f64..1.5, az in -3.1f64..3.1,
    ) {
        let grid = Grid::new(
            [3, 4, 5],
            Point3::new([ox, oy, oz]),
            Spacing3::new([sx, sy, sz]),
            rotation(ax, ay, az),
        );
        let rebuilt = Grid::from_affine(grid.shape(), &grid.affine()).unwrap();
        prop_assert!(grid.approx_eq(&rebuilt, 1e-9));
    }

    #[test]
    fn test_world_index_roundtrip(
        ox in -100.0f64..100.0, oy in -100.0f64..100.0, oz in -100.0f64..100.0,
        sx in 0.5f64..3.0, sy in 0.5f64..3.0, sz in 0.5f64..3.0,
        ax in -3.1f64..3.1, ay in -1.5f64..1.5, az in -3.1f64..3.1,
        px in -50.0f64..50.0, py in -50.0f64..50.0, pz in -50.0f64..50.0,
    ) {
        let device = Default::default();
        let grid = Grid::new(
            [2, 2, 2],
            Point3::new([ox, oy, oz]),
            Spacing3::new([sx, sy, sz]),
            rotation(ax, ay, az),
        );

        let point = Tensor::<Backend, 2>::from_floats([[px as f32, py as f32, pz as f32]], &device);
        let index = grid.world_to_index_tensor(point);
        let back = grid.index_to_world_tensor(index).into_data();
        let back = back.as_slice::<f32>().unwrap();

        for (v, e) in back.iter().zip([px, py, pz]) {
            prop_assert!((*v as f64 - e).abs() < 1e-2, "{} vs {}", v, e);
        }
    }

    #[test]
    fn test_index_to_world_matches_affine(
        sx in 0.5f64..3.0, sy in 0.5f64..3.0, sz in 0.5f64..3.0,
        az in -3.1f64..3.1,
        i in 0usize..4, j in 0usize..4, k in 0usize..4,
    ) {
        let grid = Grid::new(
            [4, 4, 4],
            Point3::new([1.0, -2.0, 3.0]),
            Spacing3::new([sx, sy, sz]),
            rotation(0.0, 0.0, az),
        );
        let p = grid.index_to_world([i as f64, j as f64, k as f64]);
        let h = grid.affine() * nalgebra::Vector4::new(i as f64, j as f64, k as f64, 1.0);
        let expected = Vector3::new(h[0], h[1], h[2]);
        for axis in 0..3 {
            prop_assert!((p[axis] - expected[axis]).abs() < 1e-9);
        }
    }
}
