//! Nearest-neighbour interpolation.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::trait_::Interpolator;

/// Nearest-neighbour interpolator. Used for masks and label volumes, whose
/// values must stay within the input's value set.
#[derive(Debug, Clone, Copy, Default)]
pub struct NearestNeighborInterpolator;

impl NearestNeighborInterpolator {
    pub fn new() -> Self {
        Self
    }
}

impl<B: Backend> Interpolator<B> for NearestNeighborInterpolator {
    fn interpolate(&self, data: &Tensor<B, 3>, indices: Tensor<B, 2>) -> Tensor<B, 1> {
        let [d, h, w] = data.dims();

        let x = indices.clone().narrow(1, 0, 1).squeeze::<1>(1);
        let y = indices.clone().narrow(1, 1, 1).squeeze::<1>(1);
        let z = indices.narrow(1, 2, 1).squeeze::<1>(1);

        let x = x.round().clamp(0.0, (w - 1) as f64).int();
        let y = y.round().clamp(0.0, (h - 1) as f64).int();
        let z = z.round().clamp(0.0, (d - 1) as f64).int();

        let idx = z * ((h * w) as i32) + y * (w as i32) + x;
        data.clone().reshape([d * h * w]).gather(0, idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type Backend = NdArray<f32>;

    #[test]
    fn test_rounds_to_closest_voxel() {
        let device = Default::default();
        let data = Tensor::<Backend, 3>::from_floats(
            [[[1.0, 2.0], [3.0, 4.0]], [[5.0, 6.0], [7.0, 8.0]]],
            &device,
        );
        let indices = Tensor::<Backend, 2>::from_floats([[0.6, 0.2, 0.9], [0.4, 0.7, 0.1]], &device);

        let out = NearestNeighborInterpolator::new().interpolate(&data, indices).into_data();
        assert_eq!(out.as_slice::<f32>().unwrap(), &[6.0, 3.0]);
    }

    #[test]
    fn test_never_produces_new_values() {
        let device = Default::default();
        let data = Tensor::<Backend, 3>::from_floats([[[0.0, 3.0], [4.0, 0.0]]], &device);
        let indices = Tensor::<Backend, 2>::from_floats(
            [[0.5, 0.5, 0.0], [0.3, 0.8, 0.0], [5.0, -2.0, 3.0]],
            &device,
        );

        let out = NearestNeighborInterpolator::new().interpolate(&data, indices).into_data();
        for v in out.as_slice::<f32>().unwrap() {
            assert!([0.0, 3.0, 4.0].contains(v));
        }
    }
}
