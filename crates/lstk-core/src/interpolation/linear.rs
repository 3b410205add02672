//! Trilinear interpolation.

use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};

use super::trait_::Interpolator;

/// Trilinear interpolator for intensity images and probability maps.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearInterpolator;

impl LinearInterpolator {
    pub fn new() -> Self {
        Self
    }

    #[inline]
    fn gather<B: Backend>(
        flat: &Tensor<B, 1>,
        x: &Tensor<B, 1, Int>,
        y: &Tensor<B, 1, Int>,
        z: &Tensor<B, 1, Int>,
        stride_y: i32,
        stride_z: i32,
    ) -> Tensor<B, 1> {
        let idx = z.clone() * stride_z + y.clone() * stride_y + x.clone();
        flat.clone().gather(0, idx)
    }
}

impl<B: Backend> Interpolator<B> for LinearInterpolator {
    fn interpolate(&self, data: &Tensor<B, 3>, indices: Tensor<B, 2>) -> Tensor<B, 1> {
        let [d, h, w] = data.dims();

        let x = indices.clone().narrow(1, 0, 1).squeeze::<1>(1);
        let y = indices.clone().narrow(1, 1, 1).squeeze::<1>(1);
        let z = indices.narrow(1, 2, 1).squeeze::<1>(1);

        let x0 = x.clone().floor();
        let y0 = y.clone().floor();
        let z0 = z.clone().floor();

        let wx = x - x0.clone();
        let wy = y - y0.clone();
        let wz = z - z0.clone();

        let x1 = (x0.clone() + 1.0).clamp(0.0, (w - 1) as f64).int();
        let y1 = (y0.clone() + 1.0).clamp(0.0, (h - 1) as f64).int();
        let z1 = (z0.clone() + 1.0).clamp(0.0, (d - 1) as f64).int();
        let x0 = x0.clamp(0.0, (w - 1) as f64).int();
        let y0 = y0.clamp(0.0, (h - 1) as f64).int();
        let z0 = z0.clamp(0.0, (d - 1) as f64).int();

        let stride_z = (h * w) as i32;
        let stride_y = w as i32;
        let flat = data.clone().reshape([d * h * w]);

        let v000 = Self::gather(&flat, &x0, &y0, &z0, stride_y, stride_z);
        let v100 = Self::gather(&flat, &x1, &y0, &z0, stride_y, stride_z);
        let v010 = Self::gather(&flat, &x0, &y1, &z0, stride_y, stride_z);
        let v110 = Self::gather(&flat, &x1, &y1, &z0, stride_y, stride_z);
        let v001 = Self::gather(&flat, &x0, &y0, &z1, stride_y, stride_z);
        let v101 = Self::gather(&flat, &x1, &y0, &z1, stride_y, stride_z);
        let v011 = Self::gather(&flat, &x0, &y1, &z1, stride_y, stride_z);
        let v111 = Self::gather(&flat, &x1, &y1, &z1, stride_y, stride_z);

        let ux = wx.clone().neg() + 1.0;
        let uy = wy.clone().neg() + 1.0;
        let uz = wz.clone().neg() + 1.0;

        // along x, then y, then z
        let c00 = v000 * ux.clone() + v100 * wx.clone();
        let c10 = v010 * ux.clone() + v110 * wx.clone();
        let c01 = v001 * ux.clone() + v101 * wx.clone();
        let c11 = v011 * ux + v111 * wx;

        let c0 = c00 * uy.clone() + c10 * wy.clone();
        let c1 = c01 * uy + c11 * wy;

        c0 * uz + c1 * wz
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type Backend = NdArray<f32>;

    #[test]
    fn test_midpoint_is_average() {
        let device = Default::default();
        // value = x along the X axis
        let data = Tensor::<Backend, 3>::from_floats(
            [[[0.0, 10.0], [0.0, 10.0]], [[0.0, 10.0], [0.0, 10.0]]],
            &device,
        );
        let indices = Tensor::<Backend, 2>::from_floats([[0.5, 0.0, 0.0], [0.25, 1.0, 1.0]], &device);

        let out = LinearInterpolator::new().interpolate(&data, indices).into_data();
        let out = out.as_slice::<f32>().unwrap();
        assert!((out[0] - 5.0).abs() < 1e-5);
        assert!((out[1] - 2.5).abs() < 1e-5);
    }

    #[test]
    fn test_integer_index_is_exact() {
        let device = Default::default();
        let data = Tensor::<Backend, 3>::from_floats(
            [[[1.0, 2.0], [3.0, 4.0]], [[5.0, 6.0], [7.0, 8.0]]],
            &device,
        );
        let indices = Tensor::<Backend, 2>::from_floats([[1.0, 0.0, 1.0], [0.0, 1.0, 0.0]], &device);

        let out = LinearInterpolator::new().interpolate(&data, indices).into_data();
        assert_eq!(out.as_slice::<f32>().unwrap(), &[6.0, 3.0]);
    }
}
