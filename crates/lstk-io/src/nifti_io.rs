use std::path::Path;

use anyhow::{bail, Context, Result};
use burn::tensor::backend::Backend;
use lstk_core::{Grid, Image, Role, Space, Volume};
use nalgebra::Matrix4;
use ndarray::{Array3, ArrayD};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};
use tracing::debug;

/// NIFTI_XFORM_SCANNER_ANAT
const XFORM_SCANNER: i16 = 1;
/// NIFTI_UNITS_MM
const UNITS_MM: u8 = 2;

/// Voxel-to-world affine from a header: sform, then qform, then pixdim only.
fn header_affine(header: &NiftiHeader) -> Matrix4<f64> {
    if header.sform_code > 0 {
        let rows = [header.srow_x, header.srow_y, header.srow_z];
        let mut m = Matrix4::identity();
        for (r, row) in rows.iter().enumerate() {
            for (c, v) in row.iter().enumerate() {
                m[(r, c)] = *v as f64;
            }
        }
        return m;
    }

    let dx = header.pixdim[1] as f64;
    let dy = header.pixdim[2] as f64;
    let dz = header.pixdim[3] as f64;

    if header.qform_code > 0 {
        let b = header.quatern_b as f64;
        let c = header.quatern_c as f64;
        let d = header.quatern_d as f64;
        let a = (1.0 - (b * b + c * c + d * d).min(1.0)).sqrt();
        let qfac = if header.pixdim[0] < 0.0 { -1.0 } else { 1.0 };

        let r = [
            [a * a + b * b - c * c - d * d, 2.0 * (b * c - a * d), 2.0 * (b * d + a * c)],
            [2.0 * (b * c + a * d), a * a + c * c - b * b - d * d, 2.0 * (c * d - a * b)],
            [2.0 * (b * d - a * c), 2.0 * (c * d + a * b), a * a + d * d - c * c - b * b],
        ];
        let scale = [dx, dy, dz * qfac];
        let offset = [header.quatern_x, header.quatern_y, header.quatern_z];

        let mut m = Matrix4::identity();
        for row in 0..3 {
            for col in 0..3 {
                m[(row, col)] = r[row][col] * scale[col];
            }
            m[(row, 3)] = offset[row] as f64;
        }
        return m;
    }

    let mut m = Matrix4::identity();
    m[(0, 0)] = dx;
    m[(1, 1)] = dy;
    m[(2, 2)] = dz;
    m
}

/// `[Z, Y, X]` shape from the header dims, ignoring trailing singleton dims.
fn header_shape(header: &NiftiHeader) -> Result<[usize; 3]> {
    let ndim = header.dim[0] as usize;
    if ndim < 3 || header.dim[4..=ndim.min(7)].iter().any(|&d| d > 1) {
        bail!("expected a 3-D volume, header has dim {:?}", &header.dim[..=ndim.min(7)]);
    }
    Ok([header.dim[3] as usize, header.dim[2] as usize, header.dim[1] as usize])
}

/// Read only the header of a NIfTI file and return its sampling grid.
pub fn read_grid<P: AsRef<Path>>(path: P) -> Result<Grid> {
    let path = path.as_ref();
    let header = NiftiHeader::from_file(path).with_context(|| format!("failed to read NIfTI header {}", path.display()))?;
    Ok(Grid::from_affine(header_shape(&header)?, &header_affine(&header))?)
}

/// Read a 3-D NIfTI file into an [`Image`] in `[Z, Y, X]` layout.
pub fn read_image<B: Backend, P: AsRef<Path>>(path: P, device: &B::Device) -> Result<Image<B>> {
    let path = path.as_ref();
    let obj = ReaderOptions::new()
        .read_file(path)
        .with_context(|| format!("failed to read NIfTI file {}", path.display()))?;
    let affine = header_affine(obj.header());

    let array: ArrayD<f32> = obj
        .into_volume()
        .into_ndarray::<f32>()
        .with_context(|| format!("failed to decode voxels of {}", path.display()))?;

    // drop trailing singleton axes (e.g. [X, Y, Z, 1])
    let mut array = array;
    while array.ndim() > 3 && array.shape()[array.ndim() - 1] == 1 {
        let last = array.ndim() - 1;
        array = array.index_axis_move(ndarray::Axis(last), 0);
    }
    let array = array
        .into_dimensionality::<ndarray::Ix3>()
        .with_context(|| format!("{} is not a 3-D volume", path.display()))?;

    let (nx, ny, nz) = array.dim();
    let mut values = Vec::with_capacity(nx * ny * nz);
    for z in 0..nz {
        for y in 0..ny {
            for x in 0..nx {
                values.push(array[[x, y, z]]);
            }
        }
    }

    let grid = Grid::from_affine([nz, ny, nx], &affine)
        .with_context(|| format!("{} has an unusable voxel-to-world affine", path.display()))?;
    debug!(path = %path.display(), shape = ?grid.shape(), "read volume");
    Ok(Image::from_voxels(values, &grid, device)?)
}

/// Read a NIfTI file and tag it with `space` and `role`.
pub fn read_volume<B: Backend, P: AsRef<Path>>(path: P, space: Space, role: Role, device: &B::Device) -> Result<Volume<B>> {
    Ok(Volume::new(read_image(path, device)?, space, role))
}

/// Write an [`Image`] as NIfTI, keeping its affine in the sform.
///
/// Files ending in `.gz` are compressed.
pub fn write_image<B: Backend, P: AsRef<Path>>(path: P, image: &Image<B>) -> Result<()> {
    let path = path.as_ref();
    let [nz, ny, nx] = image.shape();
    let values = image.voxels()?;
    let array = Array3::from_shape_fn((nx, ny, nz), |(x, y, z)| values[(z * ny + y) * nx + x]);

    let grid = image.grid();
    let affine = grid.affine();
    let row = |r: usize| {
        [
            affine[(r, 0)] as f32,
            affine[(r, 1)] as f32,
            affine[(r, 2)] as f32,
            affine[(r, 3)] as f32,
        ]
    };
    let spacing = grid.spacing();

    let header = NiftiHeader {
        sform_code: XFORM_SCANNER,
        qform_code: 0,
        srow_x: row(0),
        srow_y: row(1),
        srow_z: row(2),
        pixdim: [
            1.0,
            spacing[0] as f32,
            spacing[1] as f32,
            spacing[2] as f32,
            1.0,
            1.0,
            1.0,
            1.0,
        ],
        xyzt_units: UNITS_MM,
        ..NiftiHeader::default()
    };

    WriterOptions::new(path)
        .reference_header(&header)
        .write_nifti(&array)
        .with_context(|| format!("failed to write NIfTI file {}", path.display()))?;
    debug!(path = %path.display(), shape = ?grid.shape(), "wrote volume");
    Ok(())
}

/// Write a tagged volume. The tags live in the file name chosen by the caller.
pub fn write_volume<B: Backend, P: AsRef<Path>>(path: P, volume: &Volume<B>) -> Result<()> {
    write_image(path, volume.image())
}
