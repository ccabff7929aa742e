//! Conversion between 1d and 3d voxel indices.
//!
//! Voxels are stored with `x` varying fastest, then `y`, then `z`.

#[allow(non_camel_case_types)] pub type Index1_u = usize;
#[allow(non_camel_case_types)] pub type Index3_u = [usize; 3];
#[allow(non_camel_case_types)] pub type BoxDim_u = [usize; 3];

use std::ops::{Add, Div, Mul, Rem};

pub fn index3_to_1<T>([ix, iy, iz]: [T; 3], [nx, ny, _nz]: [T; 3]) -> T
where
    T: Mul<Output = T> + Add<Output = T>
{
    ix + (iy + iz * ny) * nx
}

#[allow(clippy::many_single_char_names)]
pub fn index1_to_3<T>(i: T, [nx, ny, _nz]: [T; 3]) -> [T; 3]
where
    T: Mul<Output = T> +
    Div<Output = T> +
    Rem<Output = T> +
    Copy
{
    let z = i / (nx * ny);
    let r = i % (nx * ny);
    let y = r / nx;
    let x = r % nx;
    [x,y,z]
}

/// Total number of voxels in a box with `n` voxels along each axis
pub fn voxel_count([nx, ny, nz]: BoxDim_u) -> usize { nx * ny * nz }
