use ndarray::azip;

use crate::{Intensityf32, Index1_u, Index3_u, Point, Vector};
use crate::index::{index3_to_1, index1_to_3, BoxDim_u};
use crate::error::{ReconError, Result};
use crate::fov::FOV;
use crate::lor::LOR;
use crate::projector::ProjectionBackend;

pub type ImageData = Vec<Intensityf32>;

/// Voxelized density, together with the FOV which gives it a physical size
/// and position.
#[derive(Clone, Debug, PartialEq)]
pub struct Image {
    pub fov: FOV,
    pub data: ImageData,
}

impl core::ops::IndexMut<Index1_u> for Image {
    #[inline]
    fn index_mut(&mut self, i: Index1_u) -> &mut Self::Output { &mut self.data[i] }
}

impl core::ops::Index<Index1_u> for Image {
    type Output = Intensityf32;
    #[inline]
    fn index(&self, i: Index1_u) -> &Self::Output { &self.data[i] }
}

impl core::ops::IndexMut<Index3_u> for Image {
    fn index_mut(&mut self, i3: Index3_u) -> &mut Self::Output {
        let i1 = index3_to_1(i3, self.fov.n);
        &mut self.data[i1]
    }
}

impl core::ops::Index<Index3_u> for Image {
    type Output = Intensityf32;
    fn index(&self, i3: Index3_u) -> &Self::Output {
        let i1 = index3_to_1(i3, self.fov.n);
        &self.data[i1]
    }
}

impl Image {

    pub fn new(fov: FOV, data: ImageData) -> Result<Self> {
        if data.len() != fov.n_voxels() {
            return Err(ReconError::geometry(format!(
                "image data has {} voxels, which does not match dimensions {:?}",
                data.len(), fov.n
            )));
        }
        Ok(Image { fov, data })
    }

    pub fn uniform(fov: FOV, value: Intensityf32) -> Self {
        Self { data: vec![value; fov.n_voxels()], fov }
    }

    pub fn ones (fov: FOV) -> Self { Self::uniform(fov, 1.0) }
    pub fn zeros(fov: FOV) -> Self { Self::uniform(fov, 0.0) }

    // A new empty data store with matching size
    pub fn zeros_buffer(fov: FOV) -> ImageData { vec![0.0; fov.n_voxels()] }

    /// Physical position of the centre of the image
    pub fn center(&self) -> Point { self.fov.center }

    /// Full physical extent of the image
    pub fn size(&self) -> Vector { self.fov.size() }

    /// Number of voxels along each axis
    pub fn shape(&self) -> BoxDim_u { self.fov.n }

    pub fn sum(&self) -> f32 { self.data.iter().sum() }

    /// Σ self[i] * other[i], over all voxels
    pub fn inner_product(&self, other: &Image) -> Result<f32> {
        self.fov.ensure_same_grid(&other.fov, "inner product of images")?;
        Ok(self.data.iter().zip(&other.data).map(|(a, b)| a * b).sum())
    }

    /// Index and value of the voxel with the highest value
    pub fn max_voxel(&self) -> Option<(Index3_u, Intensityf32)> {
        self.data.iter()
            .copied()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(i, v)| (index1_to_3(i, self.fov.n), v))
    }

    /// Index and value of the first voxel which is NaN or infinite
    pub fn first_non_finite(&self) -> Option<(Index1_u, Intensityf32)> {
        first_non_finite(&self.data)
    }
}

pub(crate) fn first_non_finite(data: &[f32]) -> Option<(usize, f32)> {
    data.iter().copied().enumerate().find(|(_, v)| !v.is_finite())
}

// ----- Sensitivity map ---------------------------------------------------------------
/// Expected per-voxel detection sensitivity: the normalization applied to
/// every MLEM update. Read-only for the duration of a reconstruction.
#[derive(Clone, Debug, PartialEq)]
pub struct SensitivityMap(Image);

impl SensitivityMap {

    /// Rejects negative or non-finite sensitivities. Zeros are accepted here:
    /// whether they are acceptable depends on the image they will divide.
    pub fn new(image: Image) -> Result<Self> {
        if let Some((i, s)) = image.data.iter().copied().enumerate().find(|(_, s)| !s.is_finite() || *s < 0.0) {
            return Err(ReconError::invalid_input(format!(
                "sensitivity of voxel {:?} is {s}: must be finite and non-negative",
                index1_to_3(i, image.fov.n)
            )))
        }
        Ok(Self(image))
    }

    pub fn ones(fov: FOV) -> Self { Self(Image::ones(fov)) }

    /// Create sensitivity image by backprojecting LORs. In theory this should
    /// use *all* possible LORs. In practice use a representative sample. The
    /// result is normalized by the number of LORs.
    pub fn from_lors(backend: &dyn ProjectionBackend, fov: FOV, lors: &[LOR]) -> Result<Self> {
        if lors.is_empty() {
            return Err(ReconError::invalid_input("cannot build a sensitivity map from zero LORs"));
        }
        let ones = vec![1.0; lors.len()];
        let mut data = backend.backward(&fov, lors, &ones)?;
        let n_lors = lors.len() as f32;
        for e in data.iter_mut() { *e /= n_lors }
        Self::new(Image::new(fov, data)?)
    }

    pub fn fov(&self) -> &FOV { &self.0.fov }
    pub fn image(&self) -> &Image { &self.0 }
    pub fn into_image(self) -> Image { self.0 }

    /// Fail unless every voxel in which `image` is nonzero has a strictly
    /// positive sensitivity.
    pub fn ensure_covers(&self, image: &Image) -> Result<()> {
        self.fov().ensure_same_grid(&image.fov, "sensitivity map vs image")?;
        let uncovered = self.0.data.iter().zip(&image.data)
            .position(|(&s, &x)| s <= 0.0 && x != 0.0);
        match uncovered {
            None => Ok(()),
            Some(i) => Err(ReconError::invalid_input(format!(
                "voxel {:?} has zero sensitivity but nonzero density {}",
                index1_to_3(i, image.fov.n), image.data[i]
            ))),
        }
    }

    /// Apply the MLEM correction `x = x * backprojection / sensitivity`,
    /// in place. Voxels without sensitivity stay as they are: `ensure_covers`
    /// guarantees that those are zero.
    pub fn apply(&self, image: &mut ImageData, backprojection: &[Intensityf32]) {
        azip!((voxel in &mut image[..], &b in backprojection, &s in &self.0.data[..]) {
            if s > 0.0 { *voxel *= b / s }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use units::mm;
    #[allow(unused)] use pretty_assertions::{assert_eq, assert_ne};

    fn fov() -> FOV { FOV::new((mm(30.0), mm(20.0), mm(10.0)), (3, 2, 1)).unwrap() }

    #[test]
    fn image_data_must_match_fov() {
        assert!(Image::new(fov(), vec![0.0; 6]).is_ok());
        assert!(matches!(Image::new(fov(), vec![0.0; 5]), Err(ReconError::GeometryMismatch(_))));
    }

    #[test]
    fn attributes_follow_fov() {
        let image = Image::ones(fov());
        assert_eq!(image.shape(), [3, 2, 1]);
        assert_eq!(image.size().to_mm(), [30.0, 20.0, 10.0]);
        assert_eq!(image.center().to_mm(), [0.0, 0.0, 0.0]);
        assert_eq!(image.sum(), 6.0);
    }

    #[test]
    fn index_1d_and_3d_agree() {
        let mut image = Image::zeros(fov());
        image[[2, 1, 0]] = 5.0;
        assert_eq!(image[5], 5.0);
        assert_eq!(image.max_voxel(), Some(([2, 1, 0], 5.0)));
    }

    #[test]
    fn inner_product_requires_same_grid() {
        let a = Image::uniform(fov(), 2.0);
        let b = Image::uniform(fov(), 3.0);
        assert_eq!(a.inner_product(&b).unwrap(), 36.0);
        let other = Image::ones(FOV::new((mm(30.0), mm(20.0), mm(10.0)), (6, 2, 1)).unwrap());
        assert!(a.inner_product(&other).is_err());
    }

    #[test]
    fn sensitivity_rejects_negative_and_nan() {
        let mut image = Image::ones(fov());
        image[3] = -1.0;
        assert!(matches!(SensitivityMap::new(image.clone()), Err(ReconError::InvalidInput(_))));
        image[3] = f32::NAN;
        assert!(matches!(SensitivityMap::new(image), Err(ReconError::InvalidInput(_))));
    }

    #[test]
    fn zero_sensitivity_only_under_zero_density() {
        let mut s = Image::ones(fov());
        s[1] = 0.0;
        let s = SensitivityMap::new(s).unwrap();
        let mut x = Image::ones(fov());
        assert!(matches!(s.ensure_covers(&x), Err(ReconError::InvalidInput(_))));
        x[1] = 0.0;
        assert!(s.ensure_covers(&x).is_ok());
    }

    #[test]
    fn apply_sensitivity() {
        let mut s = Image::uniform(fov(), 2.0);
        s[0] = 0.0;
        let s = SensitivityMap::new(s).unwrap();
        let mut x = vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0];
        let bp    = vec![9.0, 4.0, 4.0, 4.0, 4.0, 1.0];
        s.apply(&mut x, &bp);
        assert_eq!(x, vec![0.0, 2.0, 4.0, 6.0, 8.0, 2.5]);
    }

    #[test]
    fn first_non_finite_voxel() {
        let mut image = Image::ones(fov());
        assert_eq!(image.first_non_finite(), None);
        image[4] = f32::INFINITY;
        assert_eq!(image.first_non_finite(), Some((4, f32::INFINITY)));
    }
}
