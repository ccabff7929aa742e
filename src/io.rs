//! Persistence of images as headerless arrays of little-endian `f32`.
//!
//! The raw format carries no geometry: the FOV must be supplied when reading.

pub mod raw;

use std::path::Path;

use crate::error::Result;
use crate::fov::FOV;
use crate::image::Image;

impl Image {

    pub fn write_to_raw_file(&self, path: &Path) -> Result<()> {
        raw::write(&self.data, path)?;
        Ok(())
    }

    /// Fails with a geometry mismatch if the file does not contain exactly
    /// one value per voxel of `fov`.
    pub fn from_raw_file(fov: FOV, path: &Path) -> Result<Self> {
        Image::new(fov, raw::read(path)?)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::ReconError;
    use units::mm;
    #[allow(unused)] use pretty_assertions::{assert_eq, assert_ne};

    #[test]
    fn image_raw_roundtrip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("image.raw");
        let fov = FOV::new((mm(4.0), mm(2.0), mm(2.0)), (2, 1, 1))?;
        let image = Image::new(fov, vec![0.5, 3.25])?;
        image.write_to_raw_file(&path)?;
        assert_eq!(Image::from_raw_file(fov, &path)?, image);

        let bigger = FOV::new((mm(4.0), mm(2.0), mm(2.0)), (2, 2, 1))?;
        assert!(matches!(Image::from_raw_file(bigger, &path), Err(ReconError::GeometryMismatch(_))));
        Ok(())
    }
}
