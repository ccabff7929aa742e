//! Cylindrical ring scanner, discretized into crystal-like elements.
//!
//! Used to generate the set of all possible LORs through a FOV, for
//! sensitivity maps and synthetic data.

use std::f32::consts::TAU;

use itertools::iproduct;
use log::debug;
use rayon::prelude::*;

use units::{mm, mm_, Length};
use units::todo::Lengthf32;

use crate::Point;
use crate::error::{ReconError, Result};
use crate::fov::FOV;
use crate::lor::{LOR, Lors};

/// Discretization parameters of a continuous ring of scintillator.
#[derive(Debug, Clone, Copy)]
pub struct Ring {

    /// Inner radius of the scintillator ring
    pub r_min: Length,

    /// Radial thickness of the scintillator
    pub dr: Length,

    /// Axial width of elements
    pub dz: Length,

    /// Azimuthal width of elements at `r_min + dr/2`, before adjustment to
    /// fit a whole number of them around the ring
    pub da: Length,

    /// Axial length of the scintillator
    pub length: Length,
}

impl Ring {

    pub fn new(r_min: Length, dr: Length, dz: Length, da: Length, length: Length) -> Result<Self> {
        let ring = Self { r_min, dr, dz, da, length };
        let [r_min, dr, dz, da, length] = [r_min, dr, dz, da, length].map(mm_);
        if !(r_min > 0.0 && dr >= 0.0 && dz > 0.0 && da > 0.0 && length >= 0.0) {
            return Err(ReconError::configuration(format!(
                "bad ring detector: r_min={r_min} dr={dr} dz={dz} da={da} length={length} (mm)"
            )));
        }
        Ok(ring)
    }

    /// Construct from `f32`s which are interpreted as lengths in `mm`
    pub fn from_f32s_in_mm(r_min: Lengthf32, dr: Lengthf32, dz: Lengthf32, da: Lengthf32, length: Lengthf32) -> Result<Self> {
        Self::new(mm(r_min), mm(dr), mm(dz), mm(da), mm(length))
    }

    /// Radius at which the element centres lie
    pub fn radius(&self) -> Length { self.r_min + self.dr / 2.0 }

    /// Number of elements around the ring
    pub fn n_azimuthal(&self) -> usize { self.help().n_azimuthal }

    /// Number of elements along the axis. Always odd: there is always an
    /// element at `z = 0`.
    pub fn n_axial(&self) -> usize { 2 * self.n_half_axial() + 1 }

    pub fn n_elements(&self) -> usize { self.n_azimuthal() * self.n_axial() }

    /// The centre of the element nearest to `p`
    pub fn centre_of_nearest_element(&self, p: Point) -> Point {
        let Help { r, d_phi, .. } = self.help();
        let dz = mm_(self.dz);
        let [x, y, z] = p.to_mm();
        let phi = (y.atan2(x) / d_phi).round() * d_phi;
        let z = (z / dz).round() * dz;
        Point::from_mm([r * phi.cos(), r * phi.sin(), z])
    }

    /// All the points lying at the centres of the elements
    pub fn element_centres(&self) -> Vec<Point> {
        let Help { r, n_azimuthal, d_phi } = self.help();
        let dz = mm_(self.dz);
        let n_half_axial = self.n_half_axial() as i32;

        let azimuthal = (0..n_azimuthal).map(|n| {
            let phi = d_phi * n as f32;
            (r * phi.cos(), r * phi.sin())
        });
        let axial = (-n_half_axial..=n_half_axial).map(|n| n as f32 * dz);

        iproduct!(azimuthal, axial)
            .map(|((x, y), z)| Point::from_mm([x, y, z]))
            .collect()
    }

    /// Every pair of distinct elements whose LOR crosses `fov`, each pair
    /// appearing once.
    ///
    /// NB: the number of LORs grows with the square of the number of
    /// elements.
    pub fn all_lors(&self, fov: &FOV) -> Lors {
        let centres = self.element_centres();
        let n = centres.len();
        let lors: Vec<LOR> = (0..n)
            .into_par_iter()
            .flat_map_iter(|i| {
                let centres = &centres;
                (i + 1..n).filter_map(move |j| {
                    let (p1, p2) = (centres[i], centres[j]);
                    fov.clip(p1, p2).map(|_| LOR::new(p1, p2))
                })
            })
            .collect();
        debug!("{} of {} element pairs cross the FOV", lors.len(), n * n.saturating_sub(1) / 2);
        lors.into()
    }

    fn n_half_axial(&self) -> usize {
        (mm_(self.length) / 2.0 / mm_(self.dz)).round() as usize
    }

    fn help(&self) -> Help {
        let r = mm_(self.radius());
        let n_azimuthal = (TAU * r / mm_(self.da)).round().max(1.0);
        Help { r, n_azimuthal: n_azimuthal as usize, d_phi: TAU / n_azimuthal }
    }
}

struct Help {
    /// Radial position of element centres, in mm
    r: Lengthf32,

    n_azimuthal: usize,

    /// Azimuthal width of elements, in radians, after adjustment to fit
    /// the circumference
    d_phi: f32,
}
