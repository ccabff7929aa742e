//! Maximum Likelihood Expectation Maximization over listmode data.
//!
//! Each iteration maps the current estimate `x` to
//!
//! ```text
//! x * backproject(measured / project(x)) / sensitivity
//! ```
//!
//! where LORs whose projection is zero contribute nothing.

use std::time::Instant;

use log::{debug, info};

use crate::{Listmode, Image, SensitivityMap};
use crate::error::{ReconError, Result, Stage};
use crate::image::first_non_finite;
use crate::observer::{IterationObserver, NoObserver};
use crate::projector::{BackProjector, Projector};

#[derive(Debug)]
pub struct Mlem {
    projector: Projector,
    back_projector: BackProjector,
    sensitivity: SensitivityMap,
    iterations: usize,
}

impl Mlem {

    /// Fails if `iterations` is zero, if the projectors use different
    /// projection modes, or if the sensitivity map is not on the
    /// back-projector's grid.
    pub fn new(
        projector: Projector,
        back_projector: BackProjector,
        sensitivity: SensitivityMap,
        iterations: usize,
    ) -> Result<Self> {
        if iterations == 0 {
            return Err(ReconError::configuration("MLEM needs at least one iteration"));
        }
        if projector.mode() != back_projector.mode() {
            return Err(ReconError::configuration(format!(
                "projector uses {} but back-projector uses {}", projector.mode(), back_projector.mode()
            )));
        }
        back_projector.fov().ensure_same_grid(sensitivity.fov(), "sensitivity map")?;
        Ok(Self { projector, back_projector, sensitivity, iterations })
    }

    pub fn n_iterations(&self) -> usize { self.iterations }
    pub fn projector     (&self) -> &Projector      { &self.projector }
    pub fn back_projector(&self) -> &BackProjector  { &self.back_projector }
    pub fn sensitivity   (&self) -> &SensitivityMap { &self.sensitivity }

    /// Run all iterations, starting from `initial` or, if absent, from a
    /// uniform image of ones on the back-projector's grid.
    pub fn reconstruct(&self, listmode: &Listmode, initial: Option<Image>) -> Result<Image> {
        self.reconstruct_with(listmode, initial, &mut NoObserver)
    }

    /// Like `reconstruct`, but pass each iteration's estimate through
    /// `observer`. The run continues with the image it returns.
    pub fn reconstruct_with(
        &self,
        listmode: &Listmode,
        initial: Option<Image>,
        observer: &mut dyn IterationObserver,
    ) -> Result<Image> {
        let mut image = self.prepare(listmode, initial)?;
        let start = Instant::now();
        for k in 1..=self.iterations {
            image = self.one_iteration(image, listmode, k)?;
            image = observer.observe(k, image);
            self.sensitivity.ensure_covers(&image)?;
        }
        info!("MLEM finished {} iterations in {:.1?}", self.iterations, start.elapsed());
        Ok(image)
    }

    /// Successive estimates, computed lazily: the caller may stop between
    /// iterations. Yields at most one error, after which it is exhausted.
    pub fn iterations<'a>(
        &'a self,
        listmode: &'a Listmode,
        initial: Option<Image>,
    ) -> Result<impl Iterator<Item = Result<Image>> + 'a> {
        let mut image = Some(self.prepare(listmode, initial)?);
        let mut k = 0;
        Ok(std::iter::from_fn(move || {
            if k >= self.iterations { return None }
            let current = image.take()?;
            k += 1;
            Some(self.one_iteration(current, listmode, k)
                 .inspect(|next| image = Some(next.clone())))
        }))
    }

    /// One MLEM update of `image`, which is numbered `k` in error reports.
    pub fn one_iteration(&self, mut image: Image, listmode: &Listmode, k: usize) -> Result<Image> {
        let start = Instant::now();
        self.back_projector.fov().ensure_same_grid(&image.fov, "estimate")?;

        let projection = self.projector.project(&image, listmode.lors())?;
        let ratio = listmode.divide(&projection)?;
        if let Some((element, value)) = first_non_finite(ratio.values()) {
            return Err(ReconError::NumericalInstability { iteration: k, stage: Stage::Ratio, element, value });
        }

        let backprojection = self.back_projector.back_project(&ratio)?;
        self.sensitivity.apply(&mut image.data, &backprojection.data);
        if let Some((element, value)) = image.first_non_finite() {
            return Err(ReconError::NumericalInstability { iteration: k, stage: Stage::Update, element, value });
        }

        info!("Iteration {k:>3}/{}: total activity {:.4e}", self.iterations, image.sum());
        debug!("Iteration {k} took {:.1?}", start.elapsed());
        Ok(image)
    }

    // Everything that can be checked before the first projection
    fn prepare(&self, listmode: &Listmode, initial: Option<Image>) -> Result<Image> {
        let fov = *self.back_projector.fov();
        let image = initial.unwrap_or_else(|| Image::ones(fov));
        fov.ensure_same_grid(&image.fov, "initial image")?;
        if let Some((i, v)) = image.first_non_finite() {
            return Err(ReconError::invalid_input(format!("initial image voxel {i} is {v}")));
        }
        self.sensitivity.ensure_covers(&image)?;
        listmode.ensure_valid_counts()?;

        let lors = listmode.lors();
        if let Some(i) = lors.iter().position(|lor| !lor.is_finite()) {
            return Err(ReconError::geometry(format!("LOR {i} has non-finite endpoints: {}", lors[i])));
        }
        if !lors.is_empty() && !lors.iter().any(|lor| fov.clip(lor.p1, lor.p2).is_some()) {
            return Err(ReconError::geometry(format!(
                "none of the {} LORs crosses the FOV ({:?} mm wide at {:?} mm)",
                lors.len(), fov.size().to_mm(), fov.center.to_mm()
            )));
        }

        info!("MLEM: {} iterations over {} LORs on {:?} voxels, {} backend",
              self.iterations, lors.len(), fov.n, self.projector.backend().name());
        Ok(image)
    }
}
