//! Forward and backward projection of images through LORs.
//!
//! The geometric work is delegated to a [`ProjectionBackend`], chosen once
//! when a [`Projector`] or [`BackProjector`] is built. Backends are shared
//! through `Arc`, so a projector and a back-projector can use a single device
//! context.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;

use crate::{LOR, Lors, Listmode};
use crate::error::{ReconError, Result};
use crate::fov::FOV;
use crate::image::{Image, ImageData};

pub mod cpu;
pub use cpu::CpuBackend;

#[cfg(feature = "device")] pub mod device;
#[cfg(feature = "device")] pub use device::DeviceBackend;

// ----- The trait --------------------------------------------------------------------

/// Abstract interface for forward-backward projection implementations
pub trait ProjectionBackend: Send + Sync {

    fn name(&self) -> &'static str;

    /// Line integral of `image` along each of `lors`, in the same order.
    fn forward(&self, image: &Image, lors: &[LOR]) -> Result<Vec<f32>>;

    /// Sum, over all `lors`, of the corresponding `values` spread over the
    /// voxels of `fov` with the same weights that `forward` uses.
    fn backward(&self, fov: &FOV, lors: &[LOR], values: &[f32]) -> Result<ImageData>;
}

// ----- Selection of projection algorithm and backend ---------------------------------
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectionMode {
    #[default]
    Siddon,
}

impl FromStr for ProjectionMode {
    type Err = ReconError;
    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "siddon" => Ok(Self::Siddon),
            other => Err(ReconError::configuration(format!("unsupported projection mode `{other}`"))),
        }
    }
}

impl fmt::Display for ProjectionMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Siddon => write!(f, "siddon"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Cpu,
    #[serde(alias = "gpu")]
    Device,
}

impl Backend {
    /// Create the backend with default settings. Fails with a configuration
    /// error if the device backend was requested but no device can be used.
    pub fn instantiate(self) -> Result<Arc<dyn ProjectionBackend>> {
        match self {
            Self::Cpu => Ok(Arc::new(CpuBackend::default())),
            Self::Device => device_backend(),
        }
    }
}

#[cfg(feature = "device")]
fn device_backend() -> Result<Arc<dyn ProjectionBackend>> {
    Ok(Arc::new(DeviceBackend::new()?))
}

#[cfg(not(feature = "device"))]
fn device_backend() -> Result<Arc<dyn ProjectionBackend>> {
    Err(ReconError::configuration("device backend requested, but built without the `device` feature"))
}

impl FromStr for Backend {
    type Err = ReconError;
    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "cpu"    => Ok(Self::Cpu),
            "device" | "gpu" => Ok(Self::Device),
            other => Err(ReconError::configuration(format!("unknown backend `{other}`: expected `cpu` or `device`"))),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Cpu    => write!(f, "cpu"),
            Self::Device => write!(f, "device"),
        }
    }
}

// ----- Forward projection ------------------------------------------------------------
/// Image → Listmode
#[derive(Clone)]
pub struct Projector {
    mode: ProjectionMode,
    backend: Arc<dyn ProjectionBackend>,
}

impl Projector {

    pub fn new(mode: ProjectionMode, backend: Backend) -> Result<Self> {
        Ok(Self::with_backend(mode, backend.instantiate()?))
    }

    pub fn with_backend(mode: ProjectionMode, backend: Arc<dyn ProjectionBackend>) -> Self {
        Self { mode, backend }
    }

    pub fn mode(&self) -> ProjectionMode { self.mode }
    pub fn backend(&self) -> &Arc<dyn ProjectionBackend> { &self.backend }

    /// For every LOR, `Σ density[voxel] * intersection length`. Does not
    /// modify `image`.
    pub fn project(&self, image: &Image, lors: &Lors) -> Result<Listmode> {
        ensure_finite(lors)?;
        if lors.is_empty() { return Ok(Listmode::zeros(lors.clone())) }
        let values = self.backend.forward(image, lors)?;
        Listmode::new(lors.clone(), values)
    }
}

impl fmt::Debug for Projector {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Projector")
            .field("mode", &self.mode)
            .field("backend", &self.backend.name())
            .finish()
    }
}

// ----- Backward projection -----------------------------------------------------------
/// Listmode → Image, on a fixed target grid
#[derive(Clone)]
pub struct BackProjector {
    fov: FOV,
    mode: ProjectionMode,
    backend: Arc<dyn ProjectionBackend>,
}

impl BackProjector {

    pub fn new(fov: FOV, mode: ProjectionMode, backend: Backend) -> Result<Self> {
        Ok(Self::with_backend(fov, mode, backend.instantiate()?))
    }

    pub fn with_backend(fov: FOV, mode: ProjectionMode, backend: Arc<dyn ProjectionBackend>) -> Self {
        Self { fov, mode, backend }
    }

    pub fn fov(&self) -> &FOV { &self.fov }
    pub fn mode(&self) -> ProjectionMode { self.mode }
    pub fn backend(&self) -> &Arc<dyn ProjectionBackend> { &self.backend }

    /// Spread each LOR's value over the voxels it crosses, weighted by
    /// intersection length. Contributions from different LORs are summed.
    pub fn back_project(&self, listmode: &Listmode) -> Result<Image> {
        let lors = listmode.lors();
        ensure_finite(lors)?;
        if lors.is_empty() { return Ok(Image::zeros(self.fov)) }
        let data = self.backend.backward(&self.fov, lors, listmode.values())?;
        Image::new(self.fov, data)
    }
}

impl fmt::Debug for BackProjector {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("BackProjector")
            .field("fov", &self.fov)
            .field("mode", &self.mode)
            .field("backend", &self.backend.name())
            .finish()
    }
}

fn ensure_finite(lors: &[LOR]) -> Result<()> {
    match lors.iter().position(|lor| !lor.is_finite()) {
        None => Ok(()),
        Some(i) => Err(ReconError::geometry(format!("LOR {i} has non-finite endpoints: {}", lors[i]))),
    }
}
