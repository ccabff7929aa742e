//! Configuration file parser for MLEM runs
//!
//! Physical quantities are written as strings with units, for example
//! `fov_size = ["180 mm", "180 mm", "18 cm"]`.

use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, de};

use crate::Length;
use crate::Point;
use crate::error::{ReconError, Result};
use crate::fov::FOV;
use crate::projector::{Backend, BackProjector, CpuBackend, ProjectionBackend, ProjectionMode, Projector};

fn deserialize_uom_3d<'d, D, T>(deserializer: D) -> std::result::Result<(T, T, T), D::Error>
where
    D: Deserializer<'d>,
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    let (x, y, z) = <(String, String, String)>::deserialize(deserializer)?;
    tr_tup_res((x.parse(), y.parse(), z.parse()))
        .map_err(de::Error::custom)
}

fn deserialize_uom_3d_opt<'d, D, T>(deserializer: D) -> std::result::Result<Option<(T, T, T)>, D::Error>
where
    D: Deserializer<'d>,
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    Option::<(String, String, String)>::deserialize(deserializer)?
        .map(|(x,y,z)| tr_tup_res((x.parse(), y.parse(), z.parse())))
        .transpose()
        .map_err(de::Error::custom)
}

/// Transpose 3-tuple of `Result`
///
/// `Ok` if all elements `Ok`; if any element is an `Err` return the first one.
///
/// # Examples
/// `(Ok(a),  Ok(b),  Ok(c)) -> Ok((a, b, c))`
/// `(Ok(a), Err(b),  Ok(c)) -> Err(b)`
/// `(Ok(a), Err(b), Err(c)) -> Err(b)`
fn tr_tup_res<O, E>((x,y,z): (std::result::Result<O, E>, std::result::Result<O, E>, std::result::Result<O, E>)) -> std::result::Result<(O, O, O), E> {
    Ok((x?, y?, z?))
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct Config {

    /// Number of MLEM iterations to perform
    pub iterations: usize,

    /// Where the projections are calculated: `cpu` or `device`
    #[serde(default)]
    pub backend: Backend,

    #[serde(default)]
    pub projection: ProjectionMode,

    pub nvoxels: (usize, usize, usize),

    #[serde(deserialize_with = "deserialize_uom_3d")]
    pub fov_size: (Length, Length, Length),

    /// Defaults to the origin
    #[serde(default)]
    #[serde(deserialize_with = "deserialize_uom_3d_opt")]
    pub fov_center: Option<(Length, Length, Length)>,

    /// Minimum number of LORs per rayon job in CPU backprojections
    #[serde(default)]
    pub job_size: Option<usize>,

    /// Size of a dedicated CPU thread pool
    #[serde(default)]
    pub threads: Option<usize>,

    pub snapshots: Option<SnapshotSettings>,
}

/// Write the estimate to `{prefix}_{iteration:02}.raw` every `every` iterations
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SnapshotSettings {
    pub prefix: String,
    #[serde(default = "default_every")]
    pub every: usize,
}

fn default_every() -> usize { 1 }

impl Config {

    /// Parse and validate a TOML configuration
    pub fn parse(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.iterations == 0 {
            return Err(ReconError::configuration("`iterations` must be at least 1"));
        }
        if self.job_size == Some(0) {
            return Err(ReconError::configuration("`job_size` must be at least 1"));
        }
        if self.threads == Some(0) {
            return Err(ReconError::configuration("`threads` must be at least 1"));
        }
        if let Some(SnapshotSettings { every: 0, .. }) = self.snapshots {
            return Err(ReconError::configuration("snapshot interval `every` must be at least 1"));
        }
        self.fov().map_err(|e| ReconError::configuration(format!("bad FOV: {e}")))?;
        Ok(())
    }

    /// The reconstruction grid
    pub fn fov(&self) -> Result<FOV> {
        let center = self.fov_center
            .map(|(x, y, z)| Point::new(x, y, z))
            .unwrap_or_else(Point::zero);
        FOV::with_center(center, self.fov_size, self.nvoxels)
    }

    /// The configured backend, with the CPU settings applied
    pub fn backend(&self) -> Result<Arc<dyn ProjectionBackend>> {
        match self.backend {
            Backend::Cpu => Ok(Arc::new(CpuBackend::new(self.job_size, self.threads)?)),
            Backend::Device => Backend::Device.instantiate(),
        }
    }

    /// Forward and backward projectors sharing a single backend
    pub fn projectors(&self) -> Result<(Projector, BackProjector)> {
        let backend = self.backend()?;
        Ok((Projector::with_backend(self.projection, backend.clone()),
            BackProjector::with_backend(self.fov()?, self.projection, backend)))
    }
}

pub fn read_config_file(path: &Path) -> Result<Config> {
    let text = fs::read_to_string(path)?;
    Config::parse(&text)
}
