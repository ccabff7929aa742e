//! Listmode MLEM reconstruction of emission tomography images.
//!
//! Lines Of Response ([`LOR`]s) are traced through a voxelized field of view
//! ([`FOV`]) with Siddon's algorithm, forwards ([`Projector`]) and backwards
//! ([`BackProjector`]), on the CPU or on a GPU ([`Backend`]). The [`Mlem`]
//! controller alternates the two for a fixed number of iterations.

mod exports;
pub use exports::*;

pub mod error;
pub mod index;
pub mod fov;
pub mod image;
pub mod lor;
pub mod listmode;
pub mod system_matrix;
pub mod projector;
pub mod mlem;
pub mod observer;
pub mod config;
pub mod detector;
pub mod io;

pub use error::{ReconError, Result};
pub use fov::FOV;
pub use image::{Image, SensitivityMap};
pub use lor::{LOR, Lors};
pub use listmode::Listmode;
pub use projector::{Backend, BackProjector, ProjectionBackend, ProjectionMode, Projector};
pub use mlem::Mlem;
pub use observer::IterationObserver;
