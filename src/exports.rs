pub use units::{Length, Ratio};
pub use units::todo::{Lengthf32, Weightf32, Ratiof32, Intensityf32};

pub use geometry::{Point, Vector};

pub use crate::index::{BoxDim_u, Index1_u, Index3_u};
