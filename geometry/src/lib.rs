//! Points and vectors whose components carry physical units.

mod point;
mod vector;
mod mix;

pub use point::Point;
pub use vector::Vector;
