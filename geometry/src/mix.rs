//! Conversions between unit-carrying geometry and the plain `f32` (mm) types
//! used by `parry3d` for ray casting.

use crate::{Point, Vector};

type PPoint  = parry3d::math::Point <f32>;
type PVector = parry3d::math::Vector<f32>;

impl From<PPoint> for Point {
    fn from(p: PPoint) -> Self { Self::from_mm([p.x, p.y, p.z]) }
}

impl From<Point> for PPoint {
    fn from(p: Point) -> Self {
        let [x, y, z] = p.to_mm();
        Self::new(x, y, z)
    }
}

impl From<PVector> for Vector {
    fn from(v: PVector) -> Self { Self::from_mm([v.x, v.y, v.z]) }
}

impl From<Vector> for PVector {
    fn from(v: Vector) -> Self {
        let [x, y, z] = v.to_mm();
        Self::new(x, y, z)
    }
}
