use std::ops::{Add, Index, Sub};
use units::{Length, mm, mm_};
use units::todo::Lengthf32;
use crate::Vector;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point {
    pub x: Length,
    pub y: Length,
    pub z: Length,
}

impl Point {
    pub fn new(x: Length, y: Length, z: Length) -> Self { Self { x, y, z } }

    pub fn zero() -> Self { Self::from_mm([0.0; 3]) }

    /// Interpret the elements of `xyz` as millimetres
    pub fn from_mm([x, y, z]: [Lengthf32; 3]) -> Self { Self::new(mm(x), mm(y), mm(z)) }

    /// Components in millimetres, for use in inner loops and device buffers
    pub fn to_mm(self) -> [Lengthf32; 3] { [mm_(self.x), mm_(self.y), mm_(self.z)] }

    pub fn is_finite(self) -> bool { self.to_mm().iter().all(|c| c.is_finite()) }
}

impl Sub for Point {
    type Output = Vector;
    fn sub(self, rhs: Self) -> Self::Output {
        Vector::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Add<Vector> for Point {
    type Output = Self;
    fn add(self, rhs: Vector) -> Self::Output {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub<Vector> for Point {
    type Output = Self;
    fn sub(self, rhs: Vector) -> Self::Output {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Index<usize> for Point {
    type Output = Length;
    fn index(&self, index: usize) -> &Self::Output {
        match index {
            0 => &self.x,
            1 => &self.y,
            2 => &self.z,
            _ => panic!("index {index} is out of bounds [0,2]")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use units::{cm, assert_uom_eq, uom::si::length::millimeter};

    #[test]
    fn point_minus_point_is_vector() {
        let lhs      = Point ::new(cm(3.0), mm( 20.0), cm( 8.0));
        let rhs      = Point ::new(cm(2.0), cm(  4.0), mm(20.0));
        let expected = Vector::new(cm(1.0), mm(-20.0), mm(60.0));
        let result: Vector = lhs - rhs;
        assert_uom_eq!(millimeter, result.x, expected.x, ulps <= 1);
        assert_uom_eq!(millimeter, result.y, expected.y, ulps <= 2);
        assert_uom_eq!(millimeter, result.z, expected.z, ulps <= 2);
    }

    #[test]
    fn point_plus_vector_roundtrip() {
        let p = Point::from_mm([1.0, -2.0, 3.5]);
        let v = Vector::from_mm([10.0, 20.0, -30.0]);
        assert_eq!((p + v).to_mm(), [11.0, 18.0, -26.5]);
        assert_eq!((p + v - v).to_mm(), p.to_mm());
    }

    #[test]
    fn non_finite_components_detected() {
        assert!( Point::from_mm([1.0, 2.0, 3.0]).is_finite());
        assert!(!Point::from_mm([1.0, f32::NAN, 3.0]).is_finite());
        assert!(!Point::from_mm([f32::INFINITY, 2.0, 3.0]).is_finite());
    }
}
