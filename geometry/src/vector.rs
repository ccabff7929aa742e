use std::ops::{Add, Div, Index, Mul, Neg, Sub};
use units::{Length, mm, mm_};
use units::todo::Lengthf32;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Vector {
    pub x: Length,
    pub y: Length,
    pub z: Length,
}

impl Vector {

    pub fn new(x: Length, y: Length, z: Length) -> Self { Self { x, y, z } }

    /// Interpret the elements of `xyz` as millimetres
    pub fn from_mm([x, y, z]: [Lengthf32; 3]) -> Self { Self::new(mm(x), mm(y), mm(z)) }

    /// Components in millimetres, for use in inner loops and device buffers
    pub fn to_mm(self) -> [Lengthf32; 3] { [mm_(self.x), mm_(self.y), mm_(self.z)] }

    pub fn norm(self) -> Length {
        let Self { x, y, z } = self;
        (x*x + y*y + z*z).sqrt()
    }

    /// Element-wise quotient: how many `other`s fit into `self`, per axis
    pub fn component_div(self, other: Self) -> [f32; 3] {
        let (a, b) = (self.to_mm(), other.to_mm());
        [a[0] / b[0], a[1] / b[1], a[2] / b[2]]
    }
}

impl Add for Vector {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vector {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Neg for Vector {
    type Output = Self;
    fn neg(self) -> Self::Output { Self::new(-self.x, -self.y, -self.z) }
}

impl Mul<f32> for Vector {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self::Output {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Div<f32> for Vector {
    type Output = Self;
    fn div(self, rhs: f32) -> Self::Output {
        Self::new(self.x / rhs, self.y / rhs, self.z / rhs)
    }
}

impl Index<usize> for Vector {
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
