use std::sync::Arc;

use units::{mm_, Length};
use crate::Point;


/// Line Of Response.
///
/// 2 points indicating the positions of coincident detector element
/// activations. Only the segment between them is traced through the FOV.
#[derive(Clone, Copy, Debug, PartialEq)]
#[allow(clippy::upper_case_acronyms)]
pub struct LOR {
    pub p1: Point,
    pub p2: Point,
}

impl LOR {
    pub fn new(p1: Point, p2: Point) -> Self { Self { p1, p2 } }

    pub fn from_components((x1, y1, z1): (Length, Length, Length),
                           (x2, y2, z2): (Length, Length, Length),
                          ) -> Self
    {
        Self::new(Point::new(x1,y1,z1), Point::new(x2,y2,z2))
    }

    pub fn length(&self) -> Length { (self.p2 - self.p1).norm() }

    pub fn is_finite(&self) -> bool { self.p1.is_finite() && self.p2.is_finite() }
}

use core::fmt;
impl fmt::Display for LOR {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let (p, q) = (self.p1, self.p2);
        write!(f, "<LOR ({:8.2} {:8.2} {:8.2}) ({:8.2} {:8.2} {:8.2}) /{:7.2}mm >",
               mm_(p.x), mm_(p.y), mm_(p.z),
               mm_(q.x), mm_(q.y), mm_(q.z),
               mm_(self.length())
        )
    }
}

/// An immutable, ordered, shareable collection of LORs.
///
/// Cloning shares the underlying storage, so listmode data derived from one
/// set of LORs can be recognized as belonging to it with [`Lors::same_as`].
#[derive(Clone, Debug)]
pub struct Lors(Arc<[LOR]>);

impl Lors {
    pub fn new(lors: Vec<LOR>) -> Self { Self(lors.into()) }

    pub fn len     (&self) -> usize { self.0.len() }
    pub fn is_empty(&self) -> bool  { self.0.is_empty() }
    pub fn iter(&self) -> std::slice::Iter<'_, LOR> { self.0.iter() }
    pub fn as_slice(&self) -> &[LOR] { &self.0 }

    /// Do `self` and `other` share the same storage?
    pub fn same_as(&self, other: &Lors) -> bool { Arc::ptr_eq(&self.0, &other.0) }
}

impl std::ops::Deref for Lors {
    type Target = [LOR];
    fn deref(&self) -> &[LOR] { &self.0 }
}

impl From<Vec<LOR>> for Lors {
    fn from(lors: Vec<LOR>) -> Self { Self::new(lors) }
}

impl FromIterator<LOR> for Lors {
    fn from_iter<I: IntoIterator<Item = LOR>>(iter: I) -> Self { Self(iter.into_iter().collect()) }
}

impl<'a> IntoIterator for &'a Lors {
    type Item = &'a LOR;
    type IntoIter = std::slice::Iter<'a, LOR>;
    fn into_iter(self) -> Self::IntoIter { self.iter() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use units::mm;
    use float_eq::assert_float_eq;

    fn lor(x: f32) -> LOR {
        LOR::from_components((mm(x), mm(0.0), mm(0.0)), (mm(x), mm(30.0), mm(40.0)))
    }

    #[test]
    fn lor_length() {
        assert_float_eq!(mm_(lor(1.0).length()), 50.0, ulps <= 1);
    }

    #[test]
    fn clones_share_storage() {
        let a: Lors = vec![lor(1.0), lor(2.0)].into();
        let b = a.clone();
        let c: Lors = vec![lor(1.0), lor(2.0)].into();
        assert!(a.same_as(&b));
        assert!(!a.same_as(&c));
        assert_eq!(a.as_slice(), c.as_slice());
    }

    #[test]
    fn display_shows_endpoints() {
        let text = lor(1.0).to_string();
        assert!(text.contains("30.00"), "{text}");
        assert!(text.contains("50.00mm"), "{text}");
    }
}
