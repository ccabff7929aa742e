//! Per-LOR values: measured counts, or the forward projection of an image.

use crate::{Lors, Ratiof32};
use crate::error::{ReconError, Result};
use crate::image::first_non_finite;

/// One value per LOR, in the same order as the LORs it is attached to.
#[derive(Clone, Debug)]
pub struct Listmode {
    lors: Lors,
    values: Vec<f32>,
}

impl Listmode {

    pub fn new(lors: Lors, values: Vec<f32>) -> Result<Self> {
        if lors.len() != values.len() {
            return Err(ReconError::geometry(format!(
                "{} listmode values for {} LORs", values.len(), lors.len()
            )));
        }
        Ok(Self { lors, values })
    }

    /// Measured counts: like `new`, but the values must also be finite and
    /// non-negative.
    pub fn counts(lors: Lors, values: Vec<f32>) -> Result<Self> {
        let listmode = Self::new(lors, values)?;
        listmode.ensure_valid_counts()?;
        Ok(listmode)
    }

    pub fn zeros(lors: Lors) -> Self {
        let values = vec![0.0; lors.len()];
        Self { lors, values }
    }

    pub fn lors  (&self) -> &Lors  { &self.lors }
    pub fn values(&self) -> &[f32] { &self.values }
    pub fn into_values(self) -> Vec<f32> { self.values }

    pub fn len     (&self) -> usize { self.values.len() }
    pub fn is_empty(&self) -> bool  { self.values.is_empty() }

    pub fn sum(&self) -> f32 { self.values.iter().sum() }

    pub fn ensure_valid_counts(&self) -> Result<()> {
        if let Some((i, v)) = first_non_finite(&self.values) {
            return Err(ReconError::invalid_input(format!("count of LOR {i} is {v}")));
        }
        if let Some(i) = self.values.iter().position(|&v| v < 0.0) {
            return Err(ReconError::invalid_input(format!("count of LOR {i} is negative: {}", self.values[i])));
        }
        Ok(())
    }

    /// Element-wise `self / other`, where `x / 0` is defined to be 0: a LOR
    /// with no expected counts contributes nothing to the backprojection.
    /// `other` must share this listmode's `Lors`, or hold an equal sequence of LORs.
    pub fn divide(&self, other: &Listmode) -> Result<Listmode> {
        self.ensure_same_lors(other)?;
        let values = self.values.iter().zip(&other.values)
            .map(|(&m, &p)| safe_ratio(m, p))
            .collect();
        Ok(Self { lors: self.lors.clone(), values })
    }

    /// Element-wise product. `other` must share this listmode's `Lors`, or
    /// hold an equal sequence of LORs.
    pub fn multiply(&self, other: &Listmode) -> Result<Listmode> {
        self.ensure_same_lors(other)?;
        let values = self.values.iter().zip(&other.values)
            .map(|(a, b)| a * b)
            .collect();
        Ok(Self { lors: self.lors.clone(), values })
    }

    pub fn inner_product(&self, other: &Listmode) -> Result<f32> {
        self.ensure_same_lors(other)?;
        Ok(self.values.iter().zip(&other.values).map(|(a, b)| a * b).sum())
    }

    fn ensure_same_lors(&self, other: &Listmode) -> Result<()> {
        if self.lors.same_as(&other.lors) || self.lors.as_slice() == other.lors.as_slice() {
            Ok(())
        } else {
            Err(ReconError::geometry(format!(
                "listmode data refer to different LORs ({} vs {})", self.len(), other.len()
            )))
        }
    }
}

#[inline]
pub(crate) fn safe_ratio(numerator: f32, denominator: f32) -> Ratiof32 {
    if denominator == 0.0 { 0.0 } else { numerator / denominator }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LOR;
    use crate::Point;
    #[allow(unused)] use pretty_assertions::{assert_eq, assert_ne};

    fn lors(n: usize) -> Lors {
        (0..n).map(|i| LOR::new(Point::from_mm([i as f32, -10.0, 0.0]),
                                Point::from_mm([i as f32,  10.0, 0.0])))
            .collect()
    }

    #[test]
    fn value_count_must_match_lors() {
        assert!(Listmode::new(lors(3), vec![1.0; 3]).is_ok());
        assert!(matches!(Listmode::new(lors(3), vec![1.0; 2]), Err(ReconError::GeometryMismatch(_))));
    }

    #[test]
    fn counts_must_be_valid() {
        assert!(matches!(Listmode::counts(lors(2), vec![1.0, -1.0]),     Err(ReconError::InvalidInput(_))));
        assert!(matches!(Listmode::counts(lors(2), vec![f32::NAN, 1.0]), Err(ReconError::InvalidInput(_))));
        assert!(Listmode::counts(lors(2), vec![0.0, 3.0]).is_ok());
    }

    #[test]
    fn divide_by_zero_gives_zero() {
        let l = lors(4);
        let measured  = Listmode::new(l.clone(), vec![4.0, 0.0, 3.0, 5.0]).unwrap();
        let projected = Listmode::new(l.clone(), vec![2.0, 0.0, 0.0, 0.5]).unwrap();
        let ratio = measured.divide(&projected).unwrap();
        assert_eq!(ratio.values(), &[2.0, 0.0, 0.0, 10.0]);
        assert!(ratio.lors().same_as(&l));
    }

    #[test]
    fn elementwise_operations_need_matching_lors() {
        let a = Listmode::new(lors(3), vec![1.0, 2.0, 3.0]).unwrap();
        let b = Listmode::new(lors(3), vec![2.0, 2.0, 2.0]).unwrap();
        assert_eq!(a.multiply(&b).unwrap().values(), &[2.0, 4.0, 6.0]);
        assert_eq!(a.inner_product(&b).unwrap(), 12.0);
        let c = Listmode::new(lors(2), vec![2.0, 2.0]).unwrap();
        assert!(matches!(a.divide(&c), Err(ReconError::GeometryMismatch(_))));
    }

    #[test]
    fn equal_lors_need_not_be_shared() {
        let (a, b) = (lors(3), lors(3));
        assert!(!a.same_as(&b));
        let x = Listmode::new(a, vec![1.0, 2.0, 3.0]).unwrap();
        let y = Listmode::new(b, vec![2.0, 4.0, 0.0]).unwrap();
        assert_eq!(x.divide(&y).unwrap().values(), &[0.5, 0.5, 0.0]);

        let shifted: Lors = lors(4).iter().skip(1).copied().collect();
        let z = Listmode::new(shifted, vec![1.0; 3]).unwrap();
        assert!(matches!(x.multiply(&z), Err(ReconError::GeometryMismatch(_))));
    }

    #[test]
    fn zeros_and_sum() {
        let z = Listmode::zeros(lors(5));
        assert_eq!(z.len(), 5);
        assert_eq!(z.sum(), 0.0);
    }
}
