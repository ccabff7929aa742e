//! Physical quantities used throughout the reconstruction.
//!
//! Lengths are `uom` quantities, so mixing up millimetres and centimetres (or
//! lengths and ratios) at API boundaries is a compile-time error. Inner loops
//! work on plain `f32`s in millimetres: see [`todo`].

pub mod todo;

pub use uom;
pub use float_eq;

pub use uom::si::Quantity;
pub use uom::si::f32::{Length, Ratio, Area};

mod units {
    pub use uom::si::{length::{nanometer, millimeter, centimeter, meter},
                      ratio ::ratio};
}

// Making values from float literals is very long-winded in uom, so provide
// some pithily-named convenience constructors.

/// Generate a function called NAME which returns QUANTITY by interpreting its
/// argument as UNIT
///
/// wrap!(NAME QUANTITY UNIT);
macro_rules! wrap {
    ($name:ident $quantity:ident $unit:ident ) => {
        pub fn $name(x: f32) -> $quantity { $quantity::new::<units::$unit>(x) }
    };
}

wrap!(nm    Length  nanometer);
wrap!(mm    Length millimeter);
wrap!(cm    Length centimeter);
wrap!(m     Length      meter);
wrap!(ratio Ratio       ratio);

// Reverse direction of the above.
pub fn mm_   (x: Length) -> f32 { x.get::<units::millimeter>() }
pub fn cm_   (x: Length) -> f32 { x.get::<units::centimeter>() }
pub fn ratio_(x: Ratio ) -> f32 { x.get::<units::ratio>() }

/// Compare two `uom` quantities via `float_eq`, after expressing both in
/// `unit`.
///
/// ```
/// use units::{mm, cm, assert_uom_eq, uom::si::length::millimeter};
/// assert_uom_eq!(millimeter, cm(1.0), mm(10.0), ulps <= 1);
/// ```
#[macro_export]
macro_rules! assert_uom_eq {
    ($unit:ident, $lhs:expr, $rhs:expr, $algo:ident <= $tol:expr) => {
        $crate::float_eq::assert_float_eq!($lhs.get::<$unit>(), $rhs.get::<$unit>(), $algo <= $tol)
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use units::{nanometer, millimeter};

    #[test]
    fn sum_of_mixed_units() {
        let v = vec![mm(1.0), cm(1.0)];
        let total: Length = v.into_iter().sum();
        assert_uom_eq!(nanometer, total, mm(11.0), ulps <= 1);
    }

    #[test]
    fn roundtrip_through_f32() {
        assert_eq!(mm_(mm(12.5)), 12.5);
        assert_eq!(ratio_(ratio(0.25)), 0.25);
        assert_uom_eq!(millimeter, m(0.18), mm(180.0), ulps <= 2);
    }

    #[test]
    fn length_ratio_is_dimensionless() {
        let r: Ratio = mm(30.0) / cm(6.0);
        float_eq::assert_float_eq!(ratio_(r), 0.5, ulps <= 1);
    }

    #[test]
    fn lengths_parse_with_units() -> Result<(), Box<dyn std::error::Error>> {
        let l: Length = "2 cm".parse()?;
        assert_uom_eq!(millimeter, l, mm(20.0), ulps <= 1);
        Ok(())
    }
}
