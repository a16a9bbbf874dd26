//! Unit wrappers for the electrical ratings that feed the typed-line invariant.
//!
//! Capacity expansion keeps most quantities as plain `f64` MW/MVA columns, but
//! the rating of a typed line mixes kiloamperes, kilovolts and megavolt-amperes.
//! These newtypes keep that conversion explicit:
//!
//! ```
//! use gridexp_core::units::{three_phase_rating, Kiloamperes, Kilovolts};
//!
//! let s = three_phase_rating(Kiloamperes(0.645), Kilovolts(380.0));
//! assert!((s.value() - 424.5).abs() < 0.1);
//! ```
//!
//! All types are `#[repr(transparent)]` and serialize as bare numbers.

use serde::{Deserialize, Serialize};
use std::ops::{Add, Div, Mul, Sub};

/// Implements arithmetic shared by every unit type
macro_rules! impl_unit_ops {
    ($type:ty, $unit_name:literal) => {
        impl Add for $type {
            type Output = Self;
            fn add(self, rhs: Self) -> Self::Output {
                Self(self.0 + rhs.0)
            }
        }

        impl Sub for $type {
            type Output = Self;
            fn sub(self, rhs: Self) -> Self::Output {
                Self(self.0 - rhs.0)
            }
        }

        impl Mul<f64> for $type {
            type Output = Self;
            fn mul(self, rhs: f64) -> Self::Output {
                Self(self.0 * rhs)
            }
        }

        impl Div<f64> for $type {
            type Output = Self;
            fn div(self, rhs: f64) -> Self::Output {
                Self(self.0 / rhs)
            }
        }

        impl Div<$type> for $type {
            type Output = f64;
            fn div(self, rhs: $type) -> Self::Output {
                self.0 / rhs.0
            }
        }

        impl std::fmt::Display for $type {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{:.4} {}", self.0, $unit_name)
            }
        }

        impl $type {
            /// Create a new value
            #[inline]
            pub const fn new(value: f64) -> Self {
                Self(value)
            }

            /// Get the raw numeric value
            #[inline]
            pub const fn value(self) -> f64 {
                self.0
            }

            /// Check if value is finite
            #[inline]
            pub fn is_finite(self) -> bool {
                self.0.is_finite()
            }
        }
    };
}

/// Apparent power in megavolt-amperes (MVA)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct MegavoltAmperes(pub f64);

impl_unit_ops!(MegavoltAmperes, "MVA");

/// Line-to-line voltage in kilovolts (kV)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Kilovolts(pub f64);

impl_unit_ops!(Kilovolts, "kV");

/// Conductor current in kiloamperes (kA)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Kiloamperes(pub f64);

impl_unit_ops!(Kiloamperes, "kA");

/// Thermal rating of one three-phase circuit: S = √3 · I · V.
///
/// kA · kV gives MVA directly, so no scaling constant is needed.
#[inline]
pub fn three_phase_rating(current: Kiloamperes, voltage: Kilovolts) -> MegavoltAmperes {
    MegavoltAmperes(3f64.sqrt() * current.0 * voltage.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_three_phase_rating() {
        let s = three_phase_rating(Kiloamperes(1.0), Kilovolts(100.0));
        assert!((s.value() - 173.205).abs() < 1e-3);
    }

    #[test]
    fn test_unit_ratio_is_dimensionless() {
        let ratio = MegavoltAmperes(150.0) / MegavoltAmperes(100.0);
        assert!((ratio - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_serializes_as_bare_number() {
        let json = serde_json::to_string(&Kilovolts(220.0)).unwrap();
        assert_eq!(json, "220.0");
        let back: Kilovolts = serde_json::from_str("380").unwrap();
        assert_eq!(back, Kilovolts(380.0));
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", MegavoltAmperes(12.5)), "12.5000 MVA");
    }
}
