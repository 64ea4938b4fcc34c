//! This module defines the unit types used for fuel, capacity and service quantities.
use float_cmp::{ApproxEq, F64Margin};
use serde::{Deserialize, Serialize};

macro_rules! unit_struct {
    ($name:ident) => {
        /// Represents a type of quantity.
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            PartialOrd,
            Default,
            Serialize,
            Deserialize,
            derive_more::Add,
            derive_more::Sub,
            derive_more::AddAssign,
            derive_more::SubAssign,
            derive_more::Display,
        )]
        pub struct $name(pub f64);

        impl $name {
            /// Creates a new instance of the unit type from a f64 value.
            pub fn new(val: f64) -> Self {
                Self(val)
            }

            /// Returns the value of the unit type as a f64.
            pub fn value(self) -> f64 {
                self.0
            }

            /// Whether the underlying value is finite
            pub fn is_finite(self) -> bool {
                self.0.is_finite()
            }
        }

        impl std::ops::Mul<Dimensionless> for $name {
            type Output = $name;
            fn mul(self, rhs: Dimensionless) -> $name {
                $name(self.0 * rhs.0)
            }
        }

        impl std::ops::Div<Dimensionless> for $name {
            type Output = $name;
            fn div(self, rhs: Dimensionless) -> $name {
                $name(self.0 / rhs.0)
            }
        }

        impl std::ops::Div<$name> for $name {
            type Output = Dimensionless;
            fn div(self, rhs: $name) -> Dimensionless {
                Dimensionless(self.0 / rhs.0)
            }
        }

        impl std::iter::Sum for $name {
            fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
                $name(iter.map(|x| x.0).sum())
            }
        }

        impl ApproxEq for $name {
            type Margin = F64Margin;

            fn approx_eq<T: Into<Self::Margin>>(self, other: Self, margin: T) -> bool {
                self.0.approx_eq(other.0, margin)
            }
        }
    };
}

/// Represents a dimensionless quantity (shares, fractions and efficiencies).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    PartialOrd,
    Default,
    Serialize,
    Deserialize,
    derive_more::Add,
    derive_more::Sub,
    derive_more::AddAssign,
    derive_more::SubAssign,
    derive_more::Display,
)]
pub struct Dimensionless(pub f64);

impl std::ops::Mul for Dimensionless {
    type Output = Dimensionless;

    fn mul(self, rhs: Dimensionless) -> Self::Output {
        Dimensionless(self.0 * rhs.0)
    }
}

impl std::ops::Div for Dimensionless {
    type Output = Dimensionless;

    fn div(self, rhs: Dimensionless) -> Self::Output {
        Dimensionless(self.0 / rhs.0)
    }
}

impl std::iter::Sum for Dimensionless {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        Dimensionless(iter.map(|x| x.0).sum())
    }
}

impl ApproxEq for Dimensionless {
    type Margin = F64Margin;

    fn approx_eq<T: Into<Self::Margin>>(self, other: Self, margin: T) -> bool {
        self.0.approx_eq(other.0, margin)
    }
}

impl Dimensionless {
    /// Creates a new dimensionless value
    pub fn new(val: f64) -> Self {
        Self(val)
    }

    /// Returns the underlying value
    pub fn value(self) -> f64 {
        self.0
    }

    /// Whether the underlying value is finite
    pub fn is_finite(self) -> bool {
        self.0.is_finite()
    }
}

impl From<f64> for Dimensionless {
    fn from(val: f64) -> Self {
        Self(val)
    }
}

impl From<Dimensionless> for f64 {
    fn from(val: Dimensionless) -> Self {
        val.0
    }
}

// Fuel demand and installed capacity are both expressed as annual energy (e.g. GWh)
unit_struct!(Energy);

impl std::ops::Mul<Energy> for Dimensionless {
    type Output = Energy;
    fn mul(self, rhs: Energy) -> Energy {
        Energy(self.0 * rhs.0)
    }
}
