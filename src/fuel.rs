//! Fuel types and a fixed-size map keyed by fuel type.
use serde_string_enum::{DeserializeLabeledStringEnum, SerializeLabeledStringEnum};
use strum::{EnumCount, IntoEnumIterator};

/// The type of fuel consumed by a technology
#[derive(
    PartialEq,
    Eq,
    Hash,
    Clone,
    Copy,
    Debug,
    PartialOrd,
    Ord,
    DeserializeLabeledStringEnum,
    SerializeLabeledStringEnum,
    strum::EnumIter,
    strum::EnumCount,
)]
pub enum FuelType {
    #[string = "solid_fuel"]
    /// Coal and other solid fossil fuels
    SolidFuel,
    #[string = "gas"]
    /// Natural gas
    Gas,
    #[string = "electricity"]
    /// Grid electricity
    Electricity,
    #[string = "oil"]
    /// Heating oil and other liquid fuels
    Oil,
    #[string = "biomass"]
    /// Wood, pellets and other biomass
    Biomass,
    #[string = "hydrogen"]
    /// Hydrogen
    Hydrogen,
    #[string = "heat"]
    /// Heat delivered by a district heating network
    Heat,
}

impl FuelType {
    fn index(self) -> usize {
        self as usize
    }
}

/// A map with exactly one value for every [`FuelType`].
///
/// Lookups cannot fail, as every fuel type always has an entry.
#[derive(PartialEq, Debug, Clone)]
pub struct FuelMap<T>([T; FuelType::COUNT]);

impl<T: Default> Default for FuelMap<T> {
    fn default() -> Self {
        Self(std::array::from_fn(|_| T::default()))
    }
}

impl<T> FuelMap<T> {
    /// Create a map by calling `f` for every fuel type
    pub fn from_fn<F: FnMut(FuelType) -> T>(mut f: F) -> Self {
        let fuel_types: Vec<FuelType> = FuelType::iter().collect();
        Self(std::array::from_fn(|i| f(fuel_types[i])))
    }

    /// Get the value for a fuel type
    pub fn get(&self, fuel_type: FuelType) -> &T {
        &self.0[fuel_type.index()]
    }

    /// Get a mutable reference to the value for a fuel type
    pub fn get_mut(&mut self, fuel_type: FuelType) -> &mut T {
        &mut self.0[fuel_type.index()]
    }

    /// Iterate over fuel types and their values
    pub fn iter(&self) -> impl Iterator<Item = (FuelType, &T)> {
        FuelType::iter().zip(self.0.iter())
    }

    /// Iterate mutably over fuel types and their values
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (FuelType, &mut T)> {
        FuelType::iter().zip(self.0.iter_mut())
    }
}

impl<T> std::ops::Index<FuelType> for FuelMap<T> {
    type Output = T;

    fn index(&self, fuel_type: FuelType) -> &T {
        self.get(fuel_type)
    }
}

impl<T> std::ops::IndexMut<FuelType> for FuelMap<T> {
    fn index_mut(&mut self, fuel_type: FuelType) -> &mut T {
        self.get_mut(fuel_type)
    }
}
