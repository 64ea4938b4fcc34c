//! Switches describe how a scenario wants the technology mix of an end-use to change by some year.
//!
//! There are three kinds: fuel switches move a fraction of a fuel type's service to a new
//! technology, service switches set a technology's end-year service share directly and capacity
//! switches install a given amount of a technology.
use crate::end_use::{EndUseID, SectorID};
use crate::fuel::FuelType;
use crate::technology::TechnologyID;
use crate::units::{Dimensionless, Energy};

pub mod resolve;
pub use resolve::{EndUseTargets, SwitchKind, resolve_end_use};

/// Move a fraction of the service of a fuel type to another technology
#[derive(PartialEq, Debug, Clone)]
pub struct FuelSwitch {
    /// The end-use in which the switch happens
    pub end_use: EndUseID,
    /// The fuel type being displaced
    pub fuel_type: FuelType,
    /// The technology installed in place of the displaced fuel type
    pub technology_install: TechnologyID,
    /// The year by which the switch is realised
    pub switch_year: u32,
    /// Fraction of the fuel type's service which is displaced
    pub fraction: Dimensionless,
}

/// Set the service share of a technology directly
#[derive(PartialEq, Debug, Clone)]
pub struct ServiceSwitch {
    /// The end-use in which the switch happens
    pub end_use: EndUseID,
    /// The sector to which the switch applies (all sectors if `None`)
    pub sector: Option<SectorID>,
    /// The technology whose share is set
    pub technology: TechnologyID,
    /// Service share of the technology in `switch_year`
    pub service_share: Dimensionless,
    /// The year by which the switch is realised
    pub switch_year: u32,
    /// Maximum theoretical share of the technology, overriding the catalog value
    pub max_share: Option<Dimensionless>,
}

/// Install a given capacity of a technology
#[derive(PartialEq, Debug, Clone)]
pub struct CapacitySwitch {
    /// The end-use in which the switch happens
    pub end_use: EndUseID,
    /// The technology being installed
    pub technology_install: TechnologyID,
    /// The year by which the capacity is installed
    pub switch_year: u32,
    /// The installed capacity, as annual energy
    pub installed_capacity: Energy,
}

/// Any kind of switch
#[derive(PartialEq, Debug, Clone)]
pub enum Switch {
    /// A fuel switch
    Fuel(FuelSwitch),
    /// A service switch
    Service(ServiceSwitch),
    /// A capacity switch
    Capacity(CapacitySwitch),
}

impl Switch {
    /// The end-use in which the switch happens
    pub fn end_use(&self) -> &EndUseID {
        match self {
            Switch::Fuel(switch) => &switch.end_use,
            Switch::Service(switch) => &switch.end_use,
            Switch::Capacity(switch) => &switch.end_use,
        }
    }
}

/// All the switches of a scenario, separated by kind
#[derive(PartialEq, Debug, Clone, Default)]
pub struct SwitchSet {
    /// Fuel switches
    pub fuel: Vec<FuelSwitch>,
    /// Service switches
    pub service: Vec<ServiceSwitch>,
    /// Capacity switches
    pub capacity: Vec<CapacitySwitch>,
}

impl FromIterator<Switch> for SwitchSet {
    fn from_iter<I: IntoIterator<Item = Switch>>(iter: I) -> Self {
        let mut set = Self::default();
        for switch in iter {
            match switch {
                Switch::Fuel(switch) => set.fuel.push(switch),
                Switch::Service(switch) => set.service.push(switch),
                Switch::Capacity(switch) => set.capacity.push(switch),
            }
        }

        set
    }
}

/// The switches which apply to a single end-use
#[derive(PartialEq, Debug, Default)]
pub struct EndUseSwitches<'a> {
    /// Fuel switches
    pub fuel: Vec<&'a FuelSwitch>,
    /// Service switches
    pub service: Vec<&'a ServiceSwitch>,
    /// Capacity switches
    pub capacity: Vec<&'a CapacitySwitch>,
}

impl SwitchSet {
    /// Get the switches which apply to an end-use.
    ///
    /// If `sector` is given, service switches for other sectors are left out.
    pub fn for_end_use<'a>(
        &'a self,
        end_use: &EndUseID,
        sector: Option<&SectorID>,
    ) -> EndUseSwitches<'a> {
        EndUseSwitches {
            fuel: self.fuel.iter().filter(|s| s.end_use == *end_use).collect(),
            service: self
                .service
                .iter()
                .filter(|s| {
                    s.end_use == *end_use
                        && sector.is_none_or(|sector| {
                            s.sector.as_ref().is_none_or(|own| own == sector)
                        })
                })
                .collect(),
            capacity: self
                .capacity
                .iter()
                .filter(|s| s.end_use == *end_use)
                .collect(),
        }
    }
}

impl EndUseSwitches<'_> {
    /// Whether no switches apply
    pub fn is_empty(&self) -> bool {
        self.fuel.is_empty() && self.service.is_empty() && self.capacity.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{fuel_switch, service_switch};

    #[test]
    fn test_switch_set_from_iter() {
        let switches: SwitchSet = [
            Switch::Fuel(fuel_switch(FuelType::Gas, "heat_pump_ASHP", 0.5)),
            Switch::Service(service_switch("boiler_gas", 0.2)),
        ]
        .into_iter()
        .collect();

        assert_eq!(switches.fuel.len(), 1);
        assert_eq!(switches.service.len(), 1);
        assert!(switches.capacity.is_empty());
    }

    #[test]
    fn test_for_end_use_filters_end_use_and_sector() {
        let mut other_end_use = service_switch("boiler_gas", 0.2);
        other_end_use.end_use = "lighting".into();
        let mut sector_specific = service_switch("boiler_hybrid", 0.1);
        sector_specific.sector = Some("offices".into());

        let switches = SwitchSet {
            service: vec![
                service_switch("heat_pump_ASHP", 0.3),
                other_end_use,
                sector_specific,
            ],
            ..Default::default()
        };

        let end_use = "space_heating".into();
        assert_eq!(switches.for_end_use(&end_use, None).service.len(), 2);
        let offices = "offices".into();
        assert_eq!(
            switches.for_end_use(&end_use, Some(&offices)).service.len(),
            2
        );
        let homes = "homes".into();
        assert_eq!(
            switches.for_end_use(&end_use, Some(&homes)).service.len(),
            1
        );
        assert!(switches.for_end_use(&"cooking".into(), None).is_empty());
    }
}
