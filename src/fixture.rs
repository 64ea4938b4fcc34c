//! Fixtures for tests
use crate::efficiency::HeatPumpCurve;
use crate::fuel::FuelType;
use crate::model::{Model, ModelParameters, SigmoidConfig};
use crate::region::{RegionMap, RegionalDemandMap};
use crate::service::{EndUseFuel, EndUseServiceShares};
use crate::switch::{CapacitySwitch, FuelSwitch, ServiceSwitch, SwitchSet};
use crate::technology::{
    DiffusionMethod, HybridSplit, Technology, TechnologyCatalog, TechnologyCategory,
};
use crate::units::{Dimensionless, Energy};
use indexmap::indexmap;
use rstest::fixture;

/// Assert that an error with the given message occurs
macro_rules! assert_error {
    ($result:expr, $msg:expr) => {
        assert_eq!(
            $result.unwrap_err().chain().next().unwrap().to_string(),
            $msg
        );
    };
}
pub(crate) use assert_error;

/// A regular technology with a constant efficiency of 0.9
pub fn technology(id: &str, fuel_type: FuelType) -> Technology {
    Technology {
        id: id.into(),
        fuel_type,
        category: TechnologyCategory::Regular,
        eff_by: Dimensionless(0.9),
        eff_ey: Dimensionless(0.9),
        eff_ey_year: 2050,
        eff_achieved: Dimensionless(1.0),
        diff_method: DiffusionMethod::Linear,
        market_entry: 2000,
        max_share: Dimensionless(1.0),
        hybrid: None,
    }
}

#[fixture]
pub fn catalog() -> TechnologyCatalog {
    let technologies = [
        Technology {
            diff_method: DiffusionMethod::Sigmoid,
            ..technology("boiler_gas", FuelType::Gas)
        },
        technology("boiler_hybrid", FuelType::Gas),
        Technology {
            category: TechnologyCategory::HeatPump,
            eff_by: Dimensionless(3.0),
            eff_ey: Dimensionless(3.5),
            diff_method: DiffusionMethod::Sigmoid,
            ..technology("heat_pump_ASHP", FuelType::Electricity)
        },
        Technology {
            eff_by: Dimensionless(0.8),
            eff_ey: Dimensionless(0.8),
            ..technology("boiler_oil", FuelType::Oil)
        },
        Technology {
            category: TechnologyCategory::StorageHeating,
            eff_by: Dimensionless(1.0),
            eff_ey: Dimensionless(1.0),
            ..technology("storage_heater", FuelType::Electricity)
        },
        Technology {
            category: TechnologyCategory::Hybrid,
            hybrid: Some(HybridSplit {
                low: "heat_pump_ASHP".into(),
                high: "boiler_gas".into(),
                share_low: Dimensionless(0.5),
            }),
            ..technology("hybrid_gas_ASHP", FuelType::Gas)
        },
    ];

    TechnologyCatalog::new(
        technologies
            .into_iter()
            .map(|technology| (technology.id.clone(), technology))
            .collect(),
    )
    .unwrap()
}

/// Base-year service shares with gas split 70/30 between `boiler_gas` and `boiler_hybrid`
#[fixture]
pub fn base_shares(catalog: TechnologyCatalog) -> EndUseServiceShares {
    let total = indexmap! {
        "boiler_gas".into() => Dimensionless(0.7),
        "boiler_hybrid".into() => Dimensionless(0.3),
    };
    EndUseServiceShares::from_total_shares(total, &catalog).unwrap()
}

/// Gas-only base-year fuel, split between `boiler_gas` and `boiler_hybrid`
pub fn gas_end_use_fuel(fuel: f64, frac_boiler_gas: f64, frac_boiler_hybrid: f64) -> EndUseFuel {
    let mut end_use_fuel = EndUseFuel::default();
    end_use_fuel.fuel[FuelType::Gas] = Energy(fuel);
    end_use_fuel.technology_fractions[FuelType::Gas] = indexmap! {
        "boiler_gas".into() => Dimensionless(frac_boiler_gas),
        "boiler_hybrid".into() => Dimensionless(frac_boiler_hybrid),
    };
    end_use_fuel
}

pub fn fuel_switch(fuel_type: FuelType, technology: &str, fraction: f64) -> FuelSwitch {
    FuelSwitch {
        end_use: "space_heating".into(),
        fuel_type,
        technology_install: technology.into(),
        switch_year: 2050,
        fraction: Dimensionless(fraction),
    }
}

pub fn service_switch(technology: &str, service_share: f64) -> ServiceSwitch {
    ServiceSwitch {
        end_use: "space_heating".into(),
        sector: None,
        technology: technology.into(),
        service_share: Dimensionless(service_share),
        switch_year: 2050,
        max_share: None,
    }
}

pub fn capacity_switch(technology: &str, installed_capacity: f64) -> CapacitySwitch {
    CapacitySwitch {
        end_use: "space_heating".into(),
        technology_install: technology.into(),
        switch_year: 2050,
        installed_capacity: Energy(installed_capacity),
    }
}

/// A model with one end-use, where `boiler_gas` delivers 60% of the service and `storage_heater`
/// the rest
#[fixture]
pub fn model(catalog: TechnologyCatalog) -> Model {
    let mut fuel = EndUseFuel::default();
    fuel.fuel[FuelType::Gas] = Energy(60.0);
    fuel.technology_fractions[FuelType::Gas] =
        indexmap! {"boiler_gas".into() => Dimensionless(1.0)};
    fuel.fuel[FuelType::Electricity] = Energy(36.0);
    fuel.technology_fractions[FuelType::Electricity] =
        indexmap! {"storage_heater".into() => Dimensionless(1.0)};

    Model {
        parameters: ModelParameters {
            base_year: 2015,
            end_year: 2050,
            efficiency_achieved: None,
            sigmoid: SigmoidConfig::default(),
            spatial: None,
            heat_pump: HeatPumpCurve::default(),
        },
        catalog,
        base_fuel: indexmap! {"space_heating".into() => fuel},
        switches: SwitchSet::default(),
        regions: RegionMap::new(),
        regional_demand: RegionalDemandMap::new(),
    }
}
