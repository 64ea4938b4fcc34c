//! Code for converting base-year fuel consumption into shares of energy service.
//!
//! The service delivered by a technology is the fuel it consumes multiplied by its efficiency.
//! Shares are expressed both within a fuel type and of the end-use as a whole.
use crate::efficiency::EfficiencyModel;
use crate::end_use::EndUseID;
use crate::error::DiffusionError;
use crate::fuel::{FuelMap, FuelType};
use crate::technology::{TechnologyCatalog, TechnologyID};
use crate::units::{Dimensionless, Energy};
use anyhow::{Context, Result};
use indexmap::{Equivalent, IndexMap};
use itertools::Itertools;
use std::hash::Hash;

/// Tolerance used when checking that shares sum to one
pub const SHARE_SUM_TOLERANCE: f64 = 1e-6;

/// Shares of individual technologies, keyed by technology ID
pub type TechnologyShares = IndexMap<TechnologyID, Dimensionless>;

/// Base-year fuel for one end-use, broken down by fuel type and technology
#[derive(PartialEq, Debug, Clone, Default)]
pub struct EndUseFuel {
    /// Total fuel consumed for each fuel type
    pub fuel: FuelMap<Energy>,
    /// The fraction of each fuel type's fuel consumed by each technology
    pub technology_fractions: FuelMap<TechnologyShares>,
}

impl EndUseFuel {
    /// Total fuel consumed by the end-use across all fuel types
    pub fn total_fuel(&self) -> Energy {
        self.fuel.iter().map(|(_, fuel)| *fuel).sum()
    }
}

/// Base-year fuel for every end-use
pub type BaseFuelMap = IndexMap<EndUseID, EndUseFuel>;

/// Service shares of the technologies of one end-use
#[derive(PartialEq, Debug, Clone, Default)]
pub struct EndUseServiceShares {
    /// Share of each technology within the service of its fuel type.
    ///
    /// Sums to one for every fuel type carrying service, otherwise every share is zero.
    pub within_fuel_type: FuelMap<TechnologyShares>,
    /// Share of each fuel type of the total end-use service
    pub fuel_type_shares: FuelMap<Dimensionless>,
    /// Share of each technology of the total end-use service
    pub total: TechnologyShares,
}

impl EndUseServiceShares {
    /// Get the share of a technology in the total end-use service (zero if absent)
    pub fn share<Q>(&self, technology: &Q) -> Dimensionless
    where
        Q: ?Sized + Hash + Equivalent<TechnologyID>,
    {
        self.total
            .get(technology)
            .copied()
            .unwrap_or(Dimensionless(0.0))
    }

    /// Build shares from a set of total end-use shares, grouping technologies by their fuel type
    pub fn from_total_shares(total: TechnologyShares, catalog: &TechnologyCatalog) -> Result<Self> {
        let mut within_fuel_type: FuelMap<TechnologyShares> = FuelMap::default();
        let mut fuel_type_shares: FuelMap<Dimensionless> = FuelMap::default();
        for (id, share) in &total {
            let technology = catalog
                .get(id)
                .with_context(|| format!("Unknown technology {id}"))?;
            within_fuel_type[technology.fuel_type].insert(id.clone(), *share);
            fuel_type_shares[technology.fuel_type] += *share;
        }

        for (fuel_type, shares) in within_fuel_type.iter_mut() {
            let fuel_type_total = fuel_type_shares[fuel_type];
            for share in shares.values_mut() {
                *share = if fuel_type_total > Dimensionless(0.0) {
                    *share / fuel_type_total
                } else {
                    Dimensionless(0.0)
                };
            }
        }

        Ok(Self {
            within_fuel_type,
            fuel_type_shares,
            total,
        })
    }
}

/// Service shares for every end-use
pub type ServiceShareSnapshot = IndexMap<EndUseID, EndUseServiceShares>;

/// Calculate base-year service shares for every end-use
pub fn compute_service_shares(
    base_fuel: &BaseFuelMap,
    catalog: &TechnologyCatalog,
    efficiency: &EfficiencyModel,
) -> Result<ServiceShareSnapshot> {
    base_fuel
        .iter()
        .map(|(end_use, fuel)| {
            let shares = compute_end_use_service_shares(end_use, fuel, catalog, efficiency)
                .with_context(|| {
                    format!("Could not calculate service shares for end-use {end_use}")
                })?;
            Ok((end_use.clone(), shares))
        })
        .process_results(|iter| iter.collect())
}

/// Calculate base-year service shares for a single end-use
pub fn compute_end_use_service_shares(
    end_use: &EndUseID,
    fuel: &EndUseFuel,
    catalog: &TechnologyCatalog,
    efficiency: &EfficiencyModel,
) -> Result<EndUseServiceShares> {
    // Service delivered by each technology, grouped by fuel type
    let mut service: FuelMap<IndexMap<TechnologyID, Energy>> = FuelMap::default();
    for (fuel_type, fractions) in fuel.technology_fractions.iter() {
        for (id, fraction) in fractions {
            let technology = catalog
                .get(id)
                .with_context(|| format!("Unknown technology {id}"))?;
            let tech_efficiency = efficiency.base_year_efficiency(technology)?;
            let tech_service = *fraction * fuel.fuel[fuel_type] * tech_efficiency;
            service[fuel_type].insert(id.clone(), tech_service);
        }
    }

    let service_by_fuel_type =
        FuelMap::from_fn(|fuel_type| service[fuel_type].values().copied().sum::<Energy>());
    let total_service: Energy = service_by_fuel_type.iter().map(|(_, s)| *s).sum();

    let mut shares = EndUseServiceShares::default();
    for (fuel_type, tech_service) in service.iter() {
        let fuel_type_service = service_by_fuel_type[fuel_type];
        for (id, value) in tech_service {
            // A fuel type with no service is not an error; it is simply unused by this end-use
            let within = if fuel_type_service > Energy(0.0) {
                *value / fuel_type_service
            } else {
                Dimensionless(0.0)
            };
            shares.within_fuel_type[fuel_type].insert(id.clone(), within);

            if total_service > Energy(0.0) {
                *shares
                    .total
                    .entry(id.clone())
                    .or_insert(Dimensionless(0.0)) += *value / total_service;
            } else {
                shares.total.entry(id.clone()).or_insert(Dimensionless(0.0));
            }
        }

        if total_service > Energy(0.0) {
            shares.fuel_type_shares[fuel_type] = fuel_type_service / total_service;
        }
    }

    check_service_shares(end_use, &shares, &service_by_fuel_type, total_service)?;

    Ok(shares)
}

/// Check that shares sum to one wherever there is service
fn check_service_shares(
    end_use: &EndUseID,
    shares: &EndUseServiceShares,
    service_by_fuel_type: &FuelMap<Energy>,
    total_service: Energy,
) -> Result<(), DiffusionError> {
    let check_sum = |total: Dimensionless, scope: String| {
        if (total.value() - 1.0).abs() > SHARE_SUM_TOLERANCE || !total.is_finite() {
            return Err(DiffusionError::ServiceShareImbalance {
                end_use: end_use.to_string(),
                scope,
                total: total.value(),
            });
        }
        Ok(())
    };

    for (fuel_type, within) in shares.within_fuel_type.iter() {
        if service_by_fuel_type[fuel_type] > Energy(0.0) {
            check_sum(within.values().copied().sum(), fuel_type_scope(fuel_type))?;
        }
    }

    if total_service > Energy(0.0) {
        check_sum(
            shares.total.values().copied().sum(),
            "all fuel types".to_string(),
        )?;
    }

    Ok(())
}

fn fuel_type_scope(fuel_type: FuelType) -> String {
    format!("fuel type {fuel_type}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::efficiency::HeatPumpCurve;
    use crate::fixture::{catalog, gas_end_use_fuel};
    use float_cmp::assert_approx_eq;
    use indexmap::indexmap;
    use rstest::rstest;

    #[rstest]
    fn test_service_shares_single_fuel_type(catalog: TechnologyCatalog) {
        let efficiency = EfficiencyModel::new(&catalog, 2015, HeatPumpCurve::default());
        let fuel = gas_end_use_fuel(100.0, 0.7, 0.3);
        let shares =
            compute_end_use_service_shares(&"space_heating".into(), &fuel, &catalog, &efficiency)
                .unwrap();

        // Service: boiler_gas = 70 * 0.9 = 63, boiler_hybrid = 30 * 0.9 = 27
        let gas = &shares.within_fuel_type[FuelType::Gas];
        assert_approx_eq!(Dimensionless, gas["boiler_gas"], Dimensionless(0.7));
        assert_approx_eq!(Dimensionless, gas["boiler_hybrid"], Dimensionless(0.3));
        assert_approx_eq!(
            Dimensionless,
            shares.fuel_type_shares[FuelType::Gas],
            Dimensionless(1.0)
        );
        assert_approx_eq!(Dimensionless, shares.share("boiler_gas"), Dimensionless(0.7));
        assert_eq!(shares.share("heat_pump_ASHP"), Dimensionless(0.0));
    }

    #[rstest]
    fn test_service_shares_efficiency_weighting(catalog: TechnologyCatalog) {
        let efficiency = EfficiencyModel::new(&catalog, 2015, HeatPumpCurve::default());
        let mut fuel = gas_end_use_fuel(90.0, 1.0, 0.0);
        fuel.fuel[FuelType::Electricity] = Energy(10.0);
        fuel.technology_fractions[FuelType::Electricity] =
            indexmap! {"heat_pump_ASHP".into() => Dimensionless(1.0)};

        let shares =
            compute_end_use_service_shares(&"space_heating".into(), &fuel, &catalog, &efficiency)
                .unwrap();

        // Service: boiler_gas = 90 * 0.9 = 81, heat pump = 10 * 3.0 = 30
        let total = 81.0 + 30.0;
        assert_approx_eq!(
            f64,
            shares.share("boiler_gas").value(),
            81.0 / total,
            epsilon = 1e-10
        );
        assert_approx_eq!(
            f64,
            shares.share("heat_pump_ASHP").value(),
            30.0 / total,
            epsilon = 1e-10
        );
        assert_approx_eq!(
            f64,
            shares.within_fuel_type[FuelType::Electricity]["heat_pump_ASHP"].value(),
            1.0,
            epsilon = 1e-10
        );
    }

    /// Shares within each fuel type carrying service sum to one
    #[rstest]
    fn test_service_shares_conservation(catalog: TechnologyCatalog) {
        let efficiency = EfficiencyModel::new(&catalog, 2015, HeatPumpCurve::default());
        let mut fuel = gas_end_use_fuel(55.0, 0.45, 0.55);
        fuel.fuel[FuelType::Electricity] = Energy(17.0);
        fuel.technology_fractions[FuelType::Electricity] = indexmap! {
            "heat_pump_ASHP".into() => Dimensionless(0.6),
            "storage_heater".into() => Dimensionless(0.4),
        };
        fuel.fuel[FuelType::Oil] = Energy(3.0);
        fuel.technology_fractions[FuelType::Oil] =
            indexmap! {"boiler_oil".into() => Dimensionless(1.0)};

        let shares =
            compute_end_use_service_shares(&"space_heating".into(), &fuel, &catalog, &efficiency)
                .unwrap();

        for (fuel_type, within) in shares.within_fuel_type.iter() {
            if fuel.fuel[fuel_type] > Energy(0.0) {
                let sum: Dimensionless = within.values().copied().sum();
                assert_approx_eq!(f64, sum.value(), 1.0, epsilon = 1e-6);
            }
        }
        let sum: Dimensionless = shares.total.values().copied().sum();
        assert_approx_eq!(f64, sum.value(), 1.0, epsilon = 1e-6);
    }

    #[rstest]
    fn test_service_shares_unused_fuel_type(catalog: TechnologyCatalog) {
        let efficiency = EfficiencyModel::new(&catalog, 2015, HeatPumpCurve::default());
        let mut fuel = gas_end_use_fuel(100.0, 0.5, 0.5);
        fuel.technology_fractions[FuelType::Oil] =
            indexmap! {"boiler_oil".into() => Dimensionless(1.0)};

        let shares =
            compute_end_use_service_shares(&"space_heating".into(), &fuel, &catalog, &efficiency)
                .unwrap();
        assert_eq!(
            shares.within_fuel_type[FuelType::Oil]["boiler_oil"],
            Dimensionless(0.0)
        );
        assert_eq!(shares.share("boiler_oil"), Dimensionless(0.0));
    }

    #[rstest]
    fn test_service_shares_no_service(catalog: TechnologyCatalog) {
        let efficiency = EfficiencyModel::new(&catalog, 2015, HeatPumpCurve::default());
        let fuel = gas_end_use_fuel(0.0, 0.5, 0.5);
        let shares =
            compute_end_use_service_shares(&"space_heating".into(), &fuel, &catalog, &efficiency)
                .unwrap();
        assert!(shares.total.values().all(|share| *share == Dimensionless(0.0)));
    }

    #[rstest]
    fn test_service_shares_unknown_technology(catalog: TechnologyCatalog) {
        let efficiency = EfficiencyModel::new(&catalog, 2015, HeatPumpCurve::default());
        let mut fuel = gas_end_use_fuel(10.0, 1.0, 0.0);
        fuel.technology_fractions[FuelType::Gas].insert("unknown".into(), Dimensionless(0.1));
        assert!(
            compute_end_use_service_shares(&"space_heating".into(), &fuel, &catalog, &efficiency)
                .is_err()
        );
    }

    #[test]
    fn test_check_service_shares_imbalance() {
        let mut shares = EndUseServiceShares::default();
        shares.within_fuel_type[FuelType::Gas] = indexmap! {
            "boiler_gas".into() => Dimensionless(0.5),
            "boiler_hybrid".into() => Dimensionless(0.4),
        };
        let mut service = FuelMap::default();
        service[FuelType::Gas] = Energy(1.0);

        let result = check_service_shares(&"space_heating".into(), &shares, &service, Energy(1.0));
        assert!(matches!(
            result,
            Err(DiffusionError::ServiceShareImbalance { .. })
        ));
    }

    #[rstest]
    fn test_from_total_shares(catalog: TechnologyCatalog) {
        let total = indexmap! {
            "boiler_gas".into() => Dimensionless(0.3),
            "boiler_hybrid".into() => Dimensionless(0.1),
            "heat_pump_ASHP".into() => Dimensionless(0.6),
        };
        let shares = EndUseServiceShares::from_total_shares(total, &catalog).unwrap();
        assert_approx_eq!(
            Dimensionless,
            shares.within_fuel_type[FuelType::Gas]["boiler_gas"],
            Dimensionless(0.75)
        );
        assert_approx_eq!(
            Dimensionless,
            shares.fuel_type_shares[FuelType::Electricity],
            Dimensionless(0.6)
        );
    }
}
