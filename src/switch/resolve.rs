//! Resolution of the switches of an end-use into end-year service share targets.
//!
//! Only one of fuel switches and service switches may be used for an end-use. Capacity switches
//! are first converted into equivalent service switches and take precedence over any other switch.
use super::{CapacitySwitch, EndUseSwitches, FuelSwitch, ServiceSwitch};
use crate::end_use::EndUseID;
use crate::error::DiffusionError;
use crate::fuel::FuelMap;
use crate::service::{EndUseFuel, EndUseServiceShares, SHARE_SUM_TOLERANCE, TechnologyShares};
use crate::technology::{TechnologyCatalog, TechnologyID};
use crate::units::{Dimensionless, Energy};
use anyhow::{Result, bail};
use indexmap::IndexMap;
use log::{debug, warn};

/// Which kind of switch determined the end-year targets of an end-use
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum SwitchKind {
    /// No switches; end-year shares equal base-year shares
    None,
    /// Fuel switches
    Fuel,
    /// Service switches (including those derived from capacity switches)
    Service,
}

/// The resolved end-year targets of an end-use
#[derive(PartialEq, Debug, Clone)]
pub struct EndUseTargets {
    /// The end-use
    pub end_use: EndUseID,
    /// Which kind of switch was applied
    pub kind: SwitchKind,
    /// Base-year service shares
    pub base_year: EndUseServiceShares,
    /// End-year service share targets
    pub end_year: EndUseServiceShares,
    /// Maximum theoretical share of each technology
    pub l_values: TechnologyShares,
    /// The year in which each technology reaches its end-year share
    pub switch_years: IndexMap<TechnologyID, u32>,
}

impl EndUseTargets {
    /// Iterate over the technologies of the end-use (those with a base-year or end-year share)
    pub fn iter_technologies(&self) -> impl Iterator<Item = &TechnologyID> {
        self.end_year.total.keys()
    }
}

/// Resolve the switches of an end-use into end-year targets and L-values.
///
/// # Arguments
///
/// * `end_use` - The end-use being resolved
/// * `base_shares` - Base-year service shares of the end-use
/// * `base_fuel` - Base-year fuel of the end-use, needed to convert capacity switches
/// * `switches` - The switches applying to the end-use
/// * `catalog` - The technology catalog
/// * `default_year` - The year used when no switch says when a technology reaches its target
pub fn resolve_end_use(
    end_use: &EndUseID,
    base_shares: &EndUseServiceShares,
    base_fuel: &EndUseFuel,
    switches: &EndUseSwitches,
    catalog: &TechnologyCatalog,
    default_year: u32,
) -> Result<EndUseTargets> {
    if !switches.fuel.is_empty() && !switches.service.is_empty() {
        bail!(DiffusionError::ConflictingSwitchKind {
            end_use: end_use.to_string()
        });
    }
    check_switches(end_use, switches, catalog)?;

    let capacity_switches = capacity_to_service_switches(end_use, &switches.capacity, base_fuel);
    let (kind, end_year_shares, l_values, switch_years) = if !capacity_switches.is_empty() {
        if !switches.fuel.is_empty() {
            warn!(
                "Capacity switches override the fuel switches defined for end-use {end_use}; \
                the fuel switches will be ignored"
            );
        }

        // Capacity-derived switches replace explicit service switches for the same technology
        let mut service: Vec<&ServiceSwitch> = switches
            .service
            .iter()
            .copied()
            .filter(|s| {
                !capacity_switches
                    .iter()
                    .any(|c| c.technology == s.technology)
            })
            .collect();
        service.extend(capacity_switches.iter());

        resolve_service_switches(end_use, base_shares, &service, catalog, default_year)?
    } else if !switches.service.is_empty() {
        resolve_service_switches(
            end_use,
            base_shares,
            &switches.service,
            catalog,
            default_year,
        )?
    } else if !switches.fuel.is_empty() {
        resolve_fuel_switches(end_use, base_shares, &switches.fuel, catalog, default_year)?
    } else {
        let l_values = base_shares
            .total
            .keys()
            .map(|id| (id.clone(), max_share(catalog, id)))
            .collect();
        let switch_years = base_shares
            .total
            .keys()
            .map(|id| (id.clone(), default_year))
            .collect();
        (
            SwitchKind::None,
            base_shares.total.clone(),
            l_values,
            switch_years,
        )
    };
    debug!("End-use {end_use} resolved using {kind:?} switches");

    check_end_year_shares(end_use, base_shares, &end_year_shares, &l_values)?;

    Ok(EndUseTargets {
        end_use: end_use.clone(),
        kind,
        base_year: base_shares.clone(),
        end_year: EndUseServiceShares::from_total_shares(end_year_shares, catalog)?,
        l_values,
        switch_years,
    })
}

type Resolved = (
    SwitchKind,
    TechnologyShares,
    TechnologyShares,
    IndexMap<TechnologyID, u32>,
);

fn max_share(catalog: &TechnologyCatalog, id: &TechnologyID) -> Dimensionless {
    catalog
        .get(id)
        .map_or(Dimensionless(1.0), |technology| technology.max_share)
}

/// Check that switches refer to known technologies and hold sensible values
fn check_switches(
    end_use: &EndUseID,
    switches: &EndUseSwitches,
    catalog: &TechnologyCatalog,
) -> Result<()> {
    let invalid = |technology: &TechnologyID, message: String| DiffusionError::InvalidSwitch {
        end_use: end_use.to_string(),
        technology: technology.to_string(),
        message,
    };

    let technologies = switches
        .fuel
        .iter()
        .map(|s| (&s.technology_install, s.switch_year))
        .chain(switches.service.iter().map(|s| (&s.technology, s.switch_year)))
        .chain(
            switches
                .capacity
                .iter()
                .map(|s| (&s.technology_install, s.switch_year)),
        );
    for (id, switch_year) in technologies {
        let Some(technology) = catalog.get(id) else {
            bail!(DiffusionError::UnknownTechnology {
                end_use: end_use.to_string(),
                technology: id.to_string(),
            });
        };

        if !technology.is_on_market(switch_year) {
            bail!(invalid(
                id,
                format!(
                    "switch year {switch_year} is before the market entry year {}",
                    technology.market_entry
                )
            ));
        }
    }

    for switch in &switches.fuel {
        if !(0.0..=1.0).contains(&switch.fraction.value()) {
            bail!(invalid(
                &switch.technology_install,
                format!("fraction {} is not between 0 and 1", switch.fraction)
            ));
        }
    }

    let mut seen = Vec::with_capacity(switches.service.len());
    for switch in &switches.service {
        if !(0.0..=1.0).contains(&switch.service_share.value()) {
            bail!(invalid(
                &switch.technology,
                format!("service share {} is not between 0 and 1", switch.service_share)
            ));
        }
        if let Some(max_share) = switch.max_share
            && !(max_share > Dimensionless(0.0) && max_share <= Dimensionless(1.0))
        {
            bail!(invalid(
                &switch.technology,
                format!("maximum share {max_share} must be greater than 0 and at most 1")
            ));
        }
        if seen.contains(&&switch.technology) {
            bail!(invalid(
                &switch.technology,
                "more than one service switch for this technology".to_string()
            ));
        }
        seen.push(&switch.technology);
    }

    for switch in &switches.capacity {
        if !(switch.installed_capacity.is_finite() && switch.installed_capacity > Energy(0.0)) {
            bail!(invalid(
                &switch.technology_install,
                format!(
                    "installed capacity {} must be a positive number",
                    switch.installed_capacity
                )
            ));
        }
    }

    Ok(())
}

/// Convert capacity switches into equivalent service switches.
///
/// The equivalent share of a capacity switch is `capacity / (capacity + base-year fuel)`, where
/// the base-year fuel is the total fuel of the end-use over every fuel type. If several capacity
/// switches install the same technology, the largest equivalent share wins.
fn capacity_to_service_switches(
    end_use: &EndUseID,
    capacity_switches: &[&CapacitySwitch],
    base_fuel: &EndUseFuel,
) -> Vec<ServiceSwitch> {
    let total_fuel = base_fuel.total_fuel();
    let mut service_switches: Vec<ServiceSwitch> = Vec::new();
    for switch in capacity_switches {
        let share = switch.installed_capacity / (switch.installed_capacity + total_fuel);
        debug!(
            "Capacity switch for {} in end-use {end_use} is equivalent to a service share of {share}",
            switch.technology_install
        );

        match service_switches
            .iter_mut()
            .find(|s| s.technology == switch.technology_install)
        {
            Some(existing) if existing.service_share >= share => {}
            Some(existing) => {
                existing.service_share = share;
                existing.switch_year = switch.switch_year;
            }
            None => service_switches.push(ServiceSwitch {
                end_use: end_use.clone(),
                sector: None,
                technology: switch.technology_install.clone(),
                service_share: share,
                switch_year: switch.switch_year,
                max_share: None,
            }),
        }
    }

    service_switches
}

/// Resolve service switches.
///
/// Technologies named in a switch get the switch's share. The remaining service is split between
/// the other technologies in proportion to their base-year shares.
fn resolve_service_switches(
    end_use: &EndUseID,
    base_shares: &EndUseServiceShares,
    switches: &[&ServiceSwitch],
    catalog: &TechnologyCatalog,
    default_year: u32,
) -> Result<Resolved> {
    let named: TechnologyShares = switches
        .iter()
        .map(|s| (s.technology.clone(), s.service_share))
        .collect();
    let named_total: Dimensionless = named.values().copied().sum();
    if named_total.value() > 1.0 + SHARE_SUM_TOLERANCE {
        bail!(DiffusionError::OverAllocatedServiceShare {
            end_use: end_use.to_string(),
            total: named_total.value(),
        });
    }

    // Autocomplete: spread the remaining service over technologies not named in a switch
    let remainder = Dimensionless(1.0) - named_total;
    let unnamed_base_total: Dimensionless = base_shares
        .total
        .iter()
        .filter(|(id, _)| !named.contains_key(*id))
        .map(|(_, share)| *share)
        .sum();
    let mut end_year_shares = TechnologyShares::new();
    for (id, share) in &base_shares.total {
        let share = if let Some(target) = named.get(id) {
            *target
        } else if unnamed_base_total > Dimensionless(0.0) {
            remainder * (*share / unnamed_base_total)
        } else {
            Dimensionless(0.0)
        };
        end_year_shares.insert(id.clone(), share);
    }
    for (id, target) in &named {
        end_year_shares.entry(id.clone()).or_insert(*target);
    }

    let latest_year = switches
        .iter()
        .map(|s| s.switch_year)
        .max()
        .unwrap_or(default_year);
    let mut l_values = TechnologyShares::new();
    let mut switch_years = IndexMap::new();
    for id in end_year_shares.keys() {
        let switch = switches.iter().find(|s| s.technology == *id);
        let l_value = switch
            .and_then(|s| s.max_share)
            .unwrap_or_else(|| max_share(catalog, id));
        l_values.insert(id.clone(), l_value);
        switch_years.insert(id.clone(), switch.map_or(latest_year, |s| s.switch_year));
    }

    Ok((SwitchKind::Service, end_year_shares, l_values, switch_years))
}

/// Resolve fuel switches.
///
/// Each switch moves `fraction` of the service of its fuel type away from the technologies
/// currently using that fuel type (in proportion to their shares within it) to the installed
/// technology.
fn resolve_fuel_switches(
    end_use: &EndUseID,
    base_shares: &EndUseServiceShares,
    switches: &[&FuelSwitch],
    catalog: &TechnologyCatalog,
    default_year: u32,
) -> Result<Resolved> {
    let mut switched: FuelMap<Dimensionless> = FuelMap::default();
    for switch in switches {
        switched[switch.fuel_type] += switch.fraction;
    }
    for (fuel_type, total) in switched.iter() {
        if total.value() > 1.0 + SHARE_SUM_TOLERANCE {
            bail!(DiffusionError::OverAllocatedFuelSwitch {
                end_use: end_use.to_string(),
                fuel_type,
                total: total.value(),
            });
        }
    }

    let mut end_year_shares = base_shares.total.clone();
    for switch in switches {
        let fuel_type_share = base_shares.fuel_type_shares[switch.fuel_type];
        if fuel_type_share == Dimensionless(0.0) {
            warn!(
                "Fuel switch to {} in end-use {end_use} displaces fuel type {}, which delivers \
                no service in the base year",
                switch.technology_install, switch.fuel_type
            );
        }

        let shifted = fuel_type_share * switch.fraction;
        for (id, within) in &base_shares.within_fuel_type[switch.fuel_type] {
            *end_year_shares
                .entry(id.clone())
                .or_insert(Dimensionless(0.0)) -= shifted * *within;
        }
        *end_year_shares
            .entry(switch.technology_install.clone())
            .or_insert(Dimensionless(0.0)) += shifted;
    }

    // Rounding can leave tiny negative values for fully displaced technologies
    for share in end_year_shares.values_mut() {
        if share.value() < 0.0 && share.value() > -SHARE_SUM_TOLERANCE {
            *share = Dimensionless(0.0);
        }
    }

    let latest_year = switches
        .iter()
        .map(|s| s.switch_year)
        .max()
        .unwrap_or(default_year);
    let mut l_values = TechnologyShares::new();
    let mut switch_years = IndexMap::new();
    for id in end_year_shares.keys() {
        let installing: Vec<_> = switches
            .iter()
            .filter(|s| s.technology_install == *id)
            .collect();

        let l_value = if installing.is_empty() {
            max_share(catalog, id)
        } else {
            // The share the technology would reach if every switched fuel type were displaced
            // completely
            let mut fuel_types: Vec<_> = installing.iter().map(|s| s.fuel_type).collect();
            fuel_types.sort();
            fuel_types.dedup();
            let saturated = base_shares.share(id)
                + fuel_types
                    .into_iter()
                    .map(|fuel_type| base_shares.fuel_type_shares[fuel_type])
                    .sum::<Dimensionless>();
            if saturated < max_share(catalog, id) {
                saturated
            } else {
                max_share(catalog, id)
            }
        };
        l_values.insert(id.clone(), l_value);

        let year = installing
            .iter()
            .map(|s| s.switch_year)
            .max()
            .unwrap_or(latest_year);
        switch_years.insert(id.clone(), year);
    }

    Ok((SwitchKind::Fuel, end_year_shares, l_values, switch_years))
}

/// Check that the end-year shares are consistent
fn check_end_year_shares(
    end_use: &EndUseID,
    base_shares: &EndUseServiceShares,
    end_year_shares: &TechnologyShares,
    l_values: &TechnologyShares,
) -> Result<()> {
    let total: Dimensionless = end_year_shares.values().copied().sum();
    let base_total: Dimensionless = base_shares.total.values().copied().sum();
    let has_service = base_total > Dimensionless(0.0);
    let negative = end_year_shares.values().any(|share| share.value() < 0.0);
    if negative || (has_service && (total.value() - 1.0).abs() > SHARE_SUM_TOLERANCE) {
        bail!(DiffusionError::OverAllocatedServiceShare {
            end_use: end_use.to_string(),
            total: total.value(),
        });
    }

    for (id, target) in end_year_shares {
        let l_value = l_values[id];
        if target.value() > l_value.value() + SHARE_SUM_TOLERANCE {
            bail!(DiffusionError::TargetExceedsMaximumShare {
                end_use: end_use.to_string(),
                technology: id.to_string(),
                target: target.value(),
                l_value: l_value.value(),
            });
        }
    }

    Ok(())
}
