//! Code for reading base-year fuel consumption from a CSV file.
use super::*;
use crate::end_use::EndUseID;
use crate::fuel::{FuelMap, FuelType};
use crate::service::{BaseFuelMap, EndUseFuel};
use crate::technology::{TechnologyCatalog, TechnologyID};
use crate::units::Energy;
use serde::Deserialize;

const BASE_FUEL_FILE_NAME: &str = "base_fuel.csv";

/// One row of the base fuel file.
///
/// `fuel` is the total for the whole fuel type, so it is repeated on every row for that fuel type
/// and end-use.
#[derive(PartialEq, Debug, Deserialize)]
struct BaseFuelRaw {
    end_use: EndUseID,
    fuel_type: FuelType,
    technology: TechnologyID,
    fuel: Energy,
    #[serde(deserialize_with = "deserialise_proportion")]
    fraction: Dimensionless,
}

impl BaseFuelRaw {
    fn validate(&self) -> Result<()> {
        ensure!(
            self.fuel.is_finite() && self.fuel >= Energy(0.0),
            "Fuel for end-use {} and fuel type {} must be a finite, non-negative number",
            self.end_use,
            self.fuel_type
        );

        Ok(())
    }
}

/// Read base-year fuel consumption for every end-use.
///
/// # Arguments
///
/// * `model_dir` - Folder containing model configuration files
/// * `catalog` - All technologies
pub fn read_base_fuel(model_dir: &Path, catalog: &TechnologyCatalog) -> Result<BaseFuelMap> {
    let file_path = model_dir.join(BASE_FUEL_FILE_NAME);
    let base_fuel_csv = read_csv(&file_path)?;
    read_base_fuel_from_iter(base_fuel_csv, catalog).with_context(|| input_err_msg(&file_path))
}

fn read_base_fuel_from_iter<I>(iter: I, catalog: &TechnologyCatalog) -> Result<BaseFuelMap>
where
    I: Iterator<Item = BaseFuelRaw>,
{
    // Fuel for each fuel type, recorded when first seen
    let mut seen_fuel: IndexMap<EndUseID, FuelMap<Option<Energy>>> = IndexMap::new();
    let mut map = BaseFuelMap::new();
    for raw in iter {
        raw.validate()?;

        let technology = catalog
            .get(&raw.technology)
            .with_context(|| format!("Unknown technology {}", raw.technology))?;
        ensure!(
            technology.fuel_type == raw.fuel_type,
            "Technology {} consumes {}, not {}",
            raw.technology,
            technology.fuel_type,
            raw.fuel_type
        );

        let seen = &mut seen_fuel.entry(raw.end_use.clone()).or_default()[raw.fuel_type];
        if let Some(fuel) = *seen {
            ensure!(
                approx_eq!(Energy, fuel, raw.fuel),
                "Inconsistent fuel given for end-use {} and fuel type {}",
                raw.end_use,
                raw.fuel_type
            );
        } else {
            *seen = Some(raw.fuel);
        }

        let end_use_fuel = map.entry(raw.end_use.clone()).or_default();
        end_use_fuel.fuel[raw.fuel_type] = raw.fuel;
        ensure!(
            end_use_fuel.technology_fractions[raw.fuel_type]
                .insert(raw.technology.clone(), raw.fraction)
                .is_none(),
            "Duplicate entry for technology {} in end-use {}",
            raw.technology,
            raw.end_use
        );
    }

    for (end_use, end_use_fuel) in &map {
        check_end_use_fuel(end_use_fuel)
            .with_context(|| format!("Invalid base fuel for end-use {end_use}"))?;
    }

    Ok(map)
}

/// Check that the technology fractions of every fuel type sum to one
fn check_end_use_fuel(end_use_fuel: &EndUseFuel) -> Result<()> {
    for (fuel_type, fractions) in end_use_fuel.technology_fractions.iter() {
        if fractions.is_empty() {
            continue;
        }

        check_fractions_sum_to_one(fractions.values().copied())
            .with_context(|| format!("Technology fractions for fuel type {fuel_type}"))?;
    }

    Ok(())
}
