//! Code for reading region-related information from CSV files.
use super::*;
use crate::end_use::EndUseID;
use crate::id::IDCollection;
use crate::region::{RegionID, RegionMap, RegionalDemandMap};
use crate::service::BaseFuelMap;
use serde::Deserialize;

const REGIONS_FILE_NAME: &str = "regions.csv";
const REGION_DEMAND_FILE_NAME: &str = "region_demand.csv";

/// Reads regions from a CSV file.
///
/// # Arguments
///
/// * `model_dir` - Folder containing model configuration files
///
/// # Returns
///
/// A `RegionMap` with the parsed regions data or an error
pub fn read_regions(model_dir: &Path) -> Result<RegionMap> {
    let file_path = model_dir.join(REGIONS_FILE_NAME);
    let regions = read_csv_id_file(&file_path)?;
    check_covariates(&regions).with_context(|| input_err_msg(&file_path))?;

    Ok(regions)
}

fn check_covariates(regions: &RegionMap) -> Result<()> {
    for region in regions.values() {
        ensure!(
            region.covariate.is_finite() && region.covariate >= 0.0,
            "Covariate for region {} must be a finite, non-negative number",
            region.id
        );
    }

    Ok(())
}

#[derive(PartialEq, Debug, Deserialize)]
struct RegionDemandRaw {
    region_id: String,
    end_use: String,
    #[serde(deserialize_with = "deserialise_proportion")]
    demand_share: Dimensionless,
}

/// Read each region's share of the demand for every end-use.
///
/// Every region must have a share for every end-use and the shares for each end-use must sum to
/// one.
///
/// # Arguments
///
/// * `model_dir` - Folder containing model configuration files
/// * `regions` - All regions
/// * `base_fuel` - Base-year fuel, which defines the end-uses
pub fn read_regional_demand(
    model_dir: &Path,
    regions: &RegionMap,
    base_fuel: &BaseFuelMap,
) -> Result<RegionalDemandMap> {
    let file_path = model_dir.join(REGION_DEMAND_FILE_NAME);
    let demand_csv = read_csv(&file_path)?;
    read_regional_demand_from_iter(demand_csv, regions, base_fuel)
        .with_context(|| input_err_msg(&file_path))
}

fn read_regional_demand_from_iter<I>(
    iter: I,
    regions: &RegionMap,
    base_fuel: &BaseFuelMap,
) -> Result<RegionalDemandMap>
where
    I: Iterator<Item = RegionDemandRaw>,
{
    let mut map = RegionalDemandMap::new();
    for demand in iter {
        let region_id: RegionID = regions.get_id_by_str(&demand.region_id)?;
        let end_use: EndUseID = base_fuel.get_id_by_str(&demand.end_use)?;
        let shares = map.entry(end_use.clone()).or_default();
        ensure!(
            shares.insert(region_id.clone(), demand.demand_share).is_none(),
            "Duplicate demand share for region {region_id} and end-use {end_use}"
        );
    }

    for end_use in base_fuel.keys() {
        let shares = map
            .get(end_use)
            .with_context(|| format!("No regional demand given for end-use {end_use}"))?;
        let missing = regions.keys().filter(|id| !shares.contains_key(*id)).join(", ");
        ensure!(
            missing.is_empty(),
            "No demand share given for end-use {end_use} in regions: {missing}"
        );
        check_fractions_sum_to_one(shares.values().copied())
            .with_context(|| format!("Invalid regional demand shares for end-use {end_use}"))?;
    }

    Ok(map)
}
