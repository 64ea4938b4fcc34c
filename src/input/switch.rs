//! Code for reading fuel, service and capacity switches from CSV files.
//!
//! All three files are optional: a scenario without switches keeps the base-year technology mix.
use super::*;
use crate::end_use::{EndUseID, SectorID};
use crate::fuel::FuelType;
use crate::id::IDCollection;
use crate::service::BaseFuelMap;
use crate::switch::{CapacitySwitch, FuelSwitch, ServiceSwitch, Switch, SwitchSet};
use crate::technology::TechnologyID;
use crate::units::Energy;
use log::debug;
use serde::Deserialize;

const FUEL_SWITCHES_FILE_NAME: &str = "fuel_switches.csv";
const SERVICE_SWITCHES_FILE_NAME: &str = "service_switches.csv";
const CAPACITY_SWITCHES_FILE_NAME: &str = "capacity_switches.csv";

#[derive(PartialEq, Debug, Deserialize)]
struct FuelSwitchRaw {
    end_use: String,
    fuel_type: FuelType,
    technology_install: TechnologyID,
    switch_year: u32,
    fraction: Dimensionless,
}

#[derive(PartialEq, Debug, Deserialize)]
struct ServiceSwitchRaw {
    end_use: String,
    sector: Option<SectorID>,
    technology: TechnologyID,
    service_share: Dimensionless,
    switch_year: u32,
    max_share: Option<Dimensionless>,
}

#[derive(PartialEq, Debug, Deserialize)]
struct CapacitySwitchRaw {
    end_use: String,
    technology_install: TechnologyID,
    switch_year: u32,
    installed_capacity: Energy,
}

/// Check that a switch is realised after the base year
fn check_switch_year(switch_year: u32, base_year: u32) -> Result<()> {
    ensure!(
        switch_year > base_year,
        "Switch year {switch_year} must be after the base year ({base_year})"
    );

    Ok(())
}

impl FuelSwitchRaw {
    fn into_switch(self, base_fuel: &BaseFuelMap, base_year: u32) -> Result<Switch> {
        let end_use: EndUseID = base_fuel.get_id_by_str(&self.end_use)?;
        check_switch_year(self.switch_year, base_year)?;

        Ok(Switch::Fuel(FuelSwitch {
            end_use,
            fuel_type: self.fuel_type,
            technology_install: self.technology_install,
            switch_year: self.switch_year,
            fraction: self.fraction,
        }))
    }
}

impl ServiceSwitchRaw {
    fn into_switch(self, base_fuel: &BaseFuelMap, base_year: u32) -> Result<Switch> {
        let end_use: EndUseID = base_fuel.get_id_by_str(&self.end_use)?;
        check_switch_year(self.switch_year, base_year)?;

        Ok(Switch::Service(ServiceSwitch {
            end_use,
            sector: self.sector,
            technology: self.technology,
            service_share: self.service_share,
            switch_year: self.switch_year,
            max_share: self.max_share,
        }))
    }
}

impl CapacitySwitchRaw {
    fn into_switch(self, base_fuel: &BaseFuelMap, base_year: u32) -> Result<Switch> {
        let end_use: EndUseID = base_fuel.get_id_by_str(&self.end_use)?;
        check_switch_year(self.switch_year, base_year)?;

        Ok(Switch::Capacity(CapacitySwitch {
            end_use,
            technology_install: self.technology_install,
            switch_year: self.switch_year,
            installed_capacity: self.installed_capacity,
        }))
    }
}

/// Read the switches of a scenario.
///
/// Values are only checked for well-formedness here. Whether the switches of an end-use are
/// consistent with each other is checked when they are resolved into end-year targets.
///
/// # Arguments
///
/// * `model_dir` - Folder containing model configuration files
/// * `base_fuel` - Base-year fuel, which defines the end-uses
/// * `base_year` - The base year of the model
pub fn read_switches(model_dir: &Path, base_fuel: &BaseFuelMap, base_year: u32) -> Result<SwitchSet> {
    let file_path = model_dir.join(FUEL_SWITCHES_FILE_NAME);
    let fuel = read_csv_optional::<FuelSwitchRaw>(&file_path)?
        .into_iter()
        .map(|raw| raw.into_switch(base_fuel, base_year))
        .collect::<Result<Vec<_>>>()
        .with_context(|| input_err_msg(&file_path))?;

    let file_path = model_dir.join(SERVICE_SWITCHES_FILE_NAME);
    let service = read_csv_optional::<ServiceSwitchRaw>(&file_path)?
        .into_iter()
        .map(|raw| raw.into_switch(base_fuel, base_year))
        .collect::<Result<Vec<_>>>()
        .with_context(|| input_err_msg(&file_path))?;

    let file_path = model_dir.join(CAPACITY_SWITCHES_FILE_NAME);
    let capacity = read_csv_optional::<CapacitySwitchRaw>(&file_path)?
        .into_iter()
        .map(|raw| raw.into_switch(base_fuel, base_year))
        .collect::<Result<Vec<_>>>()
        .with_context(|| input_err_msg(&file_path))?;

    let switches: Vec<Switch> = fuel.into_iter().chain(service).chain(capacity).collect();
    for (end_use, count) in switches.iter().counts_by(Switch::end_use) {
        debug!("Read {count} switches for end-use {end_use}");
    }

    Ok(switches.into_iter().collect())
}
