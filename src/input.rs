//! Common routines for handling input data.
use crate::id::{HasID, IDLike};
use crate::model::{Model, ModelParameters};
use crate::units::Dimensionless;
use anyhow::{Context, Result, ensure};
use float_cmp::approx_eq;
use indexmap::IndexMap;
use itertools::Itertools;
use serde::de::{Deserialize, DeserializeOwned, Deserializer};
use std::fs;
use std::path::Path;

pub mod fuel;
use fuel::read_base_fuel;
pub mod region;
use region::{read_regional_demand, read_regions};
pub mod switch;
use switch::read_switches;
pub mod technology;
use technology::read_technologies;

/// Read a series of type `T`s from a CSV file.
///
/// Will raise an error if the file is empty.
///
/// # Arguments
///
/// * `file_path` - Path to the CSV file
pub fn read_csv<'a, T: DeserializeOwned + 'a>(
    file_path: &'a Path,
) -> Result<impl Iterator<Item = T> + 'a> {
    let vec = read_csv_internal(file_path)?;
    ensure!(!vec.is_empty(), "CSV file {} cannot be empty", file_path.display());

    Ok(vec.into_iter())
}

/// Read a series of type `T`s from a CSV file.
///
/// If the file doesn't exist, an empty `Vec` is returned.
///
/// # Arguments
///
/// * `file_path` - Path to the CSV file
pub fn read_csv_optional<T: DeserializeOwned>(file_path: &Path) -> Result<Vec<T>> {
    if !file_path.exists() {
        return Ok(Vec::new());
    }

    read_csv_internal(file_path)
}

fn read_csv_internal<T: DeserializeOwned>(file_path: &Path) -> Result<Vec<T>> {
    let vec = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(file_path)
        .with_context(|| input_err_msg(file_path))?
        .into_deserialize()
        .process_results(|iter| iter.collect_vec())
        .with_context(|| input_err_msg(file_path))?;

    Ok(vec)
}

/// Parse a TOML file at the specified path.
///
/// # Arguments
///
/// * `file_path` - Path to the TOML file
///
/// # Returns
///
/// * The deserialised TOML data or an error if the file could not be read or parsed.
pub fn read_toml<T: DeserializeOwned>(file_path: &Path) -> Result<T> {
    let toml_str = fs::read_to_string(file_path).with_context(|| input_err_msg(file_path))?;
    let toml_data = toml::from_str(&toml_str).with_context(|| input_err_msg(file_path))?;
    Ok(toml_data)
}

/// Read a Dimensionless value, checking that it is between 0 and 1
pub fn deserialise_proportion<'de, D>(deserialiser: D) -> Result<Dimensionless, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserialiser)?;
    if !(0.0..=1.0).contains(&value) {
        Err(serde::de::Error::custom("Value must be between 0 and 1"))?;
    }

    Ok(Dimensionless(value))
}

/// Format an error message to include the file path
pub fn input_err_msg<P: AsRef<Path>>(file_path: P) -> String {
    format!("Error reading {}", file_path.as_ref().display())
}

/// Read a CSV file of items with IDs.
///
/// As this function is only ever used for top-level CSV files (i.e. the ones which actually define
/// the IDs for a given type), we use an ordered map to maintain the order in the input files.
pub fn read_csv_id_file<T, ID: IDLike>(file_path: &Path) -> Result<IndexMap<ID, T>>
where
    T: HasID<ID> + DeserializeOwned,
{
    fn fill_and_validate_map<T, ID: IDLike>(file_path: &Path) -> Result<IndexMap<ID, T>>
    where
        T: HasID<ID> + DeserializeOwned,
    {
        let mut map = IndexMap::new();
        for record in read_csv::<T>(file_path)? {
            let id = record.get_id().clone();
            let existing = map.insert(id.clone(), record).is_some();
            ensure!(!existing, "Duplicate ID found: {id}");
        }

        Ok(map)
    }

    fill_and_validate_map(file_path).with_context(|| input_err_msg(file_path))
}

/// Check that fractions sum to (approximately) one
pub fn check_fractions_sum_to_one<I>(fractions: I) -> Result<()>
where
    I: Iterator<Item = Dimensionless>,
{
    let sum: Dimensionless = fractions.sum();
    ensure!(
        approx_eq!(f64, sum.value(), 1.0, epsilon = 1e-5),
        "Sum of fractions does not equal one (actual: {sum})"
    );

    Ok(())
}

/// Read a model from the specified directory.
///
/// The achieved-efficiency override (if any) is applied to the technologies here, before anything
/// else reads them.
///
/// # Arguments
///
/// * `model_dir` - Folder containing model configuration files
pub fn load_model<P: AsRef<Path>>(model_dir: P) -> Result<Model> {
    let model_dir = model_dir.as_ref();
    let parameters = ModelParameters::from_path(model_dir)?;

    let mut catalog = read_technologies(model_dir)?;
    if let Some(factor) = parameters.efficiency_achieved {
        catalog = catalog.with_achieved_efficiency(factor)?;
    }

    let base_fuel = read_base_fuel(model_dir, &catalog)?;
    let switches = read_switches(model_dir, &base_fuel, parameters.base_year)?;
    let (regions, regional_demand) = if parameters.spatial.is_some() {
        let regions = read_regions(model_dir)?;
        let regional_demand = read_regional_demand(model_dir, &regions, &base_fuel)?;
        (regions, regional_demand)
    } else {
        Default::default()
    };

    Ok(Model {
        parameters,
        catalog,
        base_fuel,
        switches,
        regions,
        regional_demand,
    })
}
