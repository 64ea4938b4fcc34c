//! Code for reading technologies from a CSV file.
use super::*;
use crate::fuel::FuelType;
use crate::technology::{
    DiffusionMethod, HybridSplit, Technology, TechnologyCatalog, TechnologyCategory,
    TechnologyID, TechnologyMap,
};
use anyhow::bail;
use serde::Deserialize;

const TECHNOLOGIES_FILE_NAME: &str = "technologies.csv";

#[derive(PartialEq, Debug, Deserialize)]
struct TechnologyRaw {
    id: TechnologyID,
    fuel_type: FuelType,
    category: TechnologyCategory,
    eff_by: Dimensionless,
    eff_ey: Dimensionless,
    eff_ey_year: u32,
    #[serde(deserialize_with = "deserialise_proportion")]
    eff_achieved: Dimensionless,
    diff_method: DiffusionMethod,
    market_entry: u32,
    max_share: Dimensionless,
    hybrid_low: Option<TechnologyID>,
    hybrid_high: Option<TechnologyID>,
    hybrid_share_low: Option<Dimensionless>,
}

impl TechnologyRaw {
    fn into_technology(self) -> Result<Technology> {
        let hybrid = match (self.hybrid_low, self.hybrid_high, self.hybrid_share_low) {
            (Some(low), Some(high), Some(share_low)) => Some(HybridSplit {
                low,
                high,
                share_low,
            }),
            (None, None, None) => None,
            _ => bail!(
                "hybrid_low, hybrid_high and hybrid_share_low must either all be given or all be \
                empty (technology {})",
                self.id
            ),
        };

        Ok(Technology {
            id: self.id,
            fuel_type: self.fuel_type,
            category: self.category,
            eff_by: self.eff_by,
            eff_ey: self.eff_ey,
            eff_ey_year: self.eff_ey_year,
            eff_achieved: self.eff_achieved,
            diff_method: self.diff_method,
            market_entry: self.market_entry,
            max_share: self.max_share,
            hybrid,
        })
    }
}

/// Read technologies from the technologies CSV file.
///
/// # Arguments
///
/// * `model_dir` - Folder containing model configuration files
///
/// # Returns
///
/// The technology catalog, or an error if any technology is invalid
pub fn read_technologies(model_dir: &Path) -> Result<TechnologyCatalog> {
    let file_path = model_dir.join(TECHNOLOGIES_FILE_NAME);
    let technologies_csv = read_csv(&file_path)?;
    read_technologies_from_iter(technologies_csv).with_context(|| input_err_msg(&file_path))
}

fn read_technologies_from_iter<I>(iter: I) -> Result<TechnologyCatalog>
where
    I: Iterator<Item = TechnologyRaw>,
{
    let mut technologies = TechnologyMap::new();
    for raw in iter {
        let technology = raw.into_technology()?;
        let id = technology.id.clone();
        ensure!(
            technologies.insert(id.clone(), technology).is_none(),
            "Duplicate technology ID {id}"
        );
    }

    TechnologyCatalog::new(technologies)
}
