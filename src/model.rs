//! The model holds all the static inputs needed to calculate technology diffusion.
use crate::efficiency::EfficiencyModel;
use crate::region::{RegionMap, RegionalDemandMap};
use crate::service::BaseFuelMap;
use crate::switch::SwitchSet;
use crate::technology::TechnologyCatalog;
use anyhow::Result;
use std::path::Path;

pub mod parameters;
pub use parameters::{ModelParameters, SigmoidConfig, SpatialConfig};

/// Model definition
#[derive(PartialEq, Debug)]
pub struct Model {
    /// Parameters from the model TOML file
    pub parameters: ModelParameters,
    /// The technologies, with any achieved-efficiency override already applied
    pub catalog: TechnologyCatalog,
    /// Base-year fuel for every end-use
    pub base_fuel: BaseFuelMap,
    /// The switches of the scenario
    pub switches: SwitchSet,
    /// Regions (empty unless spatial diffusion is enabled)
    pub regions: RegionMap,
    /// Regional shares of demand for every end-use (empty unless spatial diffusion is enabled)
    pub regional_demand: RegionalDemandMap,
}

impl Model {
    /// Read a model from the specified directory.
    ///
    /// # Arguments
    ///
    /// * `model_dir` - Folder containing model configuration files
    pub fn from_path<P: AsRef<Path>>(model_dir: P) -> Result<Model> {
        crate::input::load_model(model_dir)
    }

    /// The efficiency model for the model's technologies
    pub fn efficiency_model(&self) -> EfficiencyModel<'_> {
        EfficiencyModel::new(
            &self.catalog,
            self.parameters.base_year,
            self.parameters.heat_pump,
        )
    }
}
