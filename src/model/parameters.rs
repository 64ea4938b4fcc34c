//! Defines the `ModelParameters` struct, which represents the contents of `model.toml`.
use crate::efficiency::HeatPumpCurve;
use crate::input::{input_err_msg, read_toml};
use crate::units::Dimensionless;
use anyhow::{Context, Result, ensure};
use serde::Deserialize;
use std::path::Path;

const MODEL_PARAMETERS_FILE_NAME: &str = "model.toml";

macro_rules! define_param_default {
    ($name:ident, $type: ty, $value: expr) => {
        fn $name() -> $type {
            $value
        }
    };
}

define_param_default!(default_base_offset_year, u32, 2000);
define_param_default!(default_share_epsilon, f64, 0.001);
define_param_default!(default_max_steepness, f64, 200.0);
define_param_default!(default_max_midpoint, f64, 200.0);
define_param_default!(default_constant_share_tolerance, f64, 1e-3);
define_param_default!(default_max_iterations, u32, 500);
define_param_default!(default_fit_tolerance, f64, 1e-10);
define_param_default!(default_spatial_tolerance, f64, 0.01);

/// Represents the contents of the entire model file.
#[derive(Debug, Deserialize, PartialEq)]
pub struct ModelParameters {
    /// The year for which base-year fuel is given
    pub base_year: u32,
    /// The default year by which technologies reach their end-year shares
    pub end_year: u32,
    /// Overrides the achieved-efficiency factor of every technology
    pub efficiency_achieved: Option<Dimensionless>,
    /// Parameters for fitting diffusion curves
    #[serde(default)]
    pub sigmoid: SigmoidConfig,
    /// Parameters for spatial diffusion. If absent, diffusion is national only.
    pub spatial: Option<SpatialConfig>,
    /// Relationship between heat pump efficiency and temperature difference
    #[serde(default)]
    pub heat_pump: HeatPumpCurve,
}

/// Parameters controlling how diffusion curves are fitted.
///
/// Don't change unless you know what you're doing.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct SigmoidConfig {
    /// Midpoints are expressed as an offset from this year
    #[serde(default = "default_base_offset_year")]
    pub base_offset_year: u32,
    /// Shares of zero (or equal to the L-value) are replaced by a value this far from the bound
    #[serde(default = "default_share_epsilon")]
    pub share_epsilon: f64,
    /// Fits with a steepness at or above this value are rejected
    #[serde(default = "default_max_steepness")]
    pub max_steepness: f64,
    /// Fits with a midpoint at or above this value are rejected
    #[serde(default = "default_max_midpoint")]
    pub max_midpoint: f64,
    /// Technologies whose base-year and end-year shares differ by less than this are constant
    #[serde(default = "default_constant_share_tolerance")]
    pub constant_share_tolerance: f64,
    /// Maximum number of iterations in a single fit attempt
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Sum of squared residuals below which a fit is considered converged
    #[serde(default = "default_fit_tolerance")]
    pub fit_tolerance: f64,
    /// Start values to try, in order. If absent, a built-in list is used.
    pub start_values: Option<Vec<f64>>,
}

impl Default for SigmoidConfig {
    fn default() -> Self {
        Self {
            base_offset_year: default_base_offset_year(),
            share_epsilon: default_share_epsilon(),
            max_steepness: default_max_steepness(),
            max_midpoint: default_max_midpoint(),
            constant_share_tolerance: default_constant_share_tolerance(),
            max_iterations: default_max_iterations(),
            fit_tolerance: default_fit_tolerance(),
            start_values: None,
        }
    }
}

/// Parameters for spreading diffusion unevenly across regions
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct SpatialConfig {
    /// Relative speed of diffusion in the region with the highest congruence value
    pub speed_at_congruence_one: f64,
    /// Whether regions with a low covariate value adopt new technologies fastest
    #[serde(default)]
    pub low_congruence_means_fast: bool,
    /// Percentage of regions at either end of the covariate distribution treated as outliers
    #[serde(default)]
    pub outlier_percent: f64,
    /// Allowed difference between the demand-weighted regional shares and the national share
    #[serde(default = "default_spatial_tolerance")]
    pub tolerance: f64,
}

/// Check that the base and end years are valid
fn check_years(base_year: u32, end_year: u32) -> Result<()> {
    ensure!(
        end_year > base_year,
        "end_year ({end_year}) must be after base_year ({base_year})"
    );

    Ok(())
}

/// Check the `[sigmoid]` section is valid
fn check_sigmoid_config(config: &SigmoidConfig) -> Result<()> {
    ensure!(
        config.share_epsilon > 0.0 && config.share_epsilon < 0.5,
        "share_epsilon must be greater than 0 and less than 0.5"
    );
    ensure!(
        config.max_steepness.is_finite() && config.max_steepness > 0.0,
        "max_steepness must be a finite number greater than zero"
    );
    ensure!(
        config.max_midpoint.is_finite() && config.max_midpoint > 0.0,
        "max_midpoint must be a finite number greater than zero"
    );
    ensure!(
        config.constant_share_tolerance.is_finite() && config.constant_share_tolerance >= 0.0,
        "constant_share_tolerance must be a finite, non-negative number"
    );
    ensure!(config.max_iterations > 0, "max_iterations cannot be zero");
    ensure!(
        config.fit_tolerance.is_finite() && config.fit_tolerance > 0.0,
        "fit_tolerance must be a finite number greater than zero"
    );
    if let Some(start_values) = &config.start_values {
        ensure!(!start_values.is_empty(), "start_values cannot be empty");
        ensure!(
            start_values.iter().all(|value| value.is_finite()),
            "start_values must all be finite"
        );
    }

    Ok(())
}

/// Check the `[spatial]` section is valid
fn check_spatial_config(config: &SpatialConfig) -> Result<()> {
    ensure!(
        config.speed_at_congruence_one.is_finite() && config.speed_at_congruence_one >= 1.0,
        "speed_at_congruence_one must be a finite number of at least 1"
    );
    ensure!(
        (0.0..50.0).contains(&config.outlier_percent),
        "outlier_percent must be at least 0 and less than 50"
    );
    ensure!(
        config.tolerance.is_finite() && config.tolerance > 0.0,
        "tolerance must be a finite number greater than zero"
    );

    Ok(())
}

impl ModelParameters {
    /// Read a model file from the specified directory.
    ///
    /// # Arguments
    ///
    /// * `model_dir` - Folder containing model configuration files
    ///
    /// # Returns
    ///
    /// The model file contents as a [`ModelParameters`] struct or an error if the file is invalid
    pub fn from_path<P: AsRef<Path>>(model_dir: P) -> Result<ModelParameters> {
        let file_path = model_dir.as_ref().join(MODEL_PARAMETERS_FILE_NAME);
        let model_params: ModelParameters = read_toml(&file_path)?;

        model_params
            .validate()
            .with_context(|| input_err_msg(file_path))?;

        Ok(model_params)
    }

    /// Validate parameters after reading in file
    fn validate(&self) -> Result<()> {
        check_years(self.base_year, self.end_year)?;

        if let Some(factor) = self.efficiency_achieved {
            ensure!(
                (0.0..=1.0).contains(&factor.value()),
                "efficiency_achieved must be between 0 and 1"
            );
        }

        check_sigmoid_config(&self.sigmoid).context("Invalid [sigmoid] section")?;
        if let Some(spatial) = &self.spatial {
            check_spatial_config(spatial).context("Invalid [spatial] section")?;
        }

        Ok(())
    }
}
