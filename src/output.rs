//! The module responsible for writing output data to disk.
use crate::diffusion::{DiffusionResults, TechnologyDiffusion, Trajectory};
use crate::end_use::EndUseID;
use crate::region::RegionID;
use crate::technology::TechnologyID;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// The root folder in which model-specific output folders will be created
const OUTPUT_DIRECTORY_ROOT: &str = "techshare_results";

/// The output file name for trajectory parameters
const SIGMOID_PARAMETERS_FILE_NAME: &str = "sigmoid_parameters.csv";

/// The output file name for end-year targets
const END_YEAR_TARGETS_FILE_NAME: &str = "end_year_targets.csv";

/// The output file name for demand lost to regional capping
const LOST_DEMAND_FILE_NAME: &str = "lost_demand.csv";

/// Get the model name from the specified directory path
pub fn get_output_dir(model_dir: &Path) -> Result<PathBuf> {
    // Get the model name from the dir path. This ends up being convoluted because we need to check
    // for all possible errors. Ugh.
    let model_dir = model_dir
        .canonicalize() // canonicalise in case the user has specified "."
        .context("Could not resolve path to model")?;

    let model_name = model_dir
        .file_name()
        .context("Model cannot be in root folder")?
        .to_str()
        .context("Invalid chars in model dir name")?;

    // Construct path
    Ok([OUTPUT_DIRECTORY_ROOT, model_name].iter().collect())
}

/// Create a new output directory for the model.
///
/// Returns `true` if the directory already existed and contained files, which are left untouched
/// unless `overwrite` is set.
pub fn create_output_directory(output_dir: &Path, overwrite: bool) -> Result<bool> {
    if output_dir.is_dir() {
        let is_empty = output_dir
            .read_dir()
            .with_context(|| format!("Could not read {}", output_dir.display()))?
            .next()
            .is_none();
        if is_empty {
            return Ok(false);
        }

        if !overwrite {
            bail!(
                "Output directory {} already contains files (use --overwrite to replace them)",
                output_dir.display()
            );
        }

        fs::remove_dir_all(output_dir)?;
        fs::create_dir_all(output_dir)?;
        return Ok(true);
    }

    // Try to create the directory, with parents
    fs::create_dir_all(output_dir)?;

    Ok(false)
}

/// Represents a row in the sigmoid parameters CSV file.
///
/// Only sigmoid trajectories have a midpoint and steepness.
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct TrajectoryRow {
    end_use: EndUseID,
    region_id: Option<RegionID>,
    technology: TechnologyID,
    trajectory: String,
    midpoint: Option<f64>,
    steepness: Option<f64>,
    l_value: f64,
    share_by: f64,
    share_ey: f64,
}

impl TrajectoryRow {
    fn new(
        end_use: &EndUseID,
        region_id: Option<&RegionID>,
        technology: &TechnologyID,
        diffusion: &TechnologyDiffusion,
        trajectory: &Trajectory,
        share_ey: f64,
    ) -> Self {
        let (midpoint, steepness) = match trajectory {
            Trajectory::Sigmoid(params) => (Some(params.midpoint), Some(params.steepness)),
            _ => (None, None),
        };

        Self {
            end_use: end_use.clone(),
            region_id: region_id.cloned(),
            technology: technology.clone(),
            trajectory: trajectory.label().to_string(),
            midpoint,
            steepness,
            l_value: diffusion.l_value,
            share_by: diffusion.share_by,
            share_ey,
        }
    }
}

/// Represents a row in the end-year targets CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct TargetRow {
    end_use: EndUseID,
    technology: TechnologyID,
    share_by: f64,
    share_ey: f64,
    l_value: f64,
}

/// Represents a row in the lost demand CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct LostDemandRow {
    end_use: EndUseID,
    region_id: RegionID,
    technology: TechnologyID,
    lost_demand: f64,
}

/// Write the results of a diffusion run to CSV files in `output_path`.
///
/// The lost demand file is only written if spatial diffusion was enabled.
pub fn write_diffusion_results(output_path: &Path, results: &DiffusionResults) -> Result<()> {
    let new_writer = |file_name| {
        let file_path = output_path.join(file_name);
        csv::Writer::from_path(&file_path)
            .with_context(|| format!("Could not create {}", file_path.display()))
    };

    let mut parameters_writer = new_writer(SIGMOID_PARAMETERS_FILE_NAME)?;
    let mut targets_writer = new_writer(END_YEAR_TARGETS_FILE_NAME)?;
    let is_spatial = results
        .end_uses
        .values()
        .flat_map(|end_use| end_use.technologies.values())
        .any(|technology| !technology.regional.is_empty());
    let mut lost_demand_writer = if is_spatial {
        Some(new_writer(LOST_DEMAND_FILE_NAME)?)
    } else {
        None
    };

    for (end_use, end_use_diffusion) in &results.end_uses {
        for (technology, diffusion) in &end_use_diffusion.technologies {
            targets_writer.serialize(TargetRow {
                end_use: end_use.clone(),
                technology: technology.clone(),
                share_by: diffusion.share_by,
                share_ey: diffusion.share_ey,
                l_value: diffusion.l_value,
            })?;
            parameters_writer.serialize(TrajectoryRow::new(
                end_use,
                None,
                technology,
                diffusion,
                &diffusion.national,
                diffusion.share_ey,
            ))?;

            for (region_id, regional) in &diffusion.regional {
                parameters_writer.serialize(TrajectoryRow::new(
                    end_use,
                    Some(region_id),
                    technology,
                    diffusion,
                    &regional.trajectory,
                    regional.share_ey,
                ))?;

                if let Some(writer) = &mut lost_demand_writer {
                    writer.serialize(LostDemandRow {
                        end_use: end_use.clone(),
                        region_id: region_id.clone(),
                        technology: technology.clone(),
                        lost_demand: regional.lost_demand,
                    })?;
                }
            }
        }
    }

    parameters_writer.flush()?;
    targets_writer.flush()?;
    if let Some(writer) = &mut lost_demand_writer {
        writer.flush()?;
    }

    Ok(())
}
