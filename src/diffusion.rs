//! The diffusion engine, which turns base-year fuel and scenario switches into a trajectory of
//! service share over time for every technology of every end-use.
use crate::end_use::EndUseID;
use crate::error::DiffusionError;
use crate::model::Model;
use crate::region::RegionID;
use crate::service::compute_service_shares;
use crate::switch::{EndUseTargets, resolve_end_use};
use crate::technology::{DiffusionMethod, Technology, TechnologyID};
use crate::units::Dimensionless;
use anyhow::{Context, Result, ensure};
use indexmap::IndexMap;
use itertools::Itertools;
use log::{debug, info};

pub mod sigmoid;
pub mod spatial;
use sigmoid::{SigmoidDirection, SigmoidFitter, SigmoidParameters};
use spatial::{DiffusionIndex, NationalShares};

/// How the share of a technology changes over time
#[derive(PartialEq, Debug, Clone, Copy)]
pub enum Trajectory {
    /// The share does not change
    Constant {
        /// The share in every year
        share: f64,
    },
    /// The share changes along a straight line, then stays at the end value
    Linear {
        /// Year in which the line starts
        year_by: u32,
        /// Share at the start of the line
        share_by: f64,
        /// Year in which the line ends
        year_ey: u32,
        /// Share at the end of the line
        share_ey: f64,
    },
    /// The share follows a fitted S-curve
    Sigmoid(SigmoidParameters),
    /// The share gives way to the growing technologies of the end-use.
    ///
    /// It moves from `share_by` to `share_ey` at the same pace as the growing technologies take up
    /// their end-year gain, so the shares of the end-use always sum to one.
    Remainder {
        /// Share in the base year
        share_by: f64,
        /// Share once the growing technologies have reached their targets
        share_ey: f64,
    },
}

impl Trajectory {
    /// The share in the given year, before any bounds are applied.
    ///
    /// `progress` is the fraction (0 to 1) of their end-year gain which the growing technologies of
    /// the end-use have taken up by `year`. Only [`Trajectory::Remainder`] depends on it.
    pub fn evaluate(&self, year: u32, progress: f64) -> f64 {
        match self {
            Self::Constant { share } => *share,
            Self::Linear {
                year_by,
                share_by,
                year_ey,
                share_ey,
            } => {
                if year <= *year_by {
                    *share_by
                } else if year >= *year_ey {
                    *share_ey
                } else {
                    let position = f64::from(year - year_by) / f64::from(year_ey - year_by);
                    share_by + (share_ey - share_by) * position
                }
            }
            Self::Sigmoid(params) => params.evaluate(year),
            Self::Remainder { share_by, share_ey } => share_by + (share_ey - share_by) * progress,
        }
    }

    /// Whether the share follows the growing technologies of the end-use
    pub fn is_remainder(&self) -> bool {
        matches!(self, Self::Remainder { .. })
    }

    /// A short label describing the trajectory
    pub fn label(&self) -> &'static str {
        match self {
            Self::Constant { .. } => "constant",
            Self::Linear { .. } => "linear",
            Self::Sigmoid(SigmoidParameters {
                direction: SigmoidDirection::Increasing,
                ..
            }) => "sigmoid_increasing",
            Self::Sigmoid(SigmoidParameters {
                direction: SigmoidDirection::Decreasing,
                ..
            }) => "sigmoid_decreasing",
            Self::Remainder { .. } => "remainder",
        }
    }
}

/// The part a technology plays in the change of its end-use
#[derive(PartialEq, Debug, Clone, Copy)]
enum Role {
    /// Gains share, along its own fitted trajectory
    Growing,
    /// Gives way to the growing technologies
    Shrinking,
    /// Nothing in the end-use changes
    Unchanged,
}

impl Role {
    fn new(share_by: f64, share_ey: f64, tolerance: f64, end_use_grows: bool) -> Self {
        if share_ey - share_by > tolerance {
            Self::Growing
        } else if end_use_grows {
            Self::Shrinking
        } else {
            Self::Unchanged
        }
    }
}

/// The diffusion of a technology in one region
#[derive(PartialEq, Debug, Clone)]
pub struct RegionalDiffusion {
    /// End-year share in the region, after capping
    pub share_ey: f64,
    /// Demand lost in the region due to capping (zero if no capping was needed)
    pub lost_demand: f64,
    /// The trajectory in the region
    pub trajectory: Trajectory,
}

/// The diffusion of one technology within an end-use
#[derive(PartialEq, Debug, Clone)]
pub struct TechnologyDiffusion {
    /// National base-year share
    pub share_by: f64,
    /// National end-year share
    pub share_ey: f64,
    /// Maximum theoretical share
    pub l_value: f64,
    /// Year in which the technology reaches its end-year share
    pub switch_year: u32,
    /// Year from which the technology can have a non-zero share
    pub market_entry: u32,
    /// The national trajectory
    pub national: Trajectory,
    /// Trajectories for each region (empty unless spatial diffusion is enabled)
    pub regional: IndexMap<RegionID, RegionalDiffusion>,
}

impl TechnologyDiffusion {
    /// The trajectory and end-year share, nationally or for a single region
    fn trajectory(&self, region: Option<&str>) -> Result<(&Trajectory, f64)> {
        match region {
            None => Ok((&self.national, self.share_ey)),
            Some(region) => {
                let regional = self
                    .regional
                    .get(region)
                    .with_context(|| format!("No regional trajectory for region {region}"))?;
                Ok((&regional.trajectory, regional.share_ey))
            }
        }
    }

    /// The share of the technology in the given year, nationally or for a single region.
    ///
    /// The share is zero before the technology enters the market, stays at its end-year value after
    /// the switch year and never exceeds the L-value. `progress` is only used by
    /// [`Trajectory::Remainder`].
    pub fn service_share(
        &self,
        year: u32,
        region: Option<&str>,
        progress: f64,
    ) -> Result<Dimensionless> {
        let (trajectory, _) = self.trajectory(region)?;
        if year < self.market_entry {
            return Ok(Dimensionless(0.0));
        }

        let share = trajectory.evaluate(year.min(self.switch_year), progress);
        Ok(Dimensionless(share.clamp(0.0, self.l_value)))
    }
}

/// The diffusion of every technology of an end-use
#[derive(PartialEq, Debug, Clone)]
pub struct EndUseDiffusion {
    /// The resolved end-year targets
    pub targets: EndUseTargets,
    /// The diffusion of each technology
    pub technologies: IndexMap<TechnologyID, TechnologyDiffusion>,
}

impl EndUseDiffusion {
    /// The fraction (0 to 1) of their end-year gain which the growing technologies have taken up
    fn progress(&self, year: u32, region: Option<&str>) -> Result<f64> {
        let mut gained = 0.0;
        let mut target = 0.0;
        for diffusion in self.technologies.values() {
            let (trajectory, share_ey) = diffusion.trajectory(region)?;
            if trajectory.is_remainder() {
                continue;
            }

            gained += diffusion.service_share(year, region, 0.0)?.value() - diffusion.share_by;
            target += share_ey - diffusion.share_by;
        }

        if target <= f64::EPSILON {
            return Ok(0.0);
        }

        Ok((gained / target).clamp(0.0, 1.0))
    }

    /// The share of a technology in the given year, nationally or for a single region
    pub fn service_share(
        &self,
        technology: &str,
        year: u32,
        region: Option<&str>,
    ) -> Result<Dimensionless> {
        let diffusion = self.technologies.get(technology).with_context(|| {
            format!(
                "Technology {technology} is not used in end-use {}",
                self.targets.end_use
            )
        })?;

        let (trajectory, _) = diffusion.trajectory(region)?;
        let progress = if trajectory.is_remainder() {
            self.progress(year, region)?
        } else {
            0.0
        };

        diffusion.service_share(year, region, progress)
    }
}

/// The output of the diffusion engine for a whole scenario
#[derive(PartialEq, Debug, Clone, Default)]
pub struct DiffusionResults {
    /// The results for each end-use
    pub end_uses: IndexMap<EndUseID, EndUseDiffusion>,
}

impl DiffusionResults {
    /// Get the service share of a technology in the given end-use and year.
    ///
    /// # Arguments
    ///
    /// * `technology` - The technology
    /// * `end_use` - The end-use
    /// * `year` - The year of interest
    /// * `region` - A region, or `None` for the national share
    pub fn get_service_share(
        &self,
        technology: &str,
        end_use: &str,
        year: u32,
        region: Option<&str>,
    ) -> Result<Dimensionless> {
        self.end_uses
            .get(end_use)
            .with_context(|| format!("Unknown end-use {end_use}"))?
            .service_share(technology, year, region)
    }

    /// Total demand lost to regional capping, across all end-uses and technologies
    pub fn total_lost_demand(&self) -> f64 {
        self.end_uses
            .values()
            .flat_map(|end_use| end_use.technologies.values())
            .flat_map(|technology| technology.regional.values())
            .map(|regional| regional.lost_demand)
            .sum()
    }
}

/// Orchestrates the calculation of diffusion trajectories for a model
pub struct DiffusionEngine<'a> {
    model: &'a Model,
    fitter: SigmoidFitter<'a>,
    index: Option<DiffusionIndex>,
}

impl<'a> DiffusionEngine<'a> {
    /// Create a new engine for the given model
    pub fn new(model: &'a Model) -> Self {
        let index = model
            .parameters
            .spatial
            .as_ref()
            .map(|config| spatial::allocate(&model.regions, config));

        Self {
            model,
            fitter: SigmoidFitter::new(&model.parameters.sigmoid),
            index,
        }
    }

    /// Calculate trajectories for every technology of every end-use
    pub fn run(&self) -> Result<DiffusionResults> {
        let parameters = &self.model.parameters;
        let efficiency = self.model.efficiency_model();
        let service_shares =
            compute_service_shares(&self.model.base_fuel, &self.model.catalog, &efficiency)?;

        let mut results = DiffusionResults::default();
        for (end_use, base_shares) in &service_shares {
            let targets = resolve_end_use(
                end_use,
                base_shares,
                &self.model.base_fuel[end_use],
                &self.model.switches.for_end_use(end_use, None),
                &self.model.catalog,
                parameters.end_year,
            )
            .with_context(|| format!("Could not resolve switches for end-use {end_use}"))?;

            let tolerance = parameters.sigmoid.constant_share_tolerance;
            let end_use_grows = targets.iter_technologies().any(|id| {
                targets.end_year.share(id).value() - targets.base_year.share(id).value()
                    > tolerance
            });
            let technologies = targets
                .iter_technologies()
                .map(|id| {
                    let diffusion = self.diffuse_technology(&targets, id, end_use_grows)?;
                    Ok((id.clone(), diffusion))
                })
                .collect::<Result<IndexMap<_, _>>>()
                .with_context(|| {
                    format!("Could not calculate diffusion for end-use {end_use}")
                })?;
            info!(
                "End-use {end_use}: {} technologies resolved with {:?} switches",
                technologies.len(),
                targets.kind
            );

            results.end_uses.insert(
                end_use.clone(),
                EndUseDiffusion {
                    targets,
                    technologies,
                },
            );
        }

        Ok(results)
    }

    /// Calculate the national (and, if enabled, regional) diffusion of a single technology
    fn diffuse_technology(
        &self,
        targets: &EndUseTargets,
        id: &TechnologyID,
        end_use_grows: bool,
    ) -> Result<TechnologyDiffusion> {
        let technology = self
            .model
            .catalog
            .get(id)
            .with_context(|| format!("Unknown technology {id}"))?;
        let base_year = self.model.parameters.base_year;
        let share_by = targets.base_year.share(id).value();
        let share_ey = targets.end_year.share(id).value();
        let l_value = targets.l_values[id].value();
        let switch_year = targets.switch_years[id];

        ensure!(
            share_by == 0.0 || technology.is_on_market(base_year),
            "Technology {id} has service in the base year ({base_year}) but only enters the \
            market in {}",
            technology.market_entry
        );
        ensure!(
            share_ey == 0.0 || technology.is_on_market(switch_year),
            "Technology {id} has a target share in {switch_year} but only enters the market in {}",
            technology.market_entry
        );

        let tolerance = self.model.parameters.sigmoid.constant_share_tolerance;
        let role = Role::new(share_by, share_ey, tolerance, end_use_grows);
        let national = self.trajectory(targets, technology, role, share_ey)?;
        debug!(
            "Technology {id} in end-use {}: {} trajectory from {share_by} to {share_ey} by \
            {switch_year}",
            targets.end_use,
            national.label()
        );

        let mut regional = IndexMap::new();
        if let (Some(index), Some(config)) = (&self.index, &self.model.parameters.spatial) {
            let demand = self
                .model
                .regional_demand
                .get(&targets.end_use)
                .ok_or_else(|| DiffusionError::MissingRegionalDemand {
                    end_use: targets.end_use.to_string(),
                    region: index.keys().map(ToString::to_string).join(", "),
                })?;
            let allocation = spatial::regional_end_year_shares(
                &targets.end_use,
                id,
                &NationalShares {
                    share_by,
                    share_ey,
                    l_value,
                },
                index,
                demand,
                config.tolerance,
            )?;

            for (region_id, regional_share_ey) in allocation.shares {
                let trajectory = self.trajectory(targets, technology, role, regional_share_ey)?;
                let lost_demand = allocation
                    .lost_demand
                    .get(&region_id)
                    .copied()
                    .unwrap_or(0.0);
                regional.insert(
                    region_id,
                    RegionalDiffusion {
                        share_ey: regional_share_ey,
                        lost_demand,
                        trajectory,
                    },
                );
            }
        }

        Ok(TechnologyDiffusion {
            share_by,
            share_ey,
            l_value,
            switch_year,
            market_entry: technology.market_entry,
            national,
            regional,
        })
    }

    /// Build the trajectory of a technology from its base-year share to `share_ey`.
    ///
    /// Only growing technologies get a trajectory of their own. Shrinking ones make room for them.
    fn trajectory(
        &self,
        targets: &EndUseTargets,
        technology: &Technology,
        role: Role,
        share_ey: f64,
    ) -> Result<Trajectory, DiffusionError> {
        let id = &technology.id;
        let share_by = targets.base_year.share(id).value();
        match role {
            Role::Unchanged => return Ok(Trajectory::Constant { share: share_ey }),
            Role::Shrinking => return Ok(Trajectory::Remainder { share_by, share_ey }),
            Role::Growing => {}
        }

        let config = &self.model.parameters.sigmoid;
        if share_ey - share_by <= config.constant_share_tolerance {
            return Ok(Trajectory::Constant { share: share_ey });
        }

        let base_year = self.model.parameters.base_year;
        let switch_year = targets.switch_years[id];
        match technology.diff_method {
            DiffusionMethod::Linear => Ok(Trajectory::Linear {
                year_by: base_year.max(technology.market_entry),
                share_by,
                year_ey: switch_year,
                share_ey,
            }),
            DiffusionMethod::Sigmoid => self
                .fitter
                .fit(
                    targets.l_values[id].value(),
                    (base_year, share_by),
                    (switch_year, share_ey),
                )
                .map(Trajectory::Sigmoid)
                .map_err(|failure| DiffusionError::DiffusionFitFailure {
                    end_use: targets.end_use.to_string(),
                    technology: id.to_string(),
                    attempts: failure.attempts,
                    last_rejected: failure.last_rejected,
                }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{assert_error, model, service_switch};
    use crate::fuel::FuelType;
    use crate::model::SpatialConfig;
    use crate::region::Region;
    use crate::switch::{ServiceSwitch, SwitchSet};
    use crate::units::Energy;
    use float_cmp::assert_approx_eq;
    use indexmap::indexmap;
    use rstest::rstest;

    fn sigmoid(direction: SigmoidDirection) -> SigmoidParameters {
        SigmoidParameters {
            midpoint: 30.0,
            steepness: 0.2,
            l_value: 1.0,
            direction,
            offset_year: 2000,
        }
    }

    #[rstest]
    #[case(Trajectory::Constant { share: 0.3 }, "constant")]
    #[case(
        Trajectory::Linear { year_by: 2015, share_by: 0.1, year_ey: 2050, share_ey: 0.2 },
        "linear"
    )]
    #[case(Trajectory::Sigmoid(sigmoid(SigmoidDirection::Increasing)), "sigmoid_increasing")]
    #[case(Trajectory::Sigmoid(sigmoid(SigmoidDirection::Decreasing)), "sigmoid_decreasing")]
    fn test_trajectory_label(#[case] trajectory: Trajectory, #[case] expected: &str) {
        assert_eq!(trajectory.label(), expected);
    }

    #[rstest]
    #[case(2010, 0.1)]
    #[case(2015, 0.1)]
    #[case(2030, 0.2)]
    #[case(2045, 0.3)]
    #[case(2060, 0.3)]
    fn test_trajectory_linear(#[case] year: u32, #[case] expected: f64) {
        let trajectory = Trajectory::Linear {
            year_by: 2015,
            share_by: 0.1,
            year_ey: 2045,
            share_ey: 0.3,
        };
        assert_approx_eq!(f64, trajectory.evaluate(year, 0.0), expected, epsilon = 1e-10);
    }

    #[rstest]
    #[case(0.0, 0.6)]
    #[case(0.5, 0.4)]
    #[case(1.0, 0.2)]
    fn test_trajectory_remainder(#[case] progress: f64, #[case] expected: f64) {
        let trajectory = Trajectory::Remainder {
            share_by: 0.6,
            share_ey: 0.2,
        };
        assert_approx_eq!(f64, trajectory.evaluate(2030, progress), expected, epsilon = 1e-10);
        assert_eq!(trajectory.label(), "remainder");
    }

    #[test]
    fn test_service_share_market_entry_and_l_value() {
        let diffusion = TechnologyDiffusion {
            share_by: 0.0,
            share_ey: 0.5,
            l_value: 0.6,
            switch_year: 2050,
            market_entry: 2025,
            national: Trajectory::Linear {
                year_by: 2015,
                share_by: 0.0,
                year_ey: 2050,
                share_ey: 0.9,
            },
            regional: IndexMap::new(),
        };

        assert_eq!(
            diffusion.service_share(2024, None, 0.0).unwrap(),
            Dimensionless(0.0)
        );
        assert!(diffusion.service_share(2025, None, 0.0).unwrap() > Dimensionless(0.0));
        assert_eq!(
            diffusion.service_share(2050, None, 0.0).unwrap(),
            Dimensionless(0.6)
        );
        assert!(diffusion.service_share(2030, Some("R1"), 0.0).is_err());
    }

    /// Sigmoid shares stay at their end-year value after the switch year
    #[test]
    fn test_service_share_held_after_switch_year() {
        let params = sigmoid(SigmoidDirection::Increasing);
        let diffusion = TechnologyDiffusion {
            share_by: params.evaluate(2015),
            share_ey: params.evaluate(2030),
            l_value: 1.0,
            switch_year: 2030,
            market_entry: 2000,
            national: Trajectory::Sigmoid(params),
            regional: IndexMap::new(),
        };

        let at_switch_year = diffusion.service_share(2030, None, 0.0).unwrap();
        assert_eq!(diffusion.service_share(2050, None, 0.0).unwrap(), at_switch_year);
        assert!(params.evaluate(2050) > at_switch_year.value());
    }

    /// A service switch reduces the gas boiler's share from 0.6 to 0.2 by 2050
    #[rstest]
    fn test_run_shrinking_technology(mut model: Model) {
        model.switches = SwitchSet {
            service: vec![service_switch("boiler_gas", 0.2)],
            ..Default::default()
        };
        let results = DiffusionEngine::new(&model).run().unwrap();

        let share = |year| {
            results
                .get_service_share("boiler_gas", "space_heating", year, None)
                .unwrap()
                .value()
        };
        assert_approx_eq!(f64, share(2015), 0.6, epsilon = 1e-10);
        assert_approx_eq!(f64, share(2050), 0.2, epsilon = 1e-10);
        assert!(share(2030) < share(2020));

        // The gas boiler makes way for the electric storage heater, which diffuses linearly
        let diffusion = &results.end_uses["space_heating"].technologies["boiler_gas"];
        assert_eq!(diffusion.national.label(), "remainder");
        let storage = &results.end_uses["space_heating"].technologies["storage_heater"];
        assert_eq!(storage.national.label(), "linear");
        assert_approx_eq!(f64, storage.share_ey, 0.8, epsilon = 1e-10);
    }

    /// A small share falling slightly needs no curve of its own
    #[rstest]
    fn test_run_small_share_shrinking(mut model: Model) {
        let fuel = &mut model.base_fuel["space_heating"];
        fuel.fuel[FuelType::Gas] = Energy(10.0);
        fuel.fuel[FuelType::Electricity] = Energy(81.0);
        model.switches = SwitchSet {
            service: vec![service_switch("storage_heater", 0.95)],
            ..Default::default()
        };
        let results = DiffusionEngine::new(&model).run().unwrap();

        let share = |year| {
            results
                .get_service_share("boiler_gas", "space_heating", year, None)
                .unwrap()
                .value()
        };
        assert_approx_eq!(f64, share(2015), 0.1, epsilon = 1e-10);
        assert_approx_eq!(f64, share(2050), 0.05, epsilon = 1e-10);
    }

    #[rstest]
    fn test_run_no_switches_constant(model: Model) {
        let results = DiffusionEngine::new(&model).run().unwrap();
        let technologies = &results.end_uses["space_heating"].technologies;
        assert!(
            technologies
                .values()
                .all(|diffusion| diffusion.national.label() == "constant")
        );
        assert_approx_eq!(
            f64,
            results
                .get_service_share("boiler_gas", "space_heating", 2040, None)
                .unwrap()
                .value(),
            0.6,
            epsilon = 1e-10
        );
    }

    /// Linear and sigmoid growth alike leave the shares of the end-use summing to one
    #[rstest]
    #[case(0.2)]
    #[case(0.9)]
    fn test_run_shares_sum_to_one_every_year(mut model: Model, #[case] boiler_share: f64) {
        model.switches = SwitchSet {
            service: vec![service_switch("boiler_gas", boiler_share)],
            ..Default::default()
        };
        let results = DiffusionEngine::new(&model).run().unwrap();

        for year in 2015..=2050 {
            let total: f64 = ["boiler_gas", "storage_heater"]
                .into_iter()
                .map(|id| {
                    results
                        .get_service_share(id, "space_heating", year, None)
                        .unwrap()
                        .value()
                })
                .sum();
            assert_approx_eq!(f64, total, 1.0, epsilon = 1e-4);
        }
    }

    #[rstest]
    fn test_run_fit_failure(mut model: Model) {
        model.parameters.sigmoid.start_values = Some(vec![1000.0]);
        model.parameters.sigmoid.max_iterations = 1;
        model.switches = SwitchSet {
            service: vec![service_switch("boiler_gas", 0.9)],
            ..Default::default()
        };

        let err = DiffusionEngine::new(&model).run().unwrap_err();
        assert!(err.chain().any(|cause| matches!(
            cause.downcast_ref::<DiffusionError>(),
            Some(DiffusionError::DiffusionFitFailure { attempts: 1, .. })
        )));
    }

    fn spatial_model(mut model: Model, speed: f64, covariates: [f64; 2], demand: [f64; 2]) -> Model {
        model.parameters.spatial = Some(SpatialConfig {
            speed_at_congruence_one: speed,
            low_congruence_means_fast: false,
            outlier_percent: 0.0,
            tolerance: 0.01,
        });
        model.regions = indexmap! {
            "north".into() => Region {
                id: "north".into(),
                description: "North".into(),
                covariate: covariates[0],
            },
            "south".into() => Region {
                id: "south".into(),
                description: "South".into(),
                covariate: covariates[1],
            },
        };
        model.regional_demand = indexmap! {
            "space_heating".into() => indexmap! {
                "north".into() => Dimensionless(demand[0]),
                "south".into() => Dimensionless(demand[1]),
            }
        };
        model
    }

    #[rstest]
    fn test_run_spatial(model: Model) {
        let mut model = spatial_model(model, 2.0, [50.0, 100.0], [0.4, 0.6]);
        model.switches = SwitchSet {
            service: vec![service_switch("boiler_gas", 0.2)],
            ..Default::default()
        };

        let results = DiffusionEngine::new(&model).run().unwrap();
        let diffusion = &results.end_uses["space_heating"].technologies["boiler_gas"];
        assert_eq!(diffusion.regional.len(), 2);

        // The faster region moves further from the base-year share
        let north = diffusion.regional["north"].share_ey;
        let south = diffusion.regional["south"].share_ey;
        assert!(south < north);
        assert_approx_eq!(f64, 0.4 * north + 0.6 * south, 0.2, epsilon = 0.01);

        let share = |id, year, region| {
            results
                .get_service_share(id, "space_heating", year, Some(region))
                .unwrap()
                .value()
        };
        assert_approx_eq!(f64, share("boiler_gas", 2015, "south"), 0.6, epsilon = 1e-10);
        for year in 2015..=2050 {
            for region in ["north", "south"] {
                let total = share("boiler_gas", year, region) + share("storage_heater", year, region);
                assert_approx_eq!(f64, total, 1.0, epsilon = 1e-10);
            }
        }
        assert_eq!(results.total_lost_demand(), 0.0);
    }

    /// A region allocated more than the L-value is capped and its excess counted as lost demand
    #[rstest]
    fn test_run_spatial_capped_at_l_value(model: Model) {
        let mut model = spatial_model(model, 3.0, [10.0, 100.0], [0.5, 0.5]);
        model.switches = SwitchSet {
            service: vec![ServiceSwitch {
                max_share: Some(Dimensionless(0.7)),
                ..service_switch("heat_pump_ASHP", 0.6)
            }],
            ..Default::default()
        };

        let results = DiffusionEngine::new(&model).run().unwrap();
        let diffusion = &results.end_uses["space_heating"].technologies["heat_pump_ASHP"];
        assert_eq!(diffusion.regional["south"].share_ey, 0.7);
        let expected_lost = (0.6 * 3.0 / 2.1 - 0.7) * 0.5;
        assert_approx_eq!(
            f64,
            results.total_lost_demand(),
            expected_lost,
            epsilon = 1e-10
        );

        let share = |region| {
            results
                .get_service_share("heat_pump_ASHP", "space_heating", 2050, Some(region))
                .unwrap()
                .value()
        };
        assert_approx_eq!(
            f64,
            0.5 * share("north") + 0.5 * share("south") + results.total_lost_demand(),
            0.6,
            epsilon = 0.01
        );
    }

    #[rstest]
    fn test_run_spatial_missing_demand(mut model: Model) {
        model.parameters.spatial = Some(SpatialConfig {
            speed_at_congruence_one: 2.0,
            low_congruence_means_fast: false,
            outlier_percent: 0.0,
            tolerance: 0.01,
        });
        model.regions = indexmap! {
            "north".into() => Region {
                id: "north".into(),
                description: "North".into(),
                covariate: 50.0,
            },
        };

        let err = DiffusionEngine::new(&model).run().unwrap_err();
        assert!(err.chain().any(|cause| matches!(
            cause.downcast_ref::<DiffusionError>(),
            Some(DiffusionError::MissingRegionalDemand { .. })
        )));
    }

    #[rstest]
    fn test_get_service_share_unknown(model: Model) {
        let results = DiffusionEngine::new(&model).run().unwrap();
        assert_error!(
            results.get_service_share("boiler_gas", "lighting", 2020, None),
            "Unknown end-use lighting"
        );
        assert_error!(
            results.get_service_share("boiler_oil", "space_heating", 2020, None),
            "Technology boiler_oil is not used in end-use space_heating"
        );
    }
}
