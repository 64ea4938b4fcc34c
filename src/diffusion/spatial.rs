//! Spreading a national diffusion trajectory unevenly across regions.
//!
//! Each region gets a diffusion index derived from a covariate (e.g. population density). The
//! national change in a technology's share is then scaled by the index in every region, normalised
//! so that the demand-weighted regional shares reproduce the national share.
use crate::end_use::EndUseID;
use crate::error::DiffusionError;
use crate::model::SpatialConfig;
use crate::region::{RegionID, RegionMap};
use crate::technology::TechnologyID;
use crate::units::Dimensionless;
use indexmap::IndexMap;
use log::warn;

/// The relative speed of adoption in each region (1 is the slowest)
pub type DiffusionIndex = IndexMap<RegionID, f64>;

/// National shares of one technology, to be spread across regions
#[derive(PartialEq, Debug, Clone, Copy)]
pub struct NationalShares {
    /// National base-year share, which every region starts from
    pub share_by: f64,
    /// National end-year share
    pub share_ey: f64,
    /// No region may hold more than this share
    pub l_value: f64,
}

/// End-year shares of one technology in every region
#[derive(PartialEq, Debug, Clone, Default)]
pub struct RegionalShares {
    /// End-year share in each region, after capping
    pub shares: IndexMap<RegionID, f64>,
    /// Demand lost to capping in each region, weighted by the region's demand share.
    ///
    /// Regions which did not need capping have no entry.
    pub lost_demand: IndexMap<RegionID, f64>,
}

/// A region's demand share and diffusion index
type RegionWeight<'a> = (&'a RegionID, f64, f64);

/// Linearly interpolated percentile of sorted values
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn percentile(sorted: &[f64], percent: f64) -> f64 {
    let rank = percent / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    sorted[lower] + (sorted[upper] - sorted[lower]) * (rank - lower as f64)
}

/// Calculate the congruence value (0 to 1) of every region.
///
/// Covariates beyond the outlier percentiles are clamped to the percentile values first.
fn congruence_values(regions: &RegionMap, config: &SpatialConfig) -> IndexMap<RegionID, f64> {
    if regions.is_empty() {
        return IndexMap::new();
    }

    let mut sorted: Vec<f64> = regions.values().map(|region| region.covariate).collect();
    sorted.sort_by(f64::total_cmp);
    let low = percentile(&sorted, config.outlier_percent);
    let high = percentile(&sorted, 100.0 - config.outlier_percent);

    let clamped: IndexMap<_, _> = regions
        .values()
        .map(|region| (region.id.clone(), region.covariate.clamp(low, high)))
        .collect();
    let max = clamped.values().copied().fold(f64::MIN, f64::max);

    clamped
        .into_iter()
        .map(|(id, covariate)| {
            let congruence = if max > 0.0 { covariate / max } else { 0.0 };
            let congruence = if config.low_congruence_means_fast {
                1.0 - congruence
            } else {
                congruence
            };
            (id, congruence)
        })
        .collect()
}

/// Calculate the diffusion index of every region.
///
/// The index blends linearly between 1 (congruence of zero) and `speed_at_congruence_one`.
#[allow(clippy::float_cmp)]
pub fn allocate(regions: &RegionMap, config: &SpatialConfig) -> DiffusionIndex {
    if config.speed_at_congruence_one == 1.0 {
        return regions.keys().map(|id| (id.clone(), 1.0)).collect();
    }

    congruence_values(regions, config)
        .into_iter()
        .map(|(id, congruence)| {
            let index = (1.0 - congruence) + congruence * config.speed_at_congruence_one;
            (id, index)
        })
        .collect()
}

/// Allocate the end-year share of a technology across regions.
///
/// Every region starts from the national base-year share, and regions with a higher diffusion index
/// move further from it. Either way, the demand-weighted sum of the regional shares plus any lost
/// demand must reproduce the national end-year share.
///
/// A gain is scaled in each region by `index / Σ(demand * index)`. Shares above the L-value are then
/// capped and the excess is recorded as lost demand rather than moved to other regions.
///
/// A loss is scaled the same way, except that no region can lose more than its whole share. What a
/// region cannot lose is spread over the regions which still have some share left.
///
/// # Arguments
///
/// * `end_use` - The end-use of the technology
/// * `technology` - The technology being allocated
/// * `national` - National shares and L-value of the technology
/// * `index` - Diffusion index of every region
/// * `demand` - Each region's share of national demand for the end-use
/// * `tolerance` - Allowed difference between the weighted regional shares and `share_ey`
pub fn regional_end_year_shares(
    end_use: &EndUseID,
    technology: &TechnologyID,
    national: &NationalShares,
    index: &DiffusionIndex,
    demand: &IndexMap<RegionID, Dimensionless>,
    tolerance: f64,
) -> Result<RegionalShares, DiffusionError> {
    let mut weights = Vec::with_capacity(index.len());
    for (region_id, region_index) in index {
        let demand_share =
            demand
                .get(region_id)
                .ok_or_else(|| DiffusionError::MissingRegionalDemand {
                    end_use: end_use.to_string(),
                    region: region_id.to_string(),
                })?;
        weights.push((region_id, demand_share.value(), *region_index));
    }

    let result = if national.share_ey >= national.share_by {
        allocate_gain(end_use, technology, national, &weights)
    } else {
        RegionalShares {
            shares: allocate_loss(national, &weights),
            lost_demand: IndexMap::new(),
        }
    };

    let regional = weights
        .iter()
        .map(|(region_id, demand, _)| demand * result.shares[*region_id])
        .sum::<f64>()
        + result.lost_demand.values().sum::<f64>();
    if (regional - national.share_ey).abs() > tolerance {
        return Err(DiffusionError::SpatialNormalizationViolation {
            end_use: end_use.to_string(),
            technology: technology.to_string(),
            regional,
            national: national.share_ey,
        });
    }

    Ok(result)
}

/// Spread a national gain across regions, capping every region at the L-value
fn allocate_gain(
    end_use: &EndUseID,
    technology: &TechnologyID,
    national: &NationalShares,
    weights: &[RegionWeight],
) -> RegionalShares {
    let weighted_index: f64 = weights.iter().map(|(_, demand, index)| demand * index).sum();
    let gain = national.share_ey - national.share_by;

    let mut result = RegionalShares::default();
    for (region_id, demand, index) in weights {
        let share = if weighted_index > 0.0 {
            national.share_by + gain * index / weighted_index
        } else {
            national.share_ey
        };

        let capped = share.min(national.l_value);
        if share > capped {
            let lost = (share - capped) * demand;
            warn!(
                "Share of technology {technology} in region {region_id} (end-use {end_use}) capped \
                from {share} to {capped}; {lost} of national demand is lost"
            );
            result.lost_demand.insert((*region_id).clone(), lost);
        }
        result.shares.insert((*region_id).clone(), capped);
    }

    result
}

/// Spread a national loss across regions without taking any region below zero
fn allocate_loss(national: &NationalShares, weights: &[RegionWeight]) -> IndexMap<RegionID, f64> {
    let share_by = national.share_by;
    let loss = share_by - national.share_ey;
    let mut losses = vec![0.0; weights.len()];
    let mut emptied = vec![false; weights.len()];

    // Each pass either empties at least one more region or settles the allocation
    loop {
        let mut weighted_index = 0.0;
        let mut emptied_loss = 0.0;
        for ((_, demand, index), is_emptied) in weights.iter().zip(&emptied) {
            if *is_emptied {
                emptied_loss += demand * share_by;
            } else {
                weighted_index += demand * index;
            }
        }
        if weighted_index <= 0.0 {
            break;
        }

        let remaining = loss - emptied_loss;
        let mut settled = true;
        for (i, (_, _, index)) in weights.iter().enumerate() {
            if emptied[i] {
                continue;
            }

            losses[i] = remaining * index / weighted_index;
            if losses[i] > share_by {
                losses[i] = share_by;
                emptied[i] = true;
                settled = false;
            }
        }

        if settled {
            break;
        }
    }

    weights
        .iter()
        .zip(losses)
        .map(|((region_id, _, _), loss)| ((*region_id).clone(), share_by - loss))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::Region;
    use float_cmp::assert_approx_eq;
    use indexmap::indexmap;
    use rstest::{fixture, rstest};

    fn regions(covariates: &[f64]) -> RegionMap {
        covariates
            .iter()
            .enumerate()
            .map(|(i, covariate)| {
                let id: RegionID = format!("R{i}").into();
                let region = Region {
                    id: id.clone(),
                    description: format!("Region {i}"),
                    covariate: *covariate,
                };
                (id, region)
            })
            .collect()
    }

    fn even_demand(regions: &RegionMap) -> IndexMap<RegionID, Dimensionless> {
        let share = 1.0 / regions.len() as f64;
        regions
            .keys()
            .map(|id| (id.clone(), Dimensionless(share)))
            .collect()
    }

    #[fixture]
    fn config() -> SpatialConfig {
        SpatialConfig {
            speed_at_congruence_one: 3.0,
            low_congruence_means_fast: false,
            outlier_percent: 0.0,
            tolerance: 0.01,
        }
    }

    #[rstest]
    #[case(0.0, 1.0)]
    #[case(50.0, 3.0)]
    #[case(100.0, 5.0)]
    #[case(25.0, 2.0)]
    fn test_percentile(#[case] percent: f64, #[case] expected: f64) {
        assert_approx_eq!(f64, percentile(&[1.0, 2.0, 3.0, 4.0, 5.0], percent), expected);
    }

    /// With a speed of one there is no spatial heterogeneity
    #[rstest]
    fn test_allocate_speed_one(mut config: SpatialConfig) {
        config.speed_at_congruence_one = 1.0;
        let regions = regions(&[0.0, 3.5, 1000.0, -2.0]);
        let index = allocate(&regions, &config);
        assert_eq!(index.len(), 4);
        assert!(index.values().all(|value| *value == 1.0));
    }

    #[rstest]
    fn test_allocate(config: SpatialConfig) {
        let index = allocate(&regions(&[10.0, 40.0]), &config);
        assert_approx_eq!(f64, index["R0"], 1.5);
        assert_approx_eq!(f64, index["R1"], 3.0);
    }

    #[rstest]
    fn test_allocate_low_congruence_means_fast(mut config: SpatialConfig) {
        config.low_congruence_means_fast = true;
        let index = allocate(&regions(&[10.0, 40.0]), &config);
        assert_approx_eq!(f64, index["R0"], 2.5);
        assert_approx_eq!(f64, index["R1"], 1.0);
    }

    #[rstest]
    fn test_allocate_outliers_clamped(mut config: SpatialConfig) {
        config.outlier_percent = 25.0;
        let index = allocate(&regions(&[0.0, 10.0, 20.0, 30.0, 1000.0]), &config);

        // Covariates are clamped to 10 and 30
        assert_approx_eq!(f64, index["R0"], index["R1"]);
        assert_approx_eq!(f64, index["R4"], 3.0);
        assert_approx_eq!(f64, index["R3"], 3.0);
        assert_eq!(index.len(), 5);
    }

    #[rstest]
    fn test_allocate_zero_covariates(config: SpatialConfig) {
        let index = allocate(&regions(&[0.0, 0.0]), &config);
        assert!(index.values().all(|value| *value == 1.0));
    }

    fn national(share_by: f64, share_ey: f64) -> NationalShares {
        NationalShares {
            share_by,
            share_ey,
            l_value: 1.0,
        }
    }

    fn demand_map(regions: &RegionMap, demand_shares: &[f64]) -> IndexMap<RegionID, Dimensionless> {
        regions
            .keys()
            .zip(demand_shares)
            .map(|(id, share)| (id.clone(), Dimensionless(*share)))
            .collect()
    }

    #[rstest]
    fn test_regional_shares_two_regions(config: SpatialConfig) {
        let regions = regions(&[10.0, 40.0]);
        let index = allocate(&regions, &config);
        let shares = regional_end_year_shares(
            &"space_heating".into(),
            &"heat_pump_ASHP".into(),
            &national(0.1, 0.4),
            &index,
            &even_demand(&regions),
            config.tolerance,
        )
        .unwrap();

        assert_approx_eq!(f64, shares.shares["R0"], 0.3, epsilon = 1e-10);
        assert_approx_eq!(f64, shares.shares["R1"], 0.5, epsilon = 1e-10);
        assert_approx_eq!(
            f64,
            0.5 * shares.shares["R0"] + 0.5 * shares.shares["R1"],
            0.4,
            epsilon = 1e-10
        );
        assert!(shares.lost_demand.is_empty());
    }

    /// Demand-weighted regional shares reproduce the national share for arbitrary covariates
    #[rstest]
    #[case(&[1.0, 2.0, 3.0], &[0.2, 0.3, 0.5])]
    #[case(&[1e-3, 500.0, 12.0, 7.5], &[0.1, 0.1, 0.4, 0.4])]
    #[case(&[5.0], &[1.0])]
    fn test_regional_shares_conservation(
        config: SpatialConfig,
        #[case] covariates: &[f64],
        #[case] demand_shares: &[f64],
    ) {
        let regions = regions(covariates);
        let demand = demand_map(&regions, demand_shares);
        let index = allocate(&regions, &config);

        for (share_by, share_ey) in [(0.1, 0.4), (0.6, 0.2), (0.0, 0.05), (0.3, 0.0)] {
            let shares = regional_end_year_shares(
                &"space_heating".into(),
                &"heat_pump_ASHP".into(),
                &national(share_by, share_ey),
                &index,
                &demand,
                config.tolerance,
            )
            .unwrap();
            assert!(shares.lost_demand.is_empty());
            assert!(
                shares
                    .shares
                    .values()
                    .all(|share| (0.0..=1.0).contains(share))
            );
            let weighted: f64 = shares
                .shares
                .iter()
                .map(|(id, share)| demand[id].value() * share)
                .sum();
            assert_approx_eq!(f64, weighted, share_ey, epsilon = 0.01);
        }
    }

    /// A region which would lose more than its whole share is emptied and the rest of its loss
    /// falls on the other regions
    #[rstest]
    fn test_regional_shares_loss_never_negative(config: SpatialConfig) {
        let regions = regions(&[1e-3, 500.0, 12.0, 7.5]);
        let demand = demand_map(&regions, &[0.1, 0.1, 0.4, 0.4]);
        let index = allocate(&regions, &config);
        let shares = regional_end_year_shares(
            &"space_heating".into(),
            &"boiler_gas".into(),
            &national(0.6, 0.2),
            &index,
            &demand,
            config.tolerance,
        )
        .unwrap();

        // R1 has the highest index, so it would lose 0.4 * 3 / 1.23 > 0.6 without a floor
        assert_eq!(shares.shares["R1"], 0.0);
        assert!(shares.shares["R0"] > shares.shares["R3"]);
        assert!(shares.shares["R3"] > shares.shares["R2"]);
        assert!(shares.shares["R2"] > 0.0);
        let weighted: f64 = shares
            .shares
            .iter()
            .map(|(id, share)| demand[id].value() * share)
            .sum();
        assert_approx_eq!(f64, weighted, 0.2, epsilon = 1e-10);
    }

    #[rstest]
    fn test_regional_shares_capped(mut config: SpatialConfig) {
        config.speed_at_congruence_one = 10.0;
        let regions = regions(&[0.0, 100.0]);
        let index = allocate(&regions, &config);
        let demand = indexmap! {
            "R0".into() => Dimensionless(0.9),
            "R1".into() => Dimensionless(0.1),
        };
        let shares = regional_end_year_shares(
            &"space_heating".into(),
            &"heat_pump_ASHP".into(),
            &national(0.0, 0.5),
            &index,
            &demand,
            config.tolerance,
        )
        .unwrap();

        // Weighted index = 0.9 + 1.0 = 1.9, so R1 gets 0.5 * 10 / 1.9 = 2.63
        assert_eq!(shares.shares["R1"], 1.0);
        let expected_lost = (0.5 * 10.0 / 1.9 - 1.0) * 0.1;
        assert_approx_eq!(f64, shares.lost_demand["R1"], expected_lost, epsilon = 1e-10);
        assert!(!shares.lost_demand.contains_key("R0"));
    }

    /// Regional shares are capped at the L-value, with the excess recorded as lost demand
    #[rstest]
    fn test_regional_shares_capped_at_l_value(config: SpatialConfig) {
        let regions = regions(&[10.0, 100.0]);
        let index = allocate(&regions, &config);
        let shares = regional_end_year_shares(
            &"space_heating".into(),
            &"heat_pump_ASHP".into(),
            &NationalShares {
                share_by: 0.0,
                share_ey: 0.6,
                l_value: 0.7,
            },
            &index,
            &even_demand(&regions),
            config.tolerance,
        )
        .unwrap();

        // Indices are 1.2 and 3, so the uncapped shares are 0.6 * 1.2 / 2.1 and 0.6 * 3 / 2.1
        assert_approx_eq!(f64, shares.shares["R0"], 0.6 * 1.2 / 2.1, epsilon = 1e-10);
        assert_eq!(shares.shares["R1"], 0.7);
        let expected_lost = (0.6 * 3.0 / 2.1 - 0.7) * 0.5;
        assert_approx_eq!(f64, shares.lost_demand["R1"], expected_lost, epsilon = 1e-10);
        assert_approx_eq!(
            f64,
            0.5 * shares.shares["R0"] + 0.5 * shares.shares["R1"] + expected_lost,
            0.6,
            epsilon = 1e-10
        );
    }

    #[rstest]
    fn test_regional_shares_normalization_violation(config: SpatialConfig) {
        let regions = regions(&[10.0, 40.0]);
        let index = allocate(&regions, &config);

        // Demand shares which don't sum to one can't reproduce the national share
        let demand = indexmap! {
            "R0".into() => Dimensionless(0.5),
            "R1".into() => Dimensionless(0.3),
        };
        let result = regional_end_year_shares(
            &"space_heating".into(),
            &"heat_pump_ASHP".into(),
            &national(0.5, 0.6),
            &index,
            &demand,
            config.tolerance,
        );
        assert!(matches!(
            result,
            Err(DiffusionError::SpatialNormalizationViolation { .. })
        ));
    }

    #[rstest]
    fn test_regional_shares_missing_demand(config: SpatialConfig) {
        let regions = regions(&[10.0, 40.0]);
        let index = allocate(&regions, &config);
        let demand = indexmap! {"R0".into() => Dimensionless(1.0)};
        let result = regional_end_year_shares(
            &"space_heating".into(),
            &"heat_pump_ASHP".into(),
            &national(0.1, 0.4),
            &index,
            &demand,
            config.tolerance,
        );
        assert_eq!(
            result,
            Err(DiffusionError::MissingRegionalDemand {
                end_use: "space_heating".into(),
                region: "R1".into()
            })
        );
    }
}
