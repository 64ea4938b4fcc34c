//! Functions for calculating the efficiency of technologies.
//!
//! Efficiencies change over time between a base-year and an end-year value, either linearly or
//! along a fixed S-curve. Heat pump efficiency additionally depends on the temperature difference
//! between heat source and sink, and hybrid technologies blend the efficiencies of their two
//! sub-technologies.
use crate::technology::{
    DiffusionMethod, Technology, TechnologyCatalog, TechnologyCategory, TechnologyID,
};
use crate::units::Dimensionless;
use anyhow::{Context, Result};
use serde::Deserialize;

/// The transformed year range over which the fixed efficiency S-curve is evaluated
const SIGMOID_X_RANGE: f64 = 6.0;

fn default_slope() -> f64 {
    -0.08
}

fn default_reference_temp_diff() -> f64 {
    10.0
}

/// Linear relationship between heat pump efficiency and temperature difference
#[derive(Debug, Deserialize, PartialEq, Clone, Copy)]
pub struct HeatPumpCurve {
    /// Change in efficiency per degree of temperature difference
    #[serde(default = "default_slope")]
    pub slope: f64,
    /// The temperature difference at which a heat pump's nominal efficiency applies.
    ///
    /// The base-year service calculation evaluates every heat pump at this temperature difference,
    /// rather than using regional climate, so that technology shares are not biased by region.
    #[serde(default = "default_reference_temp_diff")]
    pub reference_temp_diff: f64,
}

impl Default for HeatPumpCurve {
    fn default() -> Self {
        Self {
            slope: default_slope(),
            reference_temp_diff: default_reference_temp_diff(),
        }
    }
}

/// Efficiency of a heat pump at the given temperature difference.
///
/// `efficiency_intersect` is the efficiency at the curve's reference temperature difference.
pub fn heat_pump_efficiency(
    temp_diff: f64,
    efficiency_intersect: Dimensionless,
    curve: &HeatPumpCurve,
) -> Dimensionless {
    let intercept = efficiency_intersect.value() - curve.slope * curve.reference_temp_diff;
    Dimensionless(curve.slope * temp_diff + intercept)
}

/// Position (0 to 1) along a linear path from `start_year` to `end_year`
fn linear_position(start_year: u32, end_year: u32, year: u32) -> f64 {
    if year <= start_year {
        return 0.0;
    }
    if year >= end_year {
        return 1.0;
    }

    (year - start_year) as f64 / (end_year - start_year) as f64
}

/// Position (0 to 1) along a fixed S-curve (midpoint 0, steepness 1) from `start_year` to
/// `end_year`.
///
/// The years are mapped onto the range -6 to 6 before the logistic function is applied.
fn sigmoid_position(start_year: u32, end_year: u32, year: u32) -> f64 {
    if year <= start_year {
        return 0.0;
    }
    if year >= end_year {
        return 1.0;
    }

    let x = -SIGMOID_X_RANGE
        + 2.0 * SIGMOID_X_RANGE * linear_position(start_year, end_year, year);
    1.0 / (1.0 + (-x).exp())
}

/// Efficiency of a technology in a given year, ignoring temperature and hybrid effects.
///
/// Only the achieved fraction of the theoretical improvement from `eff_by` to `eff_ey` is
/// realised.
pub fn regular_efficiency(technology: &Technology, base_year: u32, year: u32) -> Dimensionless {
    let position = match technology.diff_method {
        DiffusionMethod::Linear => linear_position(base_year, technology.eff_ey_year, year),
        DiffusionMethod::Sigmoid => sigmoid_position(base_year, technology.eff_ey_year, year),
    };

    let theoretical_gain = technology.eff_ey - technology.eff_by;
    technology.eff_by + theoretical_gain * Dimensionless(position) * technology.eff_achieved
}

/// Weighted average of the base-year efficiencies of a hybrid's two sub-technologies.
///
/// Heat pump sub-technologies are evaluated at the reference temperature difference.
pub fn hybrid_average_efficiency(
    tech_low: &Technology,
    tech_high: &Technology,
    share_low: Dimensionless,
    curve: &HeatPumpCurve,
) -> Dimensionless {
    let base_efficiency = |technology: &Technology| match technology.category {
        TechnologyCategory::HeatPump => {
            heat_pump_efficiency(curve.reference_temp_diff, technology.eff_by, curve)
        }
        _ => technology.eff_by,
    };

    share_low * base_efficiency(tech_low)
        + (Dimensionless(1.0) - share_low) * base_efficiency(tech_high)
}

/// Calculates efficiencies for the technologies of a catalog
pub struct EfficiencyModel<'a> {
    catalog: &'a TechnologyCatalog,
    base_year: u32,
    curve: HeatPumpCurve,
}

impl<'a> EfficiencyModel<'a> {
    /// Create a new efficiency model for the given catalog
    pub fn new(catalog: &'a TechnologyCatalog, base_year: u32, curve: HeatPumpCurve) -> Self {
        Self {
            catalog,
            base_year,
            curve,
        }
    }

    /// Efficiency of a technology in the base year, as used for the service share calculation
    pub fn base_year_efficiency(&self, technology: &Technology) -> Result<Dimensionless> {
        self.efficiency_in_year(technology, self.base_year)
    }

    /// Efficiency of a technology in any year, at the reference temperature difference
    pub fn efficiency_in_year(&self, technology: &Technology, year: u32) -> Result<Dimensionless> {
        let efficiency = match (technology.category, &technology.hybrid) {
            (TechnologyCategory::Hybrid, Some(split)) => {
                let get_sub = |id: &TechnologyID| {
                    self.catalog
                        .get(id)
                        .with_context(|| format!("Unknown sub-technology {id}"))
                };
                let low = get_sub(&split.low)?;
                let high = get_sub(&split.high)?;

                if year == self.base_year {
                    hybrid_average_efficiency(low, high, split.share_low, &self.curve)
                } else {
                    split.share_low * self.efficiency_in_year(low, year)?
                        + (Dimensionless(1.0) - split.share_low)
                            * self.efficiency_in_year(high, year)?
                }
            }
            (TechnologyCategory::HeatPump, _) => heat_pump_efficiency(
                self.curve.reference_temp_diff,
                regular_efficiency(technology, self.base_year, year),
                &self.curve,
            ),
            _ => regular_efficiency(technology, self.base_year, year),
        };

        Ok(efficiency)
    }
}
