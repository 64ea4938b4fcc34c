//! Technologies are the end-use devices (boilers, heat pumps, lighting etc.) which compete to
//! deliver the energy service of an end-use.
use crate::fuel::FuelType;
use crate::id::{define_id_getter, define_id_type};
use crate::units::Dimensionless;
use anyhow::{Context, Result, ensure};
use indexmap::{Equivalent, IndexMap};
use serde_string_enum::DeserializeLabeledStringEnum;
use std::hash::Hash;

define_id_type! {TechnologyID}

/// A map of [`Technology`]s, keyed by technology ID
pub type TechnologyMap = IndexMap<TechnologyID, Technology>;

/// Broad category of a technology, which determines how its efficiency is calculated
#[derive(PartialEq, Eq, Clone, Copy, Debug, DeserializeLabeledStringEnum)]
pub enum TechnologyCategory {
    /// Efficiency interpolated between base-year and end-year values
    #[string = "regular"]
    Regular,
    /// Efficiency depends on the temperature difference between source and sink
    #[string = "heat_pump"]
    HeatPump,
    /// A blend of two sub-technologies (typically a boiler and a heat pump)
    #[string = "hybrid"]
    Hybrid,
    /// Placeholder technology for end-uses without explicit technologies
    #[string = "dummy"]
    Dummy,
    /// Night storage heaters
    #[string = "storage_heating"]
    StorageHeating,
    /// Secondary (supplementary) heating
    #[string = "secondary_heating"]
    SecondaryHeating,
}

/// How a value changes between the base year and the year it reaches its end value
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default, DeserializeLabeledStringEnum)]
pub enum DiffusionMethod {
    /// Straight line between the two points
    #[default]
    #[string = "linear"]
    Linear,
    /// S-shaped curve between the two points
    #[string = "sigmoid"]
    Sigmoid,
}

/// The two sub-technologies of a hybrid technology
#[derive(PartialEq, Clone, Debug)]
pub struct HybridSplit {
    /// Sub-technology serving the low-temperature share (usually a heat pump)
    pub low: TechnologyID,
    /// Sub-technology serving the high-temperature share (usually a boiler)
    pub high: TechnologyID,
    /// Share of the service delivered by the low-temperature sub-technology
    pub share_low: Dimensionless,
}

/// An end-use technology
#[derive(PartialEq, Clone, Debug)]
pub struct Technology {
    /// Unique identifier (e.g. "boiler_gas")
    pub id: TechnologyID,
    /// The fuel consumed by the technology
    pub fuel_type: FuelType,
    /// The technology's category
    pub category: TechnologyCategory,
    /// Efficiency in the base year.
    ///
    /// For heat pumps this is the efficiency at the reference temperature difference.
    pub eff_by: Dimensionless,
    /// Theoretical efficiency reached by `eff_ey_year`
    pub eff_ey: Dimensionless,
    /// Year in which `eff_ey` is reached
    pub eff_ey_year: u32,
    /// Fraction (0 to 1) of the theoretical efficiency gain which is actually achieved
    pub eff_achieved: Dimensionless,
    /// How both efficiency and market share change over time
    pub diff_method: DiffusionMethod,
    /// First year in which the technology can have a non-zero service share
    pub market_entry: u32,
    /// Maximum theoretical service share (0 to 1)
    pub max_share: Dimensionless,
    /// Sub-technologies, for hybrid technologies only
    pub hybrid: Option<HybridSplit>,
}
define_id_getter! {Technology, TechnologyID}

impl Technology {
    /// Whether the technology may hold a non-zero service share in the given year
    pub fn is_on_market(&self, year: u32) -> bool {
        year >= self.market_entry
    }
}

/// The registry of all technologies for a scenario.
///
/// Once constructed the catalog is read-only. Changing the achieved-efficiency factor produces a
/// new catalog.
#[derive(PartialEq, Clone, Debug, Default)]
pub struct TechnologyCatalog(TechnologyMap);

impl TechnologyCatalog {
    /// Create a new catalog, checking that the technologies are valid
    pub fn new(technologies: TechnologyMap) -> Result<Self> {
        for technology in technologies.values() {
            check_technology(technology, &technologies)
                .with_context(|| format!("Invalid technology {}", technology.id))?;
        }

        Ok(Self(technologies))
    }

    /// Get a technology by its ID
    pub fn get<Q>(&self, id: &Q) -> Option<&Technology>
    where
        Q: ?Sized + Hash + Equivalent<TechnologyID>,
    {
        self.0.get(id)
    }

    /// Whether the catalog contains the given technology
    pub fn contains<Q>(&self, id: &Q) -> bool
    where
        Q: ?Sized + Hash + Equivalent<TechnologyID>,
    {
        self.0.contains_key(id)
    }

    /// Iterate over the technologies
    pub fn iter(&self) -> impl Iterator<Item = &Technology> {
        self.0.values()
    }

    /// Return a copy of the catalog with the achieved-efficiency factor of every technology set to
    /// `factor`.
    ///
    /// This is the only transformation the catalog undergoes and it must happen before any service
    /// shares are calculated.
    pub fn with_achieved_efficiency(&self, factor: Dimensionless) -> Result<Self> {
        ensure!(
            (0.0..=1.0).contains(&factor.value()),
            "Achieved-efficiency factor must be between 0 and 1 (got {factor})"
        );

        let technologies = self
            .0
            .iter()
            .map(|(id, technology)| {
                let technology = Technology {
                    eff_achieved: factor,
                    ..technology.clone()
                };
                (id.clone(), technology)
            })
            .collect();

        Ok(Self(technologies))
    }
}

/// Check a single technology against the rest of the catalog
fn check_technology(technology: &Technology, technologies: &TechnologyMap) -> Result<()> {
    for (name, value) in [("eff_by", technology.eff_by), ("eff_ey", technology.eff_ey)] {
        ensure!(
            value.is_finite() && value >= Dimensionless(0.0),
            "{name} must be a finite, non-negative number"
        );
    }
    ensure!(
        (0.0..=1.0).contains(&technology.eff_achieved.value()),
        "eff_achieved must be between 0 and 1"
    );
    ensure!(
        technology.max_share > Dimensionless(0.0) && technology.max_share <= Dimensionless(1.0),
        "max_share must be greater than 0 and at most 1"
    );

    match (&technology.category, &technology.hybrid) {
        (TechnologyCategory::Hybrid, Some(split)) => {
            ensure!(
                (0.0..=1.0).contains(&split.share_low.value()),
                "share_low must be between 0 and 1"
            );
            for sub_id in [&split.low, &split.high] {
                let sub = technologies
                    .get(sub_id)
                    .with_context(|| format!("Unknown sub-technology {sub_id}"))?;
                ensure!(
                    sub.category != TechnologyCategory::Hybrid,
                    "Sub-technology {sub_id} cannot itself be a hybrid"
                );
            }
        }
        (TechnologyCategory::Hybrid, None) => {
            anyhow::bail!("Hybrid technologies must define their sub-technologies")
        }
        (_, Some(_)) => anyhow::bail!("Only hybrid technologies can define sub-technologies"),
        (_, None) => {}
    }

    Ok(())
}
