//! Regions represent different geographical areas across which technology diffusion can be spread.
use crate::end_use::EndUseID;
use crate::id::{define_id_getter, define_id_type};
use crate::units::Dimensionless;
use indexmap::IndexMap;
use serde::Deserialize;

define_id_type! {RegionID}

/// A map of [`Region`]s, keyed by region ID
pub type RegionMap = IndexMap<RegionID, Region>;

/// Each region's share of national demand for an end-use, keyed by end-use then region.
///
/// For every end-use, the shares across regions sum to one.
pub type RegionalDemandMap = IndexMap<EndUseID, IndexMap<RegionID, Dimensionless>>;

/// Represents a region with an ID, a longer description and a diffusion covariate.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct Region {
    /// A unique identifier for a region (e.g. "E06000001").
    pub id: RegionID,
    /// A text description of the region (e.g. "Hartlepool").
    pub description: String,
    /// The covariate from which the region's speed of adoption is derived (e.g. population
    /// density).
    pub covariate: f64,
}
define_id_getter! {Region, RegionID}
