//! Errors raised while resolving and fitting technology diffusion.
//!
//! All of these indicate invalid scenario data. None of them can be recovered from: either every
//! technology of an end-use gets a valid trajectory or the scenario fails to initialise.
//!
//! IDs are stored as plain strings so that the errors can cross into [`anyhow::Error`].
use crate::fuel::FuelType;
use thiserror::Error;

/// An error raised by the diffusion core
#[derive(Debug, Error, PartialEq)]
pub enum DiffusionError {
    /// Fuel switches and service switches were both given for the same end-use
    #[error(
        "Both fuel switches and service switches are defined for end-use {end_use}; only one kind \
        of switch may be used per end-use"
    )]
    ConflictingSwitchKind {
        /// The end-use with conflicting switches
        end_use: String,
    },
    /// A switch refers to a technology which is not in the catalog
    #[error("Switch for end-use {end_use} refers to unknown technology {technology}")]
    UnknownTechnology {
        /// The end-use of the switch
        end_use: String,
        /// The unknown technology
        technology: String,
    },
    /// Fuel switches displace more than the whole of a fuel type
    #[error(
        "Fuel switches for end-use {end_use} displace {total} of fuel type {fuel_type}, which is \
        more than 1.0"
    )]
    OverAllocatedFuelSwitch {
        /// The end-use of the switches
        end_use: String,
        /// The over-allocated fuel type
        fuel_type: FuelType,
        /// The sum of the switched fractions
        total: f64,
    },
    /// Resolved end-year service shares do not sum to 1
    #[error("End-year service shares for end-use {end_use} sum to {total} instead of 1.0")]
    OverAllocatedServiceShare {
        /// The end-use whose shares are unbalanced
        end_use: String,
        /// The sum of the resolved shares
        total: f64,
    },
    /// The end-year target of a technology is larger than its maximum theoretical share
    #[error(
        "End-year service share {target} of technology {technology} (end-use {end_use}) is larger \
        than its maximum share {l_value}"
    )]
    TargetExceedsMaximumShare {
        /// The end-use of the technology
        end_use: String,
        /// The technology
        technology: String,
        /// The resolved end-year target share
        target: f64,
        /// The maximum theoretical share
        l_value: f64,
    },
    /// A switch record holds a value that cannot be used
    #[error("Invalid switch for end-use {end_use} and technology {technology}: {message}")]
    InvalidSwitch {
        /// The end-use of the switch
        end_use: String,
        /// The technology installed by the switch
        technology: String,
        /// What is wrong with the switch
        message: String,
    },
    /// No candidate start parameters produced an acceptable sigmoid fit
    #[error(
        "Could not fit diffusion curve for technology {technology} (end-use {end_use}) after \
        {attempts} attempts; last rejected parameters: {last_rejected:?}"
    )]
    DiffusionFitFailure {
        /// The end-use of the technology
        end_use: String,
        /// The technology which could not be fitted
        technology: String,
        /// The number of fits attempted
        attempts: usize,
        /// The last rejected (midpoint, steepness) pair, if the optimiser produced one
        last_rejected: Option<(f64, f64)>,
    },
    /// Regional shares, weighted by demand, do not reproduce the national share
    #[error(
        "Regional shares of technology {technology} (end-use {end_use}) weighted by demand give \
        {regional}, but the national share is {national}"
    )]
    SpatialNormalizationViolation {
        /// The end-use of the technology
        end_use: String,
        /// The technology being allocated
        technology: String,
        /// The demand-weighted sum of regional shares
        regional: f64,
        /// The national target share
        national: f64,
    },
    /// No demand share was given for a region
    #[error("No demand share given for region {region} and end-use {end_use}")]
    MissingRegionalDemand {
        /// The end-use lacking demand data
        end_use: String,
        /// The region lacking demand data
        region: String,
    },
    /// Base-year service shares do not sum to 1
    #[error(
        "Base-year service shares for end-use {end_use} ({scope}) sum to {total} instead of 1.0"
    )]
    ServiceShareImbalance {
        /// The end-use whose shares are unbalanced
        end_use: String,
        /// Either a fuel type or "all fuel types"
        scope: String,
        /// The sum of the shares
        total: f64,
    },
}
