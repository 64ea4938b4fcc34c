//! Common functionality for techshare, a model of how end-use energy technologies diffuse into
//! the market between a base year and a future year.
#![warn(missing_docs)]
pub mod cli;
pub mod diffusion;
pub mod efficiency;
pub mod end_use;
pub mod error;
pub mod fuel;
pub mod id;
pub mod input;
pub mod log;
pub mod model;
pub mod output;
pub mod region;
pub mod service;
pub mod settings;
pub mod switch;
pub mod technology;
pub mod units;

#[cfg(test)]
mod fixture;
