//! End-uses are categories of energy consumption (e.g. space heating, lighting) within which
//! technologies compete for a share of the energy service.
use crate::id::define_id_type;

define_id_type! {EndUseID}
define_id_type! {SectorID}
