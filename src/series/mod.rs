//! Time-series data model
//!
//! - **Types**: [`Series`] and its copy-on-write helpers
//! - **Tags**: `name;key=value` tag extraction
//! - **Align**: common-step scaling, window padding, cross-series aggregation
//! - **Consolidate**: max-data-points reduction with start nudging

mod align;
mod consolidate;
mod tags;
mod types;

pub use align::{aggregate_series, align_series, common_tags, lcm, scale_to_common_step};
pub use consolidate::{consolidate, consolidate_all, consolidate_by, values_per_point};
pub use tags::{extract_name_tag, extract_tags, NAME_TAG};
pub use types::{Series, DEFAULT_CONSOLIDATION};
