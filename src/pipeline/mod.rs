//! Census age extract to health impact estimation.
//!
//! Raw single-year-of-age records flow through four stages: a small area to
//! parent unit lookup, age banding, per-band outcome estimation, and a
//! rounded roll-up to parent units. [`run::run_pipeline`] chains them.

pub mod aggregate;
pub mod bands;
pub mod binning;
pub mod estimate;
pub mod lookup;
pub mod run;
pub mod types;

pub use run::{Diagnostics, PipelineOutput, run_pipeline};
