//! Region comparison: request model, default regions, orchestrator.

pub mod defaults;
pub mod engine;
pub mod measure;
pub mod types;

pub use defaults::default_regions;
pub use engine::Comparator;
pub use measure::{MeasureError, Measurement, diff_png_files, measure, measure_band, measure_png};
pub use types::{
    CompareError, CompareResult, ComparisonRequest, ComparisonResponse, RegionResult, Side, Tally,
    is_absolute_url,
};
